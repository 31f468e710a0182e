use url::Url;

/// Resolves a possibly relative URI reference against `base`.
///
/// Absolute references are returned as-is. A relative reference with no base
/// is an error.
pub fn resolve_uri(base: Option<&Url>, reference: &str) -> Result<Url, url::ParseError> {
    let reference = reference.trim();
    match Url::parse(reference) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(reference),
            None => Err(url::ParseError::RelativeUrlWithoutBase),
        },
        Err(e) => Err(e),
    }
}
