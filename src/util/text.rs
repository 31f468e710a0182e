use std::borrow::Cow;

/// Removes C0 control characters (except tab, newline and carriage return)
/// and DEL from feed-supplied text.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
///
/// # Examples
///
/// ```
/// use scephoto_sync::util::strip_control_chars;
///
/// assert_eq!(strip_control_chars("Sun\x00set"), "Sunset");
/// assert_eq!(strip_control_chars("line\nbreak"), "line\nbreak");
/// ```
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !is_stripped(*c)).collect())
}

fn is_stripped(c: char) -> bool {
    c == '\u{7f}' || (c < '\u{20}' && !matches!(c, '\t' | '\n' | '\r'))
}

/// Trims surrounding whitespace and strips control characters.
pub fn clean_text(s: &str) -> String {
    strip_control_chars(s.trim()).into_owned()
}
