//! Minimal namespace-aware element tree over quick-xml events.
//!
//! The converter needs random access to children by `(namespace, name)`, so
//! the document is materialised once instead of being walked as a stream.
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use thiserror::Error;

/// SEC-003: Maximum element nesting depth. Feed documents are shallow
/// (`rss/channel/item/sse:sync/sse:history`); anything deeper is hostile.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("Document has no root element")]
    Empty,
}

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        XmlError::Parse(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Resolved namespace URI; `None` for elements in no namespace.
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<Attribute>,
    /// Concatenated text and CDATA content of this element (not descendants).
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn is(&self, namespace: Option<&str>, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == namespace
    }

    pub fn child(&self, namespace: Option<&str>, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, name))
    }

    /// Text of the first matching child, if that child exists.
    pub fn child_text(&self, namespace: Option<&str>, name: &str) -> Option<&str> {
        self.child(namespace, name).map(|c| c.text.as_str())
    }

    /// Attribute lookup. Unprefixed attributes have no namespace, regardless
    /// of the element's namespace.
    pub fn attr(&self, namespace: Option<&str>, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.namespace.as_deref() == namespace)
            .map(|a| a.value.as_str())
    }
}

/// Parses a complete XML document into an [`Element`] tree.
///
/// # Errors
///
/// - [`XmlError::Parse`] for malformed XML or undeclared entities
/// - [`XmlError::MaxDepthExceeded`] when nesting exceeds the safety limit
/// - [`XmlError::Empty`] when the document has no root element
///
/// # Security
///
/// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations. Only the
/// five XML builtins are resolved; anything else fails in
/// `decode_and_unescape_value()` / `unescape()`.
pub fn parse_document(bytes: &[u8]) -> Result<Element, XmlError> {
    let mut reader = NsReader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let (ns, event) = reader.read_resolved_event_into(&mut buf)?;
        let namespace = namespace_of(ns);
        match event {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::MaxDepthExceeded(MAX_DEPTH));
                }
                let element = start_element(&reader, &e, namespace)?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = start_element(&reader, &e, namespace)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    root.ok_or(XmlError::Empty)
}

fn namespace_of(ns: ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(prefix) => {
            tracing::debug!(
                prefix = %String::from_utf8_lossy(&prefix),
                "Undeclared namespace prefix"
            );
            None
        }
    }
}

fn start_element(
    reader: &NsReader<&[u8]>,
    e: &BytesStart<'_>,
    namespace: Option<String>,
) -> Result<Element, XmlError> {
    let mut attributes = Vec::new();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed XML attribute");
                continue;
            }
        };
        // Namespace declarations are consumed by the reader itself.
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let (ns, local) = reader.resolve_attribute(attr.key);
        let attr_namespace = namespace_of(ns);
        let name = String::from_utf8_lossy(local.as_ref()).into_owned();
        let value = attr.decode_and_unescape_value(reader.decoder())?.into_owned();
        attributes.push(Attribute {
            namespace: attr_namespace,
            name,
            value,
        });
    }

    Ok(Element {
        namespace,
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}
