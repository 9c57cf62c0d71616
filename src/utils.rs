use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use chrono::Local;
use quick_xml::{NsReader, events::Event, name::ResolveResult};

use crate::error::EpubError;

pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// Returns the current time with custom format
pub fn local_time() -> String {
    Local::now().format("%Y-%m-%dT%H-%M-%S.%fU%z").to_string()
}

/// Returns the href without its `#fragment` part
pub fn strip_fragment(href: &str) -> &str {
    match href.split_once('#') {
        Some((path, _)) => path,
        None => href,
    }
}

/// Resolves an href against a directory and checks it stays inside the book
///
/// Both `base_dir` and the result are relative to the root of the extracted
/// book. The href is normalised lexically: `.` segments are dropped and each
/// `..` removes the previous segment. A leading `/` makes the href relative
/// to the book root instead of `base_dir`.
///
/// ## Return
/// - `Some(PathBuf)`: The normalised path relative to the book root
/// - `None`: The href climbs above the book root
pub fn resolve_within_book(base_dir: &Path, href: &str) -> Option<PathBuf> {
    let href = strip_fragment(href);
    let joined = match href.strip_prefix('/') {
        Some(absolute) => PathBuf::from(absolute),
        None => base_dir.join(href),
    };

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Normal(segment) => resolved.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    // failed to navigate up, the href leaves the book
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(resolved)
}

/// Reads a text file of the extracted book
///
/// A missing file is reported as `ResourceNotFound` so that callers can tell
/// an absent chapter from one that fails to decode.
pub fn read_text_file(path: &Path) -> Result<String, EpubError> {
    match fs::read(path) {
        Ok(bytes) => bytes.decode(),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(EpubError::ResourceNotFound {
            resource: path.to_string_lossy().to_string(),
        }),
        Err(err) => Err(err.into()),
    }
}

/// Provides functionality to decode byte data into strings
///
/// Detects UTF-8 (with or without BOM), UTF-16 BE and UTF-16 LE.
///
/// ## Notes
/// - Without a BOM, UTF-8 is tried first, then UTF-16 BE and LE; the last
///   resort is a lossy UTF-8 conversion.
pub trait DecodeBytes {
    fn decode(&self) -> Result<String, EpubError>;
}

impl DecodeBytes for [u8] {
    fn decode(&self) -> Result<String, EpubError> {
        if self.is_empty() {
            return Err(EpubError::EmptyDataError);
        }

        if let Some(rest) = self.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
            return String::from_utf8(rest.to_vec()).map_err(EpubError::from);
        }
        if let Some(rest) = self.strip_prefix(&[0xFE, 0xFF]) {
            return decode_utf16(rest, u16::from_be_bytes);
        }
        if let Some(rest) = self.strip_prefix(&[0xFF, 0xFE]) {
            return decode_utf16(rest, u16::from_le_bytes);
        }

        if let Ok(utf8_str) = std::str::from_utf8(self) {
            return Ok(utf8_str.to_string());
        }

        if self.len() % 2 == 0 {
            if let Ok(utf16_str) = decode_utf16(self, u16::from_be_bytes) {
                return Ok(utf16_str);
            }
            if let Ok(utf16_str) = decode_utf16(self, u16::from_le_bytes) {
                return Ok(utf16_str);
            }
        }

        Ok(String::from_utf8_lossy(self).to_string())
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Result<String, EpubError> {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect::<Vec<u16>>();

    String::from_utf16(&units).map_err(EpubError::from)
}

/// Provides functionality for normalizing whitespace characters
///
/// Collapses every run of whitespace into a single space and trims both ends.
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Represents an element node in an XML document
#[derive(Debug, Default)]
pub struct XmlElement {
    /// The local name of the element (excluding namespace prefix)
    pub name: String,

    /// The namespace prefix of the element
    pub prefix: Option<String>,

    /// The namespace URI the element is bound to
    pub namespace: Option<String>,

    /// The attributes of the element, keyed by their qualified name
    pub attributes: HashMap<String, String>,

    /// The character data before the first child, entities resolved
    pub text: String,

    /// The character data following the end tag, up to the next sibling
    /// or the end of the parent
    pub tail: String,

    /// The children of the element
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Get the full tag name of the element
    ///
    /// If the element has a namespace prefix, return "prefix:name" format;
    /// otherwise, return only the element name.
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Gets the text content of the element and all its descendants
    ///
    /// Character data is joined in document order, so mixed content such
    /// as `A <b>B</b> C` reads `A B C`. Leading and trailing whitespace is
    /// removed.
    pub fn text(&self) -> String {
        let mut result = String::new();
        self.collect_text(&mut result);

        result.trim().to_string()
    }

    fn collect_text(&self, out: &mut String) {
        out.push_str(&self.text);
        for child in &self.children {
            child.collect_text(out);
            out.push_str(&child.tail);
        }
    }

    /// Whether the element belongs to the Dublin Core element set
    ///
    /// Elements with a `dc` prefix are accepted even if the document
    /// forgot to declare the namespace.
    pub fn is_dublin_core(&self) -> bool {
        match &self.namespace {
            Some(namespace) => namespace == DC_NAMESPACE,
            None => self.prefix.as_deref() == Some("dc"),
        }
    }

    /// Returns the value of the specified attribute
    ///
    /// Empty values are treated as absent.
    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes
            .get(name)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }

    /// Find all elements with the specified local name in document order
    ///
    /// The search includes the element itself and every descendant.
    pub fn find_elements_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> {
        Descendants { stack: vec![self] }.filter(move |element| element.name == name)
    }

    /// Find all elements with the specified name among the child elements of the current element
    pub fn find_children_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Get children elements
    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter()
    }
}

/// Pre-order traversal over an element and its descendants
struct Descendants<'a> {
    stack: Vec<&'a XmlElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        self.stack.extend(element.children.iter().rev());
        Some(element)
    }
}

/// XML parser used to parse XML content and build an XML element tree
pub struct XmlReader {}

impl XmlReader {
    /// Parses an XML from string and builds the root element
    ///
    /// ## Return
    /// - `Ok(XmlElement)`: The root element of the XML element tree
    /// - `Err(EpubError)`: The content is empty or not well-formed
    pub fn parse(content: &str) -> Result<XmlElement, EpubError> {
        if content.trim().is_empty() {
            return Err(EpubError::EmptyDataError);
        }

        let mut reader = NsReader::from_str(content);

        let mut buf = Vec::new();
        let mut stack = Vec::<XmlElement>::new();
        let mut root = None;

        loop {
            let (resolved, event) = reader.read_resolved_event_into(&mut buf)?;
            let namespace = match resolved {
                ResolveResult::Bound(namespace) => {
                    Some(String::from_utf8_lossy(namespace.as_ref()).to_string())
                }
                _ => None,
            };

            match event {
                Event::Eof => break,

                Event::Start(e) => {
                    let element = Self::build_element(&e, namespace);
                    stack.push(element);
                }

                Event::Empty(e) => {
                    let element = Self::build_element(&e, namespace);
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }

                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(element),
                            None => root = Some(element),
                        }
                    }
                }

                Event::Text(e) => {
                    Self::push_text(&mut stack, &String::from_utf8_lossy(e.as_ref()));
                }

                Event::CData(e) => {
                    Self::push_text(&mut stack, &String::from_utf8_lossy(e.as_ref()));
                }

                Event::GeneralRef(e) => {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        Self::push_text(&mut stack, &resolved);
                    }
                }

                // Comment, PI, Declaration, Doctype
                _ => {}
            }

            buf.clear();
        }

        if !stack.is_empty() {
            return Err(EpubError::FailedParsingXml);
        }
        root.ok_or(EpubError::FailedParsingXml)
    }

    /// Appends character data to the open element
    ///
    /// Data after a child's end tag belongs to that child's tail.
    fn push_text(stack: &mut [XmlElement], text: &str) {
        let Some(element) = stack.last_mut() else {
            return;
        };
        match element.children.last_mut() {
            Some(child) => child.tail.push_str(text),
            None => element.text.push_str(text),
        }
    }

    fn build_element(
        start: &quick_xml::events::BytesStart<'_>,
        namespace: Option<String>,
    ) -> XmlElement {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
        let mut element = XmlElement::new(name);
        element.namespace = namespace;

        if let Some(prefix) = start.name().prefix() {
            element.prefix = Some(String::from_utf8_lossy(prefix.as_ref()).to_string());
        }

        for attr in start.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }

            let raw = String::from_utf8_lossy(&attr.value).to_string();
            let value = match quick_xml::escape::unescape(&raw) {
                Ok(value) => value.to_string(),
                Err(_) => raw.clone(),
            };
            element.attributes.insert(key, value);
        }

        element
    }
}

/// Resolves predefined XML entities and numeric character references
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };

    code.and_then(char::from_u32).map(String::from)
}
