//! Package Parser
//!
//! Reads the OPF package document: descriptive metadata, the manifest of
//! resources and the spine. Only a document that does not parse at all is
//! an error. Missing sections and unusable items are recorded as
//! diagnostics and the rest of the document is still used.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;

use crate::{
    error::EpubError,
    types::{
        Diagnostic, DiagnosticKind, ManifestItem, MetaKey, MetaProperty, PackageMetadata,
        SpineItem,
    },
    utils::{NormalizeWhitespace, XmlElement, XmlReader, resolve_within_book},
};

const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";
const CSS_MEDIA_TYPE: &str = "text/css";

/// A parsed OPF package document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDocument {
    /// Path of the package document, relative to the book root
    pub package_path: PathBuf,

    /// Directory of the package document; manifest hrefs are relative to it
    pub base_dir: PathBuf,

    pub metadata: PackageMetadata,

    /// Manifest items keyed by id, in declaration order
    pub manifest: IndexMap<String, ManifestItem>,

    /// Reading order, resolved through the manifest
    pub spine: Vec<SpineItem>,

    /// The `toc` attribute of the spine, naming the NCX manifest item
    pub toc_id: Option<String>,

    /// Everything skipped while parsing
    pub diagnostics: Vec<Diagnostic>,
}

impl PackageDocument {
    /// Parse the content of a package document
    ///
    /// ## Parameters
    /// - `content`: The package document text
    /// - `package_path`: Where the document lives, relative to the book root
    ///
    /// ## Return
    /// - `Ok(PackageDocument)`: The parsed document, possibly partial
    /// - `Err(EpubError)`: The document is not well-formed XML
    pub fn parse<P: AsRef<Path>>(content: &str, package_path: P) -> Result<Self, EpubError> {
        let package_path = package_path.as_ref().to_path_buf();
        let base_dir = package_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let root = XmlReader::parse(content)?;

        let mut doc = Self {
            package_path,
            base_dir,
            metadata: PackageMetadata::default(),
            manifest: IndexMap::new(),
            spine: vec![],
            toc_id: None,
            diagnostics: vec![],
        };

        match root.find_elements_by_name("metadata").next() {
            Some(element) => doc.parse_metadata(element),
            None => doc.missing_element("metadata"),
        }

        match root.find_elements_by_name("manifest").next() {
            Some(element) => doc.parse_manifest(element),
            None => doc.missing_element("manifest"),
        }

        match root.find_elements_by_name("spine").next() {
            Some(element) => doc.parse_spine(element),
            None => doc.missing_element("spine"),
        }

        debug!(
            "Parsed {}: {} manifest items, {} spine items",
            doc.package_path.display(),
            doc.manifest.len(),
            doc.spine.len()
        );
        Ok(doc)
    }

    fn missing_element(&mut self, tag: &str) {
        self.diagnostics.push(Diagnostic::report(
            &self.package_path,
            DiagnosticKind::MissingElement {
                tag: tag.to_string(),
                context: "package".to_string(),
            },
        ));
    }

    /// Collects Dublin Core elements and `<meta>` elements
    fn parse_metadata(&mut self, metadata_element: &XmlElement) {
        let metadata = &mut self.metadata;

        for element in metadata_element.children() {
            if element.name == "meta" {
                if let Some(meta) = parse_meta_element(element) {
                    metadata.meta.push(meta);
                }
                continue;
            }

            if !element.is_dublin_core() {
                continue;
            }

            let value = element.text().normalize_whitespace();
            if value.is_empty() {
                continue;
            }

            let field = match element.name.as_str() {
                "title" => &mut metadata.title,
                "identifier" => &mut metadata.identifier,
                "language" => &mut metadata.language,
                "publisher" => &mut metadata.publisher,
                "date" => &mut metadata.date,
                "description" => &mut metadata.description,
                "rights" => &mut metadata.rights,
                "creator" => {
                    metadata.creators.push(value.clone());
                    &mut metadata.creator
                }
                "subject" => {
                    metadata.subjects.push(value.clone());
                    &mut metadata.subject
                }
                _ => continue,
            };

            if field.is_none() {
                *field = Some(value);
            }
        }
    }

    fn parse_manifest(&mut self, manifest_element: &XmlElement) {
        for element in manifest_element.find_children_by_name("item") {
            let Some(id) = self.required_attr(element, "id") else {
                continue;
            };
            let Some(href) = self.required_attr(element, "href") else {
                continue;
            };

            if self.manifest.contains_key(&id) {
                self.diagnostics.push(Diagnostic::report(
                    &self.package_path,
                    DiagnosticKind::DuplicateId { id },
                ));
                continue;
            }

            debug!("Manifest item {} -> {}", id, href);
            self.manifest.insert(
                id.clone(),
                ManifestItem {
                    id,
                    href,
                    media_type: element.get_attr("media-type"),
                    properties: element.get_attr("properties"),
                },
            );
        }
    }

    fn parse_spine(&mut self, spine_element: &XmlElement) {
        self.toc_id = spine_element.get_attr("toc");

        let mut itemrefs = Vec::new();
        for element in spine_element.find_children_by_name("itemref") {
            let Some(idref) = self.required_attr(element, "idref") else {
                continue;
            };
            let linear = element
                .get_attr("linear")
                .map(|linear| linear != "no")
                .unwrap_or(true);
            itemrefs.push((idref, linear));
        }

        let (spine, diagnostics) = resolve_spine(
            &self.manifest,
            itemrefs
                .iter()
                .map(|(idref, linear)| (idref.as_str(), *linear)),
            &self.package_path,
        );
        self.spine = spine;
        self.diagnostics.extend(diagnostics);
    }

    fn required_attr(&mut self, element: &XmlElement, attribute: &str) -> Option<String> {
        let value = element.get_attr(attribute);
        if value.is_none() {
            self.diagnostics.push(Diagnostic::report(
                &self.package_path,
                DiagnosticKind::MissingAttribute {
                    tag: element.tag_name(),
                    attribute: attribute.to_string(),
                },
            ));
        }
        value
    }

    /// The href of the NCX document, relative to `base_dir`
    ///
    /// The spine `toc` attribute is preferred; otherwise the first manifest
    /// item with the NCX media type is used.
    pub fn ncx_href(&self) -> Option<&str> {
        self.toc_id
            .as_ref()
            .and_then(|id| self.manifest.get(id))
            .or_else(|| {
                self.manifest
                    .values()
                    .find(|item| item.media_type.as_deref() == Some(NCX_MEDIA_TYPE))
            })
            .map(|item| item.href.as_str())
    }

    /// The href of the cover image, relative to `base_dir`
    pub fn cover_href(&self) -> Option<&str> {
        self.metadata
            .meta_value("cover")
            .and_then(|id| self.manifest.get(id))
            .or_else(|| {
                self.manifest
                    .values()
                    .find(|item| item.has_property("cover-image"))
            })
            .map(|item| item.href.as_str())
    }

    /// The hrefs of every stylesheet in the manifest, in declaration order
    pub fn stylesheet_hrefs(&self) -> Vec<&str> {
        self.manifest
            .values()
            .filter(|item| item.media_type.as_deref() == Some(CSS_MEDIA_TYPE))
            .map(|item| item.href.as_str())
            .collect()
    }

    /// Resolve an href of this document to a path relative to the book root
    ///
    /// The fragment is dropped. An href climbing out of the book is
    /// rejected with `RelativeLinkLeakage`.
    pub fn resolve_href(&self, href: &str) -> Result<PathBuf, EpubError> {
        resolve_within_book(&self.base_dir, href).ok_or_else(|| EpubError::RelativeLinkLeakage {
            path: href.to_string(),
        })
    }
}

/// Parse a `<meta>` element, EPUB 2 or EPUB 3 style
fn parse_meta_element(element: &XmlElement) -> Option<MetaProperty> {
    let key = match (element.get_attr("name"), element.get_attr("property")) {
        (Some(name), _) => MetaKey::Name(name),
        (None, Some(property)) => MetaKey::Property(property),
        (None, None) => return None,
    };

    let content = element
        .get_attr("content")
        .unwrap_or_else(|| element.text().normalize_whitespace());

    Some(MetaProperty { key, content })
}

/// Resolve spine idrefs through a manifest
///
/// Each `(idref, linear)` pair whose id is declared in the manifest yields
/// one [`SpineItem`], in input order. The others are dropped and reported
/// against `file`.
pub fn resolve_spine<'a, I>(
    manifest: &IndexMap<String, ManifestItem>,
    itemrefs: I,
    file: &Path,
) -> (Vec<SpineItem>, Vec<Diagnostic>)
where
    I: IntoIterator<Item = (&'a str, bool)>,
{
    let mut spine = Vec::new();
    let mut diagnostics = Vec::new();

    for (idref, linear) in itemrefs {
        match manifest.get(idref) {
            Some(item) => spine.push(SpineItem {
                idref: idref.to_string(),
                href: item.href.clone(),
                linear,
            }),
            None => diagnostics.push(Diagnostic::report(
                file,
                DiagnosticKind::UnresolvedReference {
                    reference: idref.to_string(),
                    context: "spine".to_string(),
                },
            )),
        }
    }

    (spine, diagnostics)
}
