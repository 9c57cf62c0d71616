use std::{
    fmt,
    path::{Path, PathBuf},
};

use log::warn;

use crate::utils::strip_fragment;

/// Title used whenever a package document does not declare one
pub const UNTITLED_BOOK: &str = "Untitled Book";

/// Represents one navigable unit of the book
///
/// A `Chapter` is produced for every well-formed `navPoint` of an NCX
/// document. The title is the text of the point's navigation label and the
/// content reference is the `src` of its `content` element, relative to the
/// directory of the package document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Display label of the chapter
    pub title: String,

    /// Reference to the content document, possibly carrying a `#fragment`
    pub content_ref: String,

    /// The `playOrder` attribute of the navigation point, if it was numeric
    pub play_order: Option<usize>,
}

impl Chapter {
    pub fn new(title: &str, content_ref: &str) -> Self {
        Self {
            title: title.to_string(),
            content_ref: content_ref.to_string(),
            play_order: None,
        }
    }

    /// The content reference without its fragment identifier
    pub fn path(&self) -> &str {
        strip_fragment(&self.content_ref)
    }

    /// The fragment identifier of the content reference, if any
    pub fn fragment(&self) -> Option<&str> {
        self.content_ref
            .split_once('#')
            .map(|(_, fragment)| fragment)
            .filter(|fragment| !fragment.is_empty())
    }

    /// Joins the content path onto a base directory
    ///
    /// This is a purely structural operation; whether the file exists is
    /// only known once it is read.
    pub fn resolve<P: AsRef<Path>>(&self, base_dir: P) -> PathBuf {
        base_dir.as_ref().join(self.path())
    }
}

/// Ordering applied to the chapters of a navigation document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChapterOrder {
    /// The order in which `navPoint` elements appear in the document
    #[default]
    Document,

    /// Ascending `playOrder`; points without one keep their relative
    /// order and go last
    PlayOrder,
}

impl ChapterOrder {
    /// Reorders chapters in place
    pub fn apply(self, chapters: &mut [Chapter]) {
        if self == ChapterOrder::PlayOrder {
            // `sort_by_key` is stable, equal keys keep document order
            chapters.sort_by_key(|chapter| (chapter.play_order.is_none(), chapter.play_order));
        }
    }
}

/// Represents a resource item declared in the package manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    /// The unique identifier of the item
    pub id: String,

    /// The href of the resource, relative to the package document
    pub href: String,

    /// The declared media type
    pub media_type: Option<String>,

    /// Space-separated properties such as `cover-image` or `nav`
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|properties| properties.split_whitespace().any(|p| p == property))
    }
}

/// Represents an item of the spine, resolved through the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    /// The manifest id this item references
    pub idref: String,

    /// The href of the referenced manifest item
    pub href: String,

    /// Whether the item is part of the linear reading order
    pub linear: bool,
}

/// Key of a free-form `<meta>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaKey {
    /// EPUB 2 style `<meta name="..." content="..."/>`
    Name(String),

    /// EPUB 3 style `<meta property="...">...</meta>`
    Property(String),
}

impl MetaKey {
    pub fn as_str(&self) -> &str {
        match self {
            MetaKey::Name(key) | MetaKey::Property(key) => key,
        }
    }
}

/// A `<meta>` element collected from the package metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaProperty {
    pub key: MetaKey,
    pub content: String,
}

/// Descriptive metadata of a publication
///
/// Single-valued fields hold the first occurrence of the corresponding
/// Dublin Core element. Creators and subjects keep every occurrence in
/// document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub identifier: Option<String>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub rights: Option<String>,

    pub creators: Vec<String>,
    pub subjects: Vec<String>,

    /// `<meta>` elements keyed by `name` or `property`
    pub meta: Vec<MetaProperty>,
}

impl PackageMetadata {
    /// Returns the title, or `"Untitled Book"` if it is missing or blank
    pub fn title_or_default(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(UNTITLED_BOOK)
            .to_string()
    }

    /// Returns the content of the first `<meta>` whose name or property is `key`
    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|meta| meta.key.as_str() == key)
            .map(|meta| meta.content.as_str())
    }
}

/// The unpacked archive on persistent storage
///
/// The tree is owned by whoever holds this value; nothing in this crate
/// deletes it after it has been moved into its final location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBook {
    /// The title-named directory containing the extracted files
    pub root: PathBuf,

    /// The resolved book title
    pub title: String,

    /// The directory name derived from the title
    pub folder_name: String,
}

impl ExtractedBook {
    /// Lists every regular file of the extracted tree, sorted by path
    pub fn files(&self) -> Result<Vec<PathBuf>, crate::error::EpubError> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }
}

/// Kind of a non-fatal problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// An expected element is absent
    MissingElement { tag: String, context: String },

    /// An element lacks an attribute it needs
    MissingAttribute { tag: String, attribute: String },

    /// A reference does not resolve to a known item or file
    UnresolvedReference { reference: String, context: String },

    /// A manifest id is declared more than once
    DuplicateId { id: String },

    /// A document could not be parsed
    MalformedXml { reason: String },

    /// An optional document could not be found
    MissingDocument { expected: String },
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::MissingElement { tag, context } => {
                write!(f, "missing <{tag}> in {context}")
            }
            DiagnosticKind::MissingAttribute { tag, attribute } => {
                write!(f, "<{tag}> has no \"{attribute}\" attribute")
            }
            DiagnosticKind::UnresolvedReference { reference, context } => {
                write!(f, "{context} reference \"{reference}\" does not resolve")
            }
            DiagnosticKind::DuplicateId { id } => write!(f, "duplicate manifest id \"{id}\""),
            DiagnosticKind::MalformedXml { reason } => write!(f, "malformed XML: {reason}"),
            DiagnosticKind::MissingDocument { expected } => write!(f, "{expected} not found"),
        }
    }
}

/// A skipped item or a fallback taken while parsing, with the file it concerns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    /// Creates a diagnostic and logs it at warn level
    pub fn report<P: Into<PathBuf>>(file: P, kind: DiagnosticKind) -> Self {
        let diagnostic = Self {
            file: file.into(),
            kind,
        };
        warn!("{}", diagnostic);
        diagnostic
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.kind)
    }
}

#[cfg(test)]
mod tests {
    mod chapter_tests {
        use std::path::{Path, PathBuf};

        use crate::types::{Chapter, ChapterOrder};

        fn chapter(title: &str, play_order: Option<usize>) -> Chapter {
            Chapter {
                title: title.to_string(),
                content_ref: format!("{}.xhtml", title.to_lowercase()),
                play_order,
            }
        }

        #[test]
        fn test_chapter_path_strips_fragment() {
            let chapter = Chapter::new("Chapter One", "text/chapter1.xhtml#section-2");
            assert_eq!(chapter.path(), "text/chapter1.xhtml");
            assert_eq!(chapter.fragment(), Some("section-2"));

            let chapter = Chapter::new("Chapter Two", "chapter2.xhtml");
            assert_eq!(chapter.path(), "chapter2.xhtml");
            assert_eq!(chapter.fragment(), None);
        }

        #[test]
        fn test_chapter_resolve() {
            let chapter = Chapter::new("Chapter One", "chapter1.xhtml#top");
            assert_eq!(
                chapter.resolve(Path::new("/books/A Book/OEBPS")),
                PathBuf::from("/books/A Book/OEBPS/chapter1.xhtml")
            );
        }

        #[test]
        fn test_document_order_keeps_sequence() {
            let mut chapters = vec![chapter("B", Some(2)), chapter("A", Some(1))];
            ChapterOrder::Document.apply(&mut chapters);
            assert_eq!(chapters[0].title, "B");
            assert_eq!(chapters[1].title, "A");
        }

        #[test]
        fn test_play_order_sorts_and_puts_missing_last() {
            let mut chapters = vec![
                chapter("Appendix", None),
                chapter("Three", Some(3)),
                chapter("One", Some(1)),
                chapter("Notes", None),
                chapter("Two", Some(2)),
            ];
            ChapterOrder::PlayOrder.apply(&mut chapters);

            let titles = chapters
                .iter()
                .map(|chapter| chapter.title.as_str())
                .collect::<Vec<_>>();
            assert_eq!(titles, vec!["One", "Two", "Three", "Appendix", "Notes"]);
        }
    }

    mod metadata_tests {
        use crate::types::{MetaKey, MetaProperty, PackageMetadata, UNTITLED_BOOK};

        #[test]
        fn test_title_or_default() {
            let metadata = PackageMetadata::default();
            assert_eq!(metadata.title_or_default(), UNTITLED_BOOK);

            let metadata = PackageMetadata {
                title: Some("   ".to_string()),
                ..Default::default()
            };
            assert_eq!(metadata.title_or_default(), "Untitled Book");

            let metadata = PackageMetadata {
                title: Some("A Joyous Adventure".to_string()),
                ..Default::default()
            };
            assert_eq!(metadata.title_or_default(), "A Joyous Adventure");
        }

        #[test]
        fn test_meta_value() {
            let metadata = PackageMetadata {
                meta: vec![
                    MetaProperty {
                        key: MetaKey::Name("cover".to_string()),
                        content: "cover-image".to_string(),
                    },
                    MetaProperty {
                        key: MetaKey::Property("dcterms:modified".to_string()),
                        content: "2021-01-11T00:00:00Z".to_string(),
                    },
                ],
                ..Default::default()
            };

            assert_eq!(metadata.meta_value("cover"), Some("cover-image"));
            assert_eq!(
                metadata.meta_value("dcterms:modified"),
                Some("2021-01-11T00:00:00Z")
            );
            assert_eq!(metadata.meta_value("generator"), None);
        }
    }

    mod diagnostic_tests {
        use crate::types::{Diagnostic, DiagnosticKind, ManifestItem};

        #[test]
        fn test_diagnostic_display() {
            let diagnostic = Diagnostic::report(
                "OEBPS/content.opf",
                DiagnosticKind::UnresolvedReference {
                    reference: "ch9".to_string(),
                    context: "spine".to_string(),
                },
            );
            assert_eq!(
                diagnostic.to_string(),
                "OEBPS/content.opf: spine reference \"ch9\" does not resolve"
            );
        }

        #[test]
        fn test_manifest_item_has_property() {
            let item = ManifestItem {
                id: "cover".to_string(),
                href: "images/cover.jpg".to_string(),
                media_type: Some("image/jpeg".to_string()),
                properties: Some("svg cover-image".to_string()),
            };
            assert!(item.has_property("cover-image"));
            assert!(!item.has_property("cover"));
        }
    }
}
