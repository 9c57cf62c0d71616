//! Navigation Parser
//!
//! Turns an EPUB 2 NCX document into a flat chapter list. Nested
//! `navPoint` elements are flattened in document order.

use std::path::{Path, PathBuf};

use log::debug;

use crate::{
    error::EpubError,
    types::{Chapter, ChapterOrder, Diagnostic, DiagnosticKind},
    utils::{NormalizeWhitespace, XmlElement, XmlReader},
};

/// A parsed NCX document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcxDocument {
    /// Text of `docTitle`, if present
    pub title: Option<String>,

    /// One chapter per well-formed `navPoint`, in document order
    pub chapters: Vec<Chapter>,

    /// Navigation points that were skipped, and why
    pub diagnostics: Vec<Diagnostic>,
}

impl NcxDocument {
    /// Returns the chapters in the requested order
    pub fn ordered(&self, order: ChapterOrder) -> Vec<Chapter> {
        let mut chapters = self.chapters.clone();
        order.apply(&mut chapters);
        chapters
    }
}

/// Parse the content of an NCX document
///
/// Every `navPoint` element is visited, whatever its depth. A point yields
/// a chapter when its own `navLabel/text` and `content/@src` are present
/// and non-empty; otherwise it is skipped and a diagnostic is recorded.
///
/// ## Parameters
/// - `content`: The NCX document text
/// - `ncx_path`: Where the document lives, used to label diagnostics
///
/// ## Return
/// - `Ok(NcxDocument)`: The chapters and diagnostics
/// - `Err(EpubError)`: The document is not well-formed XML
pub fn parse_ncx<P: AsRef<Path>>(content: &str, ncx_path: P) -> Result<NcxDocument, EpubError> {
    let ncx_path = ncx_path.as_ref();
    let root = XmlReader::parse(content)?;

    let title = root
        .find_elements_by_name("docTitle")
        .next()
        .map(|element| element.text().normalize_whitespace())
        .filter(|title| !title.is_empty());

    let mut chapters = Vec::new();
    let mut diagnostics = Vec::new();
    for (index, nav_point) in root.find_elements_by_name("navPoint").enumerate() {
        match parse_nav_point(nav_point, index) {
            Ok(chapter) => {
                debug!("navPoint {} -> {}", chapter.title, chapter.content_ref);
                chapters.push(chapter);
            }
            Err(kind) => diagnostics.push(Diagnostic::report(ncx_path, kind)),
        }
    }

    Ok(NcxDocument {
        title,
        chapters,
        diagnostics,
    })
}

fn parse_nav_point(nav_point: &XmlElement, index: usize) -> Result<Chapter, DiagnosticKind> {
    let context = match nav_point.get_attr("id") {
        Some(id) => format!("navPoint \"{id}\""),
        None => format!("navPoint #{}", index + 1),
    };

    let title = nav_point
        .find_children_by_name("navLabel")
        .next()
        .and_then(|label| label.find_children_by_name("text").next())
        .map(|text| text.text().normalize_whitespace())
        .filter(|title| !title.is_empty())
        .ok_or_else(|| DiagnosticKind::MissingElement {
            tag: "navLabel/text".to_string(),
            context: context.clone(),
        })?;

    let content = nav_point
        .find_children_by_name("content")
        .next()
        .ok_or_else(|| DiagnosticKind::MissingElement {
            tag: "content".to_string(),
            context: context.clone(),
        })?;
    let src = content
        .get_attr("src")
        .map(|src| src.trim().to_string())
        .ok_or_else(|| DiagnosticKind::MissingAttribute {
            tag: "content".to_string(),
            attribute: "src".to_string(),
        })?;

    Ok(Chapter {
        title,
        content_ref: src,
        play_order: nav_point
            .get_attr("playOrder")
            .and_then(|order| order.trim().parse::<usize>().ok()),
    })
}

/// Fallback NCX location when the package does not name one
pub(crate) fn default_ncx_path(base_dir: &Path) -> PathBuf {
    base_dir.join("toc.ncx")
}
