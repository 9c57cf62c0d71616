//! Container Resolver
//!
//! Finds the package document of an extracted book. `META-INF/container.xml`
//! is the authoritative source; a scan of the extracted tree is only used
//! when the container document cannot be used.

use std::path::{Path, PathBuf};

use log::info;
use walkdir::WalkDir;

use crate::{
    error::EpubError,
    types::{Diagnostic, DiagnosticKind},
    utils::{XmlReader, read_text_file, resolve_within_book},
};

/// Location of the container document inside an extracted book
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Conventional package document locations, checked in order by the scan
pub const CONVENTIONAL_PACKAGE_PATHS: [&str; 2] = ["OEBPS/content.opf", "OEBPS/package.opf"];

/// How a package document was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    /// Named by the first `rootfile` of `META-INF/container.xml`
    Container,

    /// Found by scanning the extracted tree
    DirectoryScan,
}

/// A package document found inside an extracted book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLocation {
    /// Path of the package document, relative to the book root
    pub path: PathBuf,

    pub source: LocationSource,

    /// Why the container document could not be used, if it was not
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse the content of a `container.xml` document
///
/// Returns the `full-path` of the first `rootfile` element, wherever it
/// sits in the document. Any further rootfiles are ignored.
///
/// ## Return
/// - `Ok(PathBuf)`: The package document path, relative to the book root
/// - `Err(EpubError)`: The document is not well-formed, or has no usable
///   `rootfile`
pub fn parse_container(content: &str) -> Result<PathBuf, EpubError> {
    let root = XmlReader::parse(content)?;
    let full_path = root
        .find_elements_by_name("rootfile")
        .next()
        .and_then(|rootfile| rootfile.get_attr("full-path"))
        .ok_or(EpubError::MissingRootfile)?;

    Ok(PathBuf::from(full_path.trim()))
}

/// Find the package document of the book extracted at `root`
///
/// The container document is tried first. If it is absent, does not parse,
/// has no rootfile or names a file that does not exist, the reason is
/// recorded as a diagnostic and the tree is scanned instead: first the
/// conventional `OEBPS` locations, then any `*.opf` file.
///
/// ## Return
/// - `Ok(PackageLocation)`: The package document and how it was found
/// - `Err(EpubError)`: No package document exists, or the tree cannot be
///   traversed
pub fn locate_package_document<P: AsRef<Path>>(root: P) -> Result<PackageLocation, EpubError> {
    let root = root.as_ref();
    let mut diagnostics = Vec::new();

    match resolve_from_container(root) {
        Ok(path) => {
            info!("Package document resolved from container: {}", path.display());
            return Ok(PackageLocation {
                path,
                source: LocationSource::Container,
                diagnostics,
            });
        }
        Err(kind) => diagnostics.push(Diagnostic::report(CONTAINER_PATH, kind)),
    }

    let path = scan_for_package(root)?.ok_or_else(|| EpubError::NoPackageDocument {
        searched: format!(
            "{}, {} or any *.opf file",
            CONVENTIONAL_PACKAGE_PATHS[0], CONVENTIONAL_PACKAGE_PATHS[1]
        ),
    })?;

    info!("Package document found by directory scan: {}", path.display());
    Ok(PackageLocation {
        path,
        source: LocationSource::DirectoryScan,
        diagnostics,
    })
}

fn resolve_from_container(root: &Path) -> Result<PathBuf, DiagnosticKind> {
    let content = read_text_file(&root.join(CONTAINER_PATH)).map_err(|err| match err {
        EpubError::ResourceNotFound { .. } => DiagnosticKind::MissingDocument {
            expected: CONTAINER_PATH.to_string(),
        },
        other => DiagnosticKind::MalformedXml {
            reason: other.to_string(),
        },
    })?;

    let path = parse_container(&content).map_err(|err| match err {
        EpubError::MissingRootfile => DiagnosticKind::MissingElement {
            tag: "rootfile".to_string(),
            context: "container".to_string(),
        },
        other => DiagnosticKind::MalformedXml {
            reason: other.to_string(),
        },
    })?;

    let full_path = path.to_string_lossy().to_string();
    let unresolved = || DiagnosticKind::UnresolvedReference {
        reference: full_path.clone(),
        context: "rootfile".to_string(),
    };

    // full-path is relative to the root of the container
    let path = resolve_within_book(Path::new(""), &full_path).ok_or_else(unresolved)?;
    if path.as_os_str().is_empty() || !root.join(&path).is_file() {
        return Err(unresolved());
    }

    Ok(path)
}

/// Scan an extracted tree for a package document
///
/// The conventional locations win over any other `*.opf` file. Other files
/// are visited in sorted order so the result does not depend on the
/// filesystem.
pub fn scan_for_package(root: &Path) -> Result<Option<PathBuf>, EpubError> {
    if let Some(path) = CONVENTIONAL_PACKAGE_PATHS
        .iter()
        .find(|path| root.join(path).is_file())
    {
        return Ok(Some(PathBuf::from(path)));
    }

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        let is_opf = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("opf"));

        if entry.file_type().is_file() && is_opf {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                return Ok(Some(relative.to_path_buf()));
            }
        }
    }

    Ok(None)
}
