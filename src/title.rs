//! Metadata Title Resolver
//!
//! Finds the book title used to name the extracted tree on disk.

use std::path::Path;

use crate::{
    container::CONVENTIONAL_PACKAGE_PATHS,
    error::EpubError,
    types::UNTITLED_BOOK,
    utils::{NormalizeWhitespace, XmlReader, read_text_file},
};

/// Characters that cannot appear in a directory name on common filesystems
const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Longest folder name produced, in bytes; common filesystems allow 255
pub const FOLDER_NAME_LIMIT: usize = 200;

/// Resolve the title of a book extracted at `root`
///
/// Only the conventional `OEBPS/content.opf` and `OEBPS/package.opf`
/// locations are consulted, in that order. `container.xml` is not read;
/// the loader uses this as a fallback when the container route fails.
///
/// ## Return
/// - `Ok(String)`: The first Dublin Core title, or `"Untitled Book"`
/// - `Err(EpubError)`: Neither location exists, or the document found does
///   not parse
pub fn resolve_title<P: AsRef<Path>>(root: P) -> Result<String, EpubError> {
    let root = root.as_ref();
    let package_path = CONVENTIONAL_PACKAGE_PATHS
        .iter()
        .map(|path| root.join(path))
        .find(|path| path.is_file())
        .ok_or_else(|| EpubError::NoPackageDocument {
            searched: CONVENTIONAL_PACKAGE_PATHS.join(", "),
        })?;

    title_from_package(&read_text_file(&package_path)?)
}

/// Extract the title from the content of a package document
///
/// The first `title` element in the Dublin Core namespace wins. Whitespace
/// is collapsed, and a missing or blank title becomes `"Untitled Book"`.
pub fn title_from_package(content: &str) -> Result<String, EpubError> {
    let root = XmlReader::parse(content)?;
    let title = root
        .find_elements_by_name("title")
        .find(|element| element.is_dublin_core())
        .map(|element| element.text().normalize_whitespace())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNTITLED_BOOK.to_string());

    Ok(title)
}

/// Turn a title into a name usable as a single directory
///
/// Path separators and reserved characters become `_`, control
/// characters are removed and surrounding whitespace and dots are trimmed.
/// Long titles are cut at a character boundary so the name stays within
/// [`FOLDER_NAME_LIMIT`] bytes.
pub fn folder_name(title: &str) -> String {
    let name = title
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect::<String>();
    let name = trim_name(&name);

    let mut end = name.len().min(FOLDER_NAME_LIMIT);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let name = trim_name(&name[..end]);

    if name.is_empty() {
        UNTITLED_BOOK.to_string()
    } else {
        name.to_string()
    }
}

fn trim_name(name: &str) -> &str {
    name.trim_matches(|c: char| c.is_whitespace() || c == '.')
}
