//! Archive Extractor
//!
//! Unpacks a zip-compatible container onto disk, mirroring its internal
//! directory structure.
//!
//! Extraction is not transactional: a failure part-way leaves the entries
//! written so far in place. Running it again over the same destination
//! overwrites existing files, so the step can simply be retried.

use std::{
    fs::{self, File},
    io::{self, BufReader, Read, Seek},
    path::{Path, PathBuf},
};

use log::{debug, info};
use zip::{CompressionMethod, ZipArchive};

use crate::error::EpubError;

/// An entry of an archive, as listed by its central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// The entry name, using `/` as separator
    pub name: String,

    /// Whether the entry is a directory
    pub is_dir: bool,

    /// Uncompressed size in bytes
    pub size: u64,
}

/// Outcome of a successful extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// The directory the archive was extracted into
    pub dest: PathBuf,

    /// Number of file entries written
    pub files: usize,

    /// Number of directory entries created
    pub directories: usize,
}

/// Lists the entries of an archive without extracting them
pub fn list_entries<R: Read + Seek>(reader: R) -> Result<Vec<ArchiveEntry>, EpubError> {
    let mut archive = ZipArchive::new(reader)?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        entries.push(ArchiveEntry {
            name: file.name().to_string(),
            is_dir: file.is_dir(),
            size: file.size(),
        });
    }

    Ok(entries)
}

/// Checks that every entry uses a compression method allowed by OCF
///
/// OCF ZIP containers may only use Stored (no compression) or Deflated.
///
/// ## Return
/// - `Ok(())`: All entries use a supported compression method
/// - `Err(EpubError)`: The first entry found with another method
pub fn check_compression<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<(), EpubError> {
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index)?;

        match file.compression() {
            CompressionMethod::Stored | CompressionMethod::Deflated => continue,
            method => {
                return Err(EpubError::UnusableCompressionMethod {
                    file: file.name().to_string(),
                    method: format!("{:?}", method),
                });
            }
        }
    }

    Ok(())
}

/// Extracts every entry of an archive into `dest`
///
/// Entries keep their relative path. Directory entries are created as
/// directories and missing parent directories of file entries are created
/// on demand. Existing files are overwritten.
///
/// ## Parameters
/// - `reader`: The archive data
/// - `dest`: The destination directory, created if missing
///
/// ## Return
/// - `Ok(ExtractionSummary)`: Counts of the written entries
/// - `Err(EpubError)`: The archive or one of its entries is unreadable,
///   an entry name escapes `dest`, or the destination is not writable
pub fn extract_archive<R: Read + Seek>(
    reader: R,
    dest: &Path,
) -> Result<ExtractionSummary, EpubError> {
    let mut archive = ZipArchive::new(reader)?;
    extract_entries(&mut archive, dest)
}

/// Opens the archive at `path` and extracts it into `dest`
pub fn extract_file<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    dest: Q,
) -> Result<ExtractionSummary, EpubError> {
    let file = File::open(path.as_ref())?;
    extract_archive(BufReader::new(file), dest.as_ref())
}

/// Extracts the entries of an already opened archive
pub fn extract_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    dest: &Path,
) -> Result<ExtractionSummary, EpubError> {
    fs::create_dir_all(dest)?;

    let mut summary = ExtractionSummary {
        dest: dest.to_path_buf(),
        files: 0,
        directories: 0,
    };

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let relative = file
            .enclosed_name()
            .ok_or_else(|| EpubError::UnsafeEntryPath {
                entry: file.name().to_string(),
            })?;
        let target = dest.join(&relative);

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            summary.directories += 1;
            debug!("Directory created: {}", target.display());
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut output = File::create(&target)?;
        io::copy(&mut file, &mut output)?;
        summary.files += 1;
        debug!("File extracted: {}", target.display());
    }

    info!(
        "Extracted {} files and {} directories to {}",
        summary.files,
        summary.directories,
        dest.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Cursor};

    use zip::ZipArchive;

    use crate::{
        archive::{check_compression, extract_archive, extract_file, list_entries},
        error::EpubError,
        test_utils::{ZipFixture, minimal_epub, set_compression_method},
    };

    #[test]
    fn test_list_entries() {
        let data = ZipFixture::new()
            .directory("OEBPS/")
            .file("OEBPS/content.opf", "<package/>")
            .finish();

        let entries = list_entries(Cursor::new(data)).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "mimetype");
        assert!(entries[1].is_dir);
        assert_eq!(entries[2].name, "OEBPS/content.opf");
        assert_eq!(entries[2].size, "<package/>".len() as u64);
    }

    #[test]
    fn test_extract_creates_directories_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("book");

        let summary = extract_archive(Cursor::new(minimal_epub()), &dest).unwrap();
        assert_eq!(summary.dest, dest);
        assert_eq!(summary.files, 5);
        assert_eq!(summary.directories, 0);

        assert_eq!(
            fs::read_to_string(dest.join("mimetype")).unwrap(),
            "application/epub+zip"
        );
        assert!(dest.join("META-INF/container.xml").is_file());
        assert!(dest.join("OEBPS/content.opf").is_file());
        assert!(dest.join("OEBPS/toc.ncx").is_file());
        assert!(dest.join("OEBPS/chapter1.xhtml").is_file());
    }

    #[test]
    fn test_extract_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        let data = ZipFixture::new()
            .directory("OEBPS/")
            .directory("OEBPS/images/")
            .file("OEBPS/text/deep/chapter.xhtml", "<html/>")
            .finish();

        let summary = extract_archive(Cursor::new(data), dir.path()).unwrap();
        assert_eq!(summary.directories, 2);
        assert_eq!(summary.files, 2);
        assert!(dir.path().join("OEBPS/images").is_dir());
        assert!(dir.path().join("OEBPS/text/deep/chapter.xhtml").is_file());
    }

    #[test]
    fn test_extract_overwrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("OEBPS")).unwrap();
        fs::write(dir.path().join("OEBPS/chapter1.xhtml"), "stale").unwrap();

        extract_archive(Cursor::new(minimal_epub()), dir.path()).unwrap();
        let content = fs::read_to_string(dir.path().join("OEBPS/chapter1.xhtml")).unwrap();
        assert!(content.contains("Chapter One"));

        // running it twice is fine
        assert!(extract_archive(Cursor::new(minimal_epub()), dir.path()).is_ok());
    }

    #[test]
    fn test_extract_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let epub = dir.path().join("book.epub");
        fs::write(&epub, minimal_epub()).unwrap();

        let summary = extract_file(&epub, dir.path().join("out")).unwrap();
        assert_eq!(summary.files, 5);
    }

    #[test]
    fn test_extract_rejects_escaping_entries() {
        let dir = tempfile::tempdir().unwrap();
        let data = ZipFixture::new().file("../evil.txt", "boom").finish();

        let result = extract_archive(Cursor::new(data), &dir.path().join("book"));
        assert_eq!(
            result.unwrap_err(),
            EpubError::UnsafeEntryPath {
                entry: "../evil.txt".to_string()
            }
        );
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn test_extract_invalid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract_archive(Cursor::new(vec![b'x'; 2048]), dir.path());
        assert!(matches!(
            result,
            Err(EpubError::ArchiveError { .. } | EpubError::IOError { .. })
        ));

        let result = extract_file(dir.path().join("missing.epub"), dir.path());
        assert!(matches!(result, Err(EpubError::IOError { .. })));
    }

    #[test]
    fn test_check_compression_accepts_stored_and_deflated() {
        let mut archive = ZipArchive::new(Cursor::new(minimal_epub())).unwrap();
        assert!(check_compression(&mut archive).is_ok());
    }

    #[test]
    fn test_check_compression_rejects_other_methods() {
        let mut data = minimal_epub();
        // 12 is bzip2, which OCF does not allow
        set_compression_method(&mut data, "mimetype", 12);

        let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
        let err = check_compression(&mut archive).unwrap_err();
        match err {
            EpubError::UnusableCompressionMethod { file, method } => {
                assert_eq!(file, "mimetype");
                assert!(!method.is_empty());
                assert_ne!(method, "Stored");
                assert_ne!(method, "Deflated");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
