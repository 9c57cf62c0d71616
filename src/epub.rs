//! Book loading pipeline
//!
//! [`EpubLoader`] chains the individual steps: the archive is extracted into
//! a staging directory, the title is resolved, the staging tree is moved
//! to a directory named after the title, and finally the package and
//! navigation documents are parsed from the extracted tree.
//!
//! Problems that only affect single items are accumulated as diagnostics
//! in the returned [`LoadedBook`]. Progress can be followed through
//! [`LoadEvent`]s delivered to an observer callback.

use std::{
    fs::{self, File},
    io::{BufReader, Read, Seek},
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::{
    archive::{ExtractionSummary, check_compression, extract_entries},
    config::LoaderConfig,
    container::{LocationSource, PackageLocation, locate_package_document},
    error::EpubError,
    navigation::{NcxDocument, default_ncx_path, parse_ncx},
    package::PackageDocument,
    title::{folder_name, resolve_title, title_from_package},
    types::{Chapter, Diagnostic, DiagnosticKind, ExtractedBook, SpineItem, UNTITLED_BOOK},
    utils::{read_text_file, resolve_within_book},
};

/// Progress notifications of a load, in the order they occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// The archive was unpacked into the staging directory
    Extracted(ExtractionSummary),

    /// The title is known and the tree has been moved to `root`
    TitleResolved { title: String, root: PathBuf },

    /// The package document was found
    PackageResolved {
        path: PathBuf,
        source: LocationSource,
    },

    /// The package document was parsed
    SpineResolved { spine: Vec<SpineItem> },

    /// The chapter list is final
    ChaptersParsed { chapters: Vec<Chapter> },

    /// A problem was recorded; the load goes on
    Diagnostic(Diagnostic),
}

/// Loads EPUB archives into a library directory
///
/// ## Examples
/// ```rust, ignore
/// use epub_unpacker::{config::LoaderConfig, epub::EpubLoader};
///
/// let loader = EpubLoader::new(LoaderConfig::new("/path/to/library"));
/// let book = loader.load("A Joyous Adventure.epub")?;
/// for chapter in &book.chapters {
///     let content = book.read_chapter(chapter)?;
///     println!("{}: {} bytes", chapter.title, content.len());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct EpubLoader {
    config: LoaderConfig,
}

impl EpubLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load the archive stored at `path`
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<LoadedBook, EpubError> {
        self.load_with(path, |_| {})
    }

    /// Load the archive stored at `path`, reporting progress to `observer`
    pub fn load_with<P, F>(&self, path: P, observer: F) -> Result<LoadedBook, EpubError>
    where
        P: AsRef<Path>,
        F: FnMut(&LoadEvent),
    {
        info!("Loading {}", path.as_ref().display());
        let file = File::open(path.as_ref())?;
        self.load_from_reader_with(BufReader::new(file), observer)
    }

    /// Load an archive from any seekable source
    pub fn load_from_reader<R: Read + Seek>(&self, reader: R) -> Result<LoadedBook, EpubError> {
        self.load_from_reader_with(reader, |_| {})
    }

    /// Load an archive from any seekable source, reporting progress to `observer`
    ///
    /// ## Return
    /// - `Ok(LoadedBook)`: The extracted and parsed book, with the
    ///   diagnostics of every skipped item
    /// - `Err(EpubError)`: The archive is unreadable, the library is not
    ///   writable, no package document exists or it does not parse
    pub fn load_from_reader_with<R, F>(
        &self,
        reader: R,
        mut observer: F,
    ) -> Result<LoadedBook, EpubError>
    where
        R: Read + Seek,
        F: FnMut(&LoadEvent),
    {
        let mut diagnostics = Vec::new();

        // 1. unpack into the staging directory
        let staging = self.config.staging_dir();
        if staging.exists() {
            warn!("Removing stale staging directory {}", staging.display());
            fs::remove_dir_all(&staging)?;
        }

        let mut archive = ZipArchive::new(reader)?;
        if self.config.strict_compression() {
            check_compression(&mut archive)?;
        }
        let summary = extract_entries(&mut archive, &staging)?;
        observer(&LoadEvent::Extracted(summary));

        // 2. package document, title and final location
        let location = locate_package_document(&staging);
        let title = staged_title(&staging, location.as_ref().ok());
        let folder_name = folder_name(&title);
        let root = self.config.library_root().join(&folder_name);
        move_tree(&staging, &root)?;
        info!("Book \"{}\" stored at {}", title, root.display());
        observer(&LoadEvent::TitleResolved {
            title: title.clone(),
            root: root.clone(),
        });

        let book = ExtractedBook {
            root,
            title,
            folder_name,
        };

        // 3. package document, paths are relative so they survive the move
        let location = location?;
        record(&mut diagnostics, location.diagnostics, &mut observer);
        observer(&LoadEvent::PackageResolved {
            path: location.path.clone(),
            source: location.source,
        });

        let content = read_text_file(&book.root.join(&location.path))?;
        let package = PackageDocument::parse(&content, &location.path)?;
        record(&mut diagnostics, package.diagnostics.clone(), &mut observer);
        observer(&LoadEvent::SpineResolved {
            spine: package.spine.clone(),
        });

        // 4. navigation
        let (chapters, ncx_title) = match self.parse_navigation(&book.root, &package)? {
            Ok(ncx) => {
                record(&mut diagnostics, ncx.diagnostics.clone(), &mut observer);
                (ncx.ordered(self.config.chapter_order()), ncx.title)
            }
            Err(diagnostic) => {
                record(&mut diagnostics, vec![diagnostic], &mut observer);
                (vec![], None)
            }
        };
        info!("{} chapters found in \"{}\"", chapters.len(), book.title);
        observer(&LoadEvent::ChaptersParsed {
            chapters: chapters.clone(),
        });

        Ok(LoadedBook {
            book,
            package_path: location.path,
            package,
            chapters,
            ncx_title,
            diagnostics,
        })
    }

    /// Locate, read and parse the NCX document
    ///
    /// The outer result carries the errors that stop the load; the inner one
    /// the reasons the book simply has no usable navigation.
    fn parse_navigation(
        &self,
        root: &Path,
        package: &PackageDocument,
    ) -> Result<Result<NcxDocument, Diagnostic>, EpubError> {
        let ncx_path = match package.ncx_href() {
            Some(href) => match package.resolve_href(href) {
                Ok(path) => path,
                Err(_) => {
                    return Ok(Err(Diagnostic::report(
                        &package.package_path,
                        DiagnosticKind::UnresolvedReference {
                            reference: href.to_string(),
                            context: "toc".to_string(),
                        },
                    )));
                }
            },
            None => default_ncx_path(&package.base_dir),
        };

        let content = match read_text_file(&root.join(&ncx_path)) {
            Ok(content) => content,
            Err(EpubError::ResourceNotFound { .. }) => {
                return Ok(Err(Diagnostic::report(
                    &ncx_path,
                    DiagnosticKind::MissingDocument {
                        expected: ncx_path.to_string_lossy().to_string(),
                    },
                )));
            }
            Err(err) if err.is_malformed_xml() => {
                return Ok(Err(malformed(&ncx_path, &err)));
            }
            Err(err) => return Err(err),
        };

        Ok(parse_ncx(&content, &ncx_path).map_err(|err| malformed(&ncx_path, &err)))
    }
}

fn malformed(file: &Path, err: &EpubError) -> Diagnostic {
    Diagnostic::report(
        file,
        DiagnosticKind::MalformedXml {
            reason: err.to_string(),
        },
    )
}

fn record<F: FnMut(&LoadEvent)>(
    diagnostics: &mut Vec<Diagnostic>,
    new: Vec<Diagnostic>,
    observer: &mut F,
) {
    for diagnostic in new {
        observer(&LoadEvent::Diagnostic(diagnostic.clone()));
        diagnostics.push(diagnostic);
    }
}

/// Resolve the title of the staged tree
///
/// The located package document is used first, then the conventional
/// package locations. A book whose title cannot be found is
/// `"Untitled Book"`.
fn staged_title(staging: &Path, location: Option<&PackageLocation>) -> String {
    let from_location = match location {
        Some(location) => read_text_file(&staging.join(&location.path))
            .and_then(|content| title_from_package(&content)),
        None => return fallback_title(staging),
    };

    from_location.unwrap_or_else(|err| {
        debug!("Title lookup in the package document failed: {}", err);
        fallback_title(staging)
    })
}

fn fallback_title(staging: &Path) -> String {
    resolve_title(staging).unwrap_or_else(|err| {
        debug!("Title lookup in conventional locations failed: {}", err);
        UNTITLED_BOOK.to_string()
    })
}

/// Move the staging tree to its final location
///
/// A fresh target is a plain rename. Otherwise the staged files are copied
/// over the existing tree, replacing files with the same path, and the
/// staging directory is removed.
fn move_tree(staging: &Path, target: &Path) -> Result<(), EpubError> {
    if !target.exists() {
        fs::rename(staging, target)?;
        return Ok(());
    }

    info!("Merging into existing book directory {}", target.display());
    for entry in WalkDir::new(staging) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(staging) else {
            continue;
        };
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &destination)?;
        }
    }

    fs::remove_dir_all(staging)?;
    Ok(())
}

/// A loaded book: the extracted tree plus everything parsed from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedBook {
    pub book: ExtractedBook,

    /// Path of the package document, relative to `book.root`
    pub package_path: PathBuf,

    pub package: PackageDocument,

    /// Chapters from the NCX, in the configured order
    pub chapters: Vec<Chapter>,

    /// The `docTitle` of the NCX
    pub ncx_title: Option<String>,

    /// Every item skipped during the load
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadedBook {
    /// The directory chapter references are relative to
    pub fn content_dir(&self) -> PathBuf {
        self.book.root.join(&self.package.base_dir)
    }

    /// The file holding a chapter's content
    ///
    /// The file is not required to exist.
    pub fn chapter_path(&self, chapter: &Chapter) -> Result<PathBuf, EpubError> {
        self.chapter_reader().chapter_path(chapter)
    }

    /// Read the content document of a chapter
    pub fn read_chapter(&self, chapter: &Chapter) -> Result<String, EpubError> {
        self.chapter_reader().read_chapter(chapter)
    }

    /// The cover image file, if the package declares one
    pub fn cover_path(&self) -> Option<PathBuf> {
        let href = self.package.cover_href()?;
        self.package
            .resolve_href(href)
            .ok()
            .map(|relative| self.book.root.join(relative))
    }

    /// The stylesheet files declared in the manifest
    pub fn stylesheet_paths(&self) -> Vec<PathBuf> {
        self.package
            .stylesheet_hrefs()
            .into_iter()
            .filter_map(|href| self.package.resolve_href(href).ok())
            .map(|relative| self.book.root.join(relative))
            .collect()
    }

    /// A handle reading chapter content, usable from another thread
    pub fn chapter_reader(&self) -> ChapterReader {
        ChapterReader {
            root: self.book.root.clone(),
            base_dir: self.package.base_dir.clone(),
        }
    }
}

/// Reads chapter content from an extracted book
///
/// It only holds paths, so it can be cloned freely and moved to a
/// background thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterReader {
    root: PathBuf,
    base_dir: PathBuf,
}

impl ChapterReader {
    /// Resolve a chapter to its content file
    ///
    /// ## Return
    /// - `Ok(PathBuf)`: The file path, whether or not it exists
    /// - `Err(EpubError)`: The reference points outside of the book
    pub fn chapter_path(&self, chapter: &Chapter) -> Result<PathBuf, EpubError> {
        let relative = resolve_within_book(&self.base_dir, &chapter.content_ref).ok_or_else(
            || EpubError::RelativeLinkLeakage {
                path: chapter.content_ref.clone(),
            },
        )?;

        Ok(self.root.join(relative))
    }

    /// Read the content document of a chapter
    ///
    /// A missing file fails with `ResourceNotFound`.
    pub fn read_chapter(&self, chapter: &Chapter) -> Result<String, EpubError> {
        read_text_file(&self.chapter_path(chapter)?)
    }
}
