//! Loader configuration
//!
//! Every location the pipeline touches is derived from a [`LoaderConfig`].
//! Nothing in the crate reads or writes a fixed path on its own.

use std::path::{Path, PathBuf};

use crate::{types::ChapterOrder, utils::local_time};

/// Configuration threaded through an [`EpubLoader`](crate::epub::EpubLoader)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Directory receiving one sub-directory per extracted book
    library_root: PathBuf,

    /// Name of the temporary directory used while extracting
    staging_dir_name: String,

    /// Order of the produced chapter list
    chapter_order: ChapterOrder,

    /// Reject archives using compression methods other than Stored/Deflated
    strict_compression: bool,
}

impl LoaderConfig {
    /// Creates a configuration storing books under `library_root`
    ///
    /// The staging directory defaults to a hidden, timestamped directory
    /// inside the library root.
    pub fn new<P: AsRef<Path>>(library_root: P) -> Self {
        Self {
            library_root: library_root.as_ref().to_path_buf(),
            staging_dir_name: format!(".staging-{}", local_time()),
            chapter_order: ChapterOrder::default(),
            strict_compression: false,
        }
    }

    /// Set the name of the staging directory
    ///
    /// Only the final path component is used, so the staging directory
    /// always lives directly inside the library root.
    pub fn set_staging_dir_name(&mut self, name: &str) -> &mut Self {
        if let Some(file_name) = Path::new(name).file_name() {
            self.staging_dir_name = file_name.to_string_lossy().to_string();
        }
        self
    }

    /// Set the order applied to the chapter list
    pub fn set_chapter_order(&mut self, order: ChapterOrder) -> &mut Self {
        self.chapter_order = order;
        self
    }

    /// Enable or disable the OCF compression method check
    pub fn set_strict_compression(&mut self, strict: bool) -> &mut Self {
        self.strict_compression = strict;
        self
    }

    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    /// Full path of the staging directory
    pub fn staging_dir(&self) -> PathBuf {
        self.library_root.join(&self.staging_dir_name)
    }

    pub fn chapter_order(&self) -> ChapterOrder {
        self.chapter_order
    }

    pub fn strict_compression(&self) -> bool {
        self.strict_compression
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::{config::LoaderConfig, types::ChapterOrder};

    #[test]
    fn test_loader_config_defaults() {
        let config = LoaderConfig::new("/data/books");
        assert_eq!(config.library_root(), Path::new("/data/books"));
        assert_eq!(config.chapter_order(), ChapterOrder::Document);
        assert!(!config.strict_compression());

        let staging = config.staging_dir();
        assert_eq!(staging.parent(), Some(Path::new("/data/books")));
        assert!(
            staging
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(".staging-")
        );
    }

    #[test]
    fn test_loader_config_setters() {
        let mut config = LoaderConfig::new("/data/books");
        config
            .set_staging_dir_name("temp_extracted_epub")
            .set_chapter_order(ChapterOrder::PlayOrder)
            .set_strict_compression(true);

        assert_eq!(
            config.staging_dir(),
            Path::new("/data/books/temp_extracted_epub")
        );
        assert_eq!(config.chapter_order(), ChapterOrder::PlayOrder);
        assert!(config.strict_compression());
    }

    #[test]
    fn test_staging_dir_name_keeps_last_component() {
        let mut config = LoaderConfig::new("/data/books");
        config.set_staging_dir_name("../../elsewhere/tmp");
        assert_eq!(config.staging_dir(), Path::new("/data/books/tmp"));
    }
}
