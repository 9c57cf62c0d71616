//! Error Type Definition Module
//!
//! This module defines the errors that stop an unpacking or parsing step.
//! All of them are wrapped in the `EpubError` enumeration.
//!
//! Problems confined to a single manifest item, spine reference or
//! navigation point are not errors: they are collected as
//! [`Diagnostic`](crate::types::Diagnostic) values next to the partial
//! result instead.

use thiserror::Error;

/// Types of errors that can occur while unpacking and parsing an EPUB
#[derive(Debug, Error)]
pub enum EpubError {
    /// ZIP archive related errors
    ///
    /// Occurs when the archive cannot be opened or one of its entries
    /// cannot be read, e.g. a truncated or corrupted file.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode or parse an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// XML parsing failure error
    ///
    /// The event stream ended without producing a closed root element,
    /// which usually means the document is truncated or not XML at all.
    #[error(
        "Failed parsing XML error: The document ended before its root element was closed."
    )]
    FailedParsingXml,

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// The container document names no package document
    ///
    /// Triggered when `META-INF/container.xml` has no `rootfile` element,
    /// or its first `rootfile` carries no `full-path`.
    #[error("Missing rootfile: The container document does not reference a package document.")]
    MissingRootfile,

    /// No package document could be found in an extracted tree
    #[error("No package document: None of {searched} exists in the extracted book.")]
    NoPackageDocument { searched: String },

    /// Relative link leak error
    ///
    /// A content reference points outside of the extracted book directory.
    #[error("Relative link leakage: Path \"{path}\" is out of container range.")]
    RelativeLinkLeakage { path: String },

    /// Unable to find the resource error
    ///
    /// A file referenced by the book does not exist in the extracted tree.
    #[error("Resource not found: Unable to find resource from \"{resource}\".")]
    ResourceNotFound { resource: String },

    /// Archive entry escapes the destination directory
    ///
    /// Raised for entry names that are absolute or climb out of the
    /// extraction root with `..`.
    #[error("Unsafe entry path: The archive entry \"{entry}\" would be written outside the destination.")]
    UnsafeEntryPath { entry: String },

    /// Unusable compression method error
    ///
    /// Only raised when strict OCF compression checking is enabled.
    #[error(
        "Unusable compression method: The \"{file}\" file uses the unsupported \"{method}\" compression method."
    )]
    UnusableCompressionMethod { file: String, method: String },

    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    #[error("Decode error: {source}")]
    Utf16DecodeError { source: std::string::FromUtf16Error },

    /// WalkDir error
    ///
    /// This error occurs while traversing an extracted book directory.
    #[error("WalkDir error: {source}")]
    WalkDirError { source: walkdir::Error },

    /// QuickXml error
    ///
    /// This error occurs when parsing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },
}

impl EpubError {
    /// Returns `true` if the error means a document is not well-formed XML
    pub fn is_malformed_xml(&self) -> bool {
        matches!(
            self,
            EpubError::QuickXmlError { .. }
                | EpubError::FailedParsingXml
                | EpubError::EmptyDataError
                | EpubError::Utf8DecodeError { .. }
                | EpubError::Utf16DecodeError { .. }
        )
    }
}

impl From<zip::result::ZipError> for EpubError {
    fn from(value: zip::result::ZipError) -> Self {
        match value {
            // The zip crate reports failed writes of extracted data as Io errors,
            // keep them distinguishable from unreadable archives.
            zip::result::ZipError::Io(source) => EpubError::IOError { source },
            other => EpubError::ArchiveError { source: other },
        }
    }
}

impl From<quick_xml::Error> for EpubError {
    fn from(value: quick_xml::Error) -> Self {
        EpubError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for EpubError {
    fn from(value: std::io::Error) -> Self {
        EpubError::IOError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for EpubError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        EpubError::Utf8DecodeError { source: value }
    }
}

impl From<std::string::FromUtf16Error> for EpubError {
    fn from(value: std::string::FromUtf16Error) -> Self {
        EpubError::Utf16DecodeError { source: value }
    }
}

impl From<walkdir::Error> for EpubError {
    fn from(value: walkdir::Error) -> Self {
        EpubError::WalkDirError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for EpubError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::NoPackageDocument { searched: l_searched },
                Self::NoPackageDocument { searched: r_searched },
            ) => l_searched == r_searched,
            (
                Self::RelativeLinkLeakage { path: l_path },
                Self::RelativeLinkLeakage { path: r_path },
            ) => l_path == r_path,
            (
                Self::ResourceNotFound {
                    resource: l_resource,
                },
                Self::ResourceNotFound {
                    resource: r_resource,
                },
            ) => l_resource == r_resource,
            (Self::UnsafeEntryPath { entry: l_entry }, Self::UnsafeEntryPath { entry: r_entry }) => {
                l_entry == r_entry
            }
            (
                Self::UnusableCompressionMethod {
                    file: l_file,
                    method: l_method,
                },
                Self::UnusableCompressionMethod {
                    file: r_file,
                    method: r_method,
                },
            ) => l_file == r_file && l_method == r_method,
            (
                Self::Utf8DecodeError { source: l_source },
                Self::Utf8DecodeError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}
