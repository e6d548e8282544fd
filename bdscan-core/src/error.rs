//! Error taxonomy shared by every stage of a disc scan.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Unable to locate BD structure under {0}")]
    StructureNotFound(String),
    #[error("Malformed metadata in {file}: {reason}")]
    MalformedMetadata { file: String, reason: String },
    #[error("Stream file {file} is corrupt: {reason}")]
    StreamFileCorrupt { file: String, reason: String },
    #[error("Unexpected end of data")]
    UnexpectedEndOfData,
    /// A codec header field whose value cannot describe a real stream.
    #[error("Header field {0} out of range")]
    InvalidField(&'static str),
    #[error("Scan aborted")]
    ScanAborted,
    #[error("Scan has not been run")]
    NotScanned,
    #[error("Invalid settings: {0}")]
    Settings(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub fn malformed(file: impl Into<String>, reason: impl Into<String>) -> Self {
        ScanError::MalformedMetadata {
            file: file.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(file: impl Into<String>, reason: impl Into<String>) -> Self {
        ScanError::StreamFileCorrupt {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Attach a reader-level failure to the file it happened in.
    ///
    /// `UnexpectedEndOfData` never escapes a parser on its own; it becomes the
    /// per-file metadata error of whatever was being read.
    pub fn in_file(self, file: &str) -> Self {
        match self {
            ScanError::UnexpectedEndOfData => {
                ScanError::malformed(file, "unexpected end of data")
            }
            ScanError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                ScanError::malformed(file, "unexpected end of data")
            }
            other => other,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, ScanError::ScanAborted)
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Reports carry errors as their message.
pub(crate) fn serialize_message<S: serde::Serializer>(
    error: &ScanError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}
