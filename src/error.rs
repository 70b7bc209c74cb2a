use std::path::PathBuf;

use crate::checksum::Checksum;

/// error type for ostcore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid checksum string: {0}")]
    InvalidChecksum(String),

    #[error("invalid object type: {0}")]
    InvalidObjectType(String),

    #[error("invalid refspec: {0}")]
    InvalidRefspec(String),

    #[error("invalid ref name: {0}")]
    InvalidRev(String),

    #[error("invalid variant type signature: {0}")]
    InvalidSignature(String),

    #[error("malformed serialized data: {0}")]
    InvalidVariant(String),

    #[error("serialized data not in normal form for type {0}")]
    NonCanonical(String),

    #[error("file header size {size} invalid for stream of {available} bytes")]
    HeaderSize { size: u64, available: u64 },

    #[error("unsupported compression type {0:#04x}")]
    UnsupportedCompression(u8),

    #[error("invalid mode {mode:#o}: {reason}")]
    InvalidMode { mode: u32, reason: &'static str },

    #[error("invalid checksum of length {0}, expected 32")]
    InvalidChecksumLength(usize),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("entries not in canonical order: {0}")]
    NotSorted(String),

    #[error("duplicate entry name: {0}")]
    DuplicateEntryName(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("xattr {name} on {path}: {source}")]
    Xattr {
        path: PathBuf,
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("exhausted {attempts} attempts to create a temporary file")]
    TempNameExhausted { attempts: u32 },

    #[error("operation was cancelled")]
    Cancelled,

    #[error("corrupted object: expected checksum {expected}, got {actual}")]
    CorruptObject { expected: Checksum, actual: Checksum },

    #[error("corrupted static delta: {0}")]
    CorruptDelta(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("repository not found at {0}")]
    NoRepo(PathBuf),

    #[error("repository already exists at {0}")]
    RepoExists(PathBuf),

    #[error("repository is locked by another process")]
    LockContention,

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

/// the error categories callers dispatch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Validation,
    Io,
    Exhaustion,
    Cancellation,
    Corruption,
    NotFound,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidChecksum(_)
            | Error::InvalidObjectType(_)
            | Error::InvalidRefspec(_)
            | Error::InvalidRev(_)
            | Error::InvalidSignature(_)
            | Error::InvalidVariant(_)
            | Error::NonCanonical(_)
            | Error::HeaderSize { .. }
            | Error::UnsupportedCompression(_) => ErrorKind::Format,
            Error::InvalidMode { .. }
            | Error::InvalidChecksumLength(_)
            | Error::InvalidFilename(_)
            | Error::NotSorted(_)
            | Error::DuplicateEntryName(_) => ErrorKind::Validation,
            Error::Io { .. } | Error::Xattr { .. } => ErrorKind::Io,
            Error::TempNameExhausted { .. } => ErrorKind::Exhaustion,
            Error::Cancelled => ErrorKind::Cancellation,
            Error::CorruptObject { .. } | Error::CorruptDelta(_) => ErrorKind::Corruption,
            Error::ObjectNotFound(_) | Error::NoRepo(_) => ErrorKind::NotFound,
            Error::RepoExists(_) | Error::LockContention => ErrorKind::Io,
            Error::Config(_) | Error::ConfigSerialize(_) => ErrorKind::Config,
        }
    }

    /// true for an io error caused by the target already existing
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Io { source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists)
    }

    pub(crate) fn corrupt_delta(msg: impl Into<String>) -> Self {
        Error::CorruptDelta(msg.into())
    }

    pub(crate) fn invalid_variant(msg: impl Into<String>) -> Self {
        Error::InvalidVariant(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::InvalidChecksum("x".into()).kind(), ErrorKind::Format);
        assert_eq!(Error::InvalidChecksumLength(16).kind(), ErrorKind::Validation);
        assert_eq!(
            Error::TempNameExhausted { attempts: 128 }.kind(),
            ErrorKind::Exhaustion
        );
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancellation);
        assert_eq!(Error::corrupt_delta("bad").kind(), ErrorKind::Corruption);
    }

    #[test]
    fn test_with_path_already_exists() {
        let res: std::io::Result<()> = Err(std::io::Error::from(std::io::ErrorKind::AlreadyExists));
        let err = res.with_path("/tmp/x").unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
