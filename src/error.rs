//! Error types for parity archive operations

use thiserror::Error;

/// Errors that can occur while reading, writing, or restoring parity
/// archives
#[derive(Debug, Error)]
pub enum ParError {
    /// File exists but carries neither the v1.0 nor a legacy magic
    #[error("{0}: not a PAR file")]
    NotPar(String),

    /// Archive major version newer than 1.x
    #[error("{file}: PAR version mismatch ({major}.{minor})")]
    VersionMismatch { file: String, major: u16, minor: u16 },

    /// Control hash over bytes [0x20..EOF) does not match the header
    #[error("{0}: PAR file corrupt: control hash mismatch")]
    Corrupt(String),

    /// An archive or file entry with this name is already present
    #[error("{0}: already loaded")]
    AlreadyLoaded(String),

    /// Named entry or on-disk file not found
    #[error("{0}: not found")]
    NotFound(String),

    /// Same name, different content hash
    #[error("{0}: name clash")]
    NameClash(String),

    /// Fewer intact recovery volumes than missing files
    #[error("cannot restore: {missing} missing but only {available} recovery volumes available")]
    Unrestorable { missing: usize, available: usize },

    /// A file occupies the write target and move-away is disabled
    #[error("{0}: file exists")]
    WriteBlocked(String),

    /// Malformed request (bad entry number, volume count < 1, ...)
    #[error("invalid argument")]
    InvalidArgument,

    /// Operation declared but not supported
    #[error("not implemented")]
    NotImplemented,

    /// I/O failure, including short reads and writes in the codec
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParError {
    /// Short read in the streaming codec.
    pub fn read_error() -> Self {
        ParError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "READ ERROR",
        ))
    }

    /// Short write in the streaming codec.
    pub fn write_error() -> Self {
        ParError::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            "WRITE ERROR",
        ))
    }
}

/// Type alias for Result with ParError
pub type Result<T> = std::result::Result<T, ParError>;
