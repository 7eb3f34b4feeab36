use thiserror::Error;

/// Every error kind the core can surface, per the error handling design.
///
/// `MalformedRecord` and `UnsupportedOp` are logged-and-dropped at the apply
/// site (the origin of a committed entry is not recoverable once it has been
/// accepted into the log); the other variants are surfaced to whichever
/// caller is waiting on the operation that produced them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("proposal rejected: {0}")]
    ProposeRejected(String),

    #[error("malformed commit record: {0}")]
    MalformedRecord(String),

    #[error("unsupported op code: {0}")]
    UnsupportedOp(u8),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::StorageError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
