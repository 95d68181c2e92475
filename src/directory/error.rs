use derive_more::Display;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error returned by [`DirectoryClient`](super::DirectoryClient)s and their connections.
#[derive(Debug, Error)]
#[error("directory error: {kind}")]
pub struct DirectoryError {
    kind: ErrorKind,
    #[source]
    source: Option<BoxError>,
}

impl DirectoryError {
    /// Creates a new directory error
    pub fn new<E>(kind: ErrorKind, error: E) -> DirectoryError
    where
        E: Into<BoxError>,
    {
        DirectoryError {
            kind,
            source: Some(error.into()),
        }
    }

    /// What went wrong, broadly
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for DirectoryError {
    fn from(kind: ErrorKind) -> DirectoryError {
        DirectoryError { kind, source: None }
    }
}

/// The `ErrorKind` variants a directory client can report.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum ErrorKind {
    /// The server could not be reached or the connection broke.
    #[display("connection failed")]
    ConnectionFailed,
    /// The server refused a bind: wrong password, unknown DN, locked account...
    #[display("invalid credentials")]
    InvalidCredentials,
    /// The server answered an operation with an error result.
    #[display("operation failed")]
    OperationFailed,
}
