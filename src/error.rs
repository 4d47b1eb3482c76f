use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OsbfError {
    #[error("class file not found: `{0}`")]
    FileNotFound(PathBuf),
    #[error("class file already exists: `{0}`")]
    AlreadyExists(PathBuf),
    #[error("`{path}` is not an OSBF class file: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },
    #[error("I/O failure on `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("class database is full: `{0}`")]
    DatabaseFull(PathBuf),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl OsbfError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        OsbfError::Io {
            path: path.to_owned(),
            source,
        }
    }

    pub(crate) fn format(path: &Path, reason: impl Into<String>) -> Self {
        OsbfError::InvalidFormat {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OsbfError>;
