use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning an input file into a [`crate::grid::DayGrid`]
#[derive(Debug, Error)]
pub enum SourceError {
    /// The file exists but could not be opened or decoded
    #[error("unreadable input file '{path}': {message}")]
    Unreadable { path: PathBuf, message: String },

    /// The file was read but its contents cannot be restructured into a grid
    #[error("invalid input file '{path}': {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum ConvertError {
    /// Data-validity failure. Fatal for the partition being converted, never for the run.
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed Zarr metadata at '{path}': {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt Zarr store '{path}': {message}")]
    CorruptStore { path: PathBuf, message: String },

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl ConvertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ConvertError::InvalidData(message.into())
    }

    /// True for errors that abort the current partition but leave the rest of the run going
    pub fn is_data_validity(&self) -> bool {
        matches!(
            self,
            ConvertError::InvalidData(_) | ConvertError::Source(SourceError::Invalid { .. })
        )
    }
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
