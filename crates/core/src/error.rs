use providers::ProviderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

/// Failures of the upload and listing pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no file was attached to the request")]
    MissingFile,

    /// A required folder is absent from an unpacked bundle.
    #[error("required folder `{0}` was not found in the archive")]
    Structure(String),

    #[error("invalid archive: {0}")]
    Archive(String),

    #[error("cannot read spreadsheet {file}: {reason}")]
    Parse { file: String, reason: String },

    #[error("spreadsheet {file} has no column `{column}`")]
    MissingColumn { file: String, column: String },

    #[error("prediction gateway failed: {0}")]
    Gateway(#[from] ProviderError),

    #[error("client {0} was not found in any spreadsheet")]
    NotFound(i64),

    #[error("unknown upload `{0}`")]
    UnknownUpload(String),

    /// Registered, but its files were removed from disk.
    #[error("upload `{0}` is no longer available")]
    StaleUpload(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl IngestError {
    /// True when the request itself was at fault rather than the service.
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            IngestError::MissingFile
                | IngestError::Structure(_)
                | IngestError::Archive(_)
                | IngestError::Parse { .. }
                | IngestError::MissingColumn { .. }
        )
    }
}

impl From<zip::result::ZipError> for IngestError {
    fn from(err: zip::result::ZipError) -> Self {
        IngestError::Archive(err.to_string())
    }
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Task(err.to_string())
    }
}
