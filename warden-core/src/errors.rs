use thiserror::Error;
use warden_metadata_store::MetadataError;

pub type Result<T> = std::result::Result<T, WardenError>;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("invalid channel id {0}: channel ids are non-zero integers")]
    InvalidChannelId(i64),

    #[error("invalid account id: {0}")]
    InvalidAccountId(String),

    #[error("roster error: {0}")]
    Roster(String),

    #[error("stored assignment is corrupt: {0}")]
    CorruptAssignment(String),

    #[error("metadata store error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
