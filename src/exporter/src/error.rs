use thiserror::Error;

use crate::store::StoreError;

/// Failure of one execution slice. The hold's high-water mark is not advanced.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted index could not be parsed. It is left untouched.
    #[error("index at {path} is corrupt: {source}")]
    IndexCorrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The persisted hash manifest could not be parsed. It is left untouched.
    #[error("hash manifest at {path} is corrupt: {source}")]
    HashesCorrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("post {post_id} has a malformed attachment list: {source}")]
    InvalidFileIds {
        post_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("group {group_id} has more than {max_pages} pages of members")]
    GroupTooLarge { group_id: String, max_pages: usize },

    #[error("invalid HMAC key")]
    InvalidKey,

    #[error("export cancelled")]
    Cancelled,
}

pub type ExportResult<T> = Result<T, ExportError>;
