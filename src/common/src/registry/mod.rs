//! System of record for hold definitions.
//!
//! Updates are compare-and-swap: a caller passes the hold it last read and the
//! write only lands if the stored row still matches it.

pub mod memory;
pub mod sql;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Hold, HoldValidationError, now_millis};

pub use memory::InMemoryHoldRegistry;
pub use sql::SqlHoldRegistry;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("hold {0} not found")]
    NotFound(String),

    #[error("hold {0} already exists")]
    AlreadyExists(String),

    #[error("hold {id} was modified concurrently")]
    Conflict { id: String },

    #[error("invalid hold: {0}")]
    Validation(#[from] HoldValidationError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[async_trait]
pub trait HoldRegistry: Send + Sync {
    /// All holds, oldest first.
    async fn list_holds(&self) -> RegistryResult<Vec<Hold>>;

    async fn get_hold(&self, id: &str) -> RegistryResult<Option<Hold>>;

    /// Store a new hold, assigning its ID, secret and timestamps when unset.
    async fn create_hold(&self, hold: Hold) -> RegistryResult<Hold>;

    /// Replace `old` with `new`. Fails with [`RegistryError::Conflict`] when
    /// the stored hold no longer matches `old`.
    async fn update_hold(&self, new: &Hold, old: &Hold) -> RegistryResult<Hold>;
}

/// Fill the server-assigned fields of a hold about to be created.
pub(crate) fn prepare_new(mut hold: Hold) -> RegistryResult<Hold> {
    if hold.id.is_empty() {
        hold.id = new_id();
    }
    if hold.secret.is_empty() {
        hold.secret = new_id();
    }
    let now = now_millis();
    hold.create_at = now;
    hold.update_at = now;
    hold.last_execution_ended_at = 0;
    hold.has_messages = false;

    hold.validate()?;
    Ok(hold)
}

/// Build the row that replaces `old`. Immutable fields are taken from `old`
/// and the high-water mark never moves backwards.
pub(crate) fn prepare_update(new: &Hold, old: &Hold) -> RegistryResult<Hold> {
    new.validate()?;

    let mut next = new.clone();
    next.id = old.id.clone();
    next.name = old.name.clone();
    next.secret = old.secret.clone();
    next.create_at = old.create_at;
    next.last_execution_ended_at = new.last_execution_ended_at.max(old.last_execution_ended_at);
    next.has_messages = new.has_messages || old.has_messages;
    // Strictly increasing so two writes in the same millisecond still differ.
    next.update_at = now_millis().max(old.update_at + 1);
    Ok(next)
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
