//! Read access to the messaging data a hold exports.

pub mod memory;
pub mod sql;

use async_trait::async_trait;
use common::model::{ChannelMetadata, Cursor, FileInfo, MessageRecord, UserInfo};
use thiserror::Error;

pub use memory::InMemoryRecordStore;
pub use sql::SqlRecordStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Channels `user_id` was a member of at any point overlapping
    /// `[start_time, end_time)`, without duplicates.
    async fn channel_ids_for_user_during(
        &self,
        user_id: &str,
        start_time: i64,
        end_time: i64,
        exclude_public: bool,
    ) -> StoreResult<Vec<String>>;

    /// Up to `limit` posts of `channel_id` strictly after `cursor` and before
    /// `end_time`, ordered by `(create_at, id)`.
    async fn posts_batch(
        &self,
        channel_id: &str,
        cursor: &Cursor,
        end_time: i64,
        limit: usize,
    ) -> StoreResult<Vec<MessageRecord>>;

    async fn file_infos_by_ids(&self, file_ids: &[String]) -> StoreResult<Vec<FileInfo>>;

    /// Team and channel descriptions. Channels without a team are attributed
    /// to the direct-messages pseudo team.
    async fn channel_metadata_for_ids(
        &self,
        channel_ids: &[String],
    ) -> StoreResult<Vec<ChannelMetadata>>;

    async fn user(&self, user_id: &str) -> StoreResult<UserInfo>;

    /// One page of active member IDs of a group; `page` is zero-based.
    async fn group_members(
        &self,
        group_id: &str,
        page: usize,
        per_page: usize,
    ) -> StoreResult<Vec<String>>;
}
