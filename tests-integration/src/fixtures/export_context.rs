//! End-to-end export test context
//!
//! Wires a SQLite record store, a SQLite hold registry and bundle storage
//! together, with helpers to seed messaging data and define holds.

use anyhow::{Context, Result};
use bytes::Bytes;
use common::model::Hold;
use common::registry::{HoldRegistry, SqlHoldRegistry};
use exporter::{BundleStore, JobSettings, LegalHoldJob, SqlRecordStore};
use sqlx::SqlitePool;
use std::sync::Arc;

use super::StorageTestContext;

pub struct ExportTestContext {
    pub registry: Arc<SqlHoldRegistry>,
    pub records: SqlRecordStore,
    pub storage: StorageTestContext,
}

impl ExportTestContext {
    /// Everything in memory
    pub async fn new_in_memory() -> Result<Self> {
        Self::with_storage(StorageTestContext::new_in_memory().await?).await
    }

    /// Bundles written to a temporary directory
    pub async fn new_filesystem() -> Result<Self> {
        Self::with_storage(StorageTestContext::new_filesystem().await?).await
    }

    async fn with_storage(storage: StorageTestContext) -> Result<Self> {
        let registry = SqlHoldRegistry::new("sqlite::memory:")
            .await
            .context("Failed to create registry")?;
        let records = SqlRecordStore::new("sqlite::memory:")
            .await
            .context("Failed to create record store")?;
        records
            .init_schema()
            .await
            .context("Failed to create record schema")?;

        Ok(Self {
            registry: Arc::new(registry),
            records,
            storage,
        })
    }

    fn pool(&self) -> Result<&SqlitePool> {
        match &self.records {
            SqlRecordStore::Sqlite(pool) => Ok(pool),
            SqlRecordStore::Postgres(_) => anyhow::bail!("expected a SQLite record store"),
        }
    }

    pub fn bundles(&self) -> BundleStore {
        self.storage.bundles()
    }

    pub fn job(&self, settings: JobSettings) -> Arc<LegalHoldJob> {
        Arc::new(LegalHoldJob::new(
            self.registry.clone(),
            Arc::new(self.records.clone()),
            self.bundles(),
            settings,
        ))
    }

    pub async fn add_team(&self, id: &str, name: &str, display_name: &str) -> Result<()> {
        sqlx::query("INSERT INTO Teams (Id, Name, DisplayName) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(display_name)
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    /// `team_id` is `None` for direct and group message channels
    pub async fn add_channel(
        &self,
        id: &str,
        team_id: Option<&str>,
        name: &str,
        channel_type: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO Channels (Id, TeamId, Name, DisplayName, Type) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(team_id)
        .bind(name)
        .bind(name)
        .bind(channel_type)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    pub async fn add_user(&self, id: &str, username: &str) -> Result<()> {
        sqlx::query("INSERT INTO Users (Id, Username, Email) VALUES (?, ?, ?)")
            .bind(id)
            .bind(username)
            .bind(format!("{username}@example.com"))
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    pub async fn add_membership(
        &self,
        user_id: &str,
        channel_id: &str,
        join_time: i64,
        leave_time: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO ChannelMemberHistory (ChannelId, UserId, JoinTime, LeaveTime) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(join_time)
        .bind(leave_time)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    pub async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        sqlx::query("INSERT INTO GroupMembers (GroupId, UserId) VALUES (?, ?)")
            .bind(group_id)
            .bind(user_id)
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    pub async fn add_post(
        &self,
        id: &str,
        channel_id: &str,
        user_id: &str,
        create_at: i64,
        file_ids: &[&str],
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO Posts (Id, ChannelId, UserId, CreateAt, UpdateAt, Message, FileIds) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(channel_id)
        .bind(user_id)
        .bind(create_at)
        .bind(create_at)
        .bind(format!("message {id}"))
        .bind(serde_json::to_string(file_ids)?)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    /// Add `count` posts spaced `step` ms apart from `first_at`; returns
    /// their IDs in creation order.
    pub async fn add_posts(
        &self,
        channel_id: &str,
        user_id: &str,
        first_at: i64,
        step: i64,
        count: usize,
    ) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(count);
        for n in 0..count {
            let id = format!("{channel_id}-post{n:04}");
            self.add_post(&id, channel_id, user_id, first_at + step * n as i64, &[])
                .await?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Register an attachment and store its content at `path`
    pub async fn add_file(&self, id: &str, path: &str, name: &str, content: &[u8]) -> Result<()> {
        sqlx::query("INSERT INTO FileInfo (Id, Path, Name, Size, MimeType) VALUES (?, ?, ?, ?, ?)")
            .bind(id)
            .bind(path)
            .bind(name)
            .bind(content.len() as i64)
            .bind("application/octet-stream")
            .execute(self.pool()?)
            .await?;
        self.bundles()
            .write(path, Bytes::copy_from_slice(content))
            .await?;
        Ok(())
    }

    /// Define a hold through the registry, as an administrator would
    pub async fn create_hold(
        &self,
        name: &str,
        user_ids: &[&str],
        starts_at: i64,
        ends_at: i64,
        execution_length: i64,
    ) -> Result<Hold> {
        let hold = Hold {
            name: name.to_string(),
            display_name: name.to_string(),
            user_ids: user_ids.iter().map(|id| id.to_string()).collect(),
            starts_at,
            ends_at,
            execution_length,
            ..Default::default()
        };
        Ok(self.registry.create_hold(hold).await?)
    }

    pub async fn hold(&self, id: &str) -> Result<Hold> {
        self.registry
            .get_hold(id)
            .await?
            .with_context(|| format!("hold {id} not found"))
    }
}
