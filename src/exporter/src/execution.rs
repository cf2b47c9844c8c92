//! One bounded time slice of export work for one hold.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use common::model::{Hold, Index, IndexDetails, merge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::batch::{BatchExporter, ExportStats};
use crate::bundle::{BundleLayout, BundleStore};
use crate::error::{ExportError, ExportResult};
use crate::hashes::{self, HashList, hash_bytes};
use crate::resolver::ChannelResolver;
use crate::store::RecordStore;

/// Group members are fetched in pages of this size.
pub const GROUP_MEMBERS_PER_PAGE: usize = 50;
/// Groups with more pages than this are rejected.
pub const GROUP_MAX_PAGES: usize = 100;

/// Result of a successful slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// New high-water mark: `min(slice end, now)`.
    pub last_execution_ended_at: i64,
    pub has_messages: bool,
    pub channels: usize,
    pub stats: ExportStats,
}

pub struct Execution {
    hold: Hold,
    store: Arc<dyn RecordStore>,
    bundles: BundleStore,
    layout: BundleLayout,
    batch_size: usize,

    start_time: i64,
    end_time: i64,

    channel_ids: Vec<String>,
    index: Index,
    hashes: HashList,
    has_messages: bool,
    stats: ExportStats,
}

impl Execution {
    /// Prepare the next slice of `hold`, `[next_execution_start_time,
    /// next_execution_end_time)`.
    pub fn new(
        hold: &Hold,
        store: Arc<dyn RecordStore>,
        bundles: BundleStore,
        batch_size: usize,
    ) -> Self {
        Self {
            start_time: hold.next_execution_start_time(),
            end_time: hold.next_execution_end_time(),
            layout: BundleLayout::for_hold(hold),
            index: Index::for_hold(hold, 0),
            hold: hold.clone(),
            store,
            bundles,
            batch_size,
            channel_ids: Vec::new(),
            hashes: HashList::new(),
            has_messages: false,
            stats: ExportStats::default(),
        }
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    pub fn channel_ids(&self) -> &[String] {
        &self.channel_ids
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Run the whole slice. Nothing about the hold itself is persisted here;
    /// the caller advances the mark from the returned outcome.
    pub async fn execute(
        mut self,
        now: i64,
        cancel: &CancellationToken,
    ) -> ExportResult<ExecutionOutcome> {
        let mark = self.end_time.min(now);

        if self.start_time >= self.end_time {
            debug!(
                hold_id = %self.hold.id,
                start_time = self.start_time,
                end_time = self.end_time,
                "Empty slice, nothing to export"
            );
            return Ok(ExecutionOutcome {
                last_execution_ended_at: mark,
                has_messages: self.hold.has_messages,
                channels: 0,
                stats: ExportStats::default(),
            });
        }

        info!(
            hold_id = %self.hold.id,
            start_time = self.start_time,
            end_time = self.end_time,
            "Starting legal hold execution"
        );

        self.get_channels(cancel).await?;
        self.export_data(cancel).await?;
        check_cancelled(cancel)?;
        self.update_indexes(now).await?;
        self.write_file_hashes().await?;

        info!(
            hold_id = %self.hold.id,
            channels = self.channel_ids.len(),
            batches_written = self.stats.batches_written,
            records = self.stats.records,
            files_copied = self.stats.files_copied,
            files_missing = self.stats.files_missing,
            last_execution_ended_at = mark,
            "Legal hold execution completed"
        );

        Ok(ExecutionOutcome {
            last_execution_ended_at: mark,
            has_messages: self.hold.has_messages || self.has_messages,
            channels: self.channel_ids.len(),
            stats: self.stats,
        })
    }

    /// Resolve the subject users and every channel they could see during the
    /// slice, recording one membership per user and channel in the index.
    pub async fn get_channels(&mut self, cancel: &CancellationToken) -> ExportResult<()> {
        let mut subjects = Vec::new();
        for group_id in &self.hold.group_ids {
            subjects.extend(self.group_members(group_id).await?);
        }
        subjects.extend(self.hold.user_ids.iter().cloned());

        let resolver = ChannelResolver::new(self.store.clone());
        let mut processed = HashSet::new();
        let mut seen_channels = HashSet::new();

        for user_id in subjects {
            if !processed.insert(user_id.clone()) {
                continue;
            }
            check_cancelled(cancel)?;

            let user = self.store.user(&user_id).await?;
            let channel_ids = resolver
                .channels_for_user(
                    &user_id,
                    self.start_time,
                    self.end_time,
                    !self.hold.include_public_channels,
                )
                .await?;

            debug!(
                hold_id = %self.hold.id,
                user_id = %user_id,
                channel_count = channel_ids.len(),
                start_time = self.start_time,
                end_time = self.end_time,
                "Resolved channels for user"
            );

            for channel_id in channel_ids {
                self.index.add_membership(
                    &user_id,
                    &user.username,
                    &user.email,
                    &channel_id,
                    self.start_time,
                    self.end_time,
                );
                if seen_channels.insert(channel_id.clone()) {
                    self.channel_ids.push(channel_id);
                }
            }
        }

        Ok(())
    }

    async fn group_members(&self, group_id: &str) -> ExportResult<Vec<String>> {
        let mut members = Vec::new();
        for page in 0.. {
            if page >= GROUP_MAX_PAGES {
                return Err(ExportError::GroupTooLarge {
                    group_id: group_id.to_string(),
                    max_pages: GROUP_MAX_PAGES,
                });
            }
            let batch = self
                .store
                .group_members(group_id, page, GROUP_MEMBERS_PER_PAGE)
                .await?;
            let done = batch.len() < GROUP_MEMBERS_PER_PAGE;
            members.extend(batch);
            if done {
                break;
            }
        }
        Ok(members)
    }

    /// Export the messages and attachments of every resolved channel.
    pub async fn export_data(&mut self, cancel: &CancellationToken) -> ExportResult<()> {
        let exporter = BatchExporter::new(
            self.store.as_ref(),
            &self.bundles,
            &self.layout,
            &self.hold.secret,
            self.batch_size,
        );

        for channel_id in &self.channel_ids {
            check_cancelled(cancel)?;

            let stats = exporter
                .export_channel(
                    channel_id,
                    self.start_time,
                    self.end_time,
                    &mut self.hashes,
                    cancel,
                )
                .await?;
            if stats.batches_written > 0 {
                self.has_messages = true;
            }
            self.stats.add(&stats);
        }

        Ok(())
    }

    /// Describe the slice in the index, merge it into the stored index and
    /// write the result back.
    pub async fn update_indexes(&mut self, now: i64) -> ExportResult<()> {
        self.index.legal_hold = IndexDetails {
            id: self.hold.id.clone(),
            name: self.hold.name.clone(),
            display_name: self.hold.display_name.clone(),
            starts_at: self.hold.starts_at,
            last_execution_ended_at: self.end_time.min(now),
        };

        if !self.channel_ids.is_empty() {
            for metadata in self.store.channel_metadata_for_ids(&self.channel_ids).await? {
                self.index.add_channel_metadata(&metadata);
            }
        }

        let path = self.layout.index();
        if self.bundles.exists(&path).await? {
            let data = self.bundles.read(&path).await?;
            let existing: Index =
                serde_json::from_slice(&data).map_err(|source| ExportError::IndexCorrupt {
                    path: path.clone(),
                    source,
                })?;
            self.index = merge(&existing, &self.index);
        }

        let data = serde_json::to_vec_pretty(&self.index)?;
        self.hashes
            .insert(path.clone(), hash_bytes(&self.hold.secret, &data)?);
        self.bundles.write(&path, Bytes::from(data)).await?;
        Ok(())
    }

    /// Merge this slice's hashes into the bundle's manifest.
    pub async fn write_file_hashes(&self) -> ExportResult<()> {
        hashes::write_manifest(&self.bundles, &self.layout.hashes(), &self.hashes).await?;
        Ok(())
    }
}

fn check_cancelled(cancel: &CancellationToken) -> ExportResult<()> {
    if cancel.is_cancelled() {
        return Err(ExportError::Cancelled);
    }
    Ok(())
}
