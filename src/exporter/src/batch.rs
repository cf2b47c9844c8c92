use bytes::Bytes;
use common::model::{Cursor, MessageRecord};
use tokio_util::sync::CancellationToken;

use crate::bundle::{BundleLayout, BundleStore};
use crate::error::{ExportError, ExportResult};
use crate::hashes::{HashList, hash_bytes, hash_object};
use crate::store::RecordStore;

/// Counters for the export of one or more channels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportStats {
    pub fetches: usize,
    pub batches_written: usize,
    pub records: usize,
    pub files_copied: usize,
    pub files_missing: usize,
}

impl ExportStats {
    pub fn add(&mut self, other: &ExportStats) {
        self.fetches += other.fetches;
        self.batches_written += other.batches_written;
        self.records += other.records;
        self.files_copied += other.files_copied;
        self.files_missing += other.files_missing;
    }
}

/// Pages one channel's posts out of the record store into CSV batches and
/// copies the attachments they reference.
pub struct BatchExporter<'a> {
    store: &'a dyn RecordStore,
    bundles: &'a BundleStore,
    layout: &'a BundleLayout,
    secret: &'a str,
    batch_size: usize,
}

impl<'a> BatchExporter<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        bundles: &'a BundleStore,
        layout: &'a BundleLayout,
        secret: &'a str,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            bundles,
            layout,
            secret,
            batch_size: batch_size.max(1),
        }
    }

    /// Export every post of `channel_id` in `[start_time, end_time)`,
    /// recording the HMAC of each written file in `hashes`.
    pub async fn export_channel(
        &self,
        channel_id: &str,
        start_time: i64,
        end_time: i64,
        hashes: &mut HashList,
        cancel: &CancellationToken,
    ) -> ExportResult<ExportStats> {
        let mut stats = ExportStats::default();
        let mut cursor = Cursor::new(start_time);

        while !cursor.completed {
            if cancel.is_cancelled() {
                return Err(ExportError::Cancelled);
            }

            let batch = self
                .store
                .posts_batch(channel_id, &cursor, end_time, self.batch_size)
                .await?;
            stats.fetches += 1;

            if let (Some(lead), Some(last)) = (batch.first(), batch.last()) {
                tracing::debug!(
                    channel_id = %channel_id,
                    batch_number = cursor.batch_number,
                    post_count = batch.len(),
                    "Exporting message batch"
                );

                let path =
                    self.layout
                        .messages_batch(channel_id, lead.post_create_at, &lead.post_id);
                let data = records_to_csv(&batch)?;
                hashes.insert(path.clone(), hash_bytes(self.secret, &data)?);
                self.bundles.write(&path, Bytes::from(data)).await?;
                stats.batches_written += 1;
                stats.records += batch.len();

                self.export_files(channel_id, lead, &batch, hashes, &mut stats)
                    .await?;

                cursor.advance(
                    Some((last.post_create_at, &last.post_id)),
                    batch.len(),
                    self.batch_size,
                );
            } else {
                cursor.advance(None, 0, self.batch_size);
            }
        }

        Ok(stats)
    }

    async fn export_files(
        &self,
        channel_id: &str,
        lead: &MessageRecord,
        batch: &[MessageRecord],
        hashes: &mut HashList,
        stats: &mut ExportStats,
    ) -> ExportResult<()> {
        let mut file_ids = Vec::new();
        for record in batch {
            let ids = record
                .file_ids()
                .map_err(|source| ExportError::InvalidFileIds {
                    post_id: record.post_id.clone(),
                    source,
                })?;
            file_ids.extend(ids);
        }
        if file_ids.is_empty() {
            return Ok(());
        }

        let files = self.store.file_infos_by_ids(&file_ids).await?;
        tracing::debug!(
            channel_id = %channel_id,
            file_count = files.len(),
            "Copying attachments"
        );

        for file in files {
            let dest = self.layout.attachment(
                channel_id,
                lead.post_create_at,
                &lead.post_id,
                &file.id,
                &file.name,
            );

            match self.bundles.copy(&file.path, &dest).await {
                Ok(()) => {}
                Err(object_store::Error::NotFound { .. }) => {
                    tracing::warn!(
                        channel_id = %channel_id,
                        file_id = %file.id,
                        path = %file.path,
                        "Attachment source missing, skipping"
                    );
                    stats.files_missing += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            hashes.insert(dest, hash_object(self.bundles, self.secret, &file.path).await?);
            stats.files_copied += 1;
        }

        Ok(())
    }
}

/// Serialize records as CSV with a header row.
pub fn records_to_csv(records: &[MessageRecord]) -> ExportResult<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.into_inner()
        .map_err(|e| ExportError::Csv(csv::Error::from(e.into_error())))
}
