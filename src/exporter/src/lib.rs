//! Legal hold export engine.
//!
//! Exports the channel activity of each hold's subject users into a bundle in
//! object storage, one bounded time slice at a time:
//!
//! - [`store`]: read access to the messaging database
//! - [`resolver`]: channels a user could see during a slice
//! - [`batch`]: cursor-paged CSV export of one channel
//! - [`execution`]: one slice of one hold, including the bundle index
//! - [`hashes`]: HMAC manifest and bundle verification
//! - [`job`]: periodic scheduling with a run-once guard

pub mod batch;
pub mod bundle;
pub mod error;
pub mod execution;
pub mod hashes;
pub mod job;
pub mod metrics;
pub mod resolver;
pub mod store;

pub use batch::{BatchExporter, ExportStats};
pub use bundle::{BundleLayout, BundleStore};
pub use error::{ExportError, ExportResult};
pub use execution::{Execution, ExecutionOutcome};
pub use hashes::{VerificationReport, verify_bundle};
pub use job::{JobError, JobSettings, LegalHoldJob, RunHandle, RunOutcome, RunSummary};
pub use metrics::{ExportMetrics, MetricsSummary};
pub use resolver::ChannelResolver;
pub use store::{InMemoryRecordStore, RecordStore, SqlRecordStore, StoreError};
