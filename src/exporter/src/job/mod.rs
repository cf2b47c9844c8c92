//! Periodic legal hold export job.
//!
//! One job instance owns a scheduling loop and at most one active run. A run
//! walks every hold in registry order and exports consecutive slices until
//! each hold has caught up with the present, advancing the hold's high-water
//! mark through a compare-and-swap update after every slice.

pub mod settings;

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::model::{Hold, now_millis};
use common::registry::{HoldRegistry, RegistryError};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bundle::BundleStore;
use crate::error::ExportError;
use crate::execution::Execution;
use crate::metrics::ExportMetrics;
use crate::store::RecordStore;

pub use settings::JobSettings;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("hold {0} not found")]
    HoldNotFound(String),

    #[error("active run did not stop within {0:?}")]
    StopTimeout(Duration),
}

pub type JobResult<T> = Result<T, JobError>;

/// Cancellation and completion signal of the active run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

impl RunHandle {
    fn new(cancel: CancellationToken) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { cancel, done: rx }, tx)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the run to finish. Returns `false` if `timeout` elapsed first.
    pub async fn await_done(&self, timeout: Duration) -> bool {
        let mut done = self.done.clone();
        // A dropped sender also means the run is over.
        let finished = tokio::time::timeout(timeout, done.wait_for(|finished| *finished))
            .await
            .is_ok();
        finished
    }
}

/// Totals of one run across all holds it touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub holds_processed: usize,
    pub slices_executed: usize,
    pub slices_failed: usize,
    pub conflicts: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Another run was already active; nothing was done.
    Skipped,
}

/// Marks a run as active. Dropping it, on any exit path including a dropped
/// run future or an unwinding panic, frees the slot and signals completion.
struct ActiveRun<'a> {
    slot: &'a StdMutex<Option<RunHandle>>,
    done: watch::Sender<bool>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        let _ = self.done.send(true);
    }
}

struct Schedule {
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

struct JobState {
    settings: JobSettings,
    schedule: Option<Schedule>,
}

pub struct LegalHoldJob {
    registry: Arc<dyn HoldRegistry>,
    store: Arc<dyn RecordStore>,
    bundles: BundleStore,
    metrics: ExportMetrics,
    state: Mutex<JobState>,
    // Never held across an await
    runner: StdMutex<Option<RunHandle>>,
}

impl LegalHoldJob {
    pub fn new(
        registry: Arc<dyn HoldRegistry>,
        store: Arc<dyn RecordStore>,
        bundles: BundleStore,
        settings: JobSettings,
    ) -> Self {
        Self {
            registry,
            store,
            bundles,
            metrics: ExportMetrics::new(),
            state: Mutex::new(JobState {
                settings,
                schedule: None,
            }),
            runner: StdMutex::new(None),
        }
    }

    pub fn metrics(&self) -> &ExportMetrics {
        &self.metrics
    }

    pub async fn settings(&self) -> JobSettings {
        self.state.lock().await.settings.clone()
    }

    pub async fn is_scheduled(&self) -> bool {
        self.state.lock().await.schedule.is_some()
    }

    pub async fn is_running(&self) -> bool {
        self.active_runner().is_some()
    }

    fn active_runner(&self) -> Option<RunHandle> {
        self.runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Restart the job with new settings. A failure to stop the previous
    /// schedule is logged and does not prevent the restart.
    pub async fn on_configuration_change(self: &Arc<Self>, settings: JobSettings) {
        let timeout = self.state.lock().await.settings.stop_timeout;
        if let Err(e) = self.stop(timeout).await {
            warn!(error = %e, "Failed to stop legal hold job before reconfiguring");
        }

        let enabled = settings.enabled;
        self.state.lock().await.settings = settings;
        if enabled {
            self.start().await;
        } else {
            info!("Legal hold job disabled");
        }
    }

    /// Spawn the scheduling loop. Does nothing if it is already running.
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.schedule.is_some() {
            debug!("Legal hold job already scheduled");
            return;
        }

        let settings = state.settings.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let job = Arc::clone(self);

        info!(
            interval = ?settings.interval,
            time_of_day = ?settings.time_of_day,
            "Starting legal hold job"
        );

        let task = tokio::spawn(async move {
            let mut last_finished: Option<DateTime<Utc>> = None;
            loop {
                let wait = settings.next_wait_interval(Utc::now(), last_finished);
                debug!(wait = ?wait, "Waiting for next legal hold run");

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                match job.run_scheduled(&token).await {
                    Ok(RunOutcome::Completed(summary)) => debug!(
                        holds_processed = summary.holds_processed,
                        slices_executed = summary.slices_executed,
                        "Scheduled legal hold run finished"
                    ),
                    Ok(RunOutcome::Skipped) => {}
                    Err(e) => error!(error = %e, "Scheduled legal hold run failed"),
                }
                last_finished = Some(Utc::now());
            }
            debug!("Legal hold schedule stopped");
        });

        state.schedule = Some(Schedule {
            cancel,
            _task: task,
        });
    }

    /// Cancel the schedule and any active run, waiting up to `timeout` for
    /// the run to wind down.
    pub async fn stop(&self, timeout: Duration) -> JobResult<()> {
        let schedule = self.state.lock().await.schedule.take();
        if let Some(schedule) = schedule {
            schedule.cancel.cancel();
        }

        let runner = self.active_runner();

        if let Some(runner) = runner {
            runner.cancel();
            if !runner.await_done(timeout).await {
                return Err(JobError::StopTimeout(timeout));
            }
        }

        info!("Legal hold job stopped");
        Ok(())
    }

    pub async fn run(&self) -> JobResult<RunOutcome> {
        self.run_at(now_millis()).await
    }

    /// Process every hold as of `now` (milliseconds since the epoch).
    pub async fn run_at(&self, now: i64) -> JobResult<RunOutcome> {
        self.guarded(now, None, CancellationToken::new()).await
    }

    /// A run started by the scheduling loop. It is cancelled together with
    /// the schedule, even if it had not started when the schedule stopped.
    async fn run_scheduled(&self, schedule: &CancellationToken) -> JobResult<RunOutcome> {
        self.guarded(now_millis(), None, schedule.child_token()).await
    }

    /// Export one hold right away, even if its next slice is not yet due.
    pub async fn run_single_hold(&self, id: &str) -> JobResult<RunOutcome> {
        self.run_single_hold_at(id, now_millis()).await
    }

    pub async fn run_single_hold_at(&self, id: &str, now: i64) -> JobResult<RunOutcome> {
        self.guarded(now, Some(id), CancellationToken::new()).await
    }

    async fn guarded(
        &self,
        now: i64,
        only: Option<&str>,
        cancel: CancellationToken,
    ) -> JobResult<RunOutcome> {
        let settings = self.state.lock().await.settings.clone();
        let (handle, done) = {
            let mut runner = self.runner.lock().unwrap_or_else(PoisonError::into_inner);
            if runner.is_some() {
                self.metrics.record_run_skipped();
                error!("Legal hold job is already running, skipping this run");
                return Ok(RunOutcome::Skipped);
            }
            let (handle, done) = RunHandle::new(cancel);
            *runner = Some(handle.clone());
            (handle, done)
        };
        let active = ActiveRun {
            slot: &self.runner,
            done,
        };

        let result = match only {
            Some(id) => self.run_one(id, now, &settings, &handle.cancel).await,
            None => self.run_all(now, &settings, &handle.cancel).await,
        };
        drop(active);

        self.metrics.log_summary();
        result.map(RunOutcome::Completed)
    }

    async fn run_all(
        &self,
        now: i64,
        settings: &JobSettings,
        cancel: &CancellationToken,
    ) -> JobResult<RunSummary> {
        let holds = self.registry.list_holds().await?;
        info!(hold_count = holds.len(), "Running legal hold job");

        let mut summary = RunSummary::default();
        for hold in holds {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if hold.is_finished() {
                debug!(hold_id = %hold.id, "Legal hold finished, skipping");
                continue;
            }
            self.process_hold(hold, now, false, settings, cancel, &mut summary)
                .await;
        }
        Ok(summary)
    }

    async fn run_one(
        &self,
        id: &str,
        now: i64,
        settings: &JobSettings,
        cancel: &CancellationToken,
    ) -> JobResult<RunSummary> {
        let hold = self
            .registry
            .get_hold(id)
            .await?
            .ok_or_else(|| JobError::HoldNotFound(id.to_string()))?;

        let mut summary = RunSummary::default();
        self.process_hold(hold, now, true, settings, cancel, &mut summary)
            .await;
        Ok(summary)
    }

    /// Export consecutive slices of `hold` until it is caught up, finished,
    /// or a slice fails.
    async fn process_hold(
        &self,
        mut hold: Hold,
        now: i64,
        force: bool,
        settings: &JobSettings,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) {
        summary.holds_processed += 1;
        let mut first = true;

        while (force || hold.needs_executing(now))
            && !hold.is_finished()
            && hold.last_execution_ended_at < now
        {
            if !first && !settings.slice_pause.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(settings.slice_pause) => {}
                }
            }
            first = false;

            if cancel.is_cancelled() {
                summary.cancelled = true;
                return;
            }

            let execution = Execution::new(
                &hold,
                self.store.clone(),
                self.bundles.clone(),
                settings.batch_size,
            );
            let (start_time, end_time) = (execution.start_time(), execution.end_time());

            let outcome = match execution.execute(now, cancel).await {
                Ok(outcome) => outcome,
                Err(ExportError::Cancelled) => {
                    info!(hold_id = %hold.id, "Legal hold execution cancelled");
                    summary.cancelled = true;
                    return;
                }
                Err(e) => {
                    self.metrics.record_slice_failed();
                    summary.slices_failed += 1;
                    error!(
                        hold_id = %hold.id,
                        start_time,
                        end_time,
                        error = %e,
                        "Legal hold execution failed"
                    );
                    return;
                }
            };
            self.metrics.record_slice(&outcome.stats);
            summary.slices_executed += 1;

            let stored = match self.registry.get_hold(&hold.id).await {
                Ok(Some(stored)) => stored,
                Ok(None) => {
                    warn!(hold_id = %hold.id, "Legal hold removed during execution");
                    return;
                }
                Err(e) => {
                    error!(hold_id = %hold.id, error = %e, "Failed to re-read legal hold");
                    return;
                }
            };

            let mut updated = stored.clone();
            updated.last_execution_ended_at = stored
                .last_execution_ended_at
                .max(outcome.last_execution_ended_at);
            updated.has_messages = stored.has_messages || outcome.has_messages;

            match self.registry.update_hold(&updated, &stored).await {
                Ok(saved) => {
                    debug!(
                        hold_id = %saved.id,
                        last_execution_ended_at = saved.last_execution_ended_at,
                        "Advanced legal hold mark"
                    );
                    hold = saved;
                }
                Err(RegistryError::Conflict { .. }) => {
                    self.metrics.record_cas_conflict();
                    summary.conflicts += 1;
                    warn!(
                        hold_id = %hold.id,
                        "Legal hold modified concurrently, abandoning it for this run"
                    );
                    return;
                }
                Err(e) => {
                    error!(hold_id = %hold.id, error = %e, "Failed to update legal hold");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryRecordStore, MockRecordStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use common::model::{ChannelMetadata, Cursor, FileInfo, MessageRecord, UserInfo};
    use common::registry::{InMemoryHoldRegistry, RegistryResult};
    use object_store::memory::InMemory;
    use tokio::sync::Semaphore;

    fn hold(id: &str) -> Hold {
        Hold {
            id: id.to_string(),
            name: format!("case-{id}"),
            display_name: format!("Case {id}"),
            user_ids: vec!["u1".to_string()],
            starts_at: 1000,
            execution_length: 500,
            secret: "secret".to_string(),
            create_at: 1,
            update_at: 1,
            ..Default::default()
        }
    }

    fn settings() -> JobSettings {
        JobSettings {
            slice_pause: Duration::ZERO,
            stop_timeout: Duration::from_millis(200),
            batch_size: 100,
            ..Default::default()
        }
    }

    async fn record_store() -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store.add_user("u1", "alice", "alice@example.com").await;
        store.add_channel("c1", Some("t1"), "private", "P").await;
        store.add_membership("u1", "c1", 0, None).await;
        store
            .add_post(
                "c1",
                MessageRecord {
                    post_id: "p1".to_string(),
                    post_create_at: 1200,
                    post_file_ids: "[]".to_string(),
                    ..Default::default()
                },
            )
            .await;
        store
    }

    fn job(registry: Arc<dyn HoldRegistry>, store: Arc<dyn RecordStore>) -> Arc<LegalHoldJob> {
        Arc::new(LegalHoldJob::new(
            registry,
            store,
            BundleStore::new(Arc::new(InMemory::new())),
            settings(),
        ))
    }

    async fn mark(registry: &InMemoryHoldRegistry, id: &str) -> i64 {
        registry
            .get_hold(id)
            .await
            .unwrap()
            .unwrap()
            .last_execution_ended_at
    }

    /// Record store whose `user` lookups wait for a permit.
    struct GatedStore {
        inner: InMemoryRecordStore,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl RecordStore for GatedStore {
        async fn channel_ids_for_user_during(
            &self,
            user_id: &str,
            start_time: i64,
            end_time: i64,
            exclude_public: bool,
        ) -> StoreResult<Vec<String>> {
            self.inner
                .channel_ids_for_user_during(user_id, start_time, end_time, exclude_public)
                .await
        }

        async fn posts_batch(
            &self,
            channel_id: &str,
            cursor: &Cursor,
            end_time: i64,
            limit: usize,
        ) -> StoreResult<Vec<MessageRecord>> {
            self.inner
                .posts_batch(channel_id, cursor, end_time, limit)
                .await
        }

        async fn file_infos_by_ids(&self, file_ids: &[String]) -> StoreResult<Vec<FileInfo>> {
            self.inner.file_infos_by_ids(file_ids).await
        }

        async fn channel_metadata_for_ids(
            &self,
            channel_ids: &[String],
        ) -> StoreResult<Vec<ChannelMetadata>> {
            self.inner.channel_metadata_for_ids(channel_ids).await
        }

        async fn user(&self, user_id: &str) -> StoreResult<UserInfo> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            self.inner.user(user_id).await
        }

        async fn group_members(
            &self,
            group_id: &str,
            page: usize,
            per_page: usize,
        ) -> StoreResult<Vec<String>> {
            self.inner.group_members(group_id, page, per_page).await
        }
    }

    /// Registry that bumps the stored hold between the job's re-read and its
    /// update, as a concurrent editor would.
    struct ContendedRegistry {
        inner: InMemoryHoldRegistry,
    }

    #[async_trait]
    impl HoldRegistry for ContendedRegistry {
        async fn list_holds(&self) -> RegistryResult<Vec<Hold>> {
            self.inner.list_holds().await
        }

        async fn get_hold(&self, id: &str) -> RegistryResult<Option<Hold>> {
            let current = self.inner.get_hold(id).await?;
            if let Some(current) = &current {
                let edited = Hold {
                    description: "edited".to_string(),
                    ..current.clone()
                };
                self.inner.update_hold(&edited, current).await?;
            }
            Ok(current)
        }

        async fn create_hold(&self, hold: Hold) -> RegistryResult<Hold> {
            self.inner.create_hold(hold).await
        }

        async fn update_hold(&self, new: &Hold, old: &Hold) -> RegistryResult<Hold> {
            self.inner.update_hold(new, old).await
        }
    }

    async fn wait_until_running(job: &LegalHoldJob) {
        for _ in 0..200 {
            if job.is_running().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run never started");
    }

    #[tokio::test]
    async fn test_first_slice_of_open_ended_hold() {
        let registry = Arc::new(InMemoryHoldRegistry::new());
        let rejected = registry
            .create_hold(Hold {
                starts_at: 0,
                ..hold("zero")
            })
            .await;
        assert!(matches!(rejected, Err(RegistryError::Validation(_))));

        registry.insert(hold("h1")).await;
        let job = job(registry.clone(), Arc::new(record_store().await));

        let outcome = job.run_at(2000).await.unwrap();

        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(summary.slices_executed, 1);
        assert_eq!(mark(&registry, "h1").await, 1500);
        let stored = registry.get_hold("h1").await.unwrap().unwrap();
        assert!(stored.has_messages);
    }

    #[tokio::test]
    async fn test_bounded_hold_finishes() {
        let registry = Arc::new(InMemoryHoldRegistry::new());
        registry
            .insert(Hold {
                ends_at: 1800,
                last_execution_ended_at: 1500,
                ..hold("h1")
            })
            .await;
        let job = job(registry.clone(), Arc::new(record_store().await));

        job.run_at(2000).await.unwrap();

        let stored = registry.get_hold("h1").await.unwrap().unwrap();
        assert_eq!(stored.last_execution_ended_at, 1800);
        assert!(stored.is_finished());

        let outcome = job.run_at(10_000).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed(RunSummary {
                holds_processed: 0,
                ..Default::default()
            })
        );
    }

    #[tokio::test]
    async fn test_catches_up_over_several_slices() {
        let registry = Arc::new(InMemoryHoldRegistry::new());
        registry.insert(hold("h1")).await;
        let job = job(registry.clone(), Arc::new(record_store().await));

        let outcome = job.run_at(3200).await.unwrap();

        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        // [1000,1500) [1500,2000) [2000,2500) [2500,3000); [3000,3500) is not due
        assert_eq!(summary.slices_executed, 4);
        assert_eq!(mark(&registry, "h1").await, 3000);
        assert_eq!(job.metrics().slices_executed(), 4);
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let registry = Arc::new(InMemoryHoldRegistry::new());
        registry.insert(hold("h1")).await;
        let gate = Arc::new(Semaphore::new(0));
        let store = GatedStore {
            inner: record_store().await,
            gate: gate.clone(),
        };
        let job = job(registry.clone(), Arc::new(store));

        let first = tokio::spawn({
            let job = job.clone();
            async move { job.run_at(2000).await }
        });
        wait_until_running(&job).await;

        assert_eq!(job.run_at(2000).await.unwrap(), RunOutcome::Skipped);
        assert_eq!(job.metrics().runs_skipped(), 1);
        assert_eq!(mark(&registry, "h1").await, 0);

        gate.add_permits(10);
        let outcome = first.await.unwrap().unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(mark(&registry, "h1").await, 1500);
        assert!(!job.is_running().await);
    }

    #[tokio::test]
    async fn test_conflicting_update_abandons_hold() {
        let inner = InMemoryHoldRegistry::new();
        inner.insert(hold("h1")).await;
        let registry = Arc::new(ContendedRegistry {
            inner: inner.clone(),
        });
        let job = job(registry, Arc::new(record_store().await));

        let outcome = job.run_at(5000).await.unwrap();

        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(summary.slices_executed, 1);
        assert_eq!(summary.conflicts, 1);
        assert_eq!(job.metrics().cas_conflicts(), 1);
        assert_eq!(mark(&inner, "h1").await, 0);
    }

    #[tokio::test]
    async fn test_failed_hold_does_not_block_others() {
        let mut store = MockRecordStore::new();
        store.expect_user().returning(|id| {
            if id == "broken" {
                Err(StoreError::Unavailable("down".to_string()))
            } else {
                Ok(UserInfo {
                    id: id.to_string(),
                    username: id.to_string(),
                    email: format!("{id}@example.com"),
                })
            }
        });
        store
            .expect_channel_ids_for_user_during()
            .returning(|_, _, _, _| Ok(vec![]));

        let registry = Arc::new(InMemoryHoldRegistry::new());
        registry
            .insert(Hold {
                user_ids: vec!["broken".to_string()],
                ..hold("bad")
            })
            .await;
        registry.insert(hold("good")).await;
        let job = job(registry.clone(), Arc::new(store));

        let outcome = job.run_at(2000).await.unwrap();

        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(summary.slices_failed, 1);
        assert_eq!(summary.slices_executed, 1);
        assert_eq!(mark(&registry, "bad").await, 0);
        assert_eq!(mark(&registry, "good").await, 1500);
    }

    #[tokio::test]
    async fn test_run_single_hold_forces_partial_slice() {
        let registry = Arc::new(InMemoryHoldRegistry::new());
        registry.insert(hold("h1")).await;
        let job = job(registry.clone(), Arc::new(record_store().await));

        job.run_at(1200).await.unwrap();
        assert_eq!(mark(&registry, "h1").await, 0);

        job.run_single_hold_at("h1", 1200).await.unwrap();
        assert_eq!(mark(&registry, "h1").await, 1200);

        let err = job.run_single_hold("missing").await.unwrap_err();
        assert!(matches!(err, JobError::HoldNotFound(_)));
        assert!(!job.is_running().await);
    }

    #[tokio::test]
    async fn test_stop_times_out_then_succeeds() {
        let registry = Arc::new(InMemoryHoldRegistry::new());
        registry.insert(hold("h1")).await;
        let gate = Arc::new(Semaphore::new(0));
        let store = GatedStore {
            inner: record_store().await,
            gate: gate.clone(),
        };
        let job = job(registry.clone(), Arc::new(store));

        let running = tokio::spawn({
            let job = job.clone();
            async move { job.run_at(2000).await }
        });
        wait_until_running(&job).await;

        let err = job.stop(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, JobError::StopTimeout(_)));

        gate.add_permits(10);
        let outcome = running.await.unwrap().unwrap();
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert!(summary.cancelled);
        assert_eq!(mark(&registry, "h1").await, 0);

        job.stop(Duration::from_millis(20)).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_run_frees_the_guard() {
        let registry = Arc::new(InMemoryHoldRegistry::new());
        registry.insert(hold("h1")).await;
        let job = Arc::new(LegalHoldJob::new(
            registry.clone(),
            Arc::new(record_store().await),
            BundleStore::new(Arc::new(InMemory::new())),
            JobSettings {
                slice_pause: Duration::from_secs(10),
                ..settings()
            },
        ));

        // Abandoned while pausing after the first slice.
        let abandoned = tokio::time::timeout(Duration::from_millis(50), job.run_at(10_000)).await;
        assert!(abandoned.is_err());
        assert!(!job.is_running().await);
        assert_eq!(mark(&registry, "h1").await, 1500);

        // [1500,2000) is not yet due at 1900, so no pause is reached.
        let outcome = job.run_at(1900).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(job.metrics().runs_skipped(), 0);
    }

    #[tokio::test]
    async fn test_scheduled_run_after_stop_does_nothing() {
        let registry = Arc::new(InMemoryHoldRegistry::new());
        registry.insert(hold("h1")).await;
        let job = job(registry.clone(), Arc::new(record_store().await));

        let schedule = CancellationToken::new();
        schedule.cancel();
        let outcome = job.run_scheduled(&schedule).await.unwrap();

        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };
        assert!(summary.cancelled);
        assert_eq!(summary.slices_executed, 0);
        assert_eq!(mark(&registry, "h1").await, 0);
        assert!(!job.is_running().await);
    }

    #[tokio::test]
    async fn test_schedule_runs_immediately_and_stops() {
        let registry = Arc::new(InMemoryHoldRegistry::new());
        let now = now_millis();
        registry
            .insert(Hold {
                starts_at: now - 10_000,
                execution_length: 4_000,
                ..hold("h1")
            })
            .await;
        let job = job(registry.clone(), Arc::new(record_store().await));

        job.on_configuration_change(JobSettings {
            enabled: false,
            ..settings()
        })
        .await;
        assert!(!job.is_scheduled().await);

        job.on_configuration_change(settings()).await;
        assert!(job.is_scheduled().await);

        // No prior run, so the first one starts without waiting a day.
        for _ in 0..400 {
            if mark(&registry, "h1").await > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        job.stop(Duration::from_secs(1)).await.unwrap();
        assert!(!job.is_scheduled().await);
        assert!(!job.is_running().await);
        assert!(mark(&registry, "h1").await >= now - 6_000);
    }
}
