/// Common test utilities and helpers for integration tests
use std::time::Duration;

use exporter::JobSettings;

pub mod fixtures;

/// Job settings for tests: tiny batches so paging is exercised, no pause
/// between slices.
pub fn test_settings() -> JobSettings {
    JobSettings {
        batch_size: 2,
        slice_pause: Duration::ZERO,
        stop_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

/// Initialize test logging
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
