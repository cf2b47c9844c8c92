use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use common::config::{ConfigError, Configuration};

/// Runtime knobs of the export job, derived from [`Configuration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub enabled: bool,
    pub interval: Duration,
    /// Daily run time in UTC; takes precedence over `interval`.
    pub time_of_day: Option<NaiveTime>,
    pub stop_timeout: Duration,
    pub batch_size: usize,
    pub slice_pause: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        let config = Configuration::default();
        Self {
            enabled: config.job.enabled,
            interval: config.job.interval,
            time_of_day: None,
            stop_timeout: config.job.stop_timeout,
            batch_size: config.export.batch_size,
            slice_pause: config.export.slice_pause,
        }
    }
}

impl JobSettings {
    pub fn from_config(config: &Configuration) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: config.job.enabled,
            interval: config.job.interval,
            time_of_day: config.job.parsed_time_of_day()?,
            stop_timeout: config.job.stop_timeout,
            batch_size: config.export.batch_size,
            slice_pause: config.export.slice_pause,
        })
    }

    /// When the run following one that finished at `last_finished` is due.
    pub fn calc_next(&self, last_finished: DateTime<Utc>) -> DateTime<Utc> {
        match self.time_of_day {
            Some(time) => {
                let same_day = last_finished.date_naive().and_time(time).and_utc();
                if same_day > last_finished {
                    same_day
                } else {
                    same_day + TimeDelta::days(1)
                }
            }
            None => TimeDelta::from_std(self.interval)
                .ok()
                .and_then(|delta| last_finished.checked_add_signed(delta))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Time to sleep before the next run. A job that never ran is treated as
    /// having finished a year ago, so its first run starts immediately.
    pub fn next_wait_interval(
        &self,
        now: DateTime<Utc>,
        last_finished: Option<DateTime<Utc>>,
    ) -> Duration {
        let last_finished = last_finished.unwrap_or(now - TimeDelta::days(365));
        (self.calc_next(last_finished) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
