use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Root directory of every hold bundle in the object store.
pub const BUNDLE_ROOT: &str = "legal_hold";

const NAME_MIN_LEN: usize = 2;
const NAME_MAX_LEN: usize = 64;
const DISPLAY_NAME_MAX_LEN: usize = 64;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A legal hold: a named set of subject users whose channel activity within
/// `[starts_at, ends_at)` must be preserved.
///
/// All timestamps are milliseconds since the Unix epoch. An `ends_at` of zero
/// means the hold has no end and keeps exporting new activity forever.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    pub id: String,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub include_public_channels: bool,
    pub starts_at: i64,
    #[serde(default)]
    pub ends_at: i64,
    /// Maximum span, in milliseconds, covered by one execution slice.
    pub execution_length: i64,
    /// High-water mark: everything before this instant has been exported.
    #[serde(default)]
    pub last_execution_ended_at: i64,
    #[serde(default)]
    pub has_messages: bool,
    /// Keys the HMAC entries written to the bundle hash manifest.
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub create_at: i64,
    #[serde(default)]
    pub update_at: i64,
}

impl Hold {
    /// Check the fields a hold must carry before it is handed to the engine.
    pub fn validate(&self) -> Result<(), HoldValidationError> {
        if self.id.is_empty() {
            return Err(HoldValidationError::MissingId);
        }

        let name_len = self.name.chars().count();
        if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name_len) {
            return Err(HoldValidationError::InvalidNameLength(name_len));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(HoldValidationError::InvalidName(self.name.clone()));
        }

        let display_len = self.display_name.chars().count();
        if display_len == 0 || display_len > DISPLAY_NAME_MAX_LEN {
            return Err(HoldValidationError::InvalidDisplayName(display_len));
        }

        if self.user_ids.is_empty() && self.group_ids.is_empty() {
            return Err(HoldValidationError::NoSubjects);
        }

        if self.starts_at <= 0 {
            return Err(HoldValidationError::InvalidStartsAt(self.starts_at));
        }
        if self.ends_at < 0 || (self.ends_at > 0 && self.ends_at < self.starts_at) {
            return Err(HoldValidationError::EndsBeforeStart {
                starts_at: self.starts_at,
                ends_at: self.ends_at,
            });
        }
        if self.execution_length <= 0 {
            return Err(HoldValidationError::InvalidExecutionLength(
                self.execution_length,
            ));
        }

        Ok(())
    }

    /// Start of the next slice: the high-water mark, or the hold start if
    /// nothing has been exported yet.
    pub fn next_execution_start_time(&self) -> i64 {
        self.last_execution_ended_at.max(self.starts_at)
    }

    /// End of the next slice, capped at `ends_at` for bounded holds.
    pub fn next_execution_end_time(&self) -> i64 {
        let end = self
            .next_execution_start_time()
            .saturating_add(self.execution_length);
        if self.ends_at > 0 {
            end.min(self.ends_at)
        } else {
            end
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ends_at != 0 && self.last_execution_ended_at >= self.ends_at
    }

    /// A hold needs executing once its next slice lies entirely in the past.
    pub fn needs_executing(&self, now: i64) -> bool {
        !self.is_finished() && now > self.next_execution_end_time()
    }

    pub fn state(&self, now: i64) -> HoldState {
        if self.is_finished() {
            HoldState::Finished
        } else if self.needs_executing(now) {
            HoldState::Ready
        } else {
            HoldState::NotReady
        }
    }

    pub fn base_path(&self) -> String {
        format!("{BUNDLE_ROOT}/{}_({})", self.name, self.id)
    }

    pub fn index_path(&self) -> String {
        format!("{}/index.json", self.base_path())
    }

    pub fn hashes_path(&self) -> String {
        format!("{}/hashes.json", self.base_path())
    }
}

/// Scheduling state of a hold, evaluated on every scheduler tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HoldState {
    /// The next slice still overlaps the present.
    NotReady,
    /// There is unexported backlog.
    Ready,
    /// The whole window has been exported.
    Finished,
}

/// Configuration errors rejected when a hold is defined.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HoldValidationError {
    #[error("hold id must not be empty")]
    MissingId,

    #[error("hold name must be 2-64 characters, got {0}")]
    InvalidNameLength(usize),

    #[error("hold name '{0}' may only contain lowercase letters, digits, '-' and '_'")]
    InvalidName(String),

    #[error("hold display name must be 1-64 characters, got {0}")]
    InvalidDisplayName(usize),

    #[error("hold must name at least one user or group")]
    NoSubjects,

    #[error("starts_at must be greater than zero, got {0}")]
    InvalidStartsAt(i64),

    #[error("ends_at ({ends_at}) must not be before starts_at ({starts_at})")]
    EndsBeforeStart { starts_at: i64, ends_at: i64 },

    #[error("execution_length must be greater than zero, got {0}")]
    InvalidExecutionLength(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hold(last: i64, starts_at: i64, execution_length: i64, ends_at: i64) -> Hold {
        Hold {
            last_execution_ended_at: last,
            starts_at,
            execution_length,
            ends_at,
            ..Default::default()
        }
    }

    fn valid_hold() -> Hold {
        Hold {
            id: "5ewtf6ny5fgbjkhosnbg7wreya".to_string(),
            name: "asdf-foo1".to_string(),
            display_name: "Asdf Foo".to_string(),
            user_ids: vec!["user1".to_string()],
            starts_at: 1000,
            execution_length: 500,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_hold() {
        assert!(valid_hold().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let cases = vec![
            (
                Hold {
                    id: String::new(),
                    ..valid_hold()
                },
                HoldValidationError::MissingId,
            ),
            (
                Hold {
                    name: "a".to_string(),
                    ..valid_hold()
                },
                HoldValidationError::InvalidNameLength(1),
            ),
            (
                Hold {
                    name: "a".repeat(65),
                    ..valid_hold()
                },
                HoldValidationError::InvalidNameLength(65),
            ),
            (
                Hold {
                    name: "a-s-d f".to_string(),
                    ..valid_hold()
                },
                HoldValidationError::InvalidName("a-s-d f".to_string()),
            ),
            (
                Hold {
                    user_ids: vec![],
                    ..valid_hold()
                },
                HoldValidationError::NoSubjects,
            ),
            (
                Hold {
                    starts_at: 0,
                    ..valid_hold()
                },
                HoldValidationError::InvalidStartsAt(0),
            ),
            (
                Hold {
                    ends_at: 999,
                    ..valid_hold()
                },
                HoldValidationError::EndsBeforeStart {
                    starts_at: 1000,
                    ends_at: 999,
                },
            ),
            (
                Hold {
                    execution_length: 0,
                    ..valid_hold()
                },
                HoldValidationError::InvalidExecutionLength(0),
            ),
        ];

        for (hold, expected) in cases {
            assert_eq!(hold.validate(), Err(expected));
        }
    }

    #[test]
    fn test_needs_executing() {
        // (now, hold, expected)
        let cases = vec![
            // starts in the future
            (10, hold(0, 20, 30, 40), false),
            // ends in the past, not yet finished
            (50, hold(20, 10, 20, 40), true),
            // ends in the past, short final slice
            (50, hold(20, 10, 20, 30), true),
            // slice would end in the future
            (10, hold(0, 5, 10, 20), false),
            // slice ends in the past, hold ends in the future
            (30, hold(15, 5, 10, 50), true),
            // finished holds never need executing
            (100, hold(40, 10, 20, 40), false),
        ];

        for (now, hold, expected) in cases {
            assert_eq!(hold.needs_executing(now), expected, "hold {hold:?} at {now}");
        }
    }

    #[test]
    fn test_is_finished() {
        assert!(hold(1800, 1000, 500, 1800).is_finished());
        assert!(hold(1900, 1000, 500, 1800).is_finished());
        assert!(!hold(1500, 1000, 500, 1800).is_finished());
        assert!(!hold(1_000_000, 1000, 500, 0).is_finished());
    }

    #[test]
    fn test_unbounded_hold_first_slice() {
        let hold = hold(0, 1000, 500, 0);

        assert_eq!(hold.next_execution_start_time(), 1000);
        assert_eq!(hold.next_execution_end_time(), 1500);
        assert!(hold.needs_executing(2000));
        assert_eq!(hold.state(2000), HoldState::Ready);
        assert_eq!(hold.state(1500), HoldState::NotReady);
    }

    #[test]
    fn test_bounded_hold_final_slice_is_capped() {
        let mut hold = hold(1500, 1000, 500, 1800);

        assert_eq!(hold.next_execution_start_time(), 1500);
        assert_eq!(hold.next_execution_end_time(), 1800);

        hold.last_execution_ended_at = 1800;
        assert_eq!(hold.state(2000), HoldState::Finished);
    }

    #[test]
    fn test_bundle_paths() {
        let hold = Hold {
            id: "1".to_string(),
            name: "testhold".to_string(),
            ..Default::default()
        };

        assert_eq!(hold.base_path(), "legal_hold/testhold_(1)");
        assert_eq!(hold.index_path(), "legal_hold/testhold_(1)/index.json");
        assert_eq!(hold.hashes_path(), "legal_hold/testhold_(1)/hashes.json");
    }
}
