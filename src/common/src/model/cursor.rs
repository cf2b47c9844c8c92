use serde::{Deserialize, Serialize};

/// Post ID that sorts before every real 26-character post ID.
pub const ZERO_POST_ID: &str = "00000000000000000000000000";

/// Pagination state of one channel's message export within a slice.
///
/// Batches are ordered by `(create_at, id)`; the next batch starts strictly
/// after `(last_create_at, last_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub last_create_at: i64,
    pub last_id: String,
    pub batch_number: u32,
    pub completed: bool,
}

impl Cursor {
    pub fn new(start_time: i64) -> Self {
        Self {
            last_create_at: start_time,
            last_id: ZERO_POST_ID.to_string(),
            batch_number: 0,
            completed: false,
        }
    }

    /// Advance past a fetched batch whose trailing record is `last`.
    ///
    /// A batch shorter than `limit` is the terminal batch for the channel.
    pub fn advance(&mut self, last: Option<(i64, &str)>, batch_len: usize, limit: usize) {
        if let Some((create_at, id)) = last {
            self.last_create_at = create_at;
            self.last_id = id.to_string();
        }
        if batch_len < limit {
            self.completed = true;
        }
        self.batch_number += 1;
    }

    /// Whether `(create_at, id)` sorts strictly after this cursor.
    pub fn is_before(&self, create_at: i64, id: &str) -> bool {
        create_at > self.last_create_at
            || (create_at == self.last_create_at && id > self.last_id.as_str())
    }
}
