use std::collections::HashSet;
use std::sync::Arc;

use crate::store::{RecordStore, StoreResult};

/// Answers which channels a user could see during a time window.
#[derive(Clone)]
pub struct ChannelResolver {
    store: Arc<dyn RecordStore>,
}

impl ChannelResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Channels whose membership overlaps `[start_time, end_time)`: joined
    /// before `end_time` and not left before `start_time`. Each channel is
    /// returned once, in store order.
    pub async fn channels_for_user(
        &self,
        user_id: &str,
        start_time: i64,
        end_time: i64,
        exclude_public: bool,
    ) -> StoreResult<Vec<String>> {
        let ids = self
            .store
            .channel_ids_for_user_during(user_id, start_time, end_time, exclude_public)
            .await?;

        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids.into_iter().filter(|id| seen.insert(id.clone())).collect())
    }
}
