use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::model::{
    CHANNEL_TYPE_OPEN, ChannelMetadata, Cursor, DIRECT_MESSAGES_TEAM_DISPLAY_NAME,
    DIRECT_MESSAGES_TEAM_ID, DIRECT_MESSAGES_TEAM_NAME, FileInfo, MessageRecord, UserInfo,
};
use tokio::sync::Mutex;

use super::{RecordStore, StoreError, StoreResult};

#[derive(Clone, Debug)]
struct Membership {
    user_id: String,
    channel_id: String,
    join_time: i64,
    leave_time: Option<i64>,
}

#[derive(Clone, Debug)]
struct Channel {
    team_id: Option<String>,
    name: String,
    display_name: String,
    channel_type: String,
}

#[derive(Clone, Debug)]
struct Team {
    name: String,
    display_name: String,
}

#[derive(Debug, Default)]
struct State {
    memberships: Vec<Membership>,
    channels: BTreeMap<String, Channel>,
    teams: BTreeMap<String, Team>,
    users: BTreeMap<String, UserInfo>,
    posts: BTreeMap<String, Vec<MessageRecord>>,
    files: BTreeMap<String, FileInfo>,
    groups: BTreeMap<String, BTreeSet<String>>,
    unavailable: bool,
}

/// Record store held in memory, populated through its builder-style methods.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_team(&self, id: &str, name: &str, display_name: &str) {
        self.state.lock().await.teams.insert(
            id.to_string(),
            Team {
                name: name.to_string(),
                display_name: display_name.to_string(),
            },
        );
    }

    /// Register a channel; `team_id` is `None` for direct and group messages.
    pub async fn add_channel(
        &self,
        id: &str,
        team_id: Option<&str>,
        name: &str,
        channel_type: &str,
    ) {
        self.state.lock().await.channels.insert(
            id.to_string(),
            Channel {
                team_id: team_id.map(str::to_string),
                name: name.to_string(),
                display_name: name.to_string(),
                channel_type: channel_type.to_string(),
            },
        );
    }

    pub async fn add_user(&self, id: &str, username: &str, email: &str) {
        self.state.lock().await.users.insert(
            id.to_string(),
            UserInfo {
                id: id.to_string(),
                username: username.to_string(),
                email: email.to_string(),
            },
        );
    }

    pub async fn add_membership(
        &self,
        user_id: &str,
        channel_id: &str,
        join_time: i64,
        leave_time: Option<i64>,
    ) {
        self.state.lock().await.memberships.push(Membership {
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
            join_time,
            leave_time,
        });
    }

    /// Store a post. Only the post and author fields of `record` are kept;
    /// team and channel fields are filled from the registered channel.
    pub async fn add_post(&self, channel_id: &str, record: MessageRecord) {
        self.state
            .lock()
            .await
            .posts
            .entry(channel_id.to_string())
            .or_default()
            .push(record);
    }

    pub async fn add_file(&self, file: FileInfo) {
        self.state.lock().await.files.insert(file.id.clone(), file);
    }

    pub async fn add_group_member(&self, group_id: &str, user_id: &str) {
        self.state
            .lock()
            .await
            .groups
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    /// Make every subsequent call fail, or recover.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }
}

impl State {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }

    fn metadata(&self, channel_id: &str) -> Option<ChannelMetadata> {
        let channel = self.channels.get(channel_id)?;
        let team = channel
            .team_id
            .as_ref()
            .and_then(|id| self.teams.get(id).map(|t| (id, t)));

        let (team_id, team_name, team_display_name) = match team {
            Some((id, team)) => (id.clone(), team.name.clone(), team.display_name.clone()),
            None => (
                DIRECT_MESSAGES_TEAM_ID.to_string(),
                DIRECT_MESSAGES_TEAM_NAME.to_string(),
                DIRECT_MESSAGES_TEAM_DISPLAY_NAME.to_string(),
            ),
        };

        Some(ChannelMetadata {
            team_id,
            team_name,
            team_display_name,
            channel_id: channel_id.to_string(),
            channel_name: channel.name.clone(),
            channel_display_name: channel.display_name.clone(),
            channel_type: channel.channel_type.clone(),
        })
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn channel_ids_for_user_during(
        &self,
        user_id: &str,
        start_time: i64,
        end_time: i64,
        exclude_public: bool,
    ) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        state.check_available()?;

        let ids: BTreeSet<String> = state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter(|m| m.join_time < end_time)
            .filter(|m| m.leave_time.is_none_or(|leave| leave >= start_time))
            .filter(|m| {
                !exclude_public
                    || state
                        .channels
                        .get(&m.channel_id)
                        .is_none_or(|c| c.channel_type != CHANNEL_TYPE_OPEN)
            })
            .map(|m| m.channel_id.clone())
            .collect();

        Ok(ids.into_iter().collect())
    }

    async fn posts_batch(
        &self,
        channel_id: &str,
        cursor: &Cursor,
        end_time: i64,
        limit: usize,
    ) -> StoreResult<Vec<MessageRecord>> {
        let state = self.state.lock().await;
        state.check_available()?;

        let Some(posts) = state.posts.get(channel_id) else {
            return Ok(Vec::new());
        };

        let mut batch: Vec<MessageRecord> = posts
            .iter()
            .filter(|p| p.post_create_at < end_time)
            .filter(|p| cursor.is_before(p.post_create_at, &p.post_id))
            .cloned()
            .collect();
        batch.sort_by(|a, b| {
            (a.post_create_at, &a.post_id).cmp(&(b.post_create_at, &b.post_id))
        });
        batch.truncate(limit);

        let metadata = state.metadata(channel_id);
        for record in &mut batch {
            if let Some(meta) = &metadata {
                if meta.team_id != DIRECT_MESSAGES_TEAM_ID {
                    record.team_name = meta.team_name.clone();
                    record.team_display_name = meta.team_display_name.clone();
                }
                record.channel_name = meta.channel_name.clone();
                record.channel_display_name = meta.channel_display_name.clone();
                record.channel_type = meta.channel_type.clone();
            }
        }

        Ok(batch)
    }

    async fn file_infos_by_ids(&self, file_ids: &[String]) -> StoreResult<Vec<FileInfo>> {
        let state = self.state.lock().await;
        state.check_available()?;

        Ok(file_ids
            .iter()
            .filter_map(|id| state.files.get(id).cloned())
            .collect())
    }

    async fn channel_metadata_for_ids(
        &self,
        channel_ids: &[String],
    ) -> StoreResult<Vec<ChannelMetadata>> {
        let state = self.state.lock().await;
        state.check_available()?;

        Ok(channel_ids
            .iter()
            .filter_map(|id| state.metadata(id))
            .collect())
    }

    async fn user(&self, user_id: &str) -> StoreResult<UserInfo> {
        let state = self.state.lock().await;
        state.check_available()?;

        state
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "user",
                id: user_id.to_string(),
            })
    }

    async fn group_members(
        &self,
        group_id: &str,
        page: usize,
        per_page: usize,
    ) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        state.check_available()?;

        Ok(state
            .groups
            .get(group_id)
            .map(|members| {
                members
                    .iter()
                    .skip(page * per_page)
                    .take(per_page)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
