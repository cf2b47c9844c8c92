use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::hold::Hold;
use super::record::ChannelMetadata;

/// Navigable description of everything a hold bundle contains, persisted as
/// `index.json` at the bundle root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub legal_hold: IndexDetails,
    #[serde(default)]
    pub users: BTreeMap<String, IndexUser>,
    #[serde(default)]
    pub teams: Vec<IndexTeam>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDetails {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub starts_at: i64,
    pub last_execution_ended_at: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexUser {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub channels: Vec<ChannelMembership>,
}

/// Interval during which a user was covered as a member of a channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMembership {
    pub channel_id: String,
    pub start_time: i64,
    pub end_time: i64,
}

impl ChannelMembership {
    /// Smallest interval covering both memberships of the same channel.
    pub fn combine(&self, other: &ChannelMembership) -> ChannelMembership {
        ChannelMembership {
            channel_id: self.channel_id.clone(),
            start_time: self.start_time.min(other.start_time),
            end_time: self.end_time.max(other.end_time),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTeam {
    pub id: String,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub channels: Vec<IndexChannel>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexChannel {
    pub id: String,
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub channel_type: String,
}

impl Index {
    /// Empty index for one slice of `hold`, carrying its descriptive fields
    /// and the slice's high-water mark.
    pub fn for_hold(hold: &Hold, last_execution_ended_at: i64) -> Self {
        Self {
            legal_hold: IndexDetails {
                id: hold.id.clone(),
                name: hold.name.clone(),
                display_name: hold.display_name.clone(),
                starts_at: hold.starts_at,
                last_execution_ended_at,
            },
            users: BTreeMap::new(),
            teams: Vec::new(),
        }
    }

    /// Record that `user_id` was covered in `channel_id` over
    /// `[start_time, end_time)`.
    pub fn add_membership(
        &mut self,
        user_id: &str,
        username: &str,
        email: &str,
        channel_id: &str,
        start_time: i64,
        end_time: i64,
    ) {
        let user = self.users.entry(user_id.to_string()).or_default();
        user.username = username.to_string();
        user.email = email.to_string();

        let membership = ChannelMembership {
            channel_id: channel_id.to_string(),
            start_time,
            end_time,
        };
        match user
            .channels
            .iter_mut()
            .find(|m| m.channel_id == membership.channel_id)
        {
            Some(existing) => *existing = existing.combine(&membership),
            None => user.channels.push(membership),
        }
        user.channels.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
    }

    /// Attach team and channel descriptive fields, replacing stale values.
    pub fn add_channel_metadata(&mut self, metadata: &ChannelMetadata) {
        let channel = IndexChannel {
            id: metadata.channel_id.clone(),
            name: metadata.channel_name.clone(),
            display_name: metadata.channel_display_name.clone(),
            channel_type: metadata.channel_type.clone(),
        };

        let team = match self.teams.iter_mut().position(|t| t.id == metadata.team_id) {
            Some(pos) => &mut self.teams[pos],
            None => {
                self.teams.push(IndexTeam {
                    id: metadata.team_id.clone(),
                    ..Default::default()
                });
                let last = self.teams.len() - 1;
                &mut self.teams[last]
            }
        };
        team.name = metadata.team_name.clone();
        team.display_name = metadata.team_display_name.clone();

        match team.channels.iter_mut().find(|c| c.id == channel.id) {
            Some(existing) => *existing = channel,
            None => team.channels.push(channel),
        }
    }

    /// Total number of `(user, channel)` memberships recorded.
    pub fn membership_count(&self) -> usize {
        self.users.values().map(|u| u.channels.len()).sum()
    }
}

/// Combine a previously persisted index with a freshly computed one.
///
/// The result covers every `(user, channel)` interval either side covers.
/// Descriptive fields come from `new`; team order follows `old` with
/// `new`-only teams appended.
pub fn merge(old: &Index, new: &Index) -> Index {
    Index {
        legal_hold: merge_details(&old.legal_hold, &new.legal_hold),
        users: merge_users(&old.users, &new.users),
        teams: merge_teams(&old.teams, &new.teams),
    }
}

fn merge_details(old: &IndexDetails, new: &IndexDetails) -> IndexDetails {
    IndexDetails {
        id: new.id.clone(),
        name: new.name.clone(),
        display_name: new.display_name.clone(),
        starts_at: if new.starts_at != 0 {
            new.starts_at
        } else {
            old.starts_at
        },
        last_execution_ended_at: old
            .last_execution_ended_at
            .max(new.last_execution_ended_at),
    }
}

fn merge_users(
    old: &BTreeMap<String, IndexUser>,
    new: &BTreeMap<String, IndexUser>,
) -> BTreeMap<String, IndexUser> {
    let mut merged = old.clone();

    for (user_id, new_user) in new {
        match merged.get_mut(user_id) {
            None => {
                merged.insert(user_id.clone(), new_user.clone());
            }
            Some(existing) => {
                existing.username = new_user.username.clone();
                existing.email = new_user.email.clone();
                existing.channels = merge_memberships(&existing.channels, &new_user.channels);
            }
        }
    }

    merged
}

fn merge_memberships(
    old: &[ChannelMembership],
    new: &[ChannelMembership],
) -> Vec<ChannelMembership> {
    let mut by_channel: BTreeMap<&str, ChannelMembership> = BTreeMap::new();

    for membership in old.iter().chain(new.iter()) {
        by_channel
            .entry(membership.channel_id.as_str())
            .and_modify(|existing| *existing = existing.combine(membership))
            .or_insert_with(|| membership.clone());
    }

    by_channel.into_values().collect()
}

fn merge_teams(old: &[IndexTeam], new: &[IndexTeam]) -> Vec<IndexTeam> {
    let mut merged = old.to_vec();

    for new_team in new {
        match merged.iter_mut().find(|t| t.id == new_team.id) {
            None => merged.push(new_team.clone()),
            Some(existing) => {
                existing.name = new_team.name.clone();
                existing.display_name = new_team.display_name.clone();
                for channel in &new_team.channels {
                    match existing.channels.iter_mut().find(|c| c.id == channel.id) {
                        Some(old_channel) => *old_channel = channel.clone(),
                        None => existing.channels.push(channel.clone()),
                    }
                }
            }
        }
    }

    merged
}
