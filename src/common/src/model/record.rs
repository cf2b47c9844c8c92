use serde::{Deserialize, Serialize};

/// Team ID used for channels that do not belong to a team (DMs and GMs).
pub const DIRECT_MESSAGES_TEAM_ID: &str = "00000000000000000000000000";
pub const DIRECT_MESSAGES_TEAM_NAME: &str = "direct-messages";
pub const DIRECT_MESSAGES_TEAM_DISPLAY_NAME: &str = "Direct Messages";

/// Channel type of publicly joinable channels.
pub const CHANNEL_TYPE_OPEN: &str = "O";

/// One post flattened with its team, channel and author, as written to a
/// message batch CSV.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct MessageRecord {
    pub team_name: String,
    pub team_display_name: String,

    pub channel_name: String,
    pub channel_display_name: String,
    pub channel_type: String,

    pub user_username: String,
    pub user_email: String,
    pub user_nickname: String,

    #[serde(rename = "PostId")]
    pub post_id: String,
    pub post_create_at: i64,
    pub post_update_at: i64,
    pub post_delete_at: i64,
    #[serde(rename = "PostRootId")]
    pub post_root_id: String,
    #[serde(rename = "PostOriginalId")]
    pub post_original_id: String,
    pub post_message: String,
    pub post_type: String,
    pub post_props: String,
    pub post_hashtags: String,
    /// JSON array of attachment IDs, as stored on the post.
    #[serde(rename = "PostFileIds")]
    pub post_file_ids: String,

    pub is_bot: bool,
}

impl MessageRecord {
    /// Attachment IDs referenced by this post.
    pub fn file_ids(&self) -> Result<Vec<String>, serde_json::Error> {
        let raw = self.post_file_ids.trim();
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(raw)
    }
}

/// Attachment metadata needed to copy a file into a bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileInfo {
    pub id: String,
    /// Location of the attachment in the object store.
    pub path: String,
    pub name: String,
    pub size: i64,
    pub mime_type: String,
}

/// Team and channel descriptive fields for the bundle index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChannelMetadata {
    pub team_id: String,
    pub team_name: String,
    pub team_display_name: String,
    pub channel_id: String,
    pub channel_name: String,
    pub channel_display_name: String,
    pub channel_type: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
}
