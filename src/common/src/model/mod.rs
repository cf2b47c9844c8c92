pub mod cursor;
pub mod hold;
pub mod index;
pub mod record;

pub use cursor::{Cursor, ZERO_POST_ID};
pub use hold::{BUNDLE_ROOT, Hold, HoldState, HoldValidationError, now_millis};
pub use index::{
    ChannelMembership, Index, IndexChannel, IndexDetails, IndexTeam, IndexUser, merge,
};
pub use record::{
    CHANNEL_TYPE_OPEN, ChannelMetadata, DIRECT_MESSAGES_TEAM_DISPLAY_NAME,
    DIRECT_MESSAGES_TEAM_ID, DIRECT_MESSAGES_TEAM_NAME, FileInfo, MessageRecord, UserInfo,
};
