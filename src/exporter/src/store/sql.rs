use async_trait::async_trait;
use common::model::{
    CHANNEL_TYPE_OPEN, ChannelMetadata, Cursor, DIRECT_MESSAGES_TEAM_DISPLAY_NAME,
    DIRECT_MESSAGES_TEAM_ID, DIRECT_MESSAGES_TEAM_NAME, FileInfo, MessageRecord, UserInfo,
};
use common::registry::sql::connect_sqlite;
use sqlx::{PgPool, SqlitePool, query, query_as, query_scalar};

use super::{RecordStore, StoreError, StoreResult};

/// Record store reading a Mattermost-shaped schema on SQLite or PostgreSQL.
#[derive(Clone)]
pub enum SqlRecordStore {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS Teams (
        Id TEXT PRIMARY KEY,
        Name TEXT NOT NULL,
        DisplayName TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS Channels (
        Id TEXT PRIMARY KEY,
        TeamId TEXT,
        Name TEXT NOT NULL,
        DisplayName TEXT NOT NULL,
        Type TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS Users (
        Id TEXT PRIMARY KEY,
        Username TEXT NOT NULL,
        Email TEXT NOT NULL,
        Nickname TEXT NOT NULL DEFAULT ''
    )"#,
    r#"CREATE TABLE IF NOT EXISTS Bots (
        UserId TEXT PRIMARY KEY
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ChannelMemberHistory (
        ChannelId TEXT NOT NULL,
        UserId TEXT NOT NULL,
        JoinTime BIGINT NOT NULL,
        LeaveTime BIGINT,
        PRIMARY KEY (ChannelId, UserId, JoinTime)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS Posts (
        Id TEXT PRIMARY KEY,
        ChannelId TEXT NOT NULL,
        UserId TEXT NOT NULL,
        CreateAt BIGINT NOT NULL,
        UpdateAt BIGINT NOT NULL,
        DeleteAt BIGINT NOT NULL DEFAULT 0,
        RootId TEXT NOT NULL DEFAULT '',
        OriginalId TEXT NOT NULL DEFAULT '',
        Message TEXT NOT NULL DEFAULT '',
        Type TEXT NOT NULL DEFAULT '',
        Props TEXT NOT NULL DEFAULT '{}',
        Hashtags TEXT NOT NULL DEFAULT '',
        FileIds TEXT NOT NULL DEFAULT '[]'
    )"#,
    r#"CREATE TABLE IF NOT EXISTS FileInfo (
        Id TEXT PRIMARY KEY,
        Path TEXT NOT NULL,
        Name TEXT NOT NULL,
        Size BIGINT NOT NULL,
        MimeType TEXT NOT NULL DEFAULT ''
    )"#,
    r#"CREATE TABLE IF NOT EXISTS GroupMembers (
        GroupId TEXT NOT NULL,
        UserId TEXT NOT NULL,
        DeleteAt BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (GroupId, UserId)
    )"#,
];

const POSTS_BATCH: &str = r#"
    SELECT
        COALESCE(t.Name, '') AS team_name,
        COALESCE(t.DisplayName, '') AS team_display_name,
        c.Name AS channel_name,
        c.DisplayName AS channel_display_name,
        c.Type AS channel_type,
        COALESCE(u.Username, '') AS user_username,
        COALESCE(u.Email, '') AS user_email,
        COALESCE(u.Nickname, '') AS user_nickname,
        p.Id AS post_id,
        p.CreateAt AS post_create_at,
        p.UpdateAt AS post_update_at,
        p.DeleteAt AS post_delete_at,
        p.RootId AS post_root_id,
        p.OriginalId AS post_original_id,
        p.Message AS post_message,
        p.Type AS post_type,
        p.Props AS post_props,
        p.Hashtags AS post_hashtags,
        p.FileIds AS post_file_ids,
        CASE WHEN b.UserId IS NULL THEN FALSE ELSE TRUE END AS is_bot
    FROM Posts p
    JOIN Channels c ON c.Id = p.ChannelId
    LEFT JOIN Teams t ON t.Id = c.TeamId
    LEFT JOIN Users u ON u.Id = p.UserId
    LEFT JOIN Bots b ON b.UserId = p.UserId
    WHERE p.ChannelId = ?
      AND (p.CreateAt > ? OR (p.CreateAt = ? AND p.Id > ?))
      AND p.CreateAt < ?
    ORDER BY p.CreateAt, p.Id
    LIMIT ?
"#;

#[derive(sqlx::FromRow)]
struct ChannelRow {
    team_id: Option<String>,
    team_name: Option<String>,
    team_display_name: Option<String>,
    channel_id: String,
    channel_name: String,
    channel_display_name: String,
    channel_type: String,
}

impl From<ChannelRow> for ChannelMetadata {
    fn from(row: ChannelRow) -> Self {
        match (row.team_id, row.team_name, row.team_display_name) {
            (Some(team_id), Some(team_name), Some(team_display_name)) if !team_id.is_empty() => {
                ChannelMetadata {
                    team_id,
                    team_name,
                    team_display_name,
                    channel_id: row.channel_id,
                    channel_name: row.channel_name,
                    channel_display_name: row.channel_display_name,
                    channel_type: row.channel_type,
                }
            }
            _ => ChannelMetadata {
                team_id: DIRECT_MESSAGES_TEAM_ID.to_string(),
                team_name: DIRECT_MESSAGES_TEAM_NAME.to_string(),
                team_display_name: DIRECT_MESSAGES_TEAM_DISPLAY_NAME.to_string(),
                channel_id: row.channel_id,
                channel_name: row.channel_name,
                channel_display_name: row.channel_display_name,
                channel_type: row.channel_type,
            },
        }
    }
}

/// Rewrite `?` placeholders as `$1, $2, ...` for PostgreSQL.
fn numbered_placeholders(stmt: &str) -> String {
    let mut out = String::with_capacity(stmt.len() + 8);
    let mut n = 0;
    for ch in stmt.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

fn in_list(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl SqlRecordStore {
    pub async fn new(dsn: &str) -> StoreResult<Self> {
        tracing::info!(dsn = %dsn, "Connecting to record store");

        let store = if dsn.starts_with("sqlite:") {
            SqlRecordStore::Sqlite(connect_sqlite(dsn).await?)
        } else {
            SqlRecordStore::Postgres(PgPool::connect(dsn).await?)
        };
        Ok(store)
    }

    /// Create the tables read by this store when they do not exist yet.
    pub async fn init_schema(&self) -> StoreResult<()> {
        for stmt in SCHEMA {
            match self {
                SqlRecordStore::Sqlite(pool) => {
                    query(stmt).execute(pool).await?;
                }
                SqlRecordStore::Postgres(pool) => {
                    query(stmt).execute(pool).await?;
                }
            }
        }
        Ok(())
    }

    fn sql(&self, stmt: &str) -> String {
        match self {
            SqlRecordStore::Sqlite(_) => stmt.to_string(),
            SqlRecordStore::Postgres(_) => numbered_placeholders(stmt),
        }
    }
}

#[async_trait]
impl RecordStore for SqlRecordStore {
    async fn channel_ids_for_user_during(
        &self,
        user_id: &str,
        start_time: i64,
        end_time: i64,
        exclude_public: bool,
    ) -> StoreResult<Vec<String>> {
        let mut stmt = String::from(
            "SELECT DISTINCT cmh.ChannelId FROM ChannelMemberHistory cmh \
             LEFT JOIN Channels c ON c.Id = cmh.ChannelId \
             WHERE cmh.UserId = ? AND cmh.JoinTime < ? \
             AND (cmh.LeaveTime IS NULL OR cmh.LeaveTime >= ?)",
        );
        if exclude_public {
            stmt.push_str(&format!(
                " AND (c.Type IS NULL OR c.Type <> '{CHANNEL_TYPE_OPEN}')"
            ));
        }
        stmt.push_str(" ORDER BY cmh.ChannelId");
        let stmt = self.sql(&stmt);

        let ids = match self {
            SqlRecordStore::Sqlite(pool) => {
                query_scalar(&stmt)
                    .bind(user_id)
                    .bind(end_time)
                    .bind(start_time)
                    .fetch_all(pool)
                    .await?
            }
            SqlRecordStore::Postgres(pool) => {
                query_scalar(&stmt)
                    .bind(user_id)
                    .bind(end_time)
                    .bind(start_time)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(ids)
    }

    async fn posts_batch(
        &self,
        channel_id: &str,
        cursor: &Cursor,
        end_time: i64,
        limit: usize,
    ) -> StoreResult<Vec<MessageRecord>> {
        let stmt = self.sql(POSTS_BATCH);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let records = match self {
            SqlRecordStore::Sqlite(pool) => {
                query_as(&stmt)
                    .bind(channel_id)
                    .bind(cursor.last_create_at)
                    .bind(cursor.last_create_at)
                    .bind(&cursor.last_id)
                    .bind(end_time)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
            SqlRecordStore::Postgres(pool) => {
                query_as(&stmt)
                    .bind(channel_id)
                    .bind(cursor.last_create_at)
                    .bind(cursor.last_create_at)
                    .bind(&cursor.last_id)
                    .bind(end_time)
                    .bind(limit)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(records)
    }

    async fn file_infos_by_ids(&self, file_ids: &[String]) -> StoreResult<Vec<FileInfo>> {
        if file_ids.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = self.sql(&format!(
            "SELECT Id AS id, Path AS path, Name AS name, Size AS size, MimeType AS mime_type \
             FROM FileInfo WHERE Id IN ({}) ORDER BY Id",
            in_list(file_ids.len())
        ));

        let files = match self {
            SqlRecordStore::Sqlite(pool) => {
                let mut q = query_as::<_, FileInfo>(&stmt);
                for id in file_ids {
                    q = q.bind(id);
                }
                q.fetch_all(pool).await?
            }
            SqlRecordStore::Postgres(pool) => {
                let mut q = query_as::<_, FileInfo>(&stmt);
                for id in file_ids {
                    q = q.bind(id);
                }
                q.fetch_all(pool).await?
            }
        };
        Ok(files)
    }

    async fn channel_metadata_for_ids(
        &self,
        channel_ids: &[String],
    ) -> StoreResult<Vec<ChannelMetadata>> {
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = self.sql(&format!(
            "SELECT t.Id AS team_id, t.Name AS team_name, t.DisplayName AS team_display_name, \
             c.Id AS channel_id, c.Name AS channel_name, c.DisplayName AS channel_display_name, \
             c.Type AS channel_type \
             FROM Channels c LEFT JOIN Teams t ON t.Id = c.TeamId \
             WHERE c.Id IN ({}) ORDER BY c.Id",
            in_list(channel_ids.len())
        ));

        let rows: Vec<ChannelRow> = match self {
            SqlRecordStore::Sqlite(pool) => {
                let mut q = query_as::<_, ChannelRow>(&stmt);
                for id in channel_ids {
                    q = q.bind(id);
                }
                q.fetch_all(pool).await?
            }
            SqlRecordStore::Postgres(pool) => {
                let mut q = query_as::<_, ChannelRow>(&stmt);
                for id in channel_ids {
                    q = q.bind(id);
                }
                q.fetch_all(pool).await?
            }
        };
        Ok(rows.into_iter().map(ChannelMetadata::from).collect())
    }

    async fn user(&self, user_id: &str) -> StoreResult<UserInfo> {
        let stmt = self.sql(
            "SELECT Id AS id, Username AS username, Email AS email \
             FROM Users WHERE Id = ?",
        );

        let user: Option<UserInfo> = match self {
            SqlRecordStore::Sqlite(pool) => {
                query_as(&stmt).bind(user_id).fetch_optional(pool).await?
            }
            SqlRecordStore::Postgres(pool) => {
                query_as(&stmt).bind(user_id).fetch_optional(pool).await?
            }
        };
        user.ok_or_else(|| StoreError::NotFound {
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
        let stmt = self.sql(
            "SELECT UserId FROM GroupMembers WHERE GroupId = ? AND DeleteAt = 0 \
             ORDER BY UserId LIMIT ? OFFSET ?",
        );
        let limit = i64::try_from(per_page).unwrap_or(i64::MAX);
        let offset = i64::try_from(page.saturating_mul(per_page)).unwrap_or(i64::MAX);

        let members = match self {
            SqlRecordStore::Sqlite(pool) => {
                query_scalar(&stmt)
                    .bind(group_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await?
            }
            SqlRecordStore::Postgres(pool) => {
                query_scalar(&stmt)
                    .bind(group_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_store() -> SqlRecordStore {
        let store = SqlRecordStore::new("sqlite::memory:").await.unwrap();
        store.init_schema().await.unwrap();

        let SqlRecordStore::Sqlite(pool) = &store else {
            unreachable!("sqlite DSN")
        };
        let seed = [
            "INSERT INTO Teams VALUES ('t1', 'team-one', 'Team One')",
            "INSERT INTO Channels VALUES ('c1', 't1', 'town-square', 'Town Square', 'O')",
            "INSERT INTO Channels VALUES ('c2', 't1', 'private', 'Private', 'P')",
            "INSERT INTO Channels VALUES ('dm', '', 'u1__u2', '', 'D')",
            "INSERT INTO Users VALUES ('u1', 'alice', 'alice@example.com', 'Al')",
            "INSERT INTO Users VALUES ('bot', 'helper', 'bot@example.com', '')",
            "INSERT INTO Bots VALUES ('bot')",
            "INSERT INTO ChannelMemberHistory VALUES ('c1', 'u1', 100, NULL)",
            "INSERT INTO ChannelMemberHistory VALUES ('c2', 'u1', 100, 1000)",
            "INSERT INTO ChannelMemberHistory VALUES ('dm', 'u1', 5000, NULL)",
            "INSERT INTO Posts (Id, ChannelId, UserId, CreateAt, UpdateAt, Message, FileIds) \
             VALUES ('p2', 'c1', 'u1', 1000, 1000, 'second', '[\"f1\"]')",
            "INSERT INTO Posts (Id, ChannelId, UserId, CreateAt, UpdateAt, Message) \
             VALUES ('p1', 'c1', 'u1', 1000, 1000, 'first')",
            "INSERT INTO Posts (Id, ChannelId, UserId, CreateAt, UpdateAt, Message) \
             VALUES ('p3', 'c1', 'bot', 1500, 1500, 'beep')",
            "INSERT INTO Posts (Id, ChannelId, UserId, CreateAt, UpdateAt, Message) \
             VALUES ('p4', 'c1', 'u1', 2000, 2000, 'too late')",
            "INSERT INTO FileInfo \
             VALUES ('f1', 'data/f1.bin', 'report.pdf', 42, 'application/pdf')",
            "INSERT INTO GroupMembers VALUES ('g1', 'u1', 0)",
            "INSERT INTO GroupMembers VALUES ('g1', 'u2', 0)",
            "INSERT INTO GroupMembers VALUES ('g1', 'u3', 12345)",
        ];
        for stmt in seed {
            query(stmt).execute(pool).await.unwrap();
        }
        store
    }

    #[test]
    fn test_numbered_placeholders() {
        assert_eq!(
            numbered_placeholders("a = ? AND b IN (?, ?)"),
            "a = $1 AND b IN ($2, $3)"
        );
    }

    #[tokio::test]
    async fn test_channel_ids_for_user_during() {
        let store = seeded_store().await;

        let ids = store
            .channel_ids_for_user_during("u1", 1000, 2000, false)
            .await
            .unwrap();
        assert_eq!(ids, vec!["c1", "c2"]);

        let ids = store
            .channel_ids_for_user_during("u1", 1000, 2000, true)
            .await
            .unwrap();
        assert_eq!(ids, vec!["c2"]);

        let ids = store
            .channel_ids_for_user_during("u1", 1001, 6000, false)
            .await
            .unwrap();
        assert_eq!(ids, vec!["c1", "dm"]);
    }

    #[tokio::test]
    async fn test_posts_batch_pages_by_create_at_and_id() {
        let store = seeded_store().await;

        let mut cursor = Cursor::new(1000);
        let batch = store.posts_batch("c1", &cursor, 2000, 2).await.unwrap();
        let ids: Vec<&str> = batch.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(batch[0].team_name, "team-one");
        assert_eq!(batch[0].user_username, "alice");
        assert_eq!(batch[1].file_ids().unwrap(), vec!["f1"]);
        assert!(!batch[0].is_bot);

        let last = batch.last().unwrap();
        cursor.advance(Some((last.post_create_at, &last.post_id)), batch.len(), 2);
        let batch = store.posts_batch("c1", &cursor, 2000, 2).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].post_id, "p3");
        assert!(batch[0].is_bot);
    }

    #[tokio::test]
    async fn test_file_infos_and_metadata() {
        let store = seeded_store().await;

        let files = store
            .file_infos_by_ids(&["f1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "data/f1.bin");
        assert_eq!(files[0].size, 42);

        let meta = store
            .channel_metadata_for_ids(&["c1".to_string(), "dm".to_string()])
            .await
            .unwrap();
        assert_eq!(meta[0].team_name, "team-one");
        assert_eq!(meta[1].team_id, DIRECT_MESSAGES_TEAM_ID);
        assert_eq!(meta[1].team_display_name, "Direct Messages");
    }

    #[tokio::test]
    async fn test_user_and_group_members() {
        let store = seeded_store().await;

        assert_eq!(store.user("u1").await.unwrap().email, "alice@example.com");
        assert!(matches!(
            store.user("nobody").await,
            Err(StoreError::NotFound { .. })
        ));

        assert_eq!(store.group_members("g1", 0, 1).await.unwrap(), vec!["u1"]);
        assert_eq!(store.group_members("g1", 1, 1).await.unwrap(), vec!["u2"]);
        assert!(store.group_members("g1", 2, 1).await.unwrap().is_empty());
    }
}
