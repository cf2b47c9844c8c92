use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, SqlitePool, query, query_as};

use super::{HoldRegistry, RegistryError, RegistryResult, prepare_new, prepare_update};
use crate::model::Hold;

/// Hold registry backed by SQLite or PostgreSQL.
#[derive(Clone)]
pub enum SqlHoldRegistry {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

#[derive(sqlx::FromRow)]
struct HoldRow {
    id: String,
    name: String,
    display_name: String,
    description: String,
    user_ids: String,
    group_ids: String,
    include_public_channels: bool,
    starts_at: i64,
    ends_at: i64,
    execution_length: i64,
    last_execution_ended_at: i64,
    has_messages: bool,
    secret: String,
    create_at: i64,
    update_at: i64,
}

impl HoldRow {
    fn into_hold(self) -> RegistryResult<Hold> {
        Ok(Hold {
            id: self.id,
            name: self.name,
            display_name: self.display_name,
            description: self.description,
            user_ids: serde_json::from_str(&self.user_ids)?,
            group_ids: serde_json::from_str(&self.group_ids)?,
            include_public_channels: self.include_public_channels,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            execution_length: self.execution_length,
            last_execution_ended_at: self.last_execution_ended_at,
            has_messages: self.has_messages,
            secret: self.secret,
            create_at: self.create_at,
            update_at: self.update_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, name, display_name, description, user_ids, group_ids, \
     include_public_channels, starts_at, ends_at, execution_length, \
     last_execution_ended_at, has_messages, secret, create_at, update_at";

impl SqlHoldRegistry {
    /// Connect to the registry database and create its table if missing.
    pub async fn new(dsn: &str) -> RegistryResult<Self> {
        tracing::info!(dsn = %dsn, "Connecting to hold registry");

        let registry = if dsn.starts_with("sqlite:") {
            let pool = connect_sqlite(dsn).await.inspect_err(|e| {
                tracing::error!(dsn = %dsn, error = %e, "Failed to connect to SQLite registry");
            })?;
            SqlHoldRegistry::Sqlite(pool)
        } else {
            let pool = PgPool::connect(dsn).await.inspect_err(|e| {
                tracing::error!(error = %e, "Failed to connect to PostgreSQL registry");
            })?;
            SqlHoldRegistry::Postgres(pool)
        };

        registry.init().await?;
        Ok(registry)
    }

    pub async fn init(&self) -> RegistryResult<()> {
        match self {
            SqlHoldRegistry::Sqlite(pool) => {
                query(
                    r#"
                CREATE TABLE IF NOT EXISTS legal_holds (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL UNIQUE,
                    display_name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    user_ids TEXT NOT NULL,
                    group_ids TEXT NOT NULL,
                    include_public_channels BOOLEAN NOT NULL DEFAULT 0,
                    starts_at BIGINT NOT NULL,
                    ends_at BIGINT NOT NULL,
                    execution_length BIGINT NOT NULL,
                    last_execution_ended_at BIGINT NOT NULL DEFAULT 0,
                    has_messages BOOLEAN NOT NULL DEFAULT 0,
                    secret TEXT NOT NULL,
                    create_at BIGINT NOT NULL,
                    update_at BIGINT NOT NULL
                )"#,
                )
                .execute(pool)
                .await?;
            }
            SqlHoldRegistry::Postgres(pool) => {
                query(
                    r#"
                CREATE TABLE IF NOT EXISTS legal_holds (
                    seq BIGSERIAL PRIMARY KEY,
                    id TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL UNIQUE,
                    display_name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    user_ids TEXT NOT NULL,
                    group_ids TEXT NOT NULL,
                    include_public_channels BOOLEAN NOT NULL DEFAULT FALSE,
                    starts_at BIGINT NOT NULL,
                    ends_at BIGINT NOT NULL,
                    execution_length BIGINT NOT NULL,
                    last_execution_ended_at BIGINT NOT NULL DEFAULT 0,
                    has_messages BOOLEAN NOT NULL DEFAULT FALSE,
                    secret TEXT NOT NULL,
                    create_at BIGINT NOT NULL,
                    update_at BIGINT NOT NULL
                )"#,
                )
                .execute(pool)
                .await?;
            }
        }
        Ok(())
    }
}

/// Open a SQLite pool. An in-memory database lives only as long as a
/// connection to it, so those pools keep exactly one connection forever.
pub async fn connect_sqlite(dsn: &str) -> Result<SqlitePool, sqlx::Error> {
    if dsn.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(dsn)
            .await
    } else {
        SqlitePool::connect(&sqlite_dsn_with_create(dsn)).await
    }
}

/// Append `mode=rwc` so a missing SQLite file is created on first connect.
pub fn sqlite_dsn_with_create(dsn: &str) -> String {
    if dsn.contains("mode=") || dsn.contains(":memory:") {
        dsn.to_string()
    } else if dsn.contains('?') {
        format!("{dsn}&mode=rwc")
    } else {
        format!("{dsn}?mode=rwc")
    }
}

#[async_trait]
impl HoldRegistry for SqlHoldRegistry {
    async fn list_holds(&self) -> RegistryResult<Vec<Hold>> {
        let stmt = format!("SELECT {SELECT_COLUMNS} FROM legal_holds ORDER BY seq");
        let rows: Vec<HoldRow> = match self {
            SqlHoldRegistry::Sqlite(pool) => query_as(&stmt).fetch_all(pool).await?,
            SqlHoldRegistry::Postgres(pool) => query_as(&stmt).fetch_all(pool).await?,
        };
        rows.into_iter().map(HoldRow::into_hold).collect()
    }

    async fn get_hold(&self, id: &str) -> RegistryResult<Option<Hold>> {
        let row: Option<HoldRow> = match self {
            SqlHoldRegistry::Sqlite(pool) => {
                let stmt = format!("SELECT {SELECT_COLUMNS} FROM legal_holds WHERE id = ?");
                query_as(&stmt).bind(id).fetch_optional(pool).await?
            }
            SqlHoldRegistry::Postgres(pool) => {
                let stmt = format!("SELECT {SELECT_COLUMNS} FROM legal_holds WHERE id = $1");
                query_as(&stmt).bind(id).fetch_optional(pool).await?
            }
        };
        row.map(HoldRow::into_hold).transpose()
    }

    async fn create_hold(&self, hold: Hold) -> RegistryResult<Hold> {
        let hold = prepare_new(hold)?;
        let user_ids = serde_json::to_string(&hold.user_ids)?;
        let group_ids = serde_json::to_string(&hold.group_ids)?;

        let result = match self {
            SqlHoldRegistry::Sqlite(pool) => {
                query(&format!(
                    "INSERT INTO legal_holds ({SELECT_COLUMNS}) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ))
                .bind(&hold.id)
                .bind(&hold.name)
                .bind(&hold.display_name)
                .bind(&hold.description)
                .bind(&user_ids)
                .bind(&group_ids)
                .bind(hold.include_public_channels)
                .bind(hold.starts_at)
                .bind(hold.ends_at)
                .bind(hold.execution_length)
                .bind(hold.last_execution_ended_at)
                .bind(hold.has_messages)
                .bind(&hold.secret)
                .bind(hold.create_at)
                .bind(hold.update_at)
                .execute(pool)
                .await
                .map(|_| ())
            }
            SqlHoldRegistry::Postgres(pool) => {
                query(&format!(
                    "INSERT INTO legal_holds ({SELECT_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
                ))
                .bind(&hold.id)
                .bind(&hold.name)
                .bind(&hold.display_name)
                .bind(&hold.description)
                .bind(&user_ids)
                .bind(&group_ids)
                .bind(hold.include_public_channels)
                .bind(hold.starts_at)
                .bind(hold.ends_at)
                .bind(hold.execution_length)
                .bind(hold.last_execution_ended_at)
                .bind(hold.has_messages)
                .bind(&hold.secret)
                .bind(hold.create_at)
                .bind(hold.update_at)
                .execute(pool)
                .await
                .map(|_| ())
            }
        };

        match result {
            Ok(_) => Ok(hold),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RegistryError::AlreadyExists(hold.name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_hold(&self, new: &Hold, old: &Hold) -> RegistryResult<Hold> {
        let stored = self
            .get_hold(&old.id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(old.id.clone()))?;
        if stored.update_at != old.update_at
            || stored.last_execution_ended_at != old.last_execution_ended_at
        {
            return Err(RegistryError::Conflict { id: old.id.clone() });
        }

        let next = prepare_update(new, &stored)?;
        let user_ids = serde_json::to_string(&next.user_ids)?;
        let group_ids = serde_json::to_string(&next.group_ids)?;

        // The WHERE clause repeats the check above so a writer that slipped in
        // between the read and this statement still makes it a no-op.
        let rows_affected = match self {
            SqlHoldRegistry::Sqlite(pool) => {
                query(
                    r#"
                UPDATE legal_holds SET
                    display_name = ?, description = ?, user_ids = ?, group_ids = ?,
                    include_public_channels = ?, starts_at = ?, ends_at = ?,
                    execution_length = ?, last_execution_ended_at = ?, has_messages = ?,
                    update_at = ?
                WHERE id = ? AND update_at = ? AND last_execution_ended_at = ?
                "#,
                )
                .bind(&next.display_name)
                .bind(&next.description)
                .bind(&user_ids)
                .bind(&group_ids)
                .bind(next.include_public_channels)
                .bind(next.starts_at)
                .bind(next.ends_at)
                .bind(next.execution_length)
                .bind(next.last_execution_ended_at)
                .bind(next.has_messages)
                .bind(next.update_at)
                .bind(&old.id)
                .bind(old.update_at)
                .bind(old.last_execution_ended_at)
                .execute(pool)
                .await?
                .rows_affected()
            }
            SqlHoldRegistry::Postgres(pool) => {
                query(
                    r#"
                UPDATE legal_holds SET
                    display_name = $1, description = $2, user_ids = $3, group_ids = $4,
                    include_public_channels = $5, starts_at = $6, ends_at = $7,
                    execution_length = $8, last_execution_ended_at = $9, has_messages = $10,
                    update_at = $11
                WHERE id = $12 AND update_at = $13 AND last_execution_ended_at = $14
                "#,
                )
                .bind(&next.display_name)
                .bind(&next.description)
                .bind(&user_ids)
                .bind(&group_ids)
                .bind(next.include_public_channels)
                .bind(next.starts_at)
                .bind(next.ends_at)
                .bind(next.execution_length)
                .bind(next.last_execution_ended_at)
                .bind(next.has_messages)
                .bind(next.update_at)
                .bind(&old.id)
                .bind(old.update_at)
                .bind(old.last_execution_ended_at)
                .execute(pool)
                .await?
                .rows_affected()
            }
        };

        if rows_affected == 0 {
            return Err(RegistryError::Conflict { id: old.id.clone() });
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{exercise_registry, sample_hold};

    async fn memory_registry() -> SqlHoldRegistry {
        SqlHoldRegistry::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_registry_contract() {
        let registry = memory_registry().await;
        exercise_registry(&registry).await;
    }

    #[tokio::test]
    async fn test_sqlite_registry_round_trips_all_fields() {
        let registry = memory_registry().await;
        let hold = Hold {
            description: "Litigation 42".to_string(),
            group_ids: vec!["group1".to_string()],
            include_public_channels: true,
            ends_at: 9000,
            ..sample_hold("full")
        };

        let created = registry.create_hold(hold).await.unwrap();
        let fetched = registry.get_hold(&created.id).await.unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.group_ids, vec!["group1"]);
        assert!(fetched.include_public_channels);
    }

    #[tokio::test]
    async fn test_sqlite_duplicate_name_rejected() {
        let registry = memory_registry().await;
        registry.create_hold(sample_hold("dup")).await.unwrap();

        let err = registry.create_hold(sample_hold("dup")).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[test]
    fn test_sqlite_dsn_with_create() {
        assert_eq!(
            sqlite_dsn_with_create("sqlite://holds.db"),
            "sqlite://holds.db?mode=rwc"
        );
        assert_eq!(
            sqlite_dsn_with_create("sqlite://holds.db?cache=shared"),
            "sqlite://holds.db?cache=shared&mode=rwc"
        );
        assert_eq!(sqlite_dsn_with_create("sqlite::memory:"), "sqlite::memory:");
    }
}
