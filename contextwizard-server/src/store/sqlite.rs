//! SQLite-backed pending comment store.
//!
//! The `schema_version` table records which migrations have run. To change the
//! schema, bump `CURRENT_SCHEMA_VERSION` and add a step to `run_migrations`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::info;

use super::{CommentType, PendingComment, PendingCommentRepository, RepositoryError};

const CURRENT_SCHEMA_VERSION: i64 = 1;

const SELECT_COLUMNS: &str = "code, comment_id, comment_type, owner, repo, pr_number, installation_id, expires_at";

pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and bring its schema up to date.
    ///
    /// File-backed databases run in WAL mode with a 5s busy timeout.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!("SQLite returned '{}' instead of 'wal'", journal_mode),
            ));
        }

        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        info!("Pending comment store ready at {}", path_str);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS pending_comments (
                    code TEXT PRIMARY KEY,
                    comment_id INTEGER NOT NULL,
                    comment_type TEXT NOT NULL CHECK(comment_type IN ('inline', 'thread')),
                    owner TEXT NOT NULL,
                    repo TEXT NOT NULL,
                    pr_number INTEGER NOT NULL,
                    installation_id INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_pending_comments_expires_at
                    ON pending_comments(expires_at);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard: MutexGuard<'_, Connection> = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&guard)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

fn to_sql_id(value: u64, what: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::storage("create", format!("{} {} is out of range", what, value)))
}

fn from_sql_id(value: i64, what: &str) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::corruption(what))
}

type RawRow = (String, i64, String, String, String, i64, i64, i64);

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode(raw: RawRow) -> Result<PendingComment, RepositoryError> {
    let (code, comment_id, comment_type, owner, repo, pr_number, installation_id, expires_at) = raw;
    Ok(PendingComment {
        code,
        comment_id: from_sql_id(comment_id, "comment_id")?,
        comment_type: CommentType::parse(&comment_type)
            .ok_or_else(|| RepositoryError::corruption("comment_type"))?,
        owner,
        repo,
        pr_number: from_sql_id(pr_number, "pr_number")?,
        installation_id: from_sql_id(installation_id, "installation_id")?,
        expires_at,
    })
}

#[async_trait]
impl PendingCommentRepository for SqliteRepository {
    async fn create(&self, comment: PendingComment) -> Result<(), RepositoryError> {
        let comment_id = to_sql_id(comment.comment_id, "comment_id")?;
        let pr_number = to_sql_id(comment.pr_number, "pr_number")?;
        let installation_id = to_sql_id(comment.installation_id, "installation_id")?;

        self.with_conn("create", move |conn| {
            let result = conn.execute(
                "INSERT INTO pending_comments
                     (code, comment_id, comment_type, owner, repo, pr_number, installation_id, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    comment.code,
                    comment_id,
                    comment.comment_type.as_str(),
                    comment.owner,
                    comment.repo,
                    pr_number,
                    installation_id,
                    comment.expires_at
                ],
            );

            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(RepositoryError::Conflict(comment.code))
                }
                Err(e) => Err(RepositoryError::storage("create", e.to_string())),
            }
        })
        .await
    }

    async fn get(&self, code: &str) -> Result<Option<PendingComment>, RepositoryError> {
        let code = code.to_string();
        self.with_conn("get", move |conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {} FROM pending_comments WHERE code = ?1", SELECT_COLUMNS),
                    params![code],
                    read_raw,
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get", e.to_string()))?;
            raw.map(decode).transpose()
        })
        .await
    }

    async fn delete(&self, code: &str) -> Result<bool, RepositoryError> {
        let code = code.to_string();
        self.with_conn("delete", move |conn| {
            let removed = conn
                .execute("DELETE FROM pending_comments WHERE code = ?1", params![code])
                .map_err(|e| RepositoryError::storage("delete", e.to_string()))?;
            Ok(removed > 0)
        })
        .await
    }

    async fn list_expired(&self, now: i64) -> Result<Vec<PendingComment>, RepositoryError> {
        self.with_conn("list_expired", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM pending_comments
                     WHERE expires_at <= ?1
                     ORDER BY expires_at, code",
                    SELECT_COLUMNS
                ))
                .map_err(|e| RepositoryError::storage("list_expired", e.to_string()))?;

            let rows = stmt
                .query_map(params![now], read_raw)
                .map_err(|e| RepositoryError::storage("list_expired", e.to_string()))?;

            let mut expired = Vec::new();
            for row in rows {
                let raw = row.map_err(|e| RepositoryError::storage("list_expired", e.to_string()))?;
                expired.push(decode(raw)?);
            }
            Ok(expired)
        })
        .await
    }
}
