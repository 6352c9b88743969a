use std::{str::FromStr, time::Duration};

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use time::OffsetDateTime;

use crate::error::AppError;

/// The process-wide storage handle. Opened once at startup, cloned into every
/// repository and ledger, closed on shutdown.
#[derive(Clone, Debug)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)
            .context("parse DATABASE_URL")?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives only as long as its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("connect to database")?;
        tracing::debug!(in_memory, "database pool opened");
        Ok(Self { pool })
    }

    /// Fresh migrated in-memory database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let db = Self::connect("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("database pool closed");
    }

    async fn exists(&self, sql: &str, id: i64) -> Result<bool, AppError> {
        let found: bool = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    pub(crate) async fn require_class(&self, id: i64) -> Result<(), AppError> {
        if self
            .exists("SELECT EXISTS(SELECT 1 FROM classes WHERE id = ?)", id)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::not_found("class"))
        }
    }

    /// The user must exist and hold the student role.
    pub(crate) async fn require_student(&self, id: i64) -> Result<(), AppError> {
        if self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ? AND role = 'student')",
                id,
            )
            .await?
        {
            Ok(())
        } else {
            Err(AppError::not_found("student"))
        }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

/// Current UTC time at whole-second precision, so stored timestamps share one
/// fixed-width text form and sort lexically.
pub(crate) fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - time::Duration::nanoseconds(i64::from(now.nanosecond()))
}

/// Migrated database in a scratch file, so several pooled connections can
/// write at once. The file is removed on drop.
#[cfg(test)]
pub(crate) struct ScratchDb {
    pub db: Db,
    path: std::path::PathBuf,
}

#[cfg(test)]
impl ScratchDb {
    pub async fn open(max_connections: u32) -> Self {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static NEXT: AtomicUsize = AtomicUsize::new(0);

        let path = std::env::temp_dir().join(format!(
            "academy-test-{}-{}-{}.db",
            std::process::id(),
            OffsetDateTime::now_utc().unix_timestamp_nanos(),
            NEXT.fetch_add(1, Ordering::Relaxed),
        ));
        let db = Db::connect(&format!("sqlite://{}", path.display()), max_connections)
            .await
            .expect("open scratch db");
        db.migrate().await.expect("migrate scratch db");
        Self { db, path }
    }
}

#[cfg(test)]
impl Drop for ScratchDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}
