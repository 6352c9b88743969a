use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::{OffsetDateTime, UtcOffset};
use tracing::info;

use crate::{
    db::{self, Db},
    error::{AppError, AppResult},
};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Class {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub teacher_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ends_at: Option<OffsetDateTime>,
    pub location: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewClass {
    pub title: String,
    pub description: Option<String>,
    pub teacher_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ends_at: Option<OffsetDateTime>,
    pub location: Option<String>,
}

/// UTC at whole seconds so start times compare correctly as stored text.
/// The UTC year must fit the four-digit RFC 3339 form.
fn to_stored(field: &str, ts: OffsetDateTime) -> AppResult<OffsetDateTime> {
    let utc = ts
        .checked_to_offset(UtcOffset::UTC)
        .filter(|utc| (0..=9999).contains(&utc.year()))
        .ok_or_else(|| AppError::validation(format!("{field} out of range")))?;
    Ok(utc - time::Duration::nanoseconds(i64::from(utc.nanosecond())))
}

const CLASS_COLUMNS: &str =
    "id, title, description, teacher_id, starts_at, ends_at, location, created_at";

#[derive(Clone)]
pub struct ClassRepo {
    pool: SqlitePool,
}

impl ClassRepo {
    pub fn new(db: &Db) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub async fn create(&self, new: NewClass) -> AppResult<Class> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("title is required"));
        }
        let starts_at = to_stored("starts_at", new.starts_at)?;
        let ends_at = new
            .ends_at
            .map(|ts| to_stored("ends_at", ts))
            .transpose()?;
        if let Some(ends_at) = ends_at {
            if ends_at < starts_at {
                return Err(AppError::validation("ends_at is before starts_at"));
            }
        }

        let class = sqlx::query_as::<_, Class>(&format!(
            r#"
            INSERT INTO classes (title, description, teacher_id, starts_at, ends_at, location, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {CLASS_COLUMNS}
            "#
        ))
        .bind(title)
        .bind(new.description)
        .bind(new.teacher_id)
        .bind(starts_at)
        .bind(ends_at)
        .bind(new.location)
        .bind(db::now_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if db::is_foreign_key_violation(&e) {
                AppError::not_found("teacher")
            } else {
                AppError::Storage(e)
            }
        })?;

        info!(class_id = class.id, teacher_id = ?class.teacher_id, "class created");
        Ok(class)
    }

    pub async fn get(&self, id: i64) -> AppResult<Option<Class>> {
        let class = sqlx::query_as::<_, Class>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(class)
    }

    /// Soonest first.
    pub async fn list(&self) -> AppResult<Vec<Class>> {
        let classes = sqlx::query_as::<_, Class>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes ORDER BY starts_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(classes)
    }

    /// Enrollments and attendance for the class are removed by FK cascade.
    pub async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM classes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
pub(crate) fn new_class(title: &str, starts_at: OffsetDateTime) -> NewClass {
    NewClass {
        title: title.to_string(),
        description: None,
        teacher_id: None,
        starts_at,
        ends_at: None,
        location: None,
    }
}
