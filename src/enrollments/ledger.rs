use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    db::{self, Db},
    error::{AppError, AppResult},
};

/// Result of an enroll call. `created == false` means the pair was already enrolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrollOutcome {
    pub class_id: i64,
    pub student_id: i64,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClassSummary {
    pub title: String,
    pub teacher_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ends_at: Option<OffsetDateTime>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EnrollmentWithClass {
    pub id: i64,
    pub class_id: i64,
    pub student_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub enrolled_at: OffsetDateTime,
    #[sqlx(flatten)]
    pub class: ClassSummary,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RosterEntry {
    pub student_id: i64,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub enrolled_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct EnrollmentLedger {
    db: Db,
}

impl EnrollmentLedger {
    pub fn new(db: &Db) -> Self {
        Self { db: db.clone() }
    }

    /// At most one row per (class, student). The UNIQUE constraint plus
    /// `ON CONFLICT DO NOTHING` makes concurrent repeats collapse into one row.
    pub async fn enroll(&self, class_id: i64, student_id: i64) -> AppResult<EnrollOutcome> {
        self.db.require_class(class_id).await?;
        self.db.require_student(student_id).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO enrollments (class_id, student_id, enrolled_at)
            VALUES (?, ?, ?)
            ON CONFLICT (class_id, student_id) DO NOTHING
            "#,
        )
        .bind(class_id)
        .bind(student_id)
        .bind(db::now_utc())
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            // Class or student removed between the checks and the insert.
            if db::is_foreign_key_violation(&e) {
                AppError::not_found("class or student")
            } else {
                AppError::Storage(e)
            }
        })?;

        let created = result.rows_affected() == 1;
        if created {
            info!(class_id, student_id, "student enrolled");
        } else {
            debug!(class_id, student_id, "already enrolled");
        }
        Ok(EnrollOutcome {
            class_id,
            student_id,
            created,
        })
    }

    pub async fn unenroll(&self, class_id: i64, student_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM enrollments WHERE class_id = ? AND student_id = ?")
            .bind(class_id)
            .bind(student_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Soonest class first.
    pub async fn list_for_student(&self, student_id: i64) -> AppResult<Vec<EnrollmentWithClass>> {
        let rows = sqlx::query_as::<_, EnrollmentWithClass>(
            r#"
            SELECT e.id, e.class_id, e.student_id, e.enrolled_at,
                   c.title, c.teacher_id, c.starts_at, c.ends_at, c.location
              FROM enrollments e
              JOIN classes c ON c.id = e.class_id
             WHERE e.student_id = ?
             ORDER BY c.starts_at ASC, c.id ASC
            "#,
        )
        .bind(student_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    pub async fn list_for_class(&self, class_id: i64) -> AppResult<Vec<RosterEntry>> {
        self.db.require_class(class_id).await?;
        let rows = sqlx::query_as::<_, RosterEntry>(
            r#"
            SELECT u.id AS student_id, u.username, u.name, u.email, e.enrolled_at
              FROM enrollments e
              JOIN users u ON u.id = e.student_id
             WHERE e.class_id = ?
             ORDER BY e.enrolled_at ASC, e.id ASC
            "#,
        )
        .bind(class_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }
}
