use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use tracing::info;

use crate::{
    db::{self, Db},
    error::{AppError, AppResult},
    types::{iso_date, text_enum},
};

text_enum! {
    pub enum AttendanceStatus ("attendance status") {
        Present => "present",
        Absent => "absent",
        Late => "late",
        Excused => "excused",
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AttendanceRecord {
    pub id: i64,
    pub class_id: i64,
    pub student_id: i64,
    #[serde(with = "iso_date")]
    pub date: Date,
    #[sqlx(try_from = "String")]
    pub status: AttendanceStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

const RECORD_COLUMNS: &str = "id, class_id, student_id, date, status, created_at, updated_at";

#[derive(Clone)]
pub struct AttendanceLedger {
    db: Db,
}

impl AttendanceLedger {
    pub fn new(db: &Db) -> Self {
        Self { db: db.clone() }
    }

    /// Upsert keyed on (class, student, date). A repeat mark overwrites the
    /// status and keeps the existing id. `date` defaults to today (UTC).
    pub async fn mark(
        &self,
        class_id: i64,
        student_id: i64,
        date: Option<Date>,
        status: AttendanceStatus,
    ) -> AppResult<AttendanceRecord> {
        self.db.require_class(class_id).await?;
        self.db.require_student(student_id).await?;

        let now = db::now_utc();
        let date = date.unwrap_or_else(|| now.date());
        let record = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            INSERT INTO attendance (class_id, student_id, date, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (class_id, student_id, date)
            DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(class_id)
        .bind(student_id)
        .bind(date)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| {
            if db::is_foreign_key_violation(&e) {
                AppError::not_found("class or student")
            } else {
                AppError::Storage(e)
            }
        })?;

        info!(
            record_id = record.id,
            class_id,
            student_id,
            %date,
            status = %record.status,
            "attendance marked"
        );
        Ok(record)
    }

    /// Most recent date first, then most recently created.
    pub async fn list_for_student(&self, student_id: i64) -> AppResult<Vec<AttendanceRecord>> {
        let rows = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
              FROM attendance
             WHERE student_id = ?
             ORDER BY date DESC, created_at DESC, id DESC
            "#
        ))
        .bind(student_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    pub async fn list_for_class(
        &self,
        class_id: i64,
        date: Option<Date>,
    ) -> AppResult<Vec<AttendanceRecord>> {
        self.db.require_class(class_id).await?;
        let rows = sqlx::query_as::<_, AttendanceRecord>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
              FROM attendance
             WHERE class_id = ? AND (? IS NULL OR date = ?)
             ORDER BY date DESC, student_id ASC
            "#
        ))
        .bind(class_id)
        .bind(date)
        .bind(date)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{password::fast_config, CredentialStore},
        classes::{repo::new_class, ClassRepo},
        db::ScratchDb,
        types::Role,
        users::{
            repo::{new_user, test_repo},
            UserRepo,
        },
    };
    use time::macros::{date, datetime};

    struct Fixture {
        db: Db,
        ledger: AttendanceLedger,
        class_id: i64,
        student_id: i64,
    }

    async fn fixture() -> Fixture {
        let (db, users) = test_repo().await;
        let class = ClassRepo::new(&db)
            .create(new_class("Biology", datetime!(2026-09-01 09:00 UTC)))
            .await
            .unwrap();
        let student = users.create(new_user("ana", Role::Student), "pw").await.unwrap();
        Fixture {
            ledger: AttendanceLedger::new(&db),
            db,
            class_id: class.id,
            student_id: student.id,
        }
    }

    #[tokio::test]
    async fn second_mark_overwrites_in_place() {
        let f = fixture().await;
        let d = date!(2026 - 09 - 07);
        let first = f
            .ledger
            .mark(f.class_id, f.student_id, Some(d), AttendanceStatus::Present)
            .await
            .unwrap();
        let second = f
            .ledger
            .mark(f.class_id, f.student_id, Some(d), AttendanceStatus::Late)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, AttendanceStatus::Late);
        assert_eq!(second.created_at, first.created_at);

        let rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attendance WHERE class_id = ? AND student_id = ? AND date = ?",
        )
        .bind(f.class_id)
        .bind(f.student_id)
        .bind(d)
        .fetch_one(f.db.pool())
        .await
        .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn date_defaults_to_today() {
        let f = fixture().await;
        let record = f
            .ledger
            .mark(f.class_id, f.student_id, None, AttendanceStatus::Excused)
            .await
            .unwrap();
        assert_eq!(record.date, OffsetDateTime::now_utc().date());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_marks_on_separate_connections_keep_one_row() {
        let scratch = ScratchDb::open(4).await;
        let db = &scratch.db;
        let users = UserRepo::new(db, CredentialStore::new(&fast_config()).unwrap());
        let ledger = AttendanceLedger::new(db);
        let student = users.create(new_user("rae", Role::Student), "pw").await.unwrap();
        let class = ClassRepo::new(db)
            .create(new_class("Physics", datetime!(2026-09-01 09:00 UTC)))
            .await
            .unwrap();
        let d = Some(date!(2026 - 09 - 08));

        let racers: Vec<_> = AttendanceStatus::ALL
            .iter()
            .copied()
            .cycle()
            .take(8)
            .map(|status| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.mark(class.id, student.id, d, status).await })
            })
            .collect();
        let mut ids = Vec::new();
        for racer in racers {
            ids.push(racer.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(ledger.list_for_student(student.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn attendance_cascades_on_class_and_student_delete() {
        let (db, users) = test_repo().await;
        let classes = ClassRepo::new(&db);
        let ledger = AttendanceLedger::new(&db);
        let kept = classes
            .create(new_class("Kept", datetime!(2026-09-01 09:00 UTC)))
            .await
            .unwrap();
        let dropped = classes
            .create(new_class("Dropped", datetime!(2026-09-02 09:00 UTC)))
            .await
            .unwrap();
        let student = users.create(new_user("cas", Role::Student), "pw").await.unwrap();
        let d = Some(date!(2026 - 09 - 08));
        ledger.mark(kept.id, student.id, d, AttendanceStatus::Present).await.unwrap();
        ledger.mark(dropped.id, student.id, d, AttendanceStatus::Absent).await.unwrap();

        let rows = |db: Db| async move {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attendance")
                .fetch_one(db.pool())
                .await
                .unwrap()
        };
        assert_eq!(rows(db.clone()).await, 2);

        classes.delete(dropped.id).await.unwrap();
        assert_eq!(rows(db.clone()).await, 1);

        users.delete(student.id).await.unwrap();
        assert_eq!(rows(db.clone()).await, 0);
    }

    #[tokio::test]
    async fn lists_most_recent_date_first() {
        let f = fixture().await;
        for (d, s) in [
            (date!(2026 - 09 - 01), AttendanceStatus::Present),
            (date!(2026 - 09 - 15), AttendanceStatus::Absent),
            (date!(2026 - 09 - 08), AttendanceStatus::Late),
        ] {
            f.ledger.mark(f.class_id, f.student_id, Some(d), s).await.unwrap();
        }
        let dates: Vec<Date> = f
            .ledger
            .list_for_student(f.student_id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.date)
            .collect();
        assert_eq!(
            dates,
            vec![date!(2026 - 09 - 15), date!(2026 - 09 - 08), date!(2026 - 09 - 01)]
        );

        let one_day = f
            .ledger
            .list_for_class(f.class_id, Some(date!(2026 - 09 - 08)))
            .await
            .unwrap();
        assert_eq!(one_day.len(), 1);
        assert_eq!(one_day[0].status, AttendanceStatus::Late);
        assert_eq!(f.ledger.list_for_class(f.class_id, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejects_unknown_class_and_non_students() {
        let f = fixture().await;
        let err = f
            .ledger
            .mark(404, f.student_id, None, AttendanceStatus::Present)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = f
            .ledger
            .mark(f.class_id, 404, None, AttendanceStatus::Present)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn record_serializes_date_as_calendar_day() {
        let record = AttendanceRecord {
            id: 1,
            class_id: 2,
            student_id: 3,
            date: date!(2026 - 01 - 05),
            status: AttendanceStatus::Present,
            created_at: datetime!(2026-01-05 08:00 UTC),
            updated_at: datetime!(2026-01-05 08:00 UTC),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], "2026-01-05");
        assert_eq!(json["status"], "present");
    }
}
