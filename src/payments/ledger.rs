use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use tracing::info;

use crate::{
    db::{self, Db},
    error::{AppError, AppResult},
    types::text_enum,
};

text_enum! {
    /// Closed status set. Transitions between statuses are not validated.
    pub enum PaymentStatus ("payment status") {
        Pending => "pending",
        Paid => "paid",
        Failed => "failed",
        Refunded => "refunded",
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentRecord {
    pub id: i64,
    pub student_id: i64,
    pub amount_cents: i64,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub student_id: i64,
    pub amount_cents: i64,
    pub currency: Option<String>,
    pub status: Option<PaymentStatus>,
    pub note: Option<String>,
}

pub const DEFAULT_CURRENCY: &str = "USD";

fn normalize_currency(raw: Option<&str>) -> AppResult<String> {
    let code = raw.map(str::trim).filter(|c| !c.is_empty());
    match code {
        None => Ok(DEFAULT_CURRENCY.to_string()),
        Some(c) if c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()) => {
            Ok(c.to_ascii_uppercase())
        }
        Some(_) => Err(AppError::validation("currency must be a 3-letter code")),
    }
}

const PAYMENT_COLUMNS: &str = "id, student_id, amount_cents, currency, status, note, created_at";

#[derive(Clone)]
pub struct PaymentLedger {
    db: Db,
}

impl PaymentLedger {
    pub fn new(db: &Db) -> Self {
        Self { db: db.clone() }
    }

    pub async fn create(&self, new: NewPayment) -> AppResult<PaymentRecord> {
        if new.amount_cents < 0 {
            return Err(AppError::validation("amount_cents must be a non-negative integer"));
        }
        let currency = normalize_currency(new.currency.as_deref())?;
        let status = new.status.unwrap_or(PaymentStatus::Pending);
        let note = new
            .note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.db.require_student(new.student_id).await?;

        let record = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            INSERT INTO payments (student_id, amount_cents, currency, status, note, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(new.student_id)
        .bind(new.amount_cents)
        .bind(&currency)
        .bind(status.as_str())
        .bind(note)
        .bind(db::now_utc())
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| {
            if db::is_foreign_key_violation(&e) {
                AppError::not_found("student")
            } else {
                AppError::Storage(e)
            }
        })?;

        info!(
            payment_id = record.id,
            student_id = record.student_id,
            amount_cents = record.amount_cents,
            currency = %record.currency,
            status = %record.status,
            "payment recorded"
        );
        Ok(record)
    }

    /// Newest first.
    pub async fn list_for_student(&self, student_id: i64) -> AppResult<Vec<PaymentRecord>> {
        let rows = sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE student_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(student_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    /// Newest first, all students.
    pub async fn list_all(&self) -> AppResult<Vec<PaymentRecord>> {
        let rows = sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    pub async fn update_status(
        &self,
        id: i64,
        status: PaymentStatus,
    ) -> AppResult<Option<PaymentRecord>> {
        let record = sqlx::query_as::<_, PaymentRecord>(&format!(
            "UPDATE payments SET status = ? WHERE id = ? RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;
        if let Some(r) = &record {
            info!(payment_id = r.id, status = %r.status, "payment status updated");
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::Role,
        users::repo::{new_user, test_repo},
    };

    fn payment(student_id: i64, amount_cents: i64) -> NewPayment {
        NewPayment {
            student_id,
            amount_cents,
            currency: None,
            status: None,
            note: None,
        }
    }

    #[test]
    fn currency_codes() {
        assert_eq!(normalize_currency(None).unwrap(), "USD");
        assert_eq!(normalize_currency(Some(" eur ")).unwrap(), "EUR");
        assert!(normalize_currency(Some("EURO")).is_err());
        assert!(normalize_currency(Some("U$D")).is_err());
    }

    #[tokio::test]
    async fn create_applies_defaults_and_validates_amount() {
        let (db, users) = test_repo().await;
        let ledger = PaymentLedger::new(&db);
        let student = users.create(new_user("pat", Role::Student), "pw").await.unwrap();

        let record = ledger.create(payment(student.id, 12_500)).await.unwrap();
        assert_eq!(record.amount_cents, 12_500);
        assert_eq!(record.currency, "USD");
        assert_eq!(record.status, PaymentStatus::Pending);

        let free = ledger.create(payment(student.id, 0)).await.unwrap();
        assert_eq!(free.amount_cents, 0);

        let err = ledger.create(payment(student.id, -1)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = ledger.create(payment(999, 100)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn lists_newest_first_and_allows_repeats() {
        let (db, users) = test_repo().await;
        let ledger = PaymentLedger::new(&db);
        let a = users.create(new_user("amy", Role::Student), "pw").await.unwrap();
        let b = users.create(new_user("ben", Role::Student), "pw").await.unwrap();

        let first = ledger.create(payment(a.id, 100)).await.unwrap();
        let second = ledger.create(payment(a.id, 100)).await.unwrap();
        let other = ledger.create(payment(b.id, 300)).await.unwrap();

        let mine: Vec<i64> = ledger
            .list_for_student(a.id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(mine, vec![second.id, first.id]);

        let all: Vec<i64> = ledger.list_all().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(all, vec![other.id, second.id, first.id]);
    }

    #[tokio::test]
    async fn status_updates_are_unconstrained_and_cascade_on_user_delete() {
        let (db, users) = test_repo().await;
        let ledger = PaymentLedger::new(&db);
        let s = users.create(new_user("cy", Role::Student), "pw").await.unwrap();
        let p = ledger.create(payment(s.id, 5_000)).await.unwrap();

        let refunded = ledger.update_status(p.id, PaymentStatus::Refunded).await.unwrap().unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        let paid = ledger.update_status(p.id, PaymentStatus::Paid).await.unwrap().unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);
        assert!(ledger.update_status(999, PaymentStatus::Paid).await.unwrap().is_none());

        users.delete(s.id).await.unwrap();
        assert!(ledger.list_all().await.unwrap().is_empty());
    }
}
