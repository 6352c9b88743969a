use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    db,
    db::Db,
    error::{AppError, AppResult},
    types::{text_enum, Role},
};

text_enum! {
    /// Who an announcement is addressed to.
    pub enum Audience ("audience") {
        Student => "student",
        Teacher => "teacher",
        Admin => "admin",
        All => "all",
    }
}

impl From<Role> for Audience {
    fn from(role: Role) -> Self {
        match role {
            Role::Student => Audience::Student,
            Role::Teacher => Audience::Teacher,
            Role::Admin => Audience::Admin,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Announcement {
    pub id: i64,
    pub author_id: Option<i64>,
    pub title: String,
    pub body: String,
    #[sqlx(try_from = "String")]
    pub audience: Audience,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAnnouncement {
    pub title: String,
    pub body: String,
    #[serde(default = "default_audience")]
    pub audience: Audience,
}

fn default_audience() -> Audience {
    Audience::All
}

const ANNOUNCEMENT_COLUMNS: &str = "id, author_id, title, body, audience, created_at";

#[derive(Clone)]
pub struct AnnouncementRepo {
    pool: SqlitePool,
}

impl AnnouncementRepo {
    pub fn new(db: &Db) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub async fn create(&self, author_id: i64, new: NewAnnouncement) -> AppResult<Announcement> {
        let title = new.title.trim();
        let body = new.body.trim();
        if title.is_empty() || body.is_empty() {
            return Err(AppError::validation("title and body are required"));
        }

        let announcement = sqlx::query_as::<_, Announcement>(&format!(
            r#"
            INSERT INTO announcements (author_id, title, body, audience, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {ANNOUNCEMENT_COLUMNS}
            "#
        ))
        .bind(author_id)
        .bind(title)
        .bind(body)
        .bind(new.audience.as_str())
        .bind(db::now_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if db::is_foreign_key_violation(&e) {
                AppError::not_found("author")
            } else {
                AppError::Storage(e)
            }
        })?;

        info!(
            announcement_id = announcement.id,
            audience = %announcement.audience,
            "announcement posted"
        );
        Ok(announcement)
    }

    /// Announcements tagged `all` or the caller's own role, newest first.
    pub async fn list_visible_to(&self, role: Role) -> AppResult<Vec<Announcement>> {
        let rows = sqlx::query_as::<_, Announcement>(&format!(
            r#"
            SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements
            WHERE audience = 'all' OR audience = ?
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(Audience::from(role).as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM announcements WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo::{new_user, test_repo};

    fn post(title: &str, audience: Audience) -> NewAnnouncement {
        NewAnnouncement {
            title: title.into(),
            body: format!("{title} body"),
            audience,
        }
    }

    #[tokio::test]
    async fn visibility_follows_audience_tag() {
        let (db, users) = test_repo().await;
        let repo = AnnouncementRepo::new(&db);
        let teacher = users.create(new_user("tina", Role::Teacher), "pw").await.unwrap();

        let everyone = repo.create(teacher.id, post("Holiday", Audience::All)).await.unwrap();
        let students = repo.create(teacher.id, post("Exam", Audience::Student)).await.unwrap();
        let staff = repo.create(teacher.id, post("Meeting", Audience::Teacher)).await.unwrap();

        let ids = |list: Vec<Announcement>| list.into_iter().map(|a| a.id).collect::<Vec<_>>();
        assert_eq!(
            ids(repo.list_visible_to(Role::Student).await.unwrap()),
            vec![students.id, everyone.id]
        );
        assert_eq!(
            ids(repo.list_visible_to(Role::Teacher).await.unwrap()),
            vec![staff.id, everyone.id]
        );
        assert_eq!(ids(repo.list_visible_to(Role::Admin).await.unwrap()), vec![everyone.id]);
    }

    #[tokio::test]
    async fn create_validates_and_delete_reports_presence() {
        let (db, users) = test_repo().await;
        let repo = AnnouncementRepo::new(&db);
        let admin = users.create(new_user("root", Role::Admin), "pw").await.unwrap();

        let err = repo.create(admin.id, post("  ", Audience::All)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let a = repo.create(admin.id, post("Notice", Audience::All)).await.unwrap();
        assert_eq!(a.author_id, Some(admin.id));
        assert!(repo.delete(a.id).await.unwrap());
        assert!(!repo.delete(a.id).await.unwrap());
    }

    #[tokio::test]
    async fn author_removal_keeps_announcement() {
        let (db, users) = test_repo().await;
        let repo = AnnouncementRepo::new(&db);
        let teacher = users.create(new_user("tom", Role::Teacher), "pw").await.unwrap();
        repo.create(teacher.id, post("Kept", Audience::All)).await.unwrap();

        users.delete(teacher.id).await.unwrap();
        let list = repo.list_visible_to(Role::Student).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].author_id, None);
    }

    #[test]
    fn audience_parses_closed_set() {
        assert_eq!("all".parse::<Audience>().unwrap(), Audience::All);
        assert!("everyone".parse::<Audience>().is_err());
        assert_eq!(Audience::from(Role::Teacher), Audience::Teacher);
    }
}
