use lazy_static::lazy_static;
use regex::Regex;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::repo_types::{NewUser, User, UserPatch, UserWithHash};
use crate::{
    auth::password::CredentialStore,
    db::{self, Db},
    error::{AppError, AppResult},
    types::Role,
};

const USER_COLUMNS: &str =
    "id, username, email, name, role, created_at, last_login_at";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// How a login/lookup identifier is interpreted.
#[derive(Debug, PartialEq, Eq)]
enum Identifier {
    Email(String),
    Username(String),
}

impl Identifier {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_valid_email(trimmed) {
            Identifier::Email(trimmed.to_lowercase())
        } else {
            Identifier::Username(trimmed.to_string())
        }
    }
}

fn normalize_username(raw: &str) -> AppResult<String> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(AppError::validation("username is required"));
    }
    if username.chars().count() > 64 {
        return Err(AppError::validation("username is too long"));
    }
    // '@' is reserved for email identifiers.
    if username.contains('@') {
        return Err(AppError::validation("username must not contain '@'"));
    }
    Ok(username.to_string())
}

/// Trimmed, lowercased email; an empty string means "no email".
fn normalize_email(raw: &str) -> AppResult<Option<String>> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Ok(None);
    }
    if !is_valid_email(&email) {
        return Err(AppError::validation("invalid email"));
    }
    Ok(Some(email))
}

fn check_password(password: &str) -> AppResult<()> {
    if password.is_empty() {
        return Err(AppError::validation("password is required"));
    }
    if password.len() > 1024 {
        return Err(AppError::validation("password is too long"));
    }
    Ok(())
}

fn map_unique(err: sqlx::Error) -> AppError {
    if db::is_unique_violation(&err) {
        AppError::DuplicateIdentity
    } else {
        AppError::Storage(err)
    }
}

#[derive(Clone)]
pub struct UserRepo {
    pool: SqlitePool,
    credentials: CredentialStore,
}

impl UserRepo {
    pub fn new(db: &Db, credentials: CredentialStore) -> Self {
        Self {
            pool: db.pool().clone(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Create a user with a freshly hashed password.
    pub async fn create(&self, new: NewUser, password: &str) -> AppResult<User> {
        let username = normalize_username(&new.username)?;
        let email = match new.email.as_deref() {
            Some(raw) => normalize_email(raw)?,
            None => None,
        };
        let name = new
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| username.clone());
        check_password(password)?;
        let hash = self.credentials.hash(password).await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, name, role, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&username)
        .bind(&email)
        .bind(&name)
        .bind(new.role.as_str())
        .bind(&hash)
        .bind(db::now_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)?;

        info!(user_id = user.id, role = %user.role, "user created");
        Ok(user)
    }

    pub async fn find_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Email-shaped identifiers are matched against email, everything else against username.
    pub async fn find_by_identifier(&self, identifier: &str) -> AppResult<Option<User>> {
        Ok(self
            .find_by_identifier_with_secret(identifier)
            .await?
            .map(|u| u.user))
    }

    pub(crate) async fn find_by_identifier_with_secret(
        &self,
        identifier: &str,
    ) -> AppResult<Option<UserWithHash>> {
        let (column, value) = match Identifier::parse(identifier) {
            Identifier::Email(email) => ("email", email),
            Identifier::Username(username) => ("username", username),
        };
        if value.is_empty() {
            return Ok(None);
        }
        let user = sqlx::query_as::<_, UserWithHash>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE {column} = ?"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Applies only the supplied fields. Returns whether a row changed.
    pub async fn update(&self, id: i64, patch: UserPatch) -> AppResult<bool> {
        if patch.is_empty() {
            return Ok(false);
        }
        let username = patch.username.as_deref().map(normalize_username).transpose()?;
        let email = match patch.email.as_deref() {
            Some(raw) => normalize_email(raw)?,
            None => None,
        };
        let name = patch
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let hash = match patch.password.as_deref() {
            Some(password) => {
                check_password(password)?;
                Some(self.credentials.hash(password).await?)
            }
            None => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE users
               SET username      = COALESCE(?, username),
                   email         = COALESCE(?, email),
                   name          = COALESCE(?, name),
                   role          = COALESCE(?, role),
                   password_hash = COALESCE(?, password_hash)
             WHERE id = ?
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(name)
        .bind(patch.role.map(|r| r.as_str()))
        .bind(hash)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_unique)?;

        let changed = result.rows_affected() > 0;
        debug!(user_id = id, changed, "user updated");
        Ok(changed)
    }

    /// Enrollments, attendance and payments go with the user via FK cascade.
    pub async fn delete(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(user_id = id, "user deleted");
        }
        Ok(deleted)
    }

    pub async fn record_login(&self, id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET last_login_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
        ))
        .bind(db::now_utc())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Creates the configured admin unless that username is already taken.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> AppResult<bool> {
        if self.find_by_identifier(username).await?.is_some() {
            return Ok(false);
        }
        let new = NewUser {
            username: username.to_string(),
            email: None,
            name: None,
            role: Role::Admin,
        };
        match self.create(new, password).await {
            Ok(_) => Ok(true),
            Err(AppError::DuplicateIdentity) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
pub(crate) async fn test_repo() -> (Db, UserRepo) {
    let db = Db::in_memory().await.expect("in-memory db");
    let credentials =
        CredentialStore::new(&crate::auth::password::fast_config()).expect("credential store");
    let repo = UserRepo::new(&db, credentials);
    (db, repo)
}

#[cfg(test)]
pub(crate) fn new_user(username: &str, role: Role) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: None,
        name: None,
        role,
    }
}
