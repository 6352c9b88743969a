use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{config::JwtConfig, state::AppState, types::Role, users::User};

/// Wire payload of an access token.
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: String, // user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    iat: i64,
    exp: i64,
    iss: String,
    aud: String,
}

/// Verified token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claims {
    pub user_id: i64,
    pub role: Option<Role>,
    pub username: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Any token problem. Carries no detail.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid or expired token")]
pub struct InvalidToken;

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = config.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User) -> anyhow::Result<String> {
        self.issue_at(user, OffsetDateTime::now_utc())
    }

    /// Signs a token as if issued at `now`.
    pub fn issue_at(&self, user: &User, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + self.ttl;
        let claims = TokenClaims {
            sub: user.id.to_string(),
            role: Some(user.role),
            username: Some(user.username.clone()),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = user.id, role = %user.role, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, InvalidToken> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let data = decode::<TokenClaims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            InvalidToken
        })?;
        let user_id = data.claims.sub.parse::<i64>().map_err(|_| InvalidToken)?;
        debug!(user_id, "jwt verified");
        Ok(Claims {
            user_id,
            role: data.claims.role,
            username: data.claims.username,
            issued_at: data.claims.iat,
            expires_at: data.claims.exp,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_keys(secret: &str) -> JwtKeys {
    JwtKeys::new(&JwtConfig {
        secret: secret.into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
        ttl_minutes: 60 * 24 * 7,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, role: Role) -> User {
        User {
            id,
            username: format!("user{id}"),
            email: None,
            name: "Test".into(),
            role,
            created_at: OffsetDateTime::now_utc(),
            last_login_at: None,
        }
    }

    #[test]
    fn issued_token_verifies_to_subject_and_role() {
        let keys = test_keys("dev-secret");
        let token = keys.issue(&user(42, Role::Teacher)).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.role, Some(Role::Teacher));
        assert_eq!(claims.username.as_deref(), Some("user42"));
        assert_eq!(claims.expires_at - claims.issued_at, keys.ttl().whole_seconds());
    }

    #[test]
    fn token_expires_after_ttl() {
        let keys = test_keys("dev-secret");
        let issued = OffsetDateTime::now_utc() - keys.ttl() - Duration::seconds(1);
        let token = keys.issue_at(&user(1, Role::Student), issued).unwrap();
        assert_eq!(keys.verify(&token), Err(InvalidToken));

        let almost = OffsetDateTime::now_utc() - keys.ttl() + Duration::minutes(1);
        let token = keys.issue_at(&user(1, Role::Student), almost).unwrap();
        assert!(keys.verify(&token).is_ok());
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = test_keys("secret-a").issue(&user(7, Role::Admin)).unwrap();
        assert_eq!(test_keys("secret-b").verify(&token), Err(InvalidToken));
    }

    #[test]
    fn rejects_wrong_issuer_or_audience() {
        let good = test_keys("same-secret");
        let other = JwtKeys::new(&JwtConfig {
            secret: "same-secret".into(),
            issuer: "elsewhere".into(),
            audience: "someone-else".into(),
            ttl_minutes: 5,
        });
        let token = good.issue(&user(7, Role::Admin)).unwrap();
        assert_eq!(other.verify(&token), Err(InvalidToken));
    }

    #[test]
    fn rejects_malformed_and_tampered_tokens() {
        let keys = test_keys("dev-secret");
        assert_eq!(keys.verify(""), Err(InvalidToken));
        assert_eq!(keys.verify("not.a.jwt"), Err(InvalidToken));

        let token = keys.issue(&user(3, Role::Student)).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_payload = {
            use base64ct::{Base64UrlUnpadded, Encoding};
            let raw = Base64UrlUnpadded::decode_vec(parts[1]).unwrap();
            let text = String::from_utf8(raw).unwrap().replace("student", "admin");
            Base64UrlUnpadded::encode_string(text.as_bytes())
        };
        parts[1] = &forged_payload;
        assert_eq!(keys.verify(&parts.join(".")), Err(InvalidToken));
    }

    #[test]
    fn token_without_role_still_verifies_but_carries_none() {
        let keys = test_keys("dev-secret");
        let now = OffsetDateTime::now_utc();
        let raw = TokenClaims {
            sub: "5".into(),
            role: None,
            username: None,
            iat: now.unix_timestamp(),
            exp: (now + Duration::minutes(5)).unix_timestamp(),
            iss: "test-issuer".into(),
            aud: "test-aud".into(),
        };
        let token = encode(&Header::default(), &raw, &keys.encoding).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.user_id, 5);
        assert_eq!(claims.role, None);
    }
}
