use std::sync::Arc;

use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tokio::task;
use tracing::error;

use crate::config::PasswordConfig;

/// Salted Argon2id hashing with a configured work factor.
///
/// Verification always re-derives with the parameters and salt embedded in
/// the stored digest, so raising the work factor never breaks existing users.
#[derive(Clone)]
pub struct CredentialStore {
    hasher: Argon2<'static>,
    dummy_digest: Arc<str>,
}

impl CredentialStore {
    pub fn new(config: &PasswordConfig) -> anyhow::Result<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_digest = hash_with(&hasher, "academy-dummy-credential")
            .context("derive dummy digest")?
            .into();
        Ok(Self {
            hasher,
            dummy_digest,
        })
    }

    /// Hashes on the blocking pool so request threads keep serving.
    pub async fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let hasher = self.hasher.clone();
        let plain = plain.to_string();
        task::spawn_blocking(move || hash_with(&hasher, &plain))
            .await
            .context("password hashing task panicked")?
    }

    /// `false` on any mismatch, including a stored digest that does not parse.
    pub async fn verify(&self, plain: &str, digest: &str) -> anyhow::Result<bool> {
        let plain = plain.to_string();
        let digest = digest.to_string();
        task::spawn_blocking(move || verify_with(&plain, &digest))
            .await
            .context("password verification task panicked")
    }

    /// Burns one verification so unknown-user logins cost the same as bad passwords.
    pub async fn verify_dummy(&self, plain: &str) -> anyhow::Result<()> {
        let digest = Arc::clone(&self.dummy_digest);
        let plain = plain.to_string();
        task::spawn_blocking(move || {
            let _ = verify_with(&plain, &digest);
        })
        .await
        .context("password verification task panicked")
    }
}

fn verify_with(plain: &str, digest: &str) -> bool {
    let parsed = match PasswordHash::new(digest) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "stored password digest is malformed");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

fn hash_with(hasher: &Argon2<'_>, plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

#[cfg(test)]
pub(crate) fn fast_config() -> PasswordConfig {
    PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CredentialStore {
        CredentialStore::new(&fast_config()).expect("params should be valid")
    }

    #[tokio::test]
    async fn hash_and_verify_roundtrip() {
        let store = store();
        let hash = store.hash("Secur3P@ssw0rd!").await.expect("hashing should succeed");
        assert!(store.verify("Secur3P@ssw0rd!", &hash).await.unwrap());
        assert!(!hash.contains("Secur3P@ssw0rd!"));
    }

    #[tokio::test]
    async fn same_password_hashes_differently() {
        let store = store();
        let a = store.hash("pw1").await.unwrap();
        let b = store.hash("pw1").await.unwrap();
        assert_ne!(a, b);
        assert!(store.verify("pw1", &a).await.unwrap());
        assert!(store.verify("pw1", &b).await.unwrap());
    }

    #[tokio::test]
    async fn verify_rejects_wrong_password() {
        let store = store();
        let hash = store.hash("correct-horse-battery-staple").await.unwrap();
        assert!(!store.verify("wrong-password", &hash).await.unwrap());
        assert!(!store.verify("", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn verify_treats_malformed_digest_as_mismatch() {
        assert!(!store().verify("anything", "not-a-valid-hash").await.unwrap());
        assert!(!store().verify("anything", "").await.unwrap());
    }

    #[tokio::test]
    async fn digests_survive_work_factor_change() {
        let old = store();
        let digest = old.hash("stable").await.unwrap();
        let stronger = CredentialStore::new(&PasswordConfig {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        assert!(stronger.verify("stable", &digest).await.unwrap());
        assert!(!stronger.verify("unstable", &digest).await.unwrap());
    }

    #[tokio::test]
    async fn hashing_leaves_the_runtime_free() {
        use std::cell::Cell;

        let store = CredentialStore::new(&PasswordConfig {
            memory_kib: 8192,
            iterations: 4,
            parallelism: 1,
        })
        .unwrap();
        let done = Cell::new(false);
        let ticks = Cell::new(0usize);
        tokio::join!(
            async {
                let digest = store.hash("pw").await.unwrap();
                assert!(store.verify("pw", &digest).await.unwrap());
                store.verify_dummy("pw").await.unwrap();
                done.set(true);
            },
            async {
                while !done.get() {
                    ticks.set(ticks.get() + 1);
                    tokio::task::yield_now().await;
                }
            }
        );
        assert!(ticks.get() > 0);
    }

    #[test]
    fn rejects_invalid_params() {
        let bad = PasswordConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 0,
        };
        assert!(CredentialStore::new(&bad).is_err());
    }
}
