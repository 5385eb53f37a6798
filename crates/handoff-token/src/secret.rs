//! Where signing secrets come from.
//!
//! Issuers sign with [`SecretSource::signing_secret`]; validators try
//! every entry of [`SecretSource::verification_secrets`]. During a
//! rotation the verification list is `[current, previous]`; dropping
//! `previous` retires every token it signed.

use std::sync::{Arc, PoisonError, RwLock};

use crate::TokenError;

/// Shared, immutable secret bytes.
pub type Secret = Arc<[u8]>;

/// The key material the token layer consumes.
pub trait SecretSource: Send + Sync + 'static {
    /// The one secret new tokens are signed with.
    fn signing_secret(&self) -> Secret;

    /// Every secret a presented token may be signed with, current first.
    fn verification_secrets(&self) -> Vec<Secret>;
}

// ---------------------------------------------------------------------------
// StaticSecrets
// ---------------------------------------------------------------------------

/// A fixed current secret plus any still-accepted previous ones.
#[derive(Debug, Clone)]
pub struct StaticSecrets {
    current: Secret,
    previous: Vec<Secret>,
}

impl StaticSecrets {
    pub fn new(current: impl AsRef<[u8]>) -> Self {
        Self {
            current: Secret::from(current.as_ref()),
            previous: Vec::new(),
        }
    }

    pub fn with_previous(mut self, previous: impl AsRef<[u8]>) -> Self {
        self.previous.push(Secret::from(previous.as_ref()));
        self
    }
}

impl SecretSource for StaticSecrets {
    fn signing_secret(&self) -> Secret {
        Arc::clone(&self.current)
    }

    fn verification_secrets(&self) -> Vec<Secret> {
        let mut all = Vec::with_capacity(1 + self.previous.len());
        all.push(Arc::clone(&self.current));
        all.extend(self.previous.iter().cloned());
        all
    }
}

// ---------------------------------------------------------------------------
// RotatingSecrets
// ---------------------------------------------------------------------------

/// A secret source that can be rotated while the process runs.
#[derive(Debug)]
pub struct RotatingSecrets {
    inner: RwLock<StaticSecrets>,
}

impl RotatingSecrets {
    pub fn new(initial: StaticSecrets) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Makes `next` the signing secret; the old one stays accepted.
    pub fn rotate(&self, next: impl AsRef<[u8]>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let old = std::mem::replace(&mut guard.current, Secret::from(next.as_ref()));
        guard.previous.insert(0, old);
        tracing::info!(accepted = guard.previous.len() + 1, "signing secret rotated");
    }

    /// Stops accepting everything but the current secret.
    pub fn retire_previous(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.previous.clear();
        tracing::info!("previous signing secrets retired");
    }
}

impl SecretSource for RotatingSecrets {
    fn signing_secret(&self) -> Secret {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .signing_secret()
    }

    fn verification_secrets(&self) -> Vec<Secret> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .verification_secrets()
    }
}

// ---------------------------------------------------------------------------
// Strength policy
// ---------------------------------------------------------------------------

/// Shortest secret accepted by [`check_secret_strength`], in bytes.
pub const MIN_SECRET_LEN: usize = 32;

const WEAK_SECRETS: &[&str] = &["changeme", "changemeplease", "password", "secret"];

/// Rejects empty, short, and well-known placeholder secrets.
///
/// Placeholders are matched after dropping non-alphanumerics and
/// lowercasing, so `"Change-Me!"` counts as `"changeme"`.
pub fn check_secret_strength(secret: &str, field: &str) -> Result<(), TokenError> {
    let weak = |reason| {
        Err(TokenError::WeakSecret {
            field: field.to_string(),
            reason,
        })
    };
    if secret.trim().is_empty() {
        return weak("must not be empty");
    }
    let normalized: String = secret
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    if WEAK_SECRETS.contains(&normalized.as_str()) || normalized.starts_with("changeme") {
        return weak("must not use a default or weak secret value");
    }
    if secret.len() < MIN_SECRET_LEN {
        return weak("must be at least 32 bytes");
    }
    Ok(())
}
