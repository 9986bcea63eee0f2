use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("otp key must not be empty")]
    EmptyKey,
    #[error("otp store failure: {0}")]
    Store(String),
}

/// Wrong guesses allowed against one issued code before it is discarded.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// TTL key-value storage for one-time codes. Expired entries read as absent.
///
/// `set` replaces any previous value and resets its failure count.
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), OtpError>;
    async fn get(&self, key: &str) -> Result<Option<String>, OtpError>;
    async fn delete(&self, key: &str) -> Result<(), OtpError>;
    /// Bumps the failure count of a live entry and returns it. Absent keys report 0.
    async fn record_failure(&self, key: &str) -> Result<u32, OtpError>;
    /// Drops every expired entry and returns how many went.
    async fn purge_expired(&self) -> Result<u64, OtpError>;
}

struct StoredCode {
    value: String,
    expires_at: DateTime<Utc>,
    failures: u32,
}

#[derive(Clone, Default)]
pub struct InMemoryOtpStore {
    entries: Arc<Mutex<HashMap<String, StoredCode>>>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), OtpError> {
        let expires_at = expiry_from(Utc::now(), ttl);
        let stored = StoredCode { value: value.to_string(), expires_at, failures: 0 };
        self.entries.lock().await.insert(key.to_string(), stored);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, OtpError> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        match entries.get(key) {
            Some(stored) if stored.expires_at <= now => {
                entries.remove(key);
                Ok(None)
            }
            Some(stored) => Ok(Some(stored.value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), OtpError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn record_failure(&self, key: &str) -> Result<u32, OtpError> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(stored) if stored.expires_at > Utc::now() => {
                stored.failures += 1;
                Ok(stored.failures)
            }
            _ => Ok(0),
        }
    }

    async fn purge_expired(&self) -> Result<u64, OtpError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let now = Utc::now();
        entries.retain(|_, stored| stored.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

pub fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));
    now + ttl
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedOtp {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and checks numeric codes. Only a SHA-256 digest of each code is stored.
#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn OtpStore>,
    ttl: Duration,
    code_length: u32,
}

impl OtpService {
    pub fn new(store: Arc<dyn OtpStore>, ttl: Duration, code_length: u32) -> Self {
        Self { store, ttl, code_length }
    }

    pub async fn issue(&self, key: &str) -> Result<IssuedOtp, OtpError> {
        let key = normalize_key(key)?;
        let code = generate_code(self.code_length);
        self.store.purge_expired().await?;
        self.store.set(&store_key(&key), &digest(&key, &code), self.ttl).await?;
        Ok(IssuedOtp { code, expires_at: expiry_from(Utc::now(), self.ttl) })
    }

    pub async fn purge_expired(&self) -> Result<u64, OtpError> {
        self.store.purge_expired().await
    }

    /// Sweep cadence for the background purge task.
    pub fn sweep_interval(&self) -> Duration {
        self.ttl.max(Duration::from_secs(60))
    }

    /// Consumes the code on success so it cannot be replayed. The code is also
    /// discarded after [`MAX_FAILED_ATTEMPTS`] wrong guesses.
    pub async fn verify(&self, key: &str, code: &str) -> Result<bool, OtpError> {
        let key = normalize_key(key)?;
        let entry = store_key(&key);
        let Some(stored) = self.store.get(&entry).await? else {
            return Ok(false);
        };
        if stored != digest(&key, code.trim()) {
            if self.store.record_failure(&entry).await? >= MAX_FAILED_ATTEMPTS {
                self.store.delete(&entry).await?;
            }
            return Ok(false);
        }
        self.store.delete(&entry).await?;
        Ok(true)
    }
}

fn normalize_key(raw: &str) -> Result<String, OtpError> {
    let key = raw.trim().to_ascii_lowercase();
    if key.is_empty() {
        return Err(OtpError::EmptyKey);
    }
    Ok(key)
}

fn store_key(key: &str) -> String {
    format!("otp:{key}")
}

fn digest(key: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hasher.finalize().iter().map(|byte| format!("{byte:02x}")).collect()
}

fn generate_code(length: u32) -> String {
    let mut rng = rand::thread_rng();
    (0..length.max(1)).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{InMemoryOtpStore, OtpService, OtpStore, MAX_FAILED_ATTEMPTS};

    fn service(ttl: Duration) -> OtpService {
        OtpService::new(Arc::new(InMemoryOtpStore::new()), ttl, 6)
    }

    fn wrong_code(code: &str) -> String {
        code.chars().map(|ch| if ch == '0' { '1' } else { '0' }).collect()
    }

    #[tokio::test]
    async fn issued_code_verifies_once() {
        let otp = service(Duration::from_secs(300));
        let issued = otp.issue("Jane@Example.com").await.expect("issue code");
        assert_eq!(issued.code.len(), 6);
        assert!(issued.code.chars().all(|ch| ch.is_ascii_digit()));

        assert!(otp.verify("jane@example.com", &issued.code).await.expect("verify"));
        assert!(!otp.verify("jane@example.com", &issued.code).await.expect("replay"));
    }

    #[tokio::test]
    async fn wrong_code_is_rejected_without_consuming() {
        let otp = service(Duration::from_secs(300));
        let issued = otp.issue("ops@example.com").await.expect("issue code");
        let wrong = wrong_code(&issued.code);

        assert!(!otp.verify("ops@example.com", &wrong).await.expect("verify wrong"));
        assert!(otp.verify("ops@example.com", &issued.code).await.expect("verify right"));
    }

    #[tokio::test]
    async fn code_is_discarded_after_too_many_wrong_guesses() {
        let otp = OtpService::new(Arc::new(InMemoryOtpStore::new()), Duration::from_secs(300), 4);
        let issued = otp.issue("gate@example.com").await.expect("issue code");
        let wrong = wrong_code(&issued.code);

        for _ in 0..MAX_FAILED_ATTEMPTS {
            assert!(!otp.verify("gate@example.com", &wrong).await.expect("verify wrong"));
        }
        assert!(!otp.verify("gate@example.com", &issued.code).await.expect("verify right"));

        let reissued = otp.issue("gate@example.com").await.expect("reissue");
        assert!(otp.verify("gate@example.com", &reissued.code).await.expect("verify reissued"));
    }

    #[tokio::test]
    async fn issuing_sweeps_expired_codes() {
        let store = Arc::new(InMemoryOtpStore::new());
        let short_lived = OtpService::new(store.clone(), Duration::from_secs(0), 6);
        for index in 0..50 {
            short_lived.issue(&format!("crew{index}@example.com")).await.expect("issue");
        }
        assert_eq!(store.len().await, 1);

        assert_eq!(store.purge_expired().await.expect("purge"), 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = InMemoryOtpStore::new();
        store.set("otp:k", "v", Duration::from_secs(0)).await.expect("set");
        assert_eq!(store.get("otp:k").await.expect("get"), None);

        store.set("otp:k", "v", Duration::from_secs(60)).await.expect("set");
        assert_eq!(store.get("otp:k").await.expect("get").as_deref(), Some("v"));
        store.delete("otp:k").await.expect("delete");
        assert_eq!(store.get("otp:k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn blank_key_is_refused() {
        let otp = service(Duration::from_secs(60));
        assert!(otp.issue("   ").await.is_err());
    }
}
