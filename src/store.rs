//! Claim record storage
//!
//! Wraps a Redis connection behind a handle that is constructed once at
//! process start and injected into the claim gate. When no Redis URL is
//! configured (or the initial connect fails) the store runs disabled:
//! reads report absent, writes are dropped. Callers must treat the store
//! as a best-effort double-claim guard, never a correctness dependency.

use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Claim records are retained for one year
pub const CLAIM_TTL_SECS: u64 = 60 * 60 * 24 * 365;

/// Record of a successful claim. Written exactly once per (event, user)
/// pair; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub address: String,
    pub username: String,
    #[serde(rename = "claimedAt")]
    pub claimed_at: DateTime<Utc>,
}

/// Composite key for a claim record
pub fn claim_key(event_id: &str, user_id: &str) -> String {
    format!("poap_claim:{}:{}", event_id, user_id)
}

enum Backend {
    Disabled,
    Memory(Mutex<HashMap<String, String>>),
    Redis(MultiplexedConnection),
}

pub struct ClaimStore {
    backend: Backend,
}

impl ClaimStore {
    /// Store that ignores writes and reports every key as absent
    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
        }
    }

    /// HashMap-backed store for tests and local development.
    /// Expiry is not enforced; retention only matters against Redis.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(HashMap::new())),
        }
    }

    /// Connect to Redis. A missing URL or a connect failure degrades to
    /// the disabled store; there is no retry.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            warn!("Redis URL not configured, claim caching disabled");
            return Self::disabled();
        };

        match Self::try_connect(url).await {
            Ok(conn) => {
                info!("Claim store connected to Redis");
                Self {
                    backend: Backend::Redis(conn),
                }
            }
            Err(e) => {
                error!("Failed to connect to Redis: {}", e);
                Self::disabled()
            }
        }
    }

    async fn try_connect(url: &str) -> anyhow::Result<MultiplexedConnection> {
        let client = redis::Client::open(url)?;
        Ok(client.get_multiplexed_tokio_connection().await?)
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, Backend::Disabled)
    }

    /// Read a raw value. Transport errors degrade to absent.
    pub async fn get(&self, key: &str) -> Option<String> {
        match &self.backend {
            Backend::Disabled => None,
            Backend::Memory(map) => map.lock().unwrap().get(key).cloned(),
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                match conn.get::<_, Option<String>>(key).await {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Redis read failed for {}: {}", key, e);
                        None
                    }
                }
            }
        }
    }

    /// Write a raw value with an expiry. Best-effort: transport errors are
    /// logged and swallowed.
    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) {
        match &self.backend {
            Backend::Disabled => {}
            Backend::Memory(map) => {
                map.lock()
                    .unwrap()
                    .insert(key.to_string(), value.to_string());
            }
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
                    warn!("Redis write failed for {}: {}", key, e);
                }
            }
        }
    }

    /// Look up the claim record for a (event, user) pair
    pub async fn get_claim(&self, event_id: &str, user_id: &str) -> Option<ClaimRecord> {
        let raw = self.get(&claim_key(event_id, user_id)).await?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    "Malformed claim record for event {} user {}: {}",
                    event_id, user_id, e
                );
                None
            }
        }
    }

    /// Record a successful claim with the fixed one-year retention
    pub async fn record_claim(&self, event_id: &str, user_id: &str, record: &ClaimRecord) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize claim record: {}", e);
                return;
            }
        };
        self.set_ex(&claim_key(event_id, user_id), &json, CLAIM_TTL_SECS)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str) -> ClaimRecord {
        ClaimRecord {
            address: address.to_string(),
            username: "alice".to_string(),
            claimed_at: Utc::now(),
        }
    }

    #[test]
    fn test_claim_key_format() {
        assert_eq!(claim_key("123", "u1"), "poap_claim:123:u1");
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = ClaimStore::in_memory();
        assert!(store.is_enabled());
        assert!(store.get_claim("123", "u1").await.is_none());

        store.record_claim("123", "u1", &record("0xABC")).await;

        let found = store.get_claim("123", "u1").await.unwrap();
        assert_eq!(found.address, "0xABC");
        assert_eq!(found.username, "alice");

        // Different user under the same event is untouched
        assert!(store.get_claim("123", "u2").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_store_reports_absent() {
        let store = ClaimStore::disabled();
        assert!(!store.is_enabled());

        store.record_claim("123", "u1", &record("0xABC")).await;
        assert!(store.get_claim("123", "u1").await.is_none());
        assert!(store.get("poap_claim:123:u1").await.is_none());
    }

    #[tokio::test]
    async fn test_connect_without_url_is_disabled() {
        let store = ClaimStore::connect(None).await;
        assert!(!store.is_enabled());

        let store = ClaimStore::connect(Some("")).await;
        assert!(!store.is_enabled());
    }

    #[tokio::test]
    async fn test_malformed_record_reads_as_absent() {
        let store = ClaimStore::in_memory();
        store.set_ex(&claim_key("123", "u1"), "not json", CLAIM_TTL_SECS).await;
        assert!(store.get_claim("123", "u1").await.is_none());
    }

    #[test]
    fn test_claim_record_json_shape() {
        let json = r#"{"address":"0xABC","username":"alice","claimedAt":"2024-01-01T00:00:00Z"}"#;
        let record: ClaimRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.address, "0xABC");
    }
}
