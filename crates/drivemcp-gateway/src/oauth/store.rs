//! In-memory TTL stores backing the authorization-code proxy.
//!
//! Expiry is enforced lazily: consumption checks the deadline, and
//! handlers sweep stale entries on their way through rather than on a
//! timer. Nothing here survives a restart, which is the point - pending
//! flow state is short-lived and worthless to persist.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// How long a CSRF state and its pending authorization stay redeemable.
pub const STATE_TTL_SECS: i64 = 600;
/// How long a minted proxy authorization code stays redeemable.
pub const CODE_TTL_SECS: i64 = 600;
/// How long a dynamic client registration is retained.
pub const REGISTRATION_TTL_SECS: i64 = 86_400;

/// Flow context stored against a CSRF state while the user is at Google.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    /// Where to send the proxy code afterwards; `None` means the manual
    /// copy/paste flow.
    pub client_redirect_uri: Option<String>,
    /// Opaque value the client expects echoed back as `state`.
    pub client_state: Option<String>,
}

/// A dynamically registered client. Bookkeeping only; verification never
/// consults these records.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub client_name: String,
    pub redirect_uris: Vec<String>,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Concurrent map of single-use values with a fixed time-to-live.
///
/// `take_once` removes atomically, so two racing consumers cannot both
/// redeem the same key.
#[derive(Debug)]
pub struct TtlStore<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlStore<V> {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Insert or replace the value under `key`.
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Utc::now() + self.ttl,
            },
        );
    }

    /// Remove and return the value under `key`. Expired entries are
    /// removed but not returned, so an overdue key fails even on its
    /// first use.
    pub fn take_once(&self, key: &str) -> Option<V> {
        let (_, entry) = self.entries.remove(key)?;
        if entry.expires_at <= Utc::now() {
            return None;
        }
        Some(entry.value)
    }

    /// Non-consuming lookup, honoring expiry.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Utc::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
