// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory remote backend for testing.
//!
//! [`MockRemote`] behaves like a small key-value server: values expire according to the
//! injected clock, the lock primitives are atomic, and every call is recorded. A failure
//! predicate makes selected calls fail, which is how tests simulate an outage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tick::Clock;

use crate::{Error, Expiration, RemoteBackend, Result};

/// A recorded remote call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    /// [`RemoteBackend::get`].
    Get(String),
    /// [`RemoteBackend::set`].
    Set {
        /// The key that was written.
        key: String,
        /// The value that was written.
        value: Bytes,
        /// The requested expiry.
        ttl: Option<Duration>,
    },
    /// [`RemoteBackend::delete`].
    Delete(String),
    /// [`RemoteBackend::delete_many`].
    DeleteMany(Vec<String>),
    /// [`RemoteBackend::has_key`].
    HasKey(String),
    /// [`RemoteBackend::expire`].
    Expire {
        /// The key whose expiry was changed.
        key: String,
        /// The requested expiry.
        ttl: Duration,
    },
    /// [`RemoteBackend::time_to_live`].
    TimeToLive(String),
    /// [`RemoteBackend::increment`].
    Increment {
        /// The counter key.
        key: String,
        /// The amount added.
        delta: i64,
    },
    /// [`RemoteBackend::set_if_absent_with_expiry`].
    SetIfAbsent {
        /// The lock key.
        key: String,
        /// The token offered.
        token: String,
        /// The requested expiry.
        ttl: Duration,
    },
    /// [`RemoteBackend::delete_if_equals`].
    DeleteIfEquals {
        /// The lock key.
        key: String,
        /// The token offered.
        token: String,
    },
    /// [`RemoteBackend::flush`].
    Flush,
    /// [`RemoteBackend::ping`].
    Ping,
}

impl RemoteOp {
    /// Returns the key the call targeted, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Get(key)
            | Self::Delete(key)
            | Self::HasKey(key)
            | Self::TimeToLive(key)
            | Self::Set { key, .. }
            | Self::Expire { key, .. }
            | Self::Increment { key, .. }
            | Self::SetIfAbsent { key, .. }
            | Self::DeleteIfEquals { key, .. } => Some(key),
            Self::DeleteMany(_) | Self::Flush | Self::Ping => None,
        }
    }
}

type FailPredicate = Box<dyn Fn(&RemoteOp) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredValue {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// A configurable in-memory remote backend.
///
/// Clones share the same data, operation log and failure predicate, so a test can keep a
/// handle while the cache under test owns another.
///
/// # Examples
///
/// ```
/// use lifeboat_remote::testing::{MockRemote, RemoteOp};
/// use lifeboat_remote::RemoteBackend;
/// use tick::Clock;
///
/// # async fn example() {
/// let remote = MockRemote::new(&Clock::new_frozen());
///
/// remote.set("key", "value".into(), None).await.unwrap();
/// assert_eq!(remote.get("key").await.unwrap().as_deref(), Some(&b"value"[..]));
///
/// // Simulate an outage.
/// remote.fail_when(|_| true);
/// assert!(remote.get("key").await.is_err());
///
/// // Only fail reads of one key.
/// remote.fail_when(|op| matches!(op, RemoteOp::Get(k) if k == "forbidden"));
/// assert!(remote.get("forbidden").await.is_err());
/// assert!(remote.get("key").await.is_ok());
/// # }
/// ```
pub struct MockRemote {
    clock: Clock,
    data: Arc<Mutex<HashMap<String, StoredValue>>>,
    operations: Arc<Mutex<Vec<RemoteOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
}

impl std::fmt::Debug for MockRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRemote")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Clone for MockRemote {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
        }
    }
}

impl MockRemote {
    /// Creates an empty backend whose expiries follow `clock`.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes every call matching `predicate` fail with [`Error::Unreachable`].
    ///
    /// Replaces any previously installed predicate.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&RemoteOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Removes the failure predicate; all calls succeed again.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns all recorded calls, oldest first.
    #[must_use]
    pub fn operations(&self) -> Vec<RemoteOp> {
        self.operations.lock().clone()
    }

    /// Forgets all recorded calls.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        let now = self.clock.instant();
        self.data.lock().values().filter(|stored| stored.is_live(now)).count()
    }

    /// Returns `true` if `key` holds a live value. Not recorded as a call.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.instant();
        self.data.lock().get(key).is_some_and(|stored| stored.is_live(now))
    }

    /// Reads a live value without recording a call.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Bytes> {
        let now = self.clock.instant();
        self.data
            .lock()
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.value.clone())
    }

    fn record(&self, op: RemoteOp) -> Result<()> {
        let should_fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.operations.lock().push(op);

        if should_fail {
            Err(Error::unreachable("injected failure"))
        } else {
            Ok(())
        }
    }

    fn deadline(&self, ttl: Duration) -> Option<Instant> {
        self.clock.instant().checked_add(ttl)
    }

    /// Runs `f` on the data map after dropping expired entries.
    fn with_live_data<R>(&self, f: impl FnOnce(&mut HashMap<String, StoredValue>) -> R) -> R {
        let now = self.clock.instant();
        let mut data = self.data.lock();
        data.retain(|_, stored| stored.is_live(now));
        f(&mut data)
    }
}

impl RemoteBackend for MockRemote {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.record(RemoteOp::Get(key.to_string()))?;
        Ok(self.with_live_data(|data| data.get(key).map(|stored| stored.value.clone())))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        self.record(RemoteOp::Set {
            key: key.to_string(),
            value: value.clone(),
            ttl,
        })?;

        let expires_at = ttl.and_then(|ttl| self.deadline(ttl));
        self.with_live_data(|data| data.insert(key.to_string(), StoredValue { value, expires_at }));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.record(RemoteOp::Delete(key.to_string()))?;
        Ok(self.with_live_data(|data| data.remove(key).is_some()))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        self.record(RemoteOp::DeleteMany(keys.to_vec()))?;
        Ok(self.with_live_data(|data| keys.iter().filter(|key| data.remove(key.as_str()).is_some()).count() as u64))
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        self.record(RemoteOp::HasKey(key.to_string()))?;
        Ok(self.with_live_data(|data| data.contains_key(key)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.record(RemoteOp::Expire { key: key.to_string(), ttl })?;

        let expires_at = self.deadline(ttl);
        Ok(self.with_live_data(|data| match data.get_mut(key) {
            Some(stored) => {
                stored.expires_at = expires_at;
                true
            }
            None => false,
        }))
    }

    async fn time_to_live(&self, key: &str) -> Result<Expiration> {
        self.record(RemoteOp::TimeToLive(key.to_string()))?;

        let now = self.clock.instant();
        Ok(self.with_live_data(|data| match data.get(key) {
            None => Expiration::Missing,
            Some(StoredValue { expires_at: None, .. }) => Expiration::Persistent,
            Some(StoredValue {
                expires_at: Some(deadline), ..
            }) => Expiration::Remaining(deadline.saturating_duration_since(now)),
        }))
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.record(RemoteOp::Increment { key: key.to_string(), delta })?;

        self.with_live_data(|data| {
            let current = match data.get(key) {
                Some(stored) => std::str::from_utf8(&stored.value)
                    .ok()
                    .and_then(|text| text.parse::<i64>().ok())
                    .ok_or_else(|| Error::Protocol("value is not an integer".to_string()))?,
                None => 0,
            };

            let next = current
                .checked_add(delta)
                .ok_or_else(|| Error::Protocol("increment would overflow".to_string()))?;

            let expires_at = data.get(key).and_then(|stored| stored.expires_at);
            data.insert(
                key.to_string(),
                StoredValue {
                    value: Bytes::from(next.to_string()),
                    expires_at,
                },
            );
            Ok(next)
        })
    }

    async fn set_if_absent_with_expiry(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.record(RemoteOp::SetIfAbsent {
            key: key.to_string(),
            token: token.to_string(),
            ttl,
        })?;

        let expires_at = self.deadline(ttl);
        Ok(self.with_live_data(|data| {
            if data.contains_key(key) {
                return false;
            }

            data.insert(
                key.to_string(),
                StoredValue {
                    value: Bytes::copy_from_slice(token.as_bytes()),
                    expires_at,
                },
            );
            true
        }))
    }

    async fn delete_if_equals(&self, key: &str, token: &str) -> Result<bool> {
        self.record(RemoteOp::DeleteIfEquals {
            key: key.to_string(),
            token: token.to_string(),
        })?;

        Ok(self.with_live_data(|data| {
            if data.get(key).is_some_and(|stored| stored.value == token.as_bytes()) {
                data.remove(key);
                true
            } else {
                false
            }
        }))
    }

    async fn flush(&self) -> Result<()> {
        self.record(RemoteOp::Flush)?;
        self.data.lock().clear();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.record(RemoteOp::Ping)
    }
}
