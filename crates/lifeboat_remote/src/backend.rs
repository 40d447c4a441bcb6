// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The trait every remote backend implements.

use std::time::Duration;

use bytes::Bytes;

use crate::{Error, Result};

/// Key written by the default [`RemoteBackend::ping`] round trip.
pub const HEALTH_PROBE_KEY: &str = "lifeboat:health_probe";

const HEALTH_PROBE_VALUE: &[u8] = b"ok";
const HEALTH_PROBE_TTL: Duration = Duration::from_secs(10);

/// Remaining lifetime of a key, as reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// The key exists and expires after the given duration.
    Remaining(Duration),
    /// The key exists and never expires.
    Persistent,
    /// The key does not exist.
    Missing,
    /// The backend that served the query cannot report expirations.
    ///
    /// This is distinct from [`Expiration::Missing`]: the key may well exist.
    Unknown,
}

/// A shared, networked key-value service.
///
/// All keys are plain strings and all values are opaque bytes. Every call may fail with an
/// [`Error`]; implementations never panic on backend failures.
///
/// The two lock primitives, [`set_if_absent_with_expiry`](Self::set_if_absent_with_expiry) and
/// [`delete_if_equals`](Self::delete_if_equals), must execute atomically on the server.
pub trait RemoteBackend: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    /// Writes a value, replacing any previous value and expiry. `None` means no expiry.
    fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> impl Future<Output = Result<()>> + Send;

    /// Deletes a key, returning `true` if it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Deletes several keys, returning how many existed.
    fn delete_many(&self, keys: &[String]) -> impl Future<Output = Result<u64>> + Send;

    /// Returns `true` if the key exists.
    fn has_key(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Sets the expiry of an existing key, returning `false` if the key does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<bool>> + Send;

    /// Reports the remaining lifetime of a key.
    fn time_to_live(&self, key: &str) -> impl Future<Output = Result<Expiration>> + Send;

    /// Adds `delta` to the integer stored at `key`, treating a missing key as zero.
    fn increment(&self, key: &str, delta: i64) -> impl Future<Output = Result<i64>> + Send;

    /// Stores `token` under `key` with the given expiry, but only if `key` does not exist.
    ///
    /// Returns `true` if the value was stored.
    fn set_if_absent_with_expiry(&self, key: &str, token: &str, ttl: Duration) -> impl Future<Output = Result<bool>> + Send;

    /// Deletes `key`, but only if its current value equals `token`.
    ///
    /// Returns `true` if the key was deleted.
    fn delete_if_equals(&self, key: &str, token: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Removes every key in the backend's namespace.
    fn flush(&self) -> impl Future<Output = Result<()>> + Send;

    /// Checks that the backend is reachable and answering correctly.
    ///
    /// The default implementation writes [`HEALTH_PROBE_KEY`] with a short expiry, reads it
    /// back, and deletes it again.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.set(HEALTH_PROBE_KEY, Bytes::from_static(HEALTH_PROBE_VALUE), Some(HEALTH_PROBE_TTL))
                .await?;

            let read = self.get(HEALTH_PROBE_KEY).await?;
            self.delete(HEALTH_PROBE_KEY).await?;

            match read {
                Some(value) if value == HEALTH_PROBE_VALUE => Ok(()),
                Some(_) => Err(Error::Protocol("health probe read back a different value".to_string())),
                None => Err(Error::Protocol("health probe value was not stored".to_string())),
            }
        }
    }
}
