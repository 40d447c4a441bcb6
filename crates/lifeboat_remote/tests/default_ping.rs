// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tests for the default health probe of [`RemoteBackend`].

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use lifeboat_remote::{Error, Expiration, HEALTH_PROBE_KEY, RemoteBackend, Result};
use parking_lot::Mutex;

/// A backend that implements only the required methods and can corrupt reads.
#[derive(Default)]
struct MinimalRemote {
    data: Mutex<HashMap<String, Bytes>>,
    corrupt_reads: bool,
    drop_writes: bool,
}

impl RemoteBackend for MinimalRemote {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        if self.corrupt_reads {
            return Ok(Some(Bytes::from_static(b"garbage")));
        }
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes, _ttl: Option<Duration>) -> Result<()> {
        if !self.drop_writes {
            self.data.lock().insert(key.to_string(), value);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        let mut data = self.data.lock();
        Ok(keys.iter().filter(|key| data.remove(key.as_str()).is_some()).count() as u64)
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock().contains_key(key))
    }

    async fn expire(&self, key: &str, _ttl: Duration) -> Result<bool> {
        Ok(self.data.lock().contains_key(key))
    }

    async fn time_to_live(&self, key: &str) -> Result<Expiration> {
        Ok(if self.data.lock().contains_key(key) {
            Expiration::Persistent
        } else {
            Expiration::Missing
        })
    }

    async fn increment(&self, _key: &str, delta: i64) -> Result<i64> {
        Ok(delta)
    }

    async fn set_if_absent_with_expiry(&self, _key: &str, _token: &str, _ttl: Duration) -> Result<bool> {
        Ok(false)
    }

    async fn delete_if_equals(&self, _key: &str, _token: &str) -> Result<bool> {
        Ok(false)
    }

    async fn flush(&self) -> Result<()> {
        self.data.lock().clear();
        Ok(())
    }
}

#[tokio::test]
async fn default_ping_round_trips_and_cleans_up() {
    let remote = MinimalRemote::default();

    remote.ping().await.unwrap();

    assert!(!remote.has_key(HEALTH_PROBE_KEY).await.unwrap());
}

#[tokio::test]
async fn default_ping_fails_on_mismatched_read() {
    let remote = MinimalRemote {
        corrupt_reads: true,
        ..MinimalRemote::default()
    };

    assert!(matches!(remote.ping().await, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn default_ping_fails_when_write_is_lost() {
    let remote = MinimalRemote {
        drop_writes: true,
        ..MinimalRemote::default()
    };

    assert!(matches!(remote.ping().await, Err(Error::Protocol(_))));
}
