// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use bytes::Bytes;

use crate::{Error, Expiration, RemoteBackend, Result};

/// A placeholder backend for processes without a remote cache.
///
/// Every call fails with [`Error::NotConfigured`], so a cache built on top of it starts and
/// stays on its local store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl RemoteBackend for Unconfigured {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
        Err(Error::NotConfigured)
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Option<Duration>) -> Result<()> {
        Err(Error::NotConfigured)
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(Error::NotConfigured)
    }

    async fn delete_many(&self, _keys: &[String]) -> Result<u64> {
        Err(Error::NotConfigured)
    }

    async fn has_key(&self, _key: &str) -> Result<bool> {
        Err(Error::NotConfigured)
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
        Err(Error::NotConfigured)
    }

    async fn time_to_live(&self, _key: &str) -> Result<Expiration> {
        Err(Error::NotConfigured)
    }

    async fn increment(&self, _key: &str, _delta: i64) -> Result<i64> {
        Err(Error::NotConfigured)
    }

    async fn set_if_absent_with_expiry(&self, _key: &str, _token: &str, _ttl: Duration) -> Result<bool> {
        Err(Error::NotConfigured)
    }

    async fn delete_if_equals(&self, _key: &str, _token: &str) -> Result<bool> {
        Err(Error::NotConfigured)
    }

    async fn flush(&self) -> Result<()> {
        Err(Error::NotConfigured)
    }

    async fn ping(&self) -> Result<()> {
        Err(Error::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_call_reports_not_configured() {
        let backend = Unconfigured;

        assert!(matches!(backend.get("k").await, Err(Error::NotConfigured)));
        assert!(matches!(backend.set("k", Bytes::new(), None).await, Err(Error::NotConfigured)));
        assert!(matches!(backend.ping().await, Err(Error::NotConfigured)));
        assert!(matches!(
            backend.set_if_absent_with_expiry("k", "t", Duration::from_secs(1)).await,
            Err(Error::NotConfigured)
        ));
    }
}
