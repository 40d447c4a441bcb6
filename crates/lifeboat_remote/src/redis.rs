// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Redis implementation of [`RemoteBackend`].

use std::time::Duration;

use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands as _, RedisError, Script};

use crate::{Error, Expiration, RemoteBackend, Result};

/// Default namespace applied to every key.
pub const DEFAULT_KEY_PREFIX: &str = "lifeboat:";

const ACQUIRE_SCRIPT: &str = r"
if redis.call('setnx', KEYS[1], ARGV[1]) == 1 then
    redis.call('pexpire', KEYS[1], ARGV[2])
    return 1
end
return 0
";

const RELEASE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
end
return 0
";

/// A [`RemoteBackend`] backed by a Redis server.
///
/// Uses a [`ConnectionManager`], which multiplexes calls over one connection and reconnects
/// transparently after a failure. Clones share that connection.
///
/// Every key is stored under a prefix so several applications can share one database.
/// [`flush`](RemoteBackend::flush) clears the whole logical database, not just the prefix.
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
    key_prefix: String,
    acquire: Script,
    release: Script,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connects to the server at `url` (for example `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the first connection attempt fails.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(map_error)?;
        let connection = ConnectionManager::new(client).await.map_err(map_error)?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
            acquire: Script::new(ACQUIRE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        })
    }

    /// Returns the prefix applied to every key.
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

impl RemoteBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut connection = self.connection.clone();
        let value: Option<Vec<u8>> = connection.get(self.key(key)).await.map_err(map_error)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let mut connection = self.connection.clone();
        let mut command = redis::cmd("SET");
        command.arg(self.key(key)).arg(value.as_ref());

        if let Some(ttl) = ttl {
            command.arg("PX").arg(millis(ttl));
        }

        let (): () = command.query_async(&mut connection).await.map_err(map_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut connection = self.connection.clone();
        let removed: u64 = connection.del(self.key(key)).await.map_err(map_error)?;
        Ok(removed > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut connection = self.connection.clone();
        let keys: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
        connection.del(keys).await.map_err(map_error)
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        let mut connection = self.connection.clone();
        connection.exists(self.key(key)).await.map_err(map_error)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut connection = self.connection.clone();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(self.key(key))
            .arg(millis(ttl))
            .query_async(&mut connection)
            .await
            .map_err(map_error)?;
        Ok(updated == 1)
    }

    async fn time_to_live(&self, key: &str) -> Result<Expiration> {
        let mut connection = self.connection.clone();
        let remaining: i64 = redis::cmd("PTTL")
            .arg(self.key(key))
            .query_async(&mut connection)
            .await
            .map_err(map_error)?;

        match remaining {
            -2 => Ok(Expiration::Missing),
            -1 => Ok(Expiration::Persistent),
            ms if ms >= 0 => Ok(Expiration::Remaining(Duration::from_millis(ms.unsigned_abs()))),
            other => Err(Error::Protocol(format!("unexpected PTTL reply {other}"))),
        }
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let mut connection = self.connection.clone();
        connection.incr(self.key(key), delta).await.map_err(map_error)
    }

    async fn set_if_absent_with_expiry(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut connection = self.connection.clone();
        let acquired: i64 = self
            .acquire
            .key(self.key(key))
            .arg(token)
            .arg(millis(ttl))
            .invoke_async(&mut connection)
            .await
            .map_err(map_error)?;
        Ok(acquired == 1)
    }

    async fn delete_if_equals(&self, key: &str, token: &str) -> Result<bool> {
        let mut connection = self.connection.clone();
        let released: i64 = self
            .release
            .key(self.key(key))
            .arg(token)
            .invoke_async(&mut connection)
            .await
            .map_err(map_error)?;
        Ok(released == 1)
    }

    async fn flush(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        let (): () = redis::cmd("FLUSHDB").query_async(&mut connection).await.map_err(map_error)?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        let reply: String = redis::cmd("PING").query_async(&mut connection).await.map_err(map_error)?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(Error::Protocol(format!("expected PONG, got {reply}")))
        }
    }
}

/// Longest expiry sent to the server. Redis rejects deadlines that overflow its clock.
const MAX_EXPIRY: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 1000);

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.min(MAX_EXPIRY).as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_error(error: RedisError) -> Error {
    if error.is_timeout() {
        Error::Timeout
    } else if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal() {
        Error::unreachable(error)
    } else {
        Error::Protocol(error.to_string())
    }
}
