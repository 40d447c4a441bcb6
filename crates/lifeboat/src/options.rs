// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default for [`CacheOptions::max_local_entries`].
pub const DEFAULT_MAX_LOCAL_ENTRIES: usize = 2000;
/// Default for [`CacheOptions::default_ttl`].
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
/// Default for [`CacheOptions::cleanup_interval`].
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default for [`CacheOptions::failure_threshold`].
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
/// Default for [`CacheOptions::health_probe_interval`].
pub const DEFAULT_HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Settings of a [`Cache`](crate::Cache).
///
/// With the `serde` feature the options deserialize from a flat table in which every field
/// is optional:
///
/// ```toml
/// max_local_entries = 2000
/// default_ttl_minutes = 60
/// cleanup_interval_minutes = 5
/// failure_threshold = 3
/// health_probe_interval_secs = 30
/// background_tasks = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheOptions {
    /// Hard capacity of the local store.
    pub max_local_entries: usize,
    /// Lifetime of values written with [`Ttl::Default`](crate::Ttl::Default). Zero means
    /// such values never expire.
    #[cfg_attr(feature = "serde", serde(rename = "default_ttl_minutes", with = "minutes"))]
    pub default_ttl: Duration,
    /// How often expired local entries are swept.
    #[cfg_attr(feature = "serde", serde(rename = "cleanup_interval_minutes", with = "minutes"))]
    pub cleanup_interval: Duration,
    /// Consecutive remote failures that switch the cache to its local store.
    pub failure_threshold: u32,
    /// How often the remote backend is probed.
    #[cfg_attr(feature = "serde", serde(rename = "health_probe_interval_secs", with = "seconds"))]
    pub health_probe_interval: Duration,
    /// Whether to spawn the health probe and sweep loops on the current Tokio runtime.
    pub background_tasks: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_local_entries: DEFAULT_MAX_LOCAL_ENTRIES,
            default_ttl: DEFAULT_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            health_probe_interval: DEFAULT_HEALTH_PROBE_INTERVAL,
            background_tasks: true,
        }
    }
}

impl CacheOptions {
    pub(crate) fn default_ttl(&self) -> Option<Duration> {
        Some(self.default_ttl).filter(|ttl| !ttl.is_zero())
    }
}

#[cfg(feature = "serde")]
mod minutes {
    use std::time::Duration;

    use serde::{Deserialize as _, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs() / 60)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let minutes = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(minutes.saturating_mul(60)))
    }
}

#[cfg(feature = "serde")]
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize as _, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = CacheOptions::default();

        assert_eq!(options.max_local_entries, 2000);
        assert_eq!(options.default_ttl, Duration::from_secs(3600));
        assert_eq!(options.cleanup_interval, Duration::from_secs(300));
        assert_eq!(options.failure_threshold, 3);
        assert_eq!(options.health_probe_interval, Duration::from_secs(30));
        assert!(options.background_tasks);
    }

    #[test]
    fn zero_default_ttl_means_never() {
        let options = CacheOptions {
            default_ttl: Duration::ZERO,
            ..CacheOptions::default()
        };

        assert_eq!(options.default_ttl(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_partial_table() {
        let options: CacheOptions = serde_json::from_str(r#"{ "default_ttl_minutes": 10, "health_probe_interval_secs": 5 }"#).unwrap();

        assert_eq!(options.default_ttl, Duration::from_secs(600));
        assert_eq!(options.health_probe_interval, Duration::from_secs(5));
        assert_eq!(options.max_local_entries, DEFAULT_MAX_LOCAL_ENTRIES);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_in_configuration_units() {
        let json = serde_json::to_value(CacheOptions::default()).unwrap();

        assert_eq!(json["default_ttl_minutes"], 60);
        assert_eq!(json["cleanup_interval_minutes"], 5);
        assert_eq!(json["health_probe_interval_secs"], 30);
    }
}
