// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring local stores.

use std::borrow::Cow;
use std::marker::PhantomData;
use std::time::Duration;

use tick::Clock;

use crate::LocalStore;

/// Capacity used when [`LocalStoreBuilder::max_entries`] is not called.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

const DEFAULT_NAME: &str = "local";

/// Builder for a [`LocalStore`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use lifeboat_local::LocalStore;
/// use tick::Clock;
///
/// let store = LocalStore::<String>::builder(Clock::new_frozen())
///     .max_entries(500)
///     .default_ttl(Duration::from_secs(3600))
///     .name("sessions")
///     .build();
///
/// assert_eq!(store.max_entries(), 500);
/// ```
#[derive(Debug)]
pub struct LocalStoreBuilder<V> {
    pub(crate) clock: Clock,
    pub(crate) max_entries: usize,
    pub(crate) default_ttl: Option<Duration>,
    pub(crate) name: Cow<'static, str>,
    _value: PhantomData<V>,
}

impl<V> LocalStoreBuilder<V> {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            clock,
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl: None,
            name: Cow::Borrowed(DEFAULT_NAME),
            _value: PhantomData,
        }
    }

    /// Sets the hard capacity bound.
    ///
    /// Once this many keys are stored, inserting a new key fails until an entry is removed or
    /// expires.
    #[must_use]
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the lifetime applied to values inserted with [`Ttl::Default`](crate::Ttl::Default).
    ///
    /// Without a default TTL such values never expire.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl).filter(|ttl| !ttl.is_zero());
        self
    }

    /// Sets the name reported in log events.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the store.
    #[must_use]
    pub fn build(self) -> LocalStore<V> {
        LocalStore::from_builder(self)
    }
}
