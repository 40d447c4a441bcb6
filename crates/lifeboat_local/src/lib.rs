// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Bounded, TTL-aware in-process key-value store.
//!
//! [`LocalStore`] is the store the `lifeboat` cache serves from while its remote backend is
//! considered unhealthy. It is a plain concurrent map with three properties:
//!
//! - **Hard capacity bound.** [`LocalStore::put`] returns `false` when the store is full.
//!   Nothing is evicted; a `false` means "cache full", not "retry".
//! - **Absolute deadlines.** A [`Ttl`] is converted to a deadline on the injected clock at
//!   insertion time and never recomputed.
//! - **Lazy and periodic expiry.** Reads ignore and remove expired entries immediately;
//!   [`LocalStore::run_sweeper`] removes the rest on a fixed period.
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use lifeboat_local::{LocalStore, Ttl};
//! use tick::Clock;
//!
//! let store = LocalStore::<Bytes>::builder(Clock::new_frozen()).max_entries(2).build();
//!
//! assert!(store.put("a", "1".into(), Ttl::minutes(5)));
//! assert!(store.put("b", "2".into(), Ttl::Never));
//! assert!(!store.put("c", "3".into(), Ttl::Never), "store is full");
//!
//! assert_eq!(store.get("a").as_deref(), Some(&b"1"[..]));
//! assert_eq!(store.stats().hits, 1);
//! ```

mod builder;
mod stats;
mod store;
mod sweeper;
mod ttl;

pub use builder::{DEFAULT_MAX_ENTRIES, LocalStoreBuilder};
pub use stats::LocalStats;
pub use store::LocalStore;
pub use ttl::Ttl;
