// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Walks a cache through an outage of its remote backend.
//!
//! Run with `cargo run --example failover --features test-util` and set `RUST_LOG=debug` to
//! see every routing decision.

use std::time::Duration;

use lifeboat::testing::MockRemote;
use lifeboat::{Cache, Ttl};
use tick::Clock;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let clock = Clock::new_tokio();
    let remote = MockRemote::new(&clock);

    let cache = Cache::builder(clock)
        .remote(remote.clone())
        .failure_threshold(2)
        .health_probe_interval(Duration::from_millis(500))
        .build()
        .await;

    cache.set("greeting", "hello from remote", Ttl::minutes(5)).await;
    println!("backend: {}, value: {:?}", cache.active_backend(), cache.get("greeting").await);

    // The outage: every call fails, the cache serves from its local store.
    remote.fail_when(|_| true);
    for _ in 0..2 {
        cache.get("greeting").await;
    }
    cache.set("greeting", "hello from local", Ttl::minutes(5)).await;
    println!("backend: {}, value: {:?}", cache.active_backend(), cache.get("greeting").await);

    if let Some(lock) = cache.try_lock("nightly-report", Duration::from_secs(30), 0).await {
        println!("holding {} lock {}", if lock.is_distributed() { "distributed" } else { "local" }, lock.name());
        cache.release_lock(&lock).await;
    }

    // Recovery: the background probe switches back within one interval.
    remote.clear_failures();
    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("backend: {}, value: {:?}", cache.active_backend(), cache.get("greeting").await);

    println!("{:#?}", cache.stats());
    cache.shutdown();
}
