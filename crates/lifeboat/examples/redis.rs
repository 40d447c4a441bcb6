// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Uses a Redis server as the remote backend.
//!
//! Run with `cargo run --example redis --features redis`. The server address is read from
//! `REDIS_URL` and defaults to `redis://127.0.0.1:6379`. Connecting fails if the server cannot be
//! reached at startup; later outages are absorbed by the local store.

use std::time::Duration;

use lifeboat::{Backend, Cache, RedisBackend, Ttl};
use tick::Clock;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let remote = RedisBackend::connect(&url, "lifeboat-example:").await?;

    let cache = Cache::builder(Clock::new_tokio()).remote(remote).build().await;
    if cache.active_backend() == Backend::Local {
        println!("{url} failed the health probe, serving from the local store");
    }

    cache.set("visits", "0", Ttl::minutes(10)).await;
    let visits = cache.increment("visits", 1).await;
    println!("visits: {visits:?}, expires: {:?}", cache.get_expire("visits").await);

    match cache.try_lock("example-job", Duration::from_secs(10), 3).await {
        Some(lock) => {
            println!("acquired {} with token {}", lock.name(), lock.token());
            cache.release_lock(&lock).await;
        }
        None => println!("another process holds the lock"),
    }

    println!("{:#?}", cache.stats());
    Ok(())
}
