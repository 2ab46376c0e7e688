//! Function Cache demo
//!
//! Memoizes a slow computation to show misses, hits, notifications and
//! group expiry.

use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use function_cache::{computation, on_delete, on_set, ConfigUpdate, FunctionCache, GetOptions};

/// Entry point for the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Configure notifications on the global cache (event names from env)
/// 3. Compute, hit, delete and expire a memoized result
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "function_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cache = FunctionCache::global();
    cache.configure(
        ConfigUpdate::new()
            .on_set(on_set(|event| {
                info!(event = event.event_name, key = %event.key, ttl_ms = event.ttl.as_millis() as u64, "set");
                Ok(())
            }))
            .on_delete(on_delete(|event| {
                info!(event = event.event_name, key1 = %event.key1, "delete");
                Ok(())
            })),
    );
    info!(config = ?cache.config(), "Cache configured");

    let slow_sum = computation!(|(a, b): (u64, u64)| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, anyhow::Error>(a + b)
    });
    let options = GetOptions::new().with_ttl(Duration::from_millis(500));

    for round in 1..=2 {
        let started = Instant::now();
        let sum = cache
            .get(&slow_sum, (2, 3), options.clone())
            .await
            .context("computing slow sum")?;
        info!(round, value = sum.get(), elapsed_ms = started.elapsed().as_millis() as u64, "get");
    }

    cache
        .delete(&slow_sum, Some(&(2, 3)), Default::default())
        .context("deleting slow sum")?;

    cache
        .get(&slow_sum, (4, 5), options)
        .await
        .context("computing slow sum")?;
    tokio::time::sleep(Duration::from_millis(600)).await;

    info!(stats = ?cache.stats(), "Done");
    Ok(())
}
