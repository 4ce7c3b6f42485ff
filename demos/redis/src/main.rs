//! Redis backend example with workers, stuck-item recovery and retries.
//!
//! This example demonstrates:
//! - Using Redis as a shared, multi-process backend
//! - Running two workers and a sweeper against one queue
//! - Retrying items from the error log
//! - Graceful shutdown on Ctrl+C
//!
//! Prerequisites:
//! - Redis server running on localhost:6379
//!
//! Run with: `cargo run -p demo-redis`

use convoy_core::{
    Client, ConvoyConfig, Item, Sweeper, SweeperConfig, TaskError, TaskResult, Worker,
    WorkerConfig,
};
use convoy_redis::RedisBackend;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const QUEUE: &str = "webhooks";

/// Webhook delivery payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Webhook {
    url: String,
    event: String,
    /// For demo: fail this many attempts before delivering
    fail_count: u32,
}

/// Deliver a webhook, failing the first `fail_count` attempts.
async fn deliver(item: Item) -> TaskResult {
    let hook: Webhook = item.meta_json()?;
    println!("[webhook] attempt={} url={} event={}", item.attempts, hook.url, hook.event);

    tokio::time::sleep(Duration::from_millis(300)).await;

    if item.attempts <= hook.fail_count {
        println!("[webhook] failed\n");
        return Err(TaskError::new("connection timeout"));
    }

    println!("[webhook] delivered\n");
    Ok(())
}

#[tokio::main]
async fn main() -> convoy_core::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("convoy Redis example\n");

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost".to_string());
    let config = ConvoyConfig::builder()
        .url(redis_url.as_str())
        .retention(Duration::from_secs(3600))
        .build();

    println!("Connecting to {}...", redis_url);

    let backend = match RedisBackend::from_config(&config).await {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Failed to connect: {}", e);
            eprintln!("Make sure Redis is running: docker run -d -p 6379:6379 redis");
            return Err(e);
        }
    };

    println!("Connected\n");

    let client = Client::new(backend, config);

    let hooks = vec![
        Webhook {
            url: "https://api.example.com/orders".to_string(),
            event: "order.completed".to_string(),
            fail_count: 0,
        },
        Webhook {
            url: "https://api.example.com/billing".to_string(),
            event: "invoice.paid".to_string(),
            fail_count: 1,
        },
    ];

    for hook in &hooks {
        let id = client.enqueue_json(QUEUE, hook).await?;
        println!("enqueued: {} ({})", id, hook.event);
    }

    println!("\nPending: {}", client.pending_len(QUEUE).await?);
    println!("Press Ctrl+C to stop\n");

    let running = Arc::new(AtomicBool::new(true));
    let mut handles = Vec::new();

    for _ in 0..2 {
        let worker = Worker::new(
            client.clone(),
            WorkerConfig::builder().queue(QUEUE).build(),
            deliver,
            Arc::clone(&running),
        );
        handles.push(tokio::spawn(async move { worker.run().await }));
    }

    let sweeper = Sweeper::new(
        client.clone(),
        SweeperConfig::builder()
            .queue(QUEUE)
            .interval(Duration::from_secs(10))
            .stuck_after(Duration::from_secs(30))
            .build(),
        Arc::clone(&running),
    );
    handles.push(tokio::spawn(async move { sweeper.run().await }));

    // Failed deliveries go back to pending until they succeed.
    let mut retry_tick = tokio::time::interval(Duration::from_secs(2));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = retry_tick.tick() => {
                for id in client.report_errors(QUEUE, None).await? {
                    if client.retry(QUEUE, id.as_str()).await? {
                        tracing::info!(item_id = %id, "Retrying failed delivery");
                    }
                }
            }
        }
    }

    println!("\nShutting down...");
    running.store(false, Ordering::SeqCst);
    for handle in handles {
        if let Ok(result) = handle.await {
            result?;
        }
    }

    println!("Delivered: {}", client.count_successes(QUEUE).await?);
    println!("Failed:    {}", client.count_errors(QUEUE).await?);
    Ok(())
}
