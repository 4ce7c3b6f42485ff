//! Basic example using the in-memory backend.
//!
//! This example demonstrates:
//! - Enqueueing JSON payloads from a client
//! - Draining a queue with a worker loop
//! - Retrying failed items and reading the success and error logs
//!
//! Run with: `cargo run -p demo-basic`

use convoy_core::{
    Client, ConvoyConfig, Item, MemoryBackend, TaskError, TaskResult, Worker, WorkerConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Order fulfilment payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Order {
    sku: String,
    quantity: u32,
}

/// Ship an order. Orders for more than 10 units are rejected on the first try.
async fn ship_order(item: Item) -> TaskResult {
    let order: Order = item.meta_json()?;
    println!(
        "[orders] attempt={} sku={} quantity={}",
        item.attempts, order.sku, order.quantity
    );

    tokio::time::sleep(Duration::from_millis(100)).await;

    if order.quantity > 10 && item.attempts < 2 {
        return Err(TaskError::new(format!("not enough stock for {}", order.sku)));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> convoy_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("convoy example\n");

    let client = Client::new(MemoryBackend::new(), ConvoyConfig::default());

    let orders = vec![
        Order {
            sku: "A1".to_string(),
            quantity: 1,
        },
        Order {
            sku: "B2".to_string(),
            quantity: 25,
        },
        Order {
            sku: "C3".to_string(),
            quantity: 3,
        },
    ];

    for order in &orders {
        let id = client.enqueue_json("orders", order).await?;
        println!("  enqueued: {}", id);
    }
    println!("\nPending: {}\n", client.pending_len("orders").await?);

    let running = Arc::new(AtomicBool::new(true));
    let worker = Worker::new(
        client.clone(),
        WorkerConfig::builder()
            .queue("orders")
            .poll_interval(Duration::from_millis(50))
            .build(),
        ship_order,
        Arc::clone(&running),
    );
    let handle = tokio::spawn(async move { worker.run().await });

    wait_for_idle(&client).await?;

    let failed = client.report_errors("orders", None).await?;
    for id in &failed {
        if let Some(item) = client.status("orders", id.as_str()).await? {
            println!("[orders] retrying {} after: {:?}", id, item.last_error());
        }
        client.retry("orders", id.as_str()).await?;
    }

    wait_for_idle(&client).await?;
    running.store(false, Ordering::SeqCst);
    if let Ok(result) = handle.await {
        result?;
    }

    println!("\nSucceeded: {}", client.count_successes("orders").await?);
    println!("Failed:    {}", client.count_errors("orders").await?);
    for id in client.report_successes("orders", None).await? {
        if let Some(item) = client.status("orders", id.as_str()).await? {
            println!("  {} attempts={} errors={:?}", id, item.attempts, item.errors);
        }
    }

    Ok(())
}

/// Wait until nothing is pending or in flight.
async fn wait_for_idle(client: &Client) -> convoy_core::Result<()> {
    loop {
        let busy = client.pending_len("orders").await? + client.processing_len("orders").await?;
        if busy == 0 {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
