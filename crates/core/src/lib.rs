//! # convoy-core - Core types and engine for the convoy job queue
//!
//! Producers enqueue opaque items into named queues; workers atomically
//! claim them, run an executor, and the outcome lands in a per-queue
//! success or error log with bounded record retention.
//!
//! This crate provides:
//! - `Backend` trait for storage implementations, plus `MemoryBackend`
//! - `Client`, the lifecycle engine (enqueue, process, retry, requeue, reports)
//! - `Item`, `ItemId`, `Outcome` and the record encoding
//! - `Worker` and `Sweeper` loops
//! - Error and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use convoy_core::{verdict, Client, ConvoyConfig, Item, MemoryBackend};
//!
//! #[tokio::main]
//! async fn main() -> convoy_core::Result<()> {
//!     let client = Client::new(MemoryBackend::new(), ConvoyConfig::default());
//!
//!     let id = client.enqueue("orders", r#"{"sku":"A1"}"#).await?;
//!     let processed = client
//!         .process_next("orders", |item: Item| async move { verdict(!item.meta.is_empty()) })
//!         .await?;
//!
//!     assert!(processed.is_success());
//!     assert_eq!(client.status("orders", id.as_str()).await?.unwrap().attempts, 1);
//!     Ok(())
//! }
//! ```

mod backend;
mod client;
mod config;
mod error;
mod item;
mod keys;
mod memory;
mod sweeper;
mod worker;

// Re-export main types
pub use backend::{Backend, DynBackend, SharedBackend};
pub use client::{Client, Processed};
pub use config::{
    retention_millis, ConvoyConfig, ConvoyConfigBuilder, SweeperConfig, SweeperConfigBuilder,
    WorkerConfig, WorkerConfigBuilder, DEFAULT_RETENTION, MAX_RETENTION,
};
pub use error::{ConvoyError, Result};
pub use item::{fields, now_millis, Item, ItemId, Outcome};
pub use keys::{QueueKeys, QueueSet};
pub use memory::MemoryBackend;
pub use sweeper::Sweeper;
pub use worker::{generate_worker_id, verdict, TaskError, TaskResult, Worker};
