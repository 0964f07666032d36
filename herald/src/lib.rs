//! Reliable message publishing.
//!
//! [`Herald`] reads the RON configuration, wires the
//! [`herald_delivery`] stack around a broker client and runs the background
//! cleanup of retry contexts and traces until shutdown.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use herald_delivery::{MemoryBroker, Message};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let running = herald::config::load()?.start(Arc::new(MemoryBroker::new()))?;
//!
//! let publisher = running.delivery().publisher.clone();
//! tokio::spawn(async move {
//!     publisher
//!         .publish(Message::new("orders.created", b"{}".to_vec()))
//!         .await
//! });
//!
//! running.run_until_signalled().await
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("Only unix targets are currently supported");

pub mod config;
pub mod controller;

pub use config::ConfigError;
pub use controller::{Delivery, Herald, Running};
pub use herald_delivery as delivery;
