//! Primitives shared by every herald crate: logging setup, the span-scoped
//! logging macros and the shutdown signal broadcast between services.

pub mod logging;

pub use tracing;

/// Lifecycle signal broadcast to long-running services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
