//! Bounded resending of failed publishes.
//!
//! [`RetryService`] keeps one retry context per message id and
//! resends through a [`MessageSender`](crate::sender::MessageSender) after a
//! delay computed by [`RetryPolicy`]. It never forwards exhausted messages
//! anywhere itself; see [`ReliablePublisher`](crate::publisher::ReliablePublisher)
//! for the composition with dead-lettering.

mod context;
mod policy;
mod service;

pub use context::RetryContextSnapshot;
pub use policy::{RetryPolicy, RetryStrategy};
pub use service::{RetryHandle, RetryOutcome, RetryService};
