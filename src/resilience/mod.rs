//! Resilience primitives: retry with backoff and remote health tracking.

pub mod health;
pub mod retry;

pub use health::RemoteHealth;
pub use retry::{retry, RetryConfig};
