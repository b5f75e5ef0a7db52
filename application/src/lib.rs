//! Application layer for conclave
//!
//! This crate contains the discussion engine, the resource dispatcher, the
//! retry helper, and port definitions. It depends only on the domain layer;
//! transports plug in behind [`ports::AgentGateway`].

pub mod dispatch;
pub mod engine;
pub mod ports;
pub mod retry;
pub mod signal;

// Re-export commonly used types
pub use dispatch::{DispatchError, DispatchOptions, ResourceDispatcher, ShutdownOptions};
pub use engine::{DiscussionEngine, EngineError, EngineHandle};
pub use ports::{AgentGateway, GatewayError};
pub use retry::{RetryError, RetryPolicy, Retryable, with_retry, with_retry_if};
