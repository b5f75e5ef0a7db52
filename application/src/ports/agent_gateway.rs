//! Agent gateway port
//!
//! Defines the interface for talking to the external agent transport.
//! Implementations (adapters) live outside this workspace.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during agent gateway operations
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout")]
    Timeout,

    #[error("Cancelled")]
    Cancelled,

    #[error("Shutting down")]
    ShuttingDown,

    #[error("Other error: {0}")]
    Other(String),
}

impl GatewayError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GatewayError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout)
    }

    /// Short tag recorded in per-agent error entries
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Connection(_) => "connection",
            GatewayError::Session(_) => "session",
            GatewayError::RequestFailed(_) => "request_failed",
            GatewayError::Timeout => "timeout",
            GatewayError::Cancelled => "cancelled",
            GatewayError::ShuttingDown => "shutting_down",
            GatewayError::Other(_) => "other",
        }
    }
}

/// Gateway for external agent calls
///
/// Every method takes a cancellation token and must observe it: a fired
/// token makes the call return [`GatewayError::Cancelled`] promptly instead
/// of running to completion.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Send a prompt to the given agent inside an existing sub-conversation
    /// and return its textual reply
    async fn prompt_agent(
        &self,
        agent_kind: &str,
        prompt: &str,
        session_id: &str,
        token: &CancellationToken,
    ) -> Result<String, GatewayError>;

    /// Create a dedicated sub-conversation under `parent_id`, returning its id
    async fn create_sub_conversation(
        &self,
        parent_id: &str,
        title: &str,
        token: &CancellationToken,
    ) -> Result<String, GatewayError>;

    /// Delete a sub-conversation; used during cleanup
    async fn delete_sub_conversation(&self, id: &str) -> Result<(), GatewayError>;
}
