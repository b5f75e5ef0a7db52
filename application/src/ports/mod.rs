//! Ports (interfaces) consumed by the application layer.
//!
//! Adapters implementing these traits live outside this workspace.

pub mod agent_gateway;

pub use agent_gateway::{AgentGateway, GatewayError};
