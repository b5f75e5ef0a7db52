//! Core domain primitives shared by every module.

pub mod error;
pub mod time;

pub use error::DomainError;
pub use time::current_timestamp_ms;
