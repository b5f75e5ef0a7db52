//! Early-termination rule chain

pub mod manager;
pub mod rule;

pub use manager::TerminationManager;
pub use rule::{
    TerminationConfig, TerminationContext, TerminationOverrides, TerminationRule,
    TerminationSignal,
};
