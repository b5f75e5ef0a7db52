//! Discussion entities and the run result.

pub mod entities;
pub mod result;

pub use entities::{
    DiscussionError, DiscussionState, DiscussionStatus, Message, Participant,
    TRANSCRIPT_MIRROR_KEY,
};
pub use result::DiscussionResult;
