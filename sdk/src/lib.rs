//! Parley SDK
//!
//! Shared error and data types used by the Parley engine and by anything
//! that plugs a speech or generation backend into it.

/// Error types and handling
pub mod errors;

/// Conversation and speech types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, ParleyErrorExt};
pub use types::{ListenOutcome, Role, SpeechFailure, Utterance};
