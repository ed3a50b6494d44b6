//! Conversation loop
//!
//! This module contains the turn orchestrator and the state it owns:
//! - Turn orchestration (listen, guard, generate, record, speak)
//! - Bounded conversation memory and prompt rendering
//! - Reply post-processing for speech output

pub mod memory;
pub mod orchestrator;
pub mod reply;

pub use memory::{ConversationMemory, ConversationTurn};
pub use orchestrator::{SessionStats, TurnOrchestrator, TurnOutcome, TurnSettings};
pub use reply::LabelStripper;
