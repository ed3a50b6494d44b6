//! Parley Engine Library
//!
//! This library provides the core functionality of the Parley voice
//! assistant. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Time sources and sleepers
pub mod clock;

/// Input validation module
pub mod sanitizer;

/// Rate limiting module
pub mod rate_limiter;

/// Generation provider abstraction layer
pub mod llm;

/// Conversation loop module
pub mod conversation;

/// Audio capture and playback
pub mod audio;

/// Speech recognition and synthesis collaborators
pub mod speech;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
