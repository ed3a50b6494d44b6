//! Error types and handling
//!
//! This module provides the process-level error type used by the Parley
//! engine for everything outside the turn pipeline itself: configuration,
//! credential storage, audio devices and file I/O. All errors implement the
//! `ParleyErrorExt` trait which provides user-friendly hints and indicates
//! whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry credential values. Callers that format remote
//! service responses into an error must scrub them first.

use thiserror::Error;

/// Trait for Parley error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait ParleyErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to print and does not contain secrets or internal
    /// implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors need the operator to change configuration or hardware.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Credentials**: Keychain and environment lookups
/// - **Audio**: Capture and playback devices
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ParleyErrorExt};
///
/// let error = EngineError::AudioDevice("no input device".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(!error.is_recoverable());
///
/// let error = EngineError::Audio("stream closed".to_string());
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Path expansion failed for {0:?}: {1}")]
    PathExpansion(std::path::PathBuf, String),

    // Credential errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    // Audio errors
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio error: {0}")]
    Audio(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParleyErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::PathExpansion(_, _) => "Invalid path specified in config.toml",

            // Credential errors
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::MissingCredential(_) => {
                "Set PARLEY_GOOGLE_API_KEY, or run 'parley chat' to be prompted for it"
            }

            // Audio errors
            Self::AudioDevice(_) => "No usable microphone or speaker. Try 'parley chat' instead",
            Self::Audio(_) => "Audio capture or playback failed. Try again",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::PathExpansion(_, _)
            | Self::MissingCredential(_)
            | Self::AudioDevice(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
