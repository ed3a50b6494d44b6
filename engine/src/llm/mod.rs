//! Generation Provider Abstraction Layer
//!
//! This module provides the interface the conversation loop uses to obtain a
//! reply from a remote language model. The `LLMProvider` trait defines the
//! contract; [`gemini::GeminiProvider`] talks to the Gemini API and
//! [`mock::ScriptedProvider`] replays canned results for tests. The
//! [`retry::GenerationRetrier`] wraps any provider with bounded retry.

use async_trait::async_trait;

pub mod gemini;
pub mod mock;
pub mod retry;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
///
/// Every variant is either transient (worth retrying after a pause) or
/// terminal. See [`LLMError::is_transient`].
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl LLMError {
    /// Whether the service signalled throttling or exhausted capacity
    ///
    /// Only this class is retried; everything else fails the turn at once.
    pub fn is_transient(&self) -> bool {
        matches!(self, LLMError::RateLimitExceeded)
    }

    /// Whether the error was classified by the provider at all
    pub fn is_classified(&self) -> bool {
        !matches!(self, LLMError::Unknown(_))
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "gemini")
    fn name(&self) -> &str;

    /// Generate a completion for a fully rendered prompt
    ///
    /// # Arguments
    /// * `prompt` - Conversation history plus the new user turn, one turn per line
    ///
    /// # Returns
    /// * `Ok(String)` - The raw generated text
    /// * `Err(LLMError)` - A classified failure
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Check if the provider is currently healthy and available
    /// Default implementation returns true.
    async fn check_health(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_throttling_is_transient() {
        assert!(LLMError::RateLimitExceeded.is_transient());

        for error in [
            LLMError::ProviderUnavailable("503".to_string()),
            LLMError::AuthenticationFailed("bad key".to_string()),
            LLMError::InvalidRequest("bad field".to_string()),
            LLMError::NetworkError("reset".to_string()),
            LLMError::Timeout,
            LLMError::ParseError("no candidates".to_string()),
            LLMError::Unknown("?".to_string()),
        ] {
            assert!(!error.is_transient(), "{} should be terminal", error);
        }
    }

    #[test]
    fn test_unknown_is_unclassified() {
        assert!(!LLMError::Unknown("panic in provider".to_string()).is_classified());
        assert!(LLMError::Timeout.is_classified());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(LLMError::RateLimitExceeded.to_string(), "Rate limit exceeded");
        assert_eq!(
            LLMError::InvalidRequest("x".to_string()).to_string(),
            "Invalid request: x"
        );
    }
}
