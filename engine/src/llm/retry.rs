//! Bounded retry around a single generation call.
//!
//! Retries only on transient errors (the service reporting throttling or
//! exhausted quota), with a fixed pause between attempts. Everything else
//! fails the turn on the first attempt. Either way the caller gets a tagged
//! [`GenerationOutcome`] rather than an error, and a failed turn carries the
//! apology to speak instead of any error detail.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{LLMError, LLMProvider};
use crate::clock::{Sleeper, TokioSleeper};
use crate::config::{ConversationConfig, RetryConfig};
use crate::conversation::reply::strip_emphasis;

/// Attempt budget and pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed pause before each retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            // A zero budget would never call the service at all
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Pause before retry number `attempt` (1-based count of failed attempts)
    ///
    /// Constant for now; kept as a function so a backoff curve can replace it.
    pub fn delay_for(&self, _attempt: u32) -> Duration {
        self.base_delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }
}

/// Progress through one `generate` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_delay: Duration,
}

impl RetryState {
    fn start(policy: &RetryPolicy) -> Self {
        Self {
            attempts_made: 0,
            max_attempts: policy.max_attempts,
            backoff_delay: policy.base_delay,
        }
    }

    fn can_retry(&self) -> bool {
        self.attempts_made < self.max_attempts
    }
}

/// How a `generate` call ended
#[derive(Debug)]
pub enum GenerationOutcome {
    /// Generated text with emphasis markers removed
    Reply(String),

    /// Every attempt hit a transient error
    Exhausted {
        attempts: u32,
        last_error: LLMError,
        apology: String,
    },

    /// A terminal or unclassified error ended the call
    Failed {
        attempts: u32,
        error: LLMError,
        apology: String,
    },
}

impl GenerationOutcome {
    /// Text to present to the user: the reply, or the apology
    pub fn text(&self) -> &str {
        match self {
            GenerationOutcome::Reply(reply) => reply,
            GenerationOutcome::Exhausted { apology, .. }
            | GenerationOutcome::Failed { apology, .. } => apology,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, GenerationOutcome::Reply(_))
    }

    /// Remote calls made before the outcome was decided
    pub fn attempts(&self) -> Option<u32> {
        match self {
            GenerationOutcome::Reply(_) => None,
            GenerationOutcome::Exhausted { attempts, .. }
            | GenerationOutcome::Failed { attempts, .. } => Some(*attempts),
        }
    }
}

/// Wraps a provider with the retry policy
pub struct GenerationRetrier {
    provider: Arc<dyn LLMProvider>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    apology: String,
}

impl GenerationRetrier {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        apology: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            policy,
            sleeper,
            apology: apology.into(),
        }
    }

    /// Build from config, sleeping on the tokio timer
    pub fn from_config(
        provider: Arc<dyn LLMProvider>,
        retry: &RetryConfig,
        conversation: &ConversationConfig,
    ) -> Self {
        Self::new(
            provider,
            RetryPolicy::from(retry),
            Arc::new(TokioSleeper),
            conversation.apology_reply.clone(),
        )
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Obtain a reply for `prompt`
    pub async fn generate(&self, prompt: &str) -> GenerationOutcome {
        let mut state = RetryState::start(&self.policy);

        loop {
            state.attempts_made += 1;

            let error = match self.provider.complete(prompt).await {
                Ok(text) => {
                    if state.attempts_made > 1 {
                        info!(
                            "{} succeeded on attempt {}",
                            self.provider.name(),
                            state.attempts_made
                        );
                    }
                    return GenerationOutcome::Reply(strip_emphasis(&text));
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                if error.is_classified() {
                    error!(
                        "{} failed on attempt {}: {}",
                        self.provider.name(),
                        state.attempts_made,
                        error
                    );
                } else {
                    error!(
                        "{} raised an unclassified error on attempt {}: {:?}",
                        self.provider.name(),
                        state.attempts_made,
                        error
                    );
                }
                return GenerationOutcome::Failed {
                    attempts: state.attempts_made,
                    error,
                    apology: self.apology.clone(),
                };
            }

            warn!(
                "{} returned a transient error on attempt {}/{}: {}",
                self.provider.name(),
                state.attempts_made,
                state.max_attempts,
                error
            );

            if !state.can_retry() {
                error!(
                    "All {} attempts exhausted. Last error: {}",
                    state.max_attempts, error
                );
                return GenerationOutcome::Exhausted {
                    attempts: state.attempts_made,
                    last_error: error,
                    apology: self.apology.clone(),
                };
            }

            state.backoff_delay = self.policy.delay_for(state.attempts_made);
            info!(
                "{} retrying in {:.1}s (attempt {}/{})",
                self.provider.name(),
                state.backoff_delay.as_secs_f64(),
                state.attempts_made + 1,
                state.max_attempts
            );
            self.sleeper.sleep(state.backoff_delay).await;
        }
    }
}
