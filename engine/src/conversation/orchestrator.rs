//! Turn Orchestrator
//!
//! Drives the conversation one turn at a time:
//!
//! 1. Listen for an utterance
//! 2. End the session if it contains an exit keyword
//! 3. Drop empty or rejected input without calling anything else
//! 4. Ask the rate limiter; on denial speak the "try again later" reply and pause
//! 5. Render the prompt from memory and generate with bounded retry
//! 6. Record the exchange in memory (successful replies only)
//! 7. Speak the reply with role labels removed
//!
//! Nothing in a turn is fatal. Speech failures are logged and the loop
//! carries on; the only way out is the exit keyword.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::memory::ConversationMemory;
use super::reply::LabelStripper;
use crate::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::config::{Config, ConversationConfig};
use crate::llm::retry::{GenerationOutcome, GenerationRetrier};
use crate::llm::LLMProvider;
use crate::rate_limiter::RateLimiter;
use crate::sanitizer::{Sanitizer, Validation};
use crate::speech::{Synthesizer, Transcriber};

/// What one turn did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// An exit keyword was heard
    Terminated,

    /// Silence, a failed listen, or whitespace
    NoInput,

    /// The sanitizer refused the utterance
    Rejected,

    /// The rate limiter denied the request; the rate-limit reply was spoken
    RateLimited,

    /// A generated reply was recorded and spoken
    Replied { spoken: String },

    /// Generation failed or ran out of attempts; the apology was spoken
    Degraded { spoken: String },
}

/// Canned replies and exit keywords
#[derive(Debug, Clone)]
pub struct TurnSettings {
    exit_keywords: Vec<String>,
    rate_limited_reply: String,
}

impl TurnSettings {
    pub fn new(exit_keywords: Vec<String>, rate_limited_reply: impl Into<String>) -> Self {
        Self {
            exit_keywords: exit_keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            rate_limited_reply: rate_limited_reply.into(),
        }
    }

    /// Whether `text` contains any exit keyword, ignoring case
    pub fn is_exit(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.exit_keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from(&ConversationConfig::default())
    }
}

impl From<&ConversationConfig> for TurnSettings {
    fn from(config: &ConversationConfig) -> Self {
        Self::new(
            config.exit_keywords.clone(),
            config.rate_limited_reply.clone(),
        )
    }
}

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub turns: usize,
    pub replies: usize,
    pub degraded: usize,
    pub rate_limited: usize,
    pub ignored: usize,
    pub speech_failures: usize,
}

/// Owns every piece of conversation state and runs the loop
pub struct TurnOrchestrator {
    transcriber: Box<dyn Transcriber>,
    synthesizer: Box<dyn Synthesizer>,
    sanitizer: Sanitizer,
    limiter: RateLimiter,
    memory: ConversationMemory,
    retrier: GenerationRetrier,
    stripper: LabelStripper,
    settings: TurnSettings,
    sleeper: Arc<dyn Sleeper>,
    stats: SessionStats,
}

impl TurnOrchestrator {
    /// Assemble an orchestrator from its parts
    ///
    /// Uses default exit keywords and replies and sleeps on the tokio timer;
    /// see [`with_settings`](Self::with_settings) and
    /// [`with_sleeper`](Self::with_sleeper).
    pub fn new(
        transcriber: Box<dyn Transcriber>,
        synthesizer: Box<dyn Synthesizer>,
        sanitizer: Sanitizer,
        limiter: RateLimiter,
        memory: ConversationMemory,
        retrier: GenerationRetrier,
    ) -> Result<Self> {
        let stripper = LabelStripper::new([
            memory.label(sdk::Role::User),
            memory.label(sdk::Role::Assistant),
        ])?;

        Ok(Self {
            transcriber,
            synthesizer,
            sanitizer,
            limiter,
            memory,
            retrier,
            stripper,
            settings: TurnSettings::default(),
            sleeper: Arc::new(TokioSleeper),
            stats: SessionStats::default(),
        })
    }

    /// Build everything from config around the given collaborators
    pub fn from_config(
        config: &Config,
        transcriber: Box<dyn Transcriber>,
        synthesizer: Box<dyn Synthesizer>,
        provider: Arc<dyn LLMProvider>,
    ) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let orchestrator = Self::new(
            transcriber,
            synthesizer,
            Sanitizer::with_max_chars(config.sanitizer.max_chars)?,
            RateLimiter::from_config(&config.rate_limit, clock),
            ConversationMemory::from_config(&config.memory),
            GenerationRetrier::from_config(provider, &config.retry, &config.conversation),
        )?;

        Ok(orchestrator.with_settings(TurnSettings::from(&config.conversation)))
    }

    pub fn with_settings(mut self, settings: TurnSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sleeper used for the pause after a rate-limit denial
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run turns until an exit keyword is heard
    pub async fn run(&mut self) -> SessionStats {
        let session = Uuid::new_v4();
        let span = tracing::info_span!("session", id = %session);

        async {
            info!("Conversation started");
            loop {
                if self.step().await == TurnOutcome::Terminated {
                    break;
                }
            }
            info!(
                "Conversation ended after {} turns ({} replies, {} degraded, {} rate limited)",
                self.stats.turns, self.stats.replies, self.stats.degraded, self.stats.rate_limited
            );
        }
        .instrument(span)
        .await;

        self.stats
    }

    /// Listen once and handle what was heard
    pub async fn step(&mut self) -> TurnOutcome {
        let heard = self.transcriber.listen().await;
        if let sdk::ListenOutcome::Failed(failure) = &heard {
            debug!("Listen produced no text: {}", failure);
        }
        self.handle_utterance(&heard.into_text()).await
    }

    /// Run one turn for already-transcribed text
    pub async fn handle_utterance(&mut self, raw: &str) -> TurnOutcome {
        self.stats.turns += 1;

        if self.settings.is_exit(raw) {
            info!("Exit keyword heard, ending conversation");
            return TurnOutcome::Terminated;
        }

        let utterance = match self.sanitizer.validate(raw) {
            Validation::Valid(utterance) => utterance,
            Validation::Empty => {
                self.stats.ignored += 1;
                return TurnOutcome::NoInput;
            }
            Validation::Rejected(_) => {
                self.stats.ignored += 1;
                return TurnOutcome::Rejected;
            }
        };

        if !self.limiter.allow() {
            self.stats.rate_limited += 1;
            let reply = self.settings.rate_limited_reply.clone();
            self.say(&reply).await;
            self.sleeper.sleep(self.limiter.cooldown()).await;
            return TurnOutcome::RateLimited;
        }

        let prompt = self.memory.render_prompt(&utterance.text);
        let outcome = self.retrier.generate(&prompt).await;

        match outcome {
            GenerationOutcome::Reply(reply) => {
                self.memory.record(&utterance.text, &reply);
                let spoken = self.stripper.for_speech(&reply);
                self.stats.replies += 1;
                self.say(&spoken).await;
                TurnOutcome::Replied { spoken }
            }
            degraded => {
                match &degraded {
                    GenerationOutcome::Exhausted { attempts, .. } => {
                        warn!("Generation exhausted after {} attempts", attempts)
                    }
                    _ => warn!("Generation failed, apologising"),
                }
                let spoken = degraded.text().to_string();
                self.stats.degraded += 1;
                self.say(&spoken).await;
                TurnOutcome::Degraded { spoken }
            }
        }
    }

    async fn say(&mut self, text: &str) {
        if text.is_empty() {
            debug!("Nothing to speak");
            return;
        }

        if let Err(e) = self.synthesizer.speak(text).await {
            self.stats.speech_failures += 1;
            error!("Speech output failed: {}", e);
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}
