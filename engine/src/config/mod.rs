//! Configuration management
//!
//! This module handles loading, validation, and management of the Parley configuration.
//! Configuration is stored in TOML format at ~/.parley/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **llm**: Generation provider and its request options
//! - **retry**: Attempt budget and fixed delay for throttled generation calls
//! - **rate_limit**: Fixed-window request governor
//! - **memory**: Conversation memory size and role labels
//! - **sanitizer**: Input validation limits
//! - **conversation**: Exit keywords and canned replies
//! - **speech**: Microphone, recognition and synthesis settings
//!
//! Every timing constant lives here rather than in code; the values below are
//! defaults, not fixed behavior.
//!
//! # Examples
//!
//! ```no_run
//! use parley_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Model: {}", config.llm.gemini.model);
//! println!("Retries: {}", config.retry.max_attempts);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
///
/// `core` and `llm` are required; every other section falls back to its
/// defaults when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Generation provider configuration
    pub llm: LLMConfig,

    /// Generation retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Generation rate limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Conversation memory
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Input validation
    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    /// Loop behavior
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Speech capture, recognition and synthesis
    #[serde(default)]
    pub speech: SpeechConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Generation provider (gemini)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Gemini provider settings
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Base URL for the Gemini API
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// Upper bound on generated tokens per reply
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Sampling temperature (0.0-2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Nucleus sampling cutoff (0.0-1.0)
    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Sampling seed
    #[serde(default)]
    pub seed: i64,

    /// Block threshold applied to every harm category
    #[serde(default = "default_safety_threshold")]
    pub safety_threshold: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    // Note: API key comes from the environment or the OS keychain, not from config
}

/// Retry policy for throttled generation calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between attempts in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Fixed-window rate limit on generation requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Pause after a denied request in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum stored turns (user and assistant entries each count as one)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Label prefixed to user turns in the prompt
    #[serde(default = "default_user_label")]
    pub user_label: String,

    /// Label prefixed to assistant turns in the prompt
    #[serde(default = "default_assistant_label")]
    pub assistant_label: String,
}

/// Input validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Longest accepted utterance, in characters
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

/// Loop behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Any utterance containing one of these (case-insensitive) ends the loop
    #[serde(default = "default_exit_keywords")]
    pub exit_keywords: Vec<String>,

    /// Spoken when the rate limiter denies a request
    #[serde(default = "default_rate_limited_reply")]
    pub rate_limited_reply: String,

    /// Spoken when generation fails or exhausts its retries
    #[serde(default = "default_apology_reply")]
    pub apology_reply: String,
}

/// Speech capture, recognition and synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// BCP-47 language code for recognition and synthesis
    #[serde(default = "default_language_code")]
    pub language_code: String,

    /// Seconds to wait for speech to start before giving up
    #[serde(default = "default_listen_timeout")]
    pub listen_timeout_secs: u64,

    /// Longest phrase recorded in one turn, in seconds
    #[serde(default = "default_phrase_time_limit")]
    pub phrase_time_limit_secs: u64,

    /// Capture rate handed to voice detection and recognition: 8000, 16000,
    /// 32000 or 48000. Devices that cannot capture at it are resampled.
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u32,

    /// Voice detection aggressiveness, 0 (quality) to 3 (very aggressive)
    #[serde(default = "default_vad_mode")]
    pub vad_mode: u8,

    /// Trailing quiet that ends a phrase, in milliseconds
    #[serde(default = "default_trailing_silence_ms")]
    pub trailing_silence_ms: u64,

    /// Recognition model
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    /// Ask the recognizer to punctuate transcripts
    #[serde(default = "default_true")]
    pub automatic_punctuation: bool,

    /// Synthesis voice name
    #[serde(default = "default_voice_name")]
    pub voice_name: String,

    /// Base URL for the recognition API
    #[serde(default = "default_speech_base_url")]
    pub speech_base_url: String,

    /// Base URL for the synthesis API
    #[serde(default = "default_tts_base_url")]
    pub tts_base_url: String,

    /// Recognition and synthesis request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-pro-002".to_string()
}

fn default_max_output_tokens() -> u32 {
    4000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    0.95
}

fn default_safety_threshold() -> String {
    "BLOCK_LOW_AND_ABOVE".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_capacity() -> u32 {
    30
}

fn default_window_secs() -> u64 {
    60
}

fn default_cooldown_secs() -> u64 {
    5
}

fn default_max_entries() -> usize {
    10
}

fn default_user_label() -> String {
    "You".to_string()
}

fn default_assistant_label() -> String {
    "AI".to_string()
}

fn default_max_chars() -> usize {
    500
}

fn default_exit_keywords() -> Vec<String> {
    vec!["exit".to_string()]
}

fn default_rate_limited_reply() -> String {
    "I'm getting a lot of requests right now. Please try again later.".to_string()
}

fn default_apology_reply() -> String {
    "I'm having trouble connecting right now. Please try again later.".to_string()
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_listen_timeout() -> u64 {
    15
}

fn default_phrase_time_limit() -> u64 {
    15
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_vad_mode() -> u8 {
    2
}

fn default_trailing_silence_ms() -> u64 {
    800
}

fn default_stt_model() -> String {
    "latest_long".to_string()
}

fn default_voice_name() -> String {
    "en-US-Wavenet-F".to_string()
}

fn default_speech_base_url() -> String {
    "https://speech.googleapis.com/v1".to_string()
}

fn default_tts_base_url() -> String {
    "https://texttospeech.googleapis.com/v1".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            seed: 0,
            safety_threshold: default_safety_threshold(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Fixed pause between attempts
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            user_label: default_user_label(),
            assistant_label: default_assistant_label(),
        }
    }
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            exit_keywords: default_exit_keywords(),
            rate_limited_reply: default_rate_limited_reply(),
            apology_reply: default_apology_reply(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            language_code: default_language_code(),
            listen_timeout_secs: default_listen_timeout(),
            phrase_time_limit_secs: default_phrase_time_limit(),
            sample_rate_hz: default_sample_rate(),
            vad_mode: default_vad_mode(),
            trailing_silence_ms: default_trailing_silence_ms(),
            stt_model: default_stt_model(),
            automatic_punctuation: true,
            voice_name: default_voice_name(),
            speech_base_url: default_speech_base_url(),
            tts_base_url: default_tts_base_url(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load configuration from the default location (~/.parley/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    /// Validates the configuration after loading and returns descriptive errors
    /// if validation fails.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    ///
    /// Creates the configuration directory if it doesn't exist, generates
    /// a default configuration, and saves it to the specified path.
    pub fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let default_config = Self::default_config();

        let toml_string = toml::to_string_pretty(&default_config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        default_config.validate()?;

        Ok(default_config)
    }

    /// Get the default configuration file path (~/.parley/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".parley").join("config.toml"))
    }

    /// Create a default configuration
    fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LLMConfig::default(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            memory: MemoryConfig::default(),
            sanitizer: SanitizerConfig::default(),
            conversation: ConversationConfig::default(),
            speech: SpeechConfig::default(),
        }
    }

    /// Check value ranges without touching the file system
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["gemini"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid provider '{}'. Must be one of: {}",
                self.llm.provider,
                valid_providers.join(", ")
            )));
        }

        let gemini = &self.llm.gemini;
        if !(0.0..=2.0).contains(&gemini.temperature) {
            return Err(EngineError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&gemini.top_p) {
            return Err(EngineError::Config(
                "top_p must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.rate_limit.capacity == 0 {
            return Err(EngineError::Config(
                "rate_limit.capacity must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(EngineError::Config(
                "rate_limit.window_secs must be at least 1".to_string(),
            ));
        }

        // Turns are recorded in user/assistant pairs
        if self.memory.max_entries == 0 || self.memory.max_entries % 2 != 0 {
            return Err(EngineError::Config(
                "memory.max_entries must be a positive even number".to_string(),
            ));
        }
        if self.memory.user_label.trim().is_empty()
            || self.memory.assistant_label.trim().is_empty()
        {
            return Err(EngineError::Config(
                "memory role labels cannot be empty".to_string(),
            ));
        }

        if self.sanitizer.max_chars == 0 {
            return Err(EngineError::Config(
                "sanitizer.max_chars must be at least 1".to_string(),
            ));
        }

        if self
            .conversation
            .exit_keywords
            .iter()
            .all(|k| k.trim().is_empty())
        {
            return Err(EngineError::Config(
                "conversation.exit_keywords needs at least one keyword".to_string(),
            ));
        }

        // Rates the voice detector accepts
        let valid_rates = [8_000, 16_000, 32_000, 48_000];
        if !valid_rates.contains(&self.speech.sample_rate_hz) {
            return Err(EngineError::Config(format!(
                "speech.sample_rate_hz must be one of 8000, 16000, 32000, 48000 (got {})",
                self.speech.sample_rate_hz
            )));
        }
        if self.speech.vad_mode > 3 {
            return Err(EngineError::Config(
                "speech.vad_mode must be between 0 and 3".to_string(),
            ));
        }
        if self.speech.listen_timeout_secs == 0 || self.speech.timeout_secs == 0 {
            return Err(EngineError::Config(
                "speech.listen_timeout_secs and speech.timeout_secs must be at least 1"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
///
/// # Examples
///
/// ```ignore
/// let path = PathBuf::from("~/.parley");
/// let expanded = expand_path(&path)?;
/// // expanded is now /home/user/.parley (on Unix)
/// ```
pub fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path.to_str().ok_or_else(|| {
        EngineError::PathExpansion(path.to_path_buf(), "Invalid UTF-8 in path".to_string())
    })?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.llm.gemini.model, "gemini-1.5-pro-002");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.rate_limit.capacity, 30);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.memory.max_entries, 10);
        assert_eq!(config.sanitizer.max_chars, 500);
        assert_eq!(config.conversation.exit_keywords, vec!["exit".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_expand_path_tilde_only() {
        let path = PathBuf::from("~");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.llm.gemini.model, deserialized.llm.gemini.model);
        assert_eq!(config.speech.voice_name, deserialized.speech.voice_name);
    }

    #[test]
    fn test_rejects_odd_memory_size() {
        let mut config = Config::default_config();
        config.memory.max_entries = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let mut config = Config::default_config();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_blank_exit_keywords() {
        let mut config = Config::default_config();
        config.conversation.exit_keywords = vec!["  ".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_rates_the_voice_detector_cannot_use() {
        let mut config = Config::default_config();
        config.speech.sample_rate_hz = 44_100;
        assert!(config.validate().is_err());

        for rate in [8_000, 16_000, 32_000, 48_000] {
            config.speech.sample_rate_hz = rate;
            assert!(config.validate().is_ok(), "{} Hz should be accepted", rate);
        }
    }

    #[test]
    fn test_rejects_unknown_vad_mode() {
        let mut config = Config::default_config();
        config.speech.vad_mode = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_speech_defaults() {
        let speech = SpeechConfig::default();
        assert_eq!(speech.sample_rate_hz, 16_000);
        assert_eq!(speech.vad_mode, 2);
        assert_eq!(speech.timeout_secs, 60);
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config::default_config();
        assert_eq!(config.retry.base_delay(), Duration::from_secs(2));
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.cooldown(), Duration::from_secs(5));
    }
}
