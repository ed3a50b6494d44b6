//! Conversation and speech types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person talking to the assistant
    User,

    /// The generated reply
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Transcribed text on its way into the turn pipeline
///
/// `valid` is only set once the sanitizer has accepted the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Text exactly as the transcriber produced it
    pub raw: String,

    /// `raw` with surrounding whitespace removed
    pub text: String,

    /// Whether the sanitizer accepted the text
    pub valid: bool,
}

impl Utterance {
    /// Wrap freshly transcribed text; not yet validated
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let text = raw.trim().to_string();
        Self {
            raw,
            text,
            valid: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Why a listen attempt produced no text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechFailure {
    /// Audio was captured but the recognizer returned nothing usable
    Unintelligible,

    /// The recognition service rejected or failed the request
    Service(String),

    /// The capture device could not be opened or stopped mid-stream
    Device(String),
}

impl fmt::Display for SpeechFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeechFailure::Unintelligible => write!(f, "could not understand the audio"),
            SpeechFailure::Service(msg) => write!(f, "recognition service error: {}", msg),
            SpeechFailure::Device(msg) => write!(f, "capture device error: {}", msg),
        }
    }
}

/// Result of one listen attempt
///
/// Transcribers report what happened as a tag instead of an error so the
/// conversation loop can branch on it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    /// Speech was recognized
    Heard(String),

    /// Nothing was said before the listening deadline
    Silence,

    /// Something was captured but no text could be produced
    Failed(SpeechFailure),
}

impl ListenOutcome {
    /// Collapse the outcome into the text handed to the sanitizer.
    ///
    /// Silence and failures become the empty string.
    pub fn into_text(self) -> String {
        match self {
            ListenOutcome::Heard(text) => text,
            ListenOutcome::Silence | ListenOutcome::Failed(_) => String::new(),
        }
    }
}
