//! Speech collaborators
//!
//! The conversation loop talks to two seams: a [`Transcriber`] that produces
//! the next utterance and a [`Synthesizer`] that speaks a reply. Voice mode
//! backs them with the microphone, the speaker and Google's speech APIs;
//! text mode uses the console; tests use the scripted versions.

use async_trait::async_trait;
use sdk::types::ListenOutcome;

pub mod console;
pub mod google;
pub mod scripted;
pub mod voice;

pub use console::{ConsoleSynthesizer, ConsoleTranscriber};
pub use google::GoogleSpeech;
pub use scripted::{RecordingSynthesizer, ScriptedTranscriber};
pub use voice::{VoiceSynthesizer, VoiceTranscriber};

/// Errors from recognition, synthesis or playback
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces the next utterance
///
/// Never fails: silence, unintelligible audio and service errors are all
/// reported through [`ListenOutcome`].
#[async_trait]
pub trait Transcriber: Send {
    async fn listen(&mut self) -> ListenOutcome;
}

/// Speaks a reply
#[async_trait]
pub trait Synthesizer: Send {
    async fn speak(&mut self, text: &str) -> Result<(), SpeechError>;
}

#[async_trait]
impl<T: Transcriber + ?Sized> Transcriber for Box<T> {
    async fn listen(&mut self) -> ListenOutcome {
        (**self).listen().await
    }
}

#[async_trait]
impl<S: Synthesizer + ?Sized> Synthesizer for Box<S> {
    async fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        (**self).speak(text).await
    }
}
