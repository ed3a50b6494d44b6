use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{ListenOutcome, SpeechFailure};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{GoogleSpeech, SpeechError, Synthesizer, Transcriber};
use crate::audio::{CaptureOutcome, Microphone, Speaker};

/// Microphone capture followed by cloud recognition
pub struct VoiceTranscriber {
    microphone: Microphone,
    speech: Arc<GoogleSpeech>,
}

impl VoiceTranscriber {
    pub fn new(microphone: Microphone, speech: Arc<GoogleSpeech>) -> Self {
        Self { microphone, speech }
    }
}

#[async_trait]
impl Transcriber for VoiceTranscriber {
    async fn listen(&mut self) -> ListenOutcome {
        info!("Listening...");

        let recording = match self.microphone.listen().await {
            Ok(CaptureOutcome::Phrase(recording)) => recording,
            Ok(CaptureOutcome::Timeout) => {
                debug!("Listening timed out");
                return ListenOutcome::Silence;
            }
            Err(e) => {
                warn!("Capture failed: {}", e);
                return ListenOutcome::Failed(SpeechFailure::Device(e.to_string()));
            }
        };

        let wav = match recording.to_wav() {
            Ok(wav) => wav,
            Err(e) => {
                warn!("Failed to encode recording: {}", e);
                return ListenOutcome::Failed(SpeechFailure::Device(e.to_string()));
            }
        };

        match self.speech.recognize(&wav, recording.sample_rate).await {
            Ok(Some(text)) => {
                info!("Heard: {}", text);
                ListenOutcome::Heard(text)
            }
            Ok(None) => {
                warn!("Could not understand the audio");
                ListenOutcome::Failed(SpeechFailure::Unintelligible)
            }
            Err(e) => {
                warn!("Speech recognition error: {}", e);
                ListenOutcome::Failed(SpeechFailure::Service(e.to_string()))
            }
        }
    }
}

/// Cloud synthesis played on the default output device
pub struct VoiceSynthesizer {
    speech: Arc<GoogleSpeech>,
    speaker: Speaker,
}

impl VoiceSynthesizer {
    pub fn new(speech: Arc<GoogleSpeech>, speaker: Speaker) -> Self {
        Self { speech, speaker }
    }
}

#[async_trait]
impl Synthesizer for VoiceSynthesizer {
    async fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        let audio = self.speech.synthesize(text).await?;
        self.speaker.play(audio).await.map_err(|e| match e {
            EngineError::AudioDevice(msg) => SpeechError::Device(msg),
            other => SpeechError::Playback(other.to_string()),
        })
    }
}
