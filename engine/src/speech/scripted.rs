//! Scripted collaborators for tests and dry runs.

use async_trait::async_trait;
use sdk::types::ListenOutcome;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{SpeechError, Synthesizer, Transcriber};

/// Replays a fixed list of listen outcomes, then says `exit_phrase` forever
pub struct ScriptedTranscriber {
    outcomes: VecDeque<ListenOutcome>,
    exit_phrase: String,
    listens: Arc<Mutex<usize>>,
}

impl ScriptedTranscriber {
    pub fn new(outcomes: impl IntoIterator<Item = ListenOutcome>) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
            exit_phrase: "exit".to_string(),
            listens: Arc::new(Mutex::new(0)),
        }
    }

    /// Transcriber that hears each of `utterances` in turn
    pub fn hearing<'a>(utterances: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(
            utterances
                .into_iter()
                .map(|u| ListenOutcome::Heard(u.to_string())),
        )
    }

    pub fn with_exit_phrase(mut self, exit_phrase: impl Into<String>) -> Self {
        self.exit_phrase = exit_phrase.into();
        self
    }

    /// Shared counter of `listen` calls
    pub fn listen_counter(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.listens)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn listen(&mut self) -> ListenOutcome {
        *self.listens.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.outcomes
            .pop_front()
            .unwrap_or_else(|| ListenOutcome::Heard(self.exit_phrase.clone()))
    }
}

/// Records everything it is asked to speak
///
/// Clones share the record, so a test can keep one handle while the loop
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingSynthesizer {
    spoken: Arc<Mutex<Vec<String>>>,
    failing: bool,
}

impl RecordingSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records each request, then fails it
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Every text passed to `speak`, in call order
    pub fn spoken(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.spoken.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        self.lock().push(text.to_string());
        if self.failing {
            return Err(SpeechError::Playback("output device unavailable".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::SpeechFailure;

    #[tokio::test]
    async fn test_scripted_transcriber_then_exit() {
        let mut transcriber = ScriptedTranscriber::new([
            ListenOutcome::Silence,
            ListenOutcome::Failed(SpeechFailure::Unintelligible),
        ]);
        let counter = transcriber.listen_counter();

        assert_eq!(transcriber.listen().await, ListenOutcome::Silence);
        assert!(matches!(transcriber.listen().await, ListenOutcome::Failed(_)));
        assert_eq!(transcriber.listen().await, ListenOutcome::Heard("exit".into()));
        assert_eq!(*counter.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_recording_synthesizer_shares_record() {
        let handle = RecordingSynthesizer::new();
        let mut owned = handle.clone();

        owned.speak("one").await.unwrap();
        owned.speak("two").await.unwrap();

        assert_eq!(handle.spoken(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_failing_synthesizer_records_then_errors() {
        let handle = RecordingSynthesizer::failing();
        let mut owned = handle.clone();

        assert!(owned.speak("lost").await.is_err());
        assert_eq!(handle.calls(), 1);
    }
}
