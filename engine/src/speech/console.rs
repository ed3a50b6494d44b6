use async_trait::async_trait;
use sdk::types::ListenOutcome;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

use super::{SpeechError, Synthesizer, Transcriber};

/// Reads utterances line by line
///
/// End of input is reported as `exit_phrase` so the loop ends the same way
/// it does when the user says goodbye.
pub struct ConsoleTranscriber<R> {
    reader: R,
    prompt: Option<String>,
    exit_phrase: String,
}

impl ConsoleTranscriber<BufReader<Stdin>> {
    /// Read from stdin, printing `prompt` to stderr before each line
    pub fn stdin(prompt: impl Into<String>, exit_phrase: impl Into<String>) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), exit_phrase).with_prompt(prompt)
    }
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleTranscriber<R> {
    pub fn new(reader: R, exit_phrase: impl Into<String>) -> Self {
        Self {
            reader,
            prompt: None,
            exit_phrase: exit_phrase.into(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Transcriber for ConsoleTranscriber<R> {
    async fn listen(&mut self) -> ListenOutcome {
        if let Some(prompt) = &self.prompt {
            eprint!("{}", prompt);
        }

        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) => ListenOutcome::Heard(self.exit_phrase.clone()),
            Ok(_) => {
                let line = line.trim_end_matches(['\r', '\n']);
                if line.trim().is_empty() {
                    ListenOutcome::Silence
                } else {
                    ListenOutcome::Heard(line.to_string())
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read input: {}", e);
                ListenOutcome::Heard(self.exit_phrase.clone())
            }
        }
    }
}

/// Writes replies as lines of text
pub struct ConsoleSynthesizer<W> {
    writer: W,
    prefix: String,
}

impl ConsoleSynthesizer<Stdout> {
    pub fn stdout(prefix: impl Into<String>) -> Self {
        Self::new(tokio::io::stdout(), prefix)
    }
}

impl<W: AsyncWrite + Unpin + Send> ConsoleSynthesizer<W> {
    pub fn new(writer: W, prefix: impl Into<String>) -> Self {
        Self {
            writer,
            prefix: prefix.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Synthesizer for ConsoleSynthesizer<W> {
    async fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        let line = format!("{}{}\n", self.prefix, text);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
