use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use std::time::Duration;

use super::SpeechError;
use crate::config::SpeechConfig;
use crate::secrets::{SecretManager, SecretString};

/// Client for Google Cloud Speech-to-Text and Text-to-Speech over REST
///
/// Audio travels base64-encoded inside the JSON bodies. Both directions use
/// LINEAR16; synthesized audio comes back as a complete WAV file.
pub struct GoogleSpeech {
    config: SpeechConfig,
    api_key: SecretString,
    client: reqwest::Client,
}

impl GoogleSpeech {
    pub fn new(config: SpeechConfig, api_key: SecretString) -> Result<Self, SpeechError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SpeechError::Network(e.to_string()))?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn url(&self, base: &str, method: &str) -> String {
        format!(
            "{}/{}?key={}",
            base.trim_end_matches('/'),
            method,
            self.api_key.unsecure()
        )
    }

    /// Transcribe one WAV recording
    ///
    /// Returns `None` when the service heard nothing it could transcribe.
    pub async fn recognize(
        &self,
        wav: &[u8],
        sample_rate: u32,
    ) -> Result<Option<String>, SpeechError> {
        let body = json!({
            "config": {
                "encoding": "LINEAR16",
                "sampleRateHertz": sample_rate,
                "languageCode": self.config.language_code,
                "model": self.config.stt_model,
                "enableAutomaticPunctuation": self.config.automatic_punctuation,
            },
            "audio": {
                "content": STANDARD.encode(wav),
            },
        });

        let data = self
            .post(&self.config.speech_base_url, "speech:recognize", &body)
            .await
            .map_err(|e| match e {
                SpeechError::InvalidResponse(msg) => SpeechError::Recognition(msg),
                other => other,
            })?;

        let transcript = data
            .get("results")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first())
            .and_then(|r| r.get("alternatives"))
            .and_then(|a| a.as_array())
            .and_then(|a| a.first())
            .and_then(|a| a.get("transcript"))
            .and_then(|t| t.as_str())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(transcript)
    }

    /// Synthesize `text` into WAV bytes
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let body = json!({
            "input": {"text": text},
            "voice": {
                "languageCode": self.config.language_code,
                "name": self.config.voice_name,
                "ssmlGender": "FEMALE",
            },
            "audioConfig": {"audioEncoding": "LINEAR16"},
        });

        let data = self
            .post(&self.config.tts_base_url, "text:synthesize", &body)
            .await
            .map_err(|e| match e {
                SpeechError::InvalidResponse(msg) => SpeechError::Synthesis(msg),
                other => other,
            })?;

        let content = data
            .get("audioContent")
            .and_then(|c| c.as_str())
            .ok_or_else(|| SpeechError::Synthesis("No audioContent in response".to_string()))?;

        STANDARD
            .decode(content)
            .map_err(|e| SpeechError::Synthesis(format!("Bad audioContent: {}", e)))
    }

    async fn post(
        &self,
        base: &str,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, SpeechError> {
        let response = self
            .client
            .post(self.url(base, method))
            .json(body)
            .send()
            .await
            .map_err(|e| SpeechError::Network(SecretManager::scrub(&e.to_string())))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SpeechError::InvalidResponse(format!(
                "{} returned {}: {}",
                method,
                status,
                SecretManager::scrub(&text)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SpeechError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn speech(server: &MockServer) -> GoogleSpeech {
        let config = SpeechConfig {
            speech_base_url: server.uri(),
            tts_base_url: server.uri(),
            ..SpeechConfig::default()
        };
        GoogleSpeech::new(config, SecretString::new("test-key")).unwrap()
    }

    #[tokio::test]
    async fn test_recognize_returns_first_alternative() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/speech:recognize"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "config": {"encoding": "LINEAR16", "sampleRateHertz": 16000, "languageCode": "en-US"},
                "audio": {"content": STANDARD.encode(b"RIFF")}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"alternatives": [{"transcript": " hello there ", "confidence": 0.9}]},
                    {"alternatives": [{"transcript": "ignored"}]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = speech(&server).recognize(b"RIFF", 16_000).await.unwrap();
        assert_eq!(text.as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn test_recognize_empty_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/speech:recognize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let text = speech(&server).recognize(b"RIFF", 16_000).await.unwrap();
        assert_eq!(text, None);
    }

    #[tokio::test]
    async fn test_recognize_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/speech:recognize"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let err = speech(&server)
            .recognize(b"RIFF", 16_000)
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Recognition(_)));
    }

    #[tokio::test]
    async fn test_synthesize_decodes_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text:synthesize"))
            .and(body_partial_json(json!({
                "input": {"text": "Hi there!"},
                "voice": {"name": "en-US-Wavenet-F"},
                "audioConfig": {"audioEncoding": "LINEAR16"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "audioContent": STANDARD.encode(b"RIFF....WAVE")
            })))
            .mount(&server)
            .await;

        let audio = speech(&server).synthesize("Hi there!").await.unwrap();
        assert_eq!(audio, b"RIFF....WAVE");
    }

    #[tokio::test]
    async fn test_synthesize_missing_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text:synthesize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = speech(&server).synthesize("Hi").await.unwrap_err();
        assert!(matches!(err, SpeechError::Synthesis(_)));
    }

    #[tokio::test]
    async fn test_slow_service_hits_configured_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/speech:recognize"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": []}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let config = SpeechConfig {
            speech_base_url: server.uri(),
            timeout_secs: 1,
            ..SpeechConfig::default()
        };
        let speech = GoogleSpeech::new(config, SecretString::new("test-key")).unwrap();

        let started = std::time::Instant::now();
        let err = speech.recognize(b"RIFF", 16_000).await.unwrap_err();

        assert!(matches!(err, SpeechError::Network(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
