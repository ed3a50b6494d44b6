use super::{LLMError, LLMProvider};
use crate::config::GeminiConfig;
use crate::secrets::{SecretManager, SecretString};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Harm categories every request sets a block threshold for
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GeminiProvider {
    config: GeminiConfig,
    api_key: SecretString,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig, api_key: SecretString) -> Result<Self, LLMError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!(
            "{}/models/{}{}?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            suffix,
            self.api_key.unsecure()
        )
    }

    fn payload(&self, prompt: &str) -> serde_json::Value {
        let safety_settings: Vec<_> = HARM_CATEGORIES
            .iter()
            .map(|category| {
                json!({
                    "category": category,
                    "threshold": self.config.safety_threshold,
                })
            })
            .collect();

        json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "maxOutputTokens": self.config.max_output_tokens,
                "temperature": self.config.temperature,
                "topP": self.config.top_p,
                "seed": self.config.seed,
            },
            "safetySettings": safety_settings,
        })
    }
}

/// Map a non-success response to a classified error
///
/// Gemini reports quota exhaustion as 429, but some gateways relay it with a
/// different status and only the `RESOURCE_EXHAUSTED` marker in the body.
fn classify_failure(status: reqwest::StatusCode, body: &str) -> LLMError {
    let body = SecretManager::scrub(body);

    if status.as_u16() == 429 || body.contains("RESOURCE_EXHAUSTED") {
        LLMError::RateLimitExceeded
    } else if status.as_u16() == 400 || status.as_u16() == 404 {
        LLMError::InvalidRequest(body)
    } else if status.as_u16() == 401 || status.as_u16() == 403 {
        LLMError::AuthenticationFailed(body)
    } else {
        LLMError::ProviderUnavailable(format!("Gemini API error ({}): {}", status, body))
    }
}

fn transport_failure(e: reqwest::Error) -> LLMError {
    if e.is_timeout() {
        LLMError::Timeout
    } else {
        // reqwest includes the request URL, which carries the key
        LLMError::NetworkError(SecretManager::scrub(&e.to_string()))
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn check_health(&self) -> bool {
        match self.client.get(self.endpoint("")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Gemini health check failed: {}", transport_failure(e));
                false
            }
        }
    }

    async fn complete(&self, prompt: &str) -> super::Result<String> {
        let response = self
            .client
            .post(self.endpoint(":generateContent"))
            .header("Content-Type", "application/json")
            .json(&self.payload(prompt))
            .send()
            .await
            .map_err(transport_failure)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let candidate = data
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| LLMError::ParseError("No candidates in response".to_string()))?;

        let content_item = candidate
            .get("content")
            .ok_or_else(|| LLMError::ParseError("No content in candidate".to_string()))?;

        let parts = content_item
            .get("parts")
            .and_then(|p| p.as_array())
            .ok_or_else(|| LLMError::ParseError("No parts in candidate content".to_string()))?;

        let mut full_text = String::new();
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                full_text.push_str(text);
            }
        }

        if full_text.trim().is_empty() {
            return Err(LLMError::ParseError("Empty text in candidate".to_string()));
        }

        Ok(full_text)
    }
}
