//! Scripted provider, deterministic responses for tests and dry runs.

use super::{LLMError, LLMProvider};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Script {
    results: VecDeque<super::Result<String>>,
    prompts: Vec<String>,
}

/// Provider that replays a fixed queue of results
///
/// Each `complete` call pops the next result and records the prompt it was
/// given. Once the queue is empty every call fails with `LLMError::Unknown`.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
}

impl ScriptedProvider {
    pub fn new(results: impl IntoIterator<Item = super::Result<String>>) -> Self {
        Self {
            script: Mutex::new(Script {
                results: results.into_iter().collect(),
                prompts: Vec::new(),
            }),
        }
    }

    /// Provider that answers every call with `reply`, `times` times
    pub fn replying(reply: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| Ok(reply.to_string())))
    }

    /// Queue one more result
    pub fn push(&self, result: super::Result<String>) {
        self.lock().results.push_back(result);
    }

    /// Number of `complete` calls so far
    pub fn calls(&self) -> usize {
        self.lock().prompts.len()
    }

    /// Prompts received, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> super::Result<String> {
        let mut script = self.lock();
        script.prompts.push(prompt.to_string());
        script
            .results
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::Unknown("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order() {
        let provider = ScriptedProvider::new([
            Err(LLMError::RateLimitExceeded),
            Ok("second".to_string()),
        ]);

        assert!(matches!(
            provider.complete("a").await,
            Err(LLMError::RateLimitExceeded)
        ));
        assert_eq!(provider.complete("b").await.unwrap(), "second");
        assert!(matches!(
            provider.complete("c").await,
            Err(LLMError::Unknown(_))
        ));

        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_push_extends_script() {
        let provider = ScriptedProvider::replying("hi", 1);
        provider.push(Ok("again".to_string()));

        assert_eq!(provider.complete("x").await.unwrap(), "hi");
        assert_eq!(provider.complete("y").await.unwrap(), "again");
    }
}
