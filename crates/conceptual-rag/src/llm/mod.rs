//! LLM module — external API client for concept extraction (spec §4.2-§4.3).
//! The model itself is an out-of-scope external collaborator; this module
//! only owns the request/response contract and retry policy around it.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod external;

pub use external::ExternalProvider;

/// External API providers, each with its own request/response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiProvider {
    OpenAI,
    Anthropic,
    OpenRouter,
    Together,
    Google,
    Custom { endpoint: String },
}

/// Generation configuration passed to every provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.2,
            top_p: 0.95,
        }
    }
}

/// Core trait for LLM providers used by the concept extractor.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;

    fn info(&self) -> ProviderInfo;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub context_window: usize,
}

/// Thin manager wrapping a configured provider, matching the crate's
/// optional-LLM-means-degrade-gracefully posture (spec §4.2 "LLM unreachable").
pub struct LLMManager {
    provider: Option<Box<dyn LLMProvider>>,
}

impl LLMManager {
    pub fn new(provider: Option<Box<dyn LLMProvider>>) -> Self {
        Self { provider }
    }

    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        match &self.provider {
            Some(provider) => provider.generate(prompt, config).await,
            None => Err(anyhow!("LLM is disabled or not initialized")),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn info(&self) -> Option<ProviderInfo> {
        self.provider.as_ref().map(|p| p.info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_manager_errors_on_generate() {
        let manager = LLMManager::disabled();
        assert!(!manager.is_enabled());
        let result = manager.generate("hello", &GenerationConfig::default()).await;
        assert!(result.is_err());
    }
}
