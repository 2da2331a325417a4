//! External API providers for concept extraction calls.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ApiProvider, GenerationConfig, LLMProvider, ProviderInfo};

pub struct ExternalProvider {
    provider: ApiProvider,
    api_key: String,
    model: String,
    client: Client,
}

impl ExternalProvider {
    pub fn new(provider: ApiProvider, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(120))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            provider,
            api_key,
            model,
            client,
        })
    }

    fn get_endpoint(&self) -> String {
        match &self.provider {
            ApiProvider::OpenAI => "https://api.openai.com/v1/chat/completions".to_string(),
            ApiProvider::Anthropic => "https://api.anthropic.com/v1/messages".to_string(),
            ApiProvider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions".to_string(),
            ApiProvider::Together => "https://api.together.xyz/v1/chat/completions".to_string(),
            ApiProvider::Google => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            ),
            ApiProvider::Custom { endpoint } => endpoint.clone(),
        }
    }

    /// Parse a response body as JSON, returning a clear error if the server returned HTML.
    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body from {}: {}", endpoint, e))?;
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "Endpoint {} returned HTML instead of JSON (HTTP {}) — service may be down. Response: {}",
                endpoint, status, preview
            ));
        }
        serde_json::from_str::<T>(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!("Failed to parse JSON from {} (HTTP {}): {}. Body: {}", endpoint, status, e, preview)
        })
    }

    async fn openai_compatible_generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let endpoint = self.get_endpoint();
        let request = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "stream": false
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Request to {} timed out", endpoint)
                } else if e.is_connect() {
                    anyhow!("Failed to connect to {}: {}", endpoint, e)
                } else {
                    anyhow!("Request to {} failed: {}", endpoint, e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(anyhow!("API error ({}): {}", status, error));
        }

        let result: OpenAIResponse = Self::parse_json_response(response, &endpoint).await?;
        result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("provider returned empty choices array"))
    }

    async fn anthropic_generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let request = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
        });

        let response = self
            .client
            .post(self.get_endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error: {}", error));
        }

        let endpoint = self.get_endpoint();
        let result: AnthropicResponse = Self::parse_json_response(response, &endpoint).await?;
        result
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| anyhow!("Anthropic returned empty content array"))
    }

    async fn google_generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let request = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": config.temperature,
                "topP": config.top_p,
                "maxOutputTokens": config.max_tokens,
            }
        });

        let response = self
            .client
            .post(self.get_endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(anyhow!("Google API error: {}", error));
        }

        let endpoint = self.get_endpoint();
        let result: GoogleResponse = Self::parse_json_response(response, &endpoint).await?;
        result
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| anyhow!("No response from Google Gemini"))
    }
}

#[async_trait]
impl LLMProvider for ExternalProvider {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        match &self.provider {
            ApiProvider::OpenAI
            | ApiProvider::Together
            | ApiProvider::OpenRouter
            | ApiProvider::Custom { .. } => self.openai_compatible_generate(prompt, config).await,
            ApiProvider::Anthropic => self.anthropic_generate(prompt, config).await,
            ApiProvider::Google => self.google_generate(prompt, config).await,
        }
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: format!("{:?}", self.provider),
            model: self.model.clone(),
            context_window: match &self.provider {
                ApiProvider::OpenAI => 128_000,
                ApiProvider::Anthropic => 200_000,
                ApiProvider::OpenRouter => 200_000,
                ApiProvider::Together => 32_768,
                ApiProvider::Google => 1_000_000,
                ApiProvider::Custom { .. } => 8_192,
            },
        }
    }
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: GoogleContent,
}

#[derive(Deserialize)]
struct GoogleContent {
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_selection_matches_provider() {
        let p = ExternalProvider::new(ApiProvider::OpenAI, "key".into(), "gpt-4o-mini".into()).unwrap();
        assert_eq!(p.get_endpoint(), "https://api.openai.com/v1/chat/completions");

        let p = ExternalProvider::new(
            ApiProvider::Custom { endpoint: "http://localhost:9999/v1/chat".into() },
            "key".into(),
            "local".into(),
        )
        .unwrap();
        assert_eq!(p.get_endpoint(), "http://localhost:9999/v1/chat");
    }

    #[test]
    fn info_reports_model_and_context_window() {
        let p = ExternalProvider::new(ApiProvider::Anthropic, "key".into(), "claude".into()).unwrap();
        let info = p.info();
        assert_eq!(info.model, "claude");
        assert_eq!(info.context_window, 200_000);
    }
}
