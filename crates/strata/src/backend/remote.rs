//! Remote model backend using OpenAI-compatible APIs
//!
//! Implements the ModelBackend trait for any `/chat/completions` endpoint
//! with configurable URL and an API key read from an environment variable.
//! Every routing tier, the classifier and the summarizer share one client;
//! the model profile travels with each call.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, BackendReply, ModelBackend};
use crate::config::{BackendConfig, ModelConfig};

/// Remote backend using OpenAI-compatible HTTP APIs
#[derive(Debug)]
pub struct RemoteBackend {
    client: Client,
    api_url: String,
    api_key: String,
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl RemoteBackend {
    /// Create a new remote backend with the given configuration
    ///
    /// Reads the API key from the environment variable named by
    /// `config.api_key_env`. Returns an error if the variable is not set.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            BackendError::Config(format!("API key env var '{}' not set", config.api_key_env))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        info!("RemoteBackend initialized with api_url: {}", config.api_url);

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ModelBackend for RemoteBackend {
    async fn invoke(
        &self,
        prompt: &str,
        model: &ModelConfig,
    ) -> Result<BackendReply, BackendError> {
        let request = ChatCompletionRequest {
            model: &model.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: model.temperature,
            max_tokens: model.max_output_tokens,
        };

        let url = format!("{}/chat/completions", self.api_url);
        debug!(model = %model.model, "Calling remote API at: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();

        // No retry here: a failed turn surfaces to the caller.
        if status == 429 {
            warn!(model = %model.model, "Rate limited by remote API");
            return Err(BackendError::RateLimited(format!(
                "model '{}' returned 429",
                model.model
            )));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BackendError::Api(format!(
                "API returned {status}: {error_text}"
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(BackendError::EmptyResponse)?;

        Ok(BackendReply {
            content,
            model: completion.model.unwrap_or_else(|| model.model.clone()),
        })
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(api_url: String, key_env: &str) -> BackendConfig {
        BackendConfig {
            api_url,
            api_key_env: key_env.to_string(),
            timeout_secs: 30,
        }
    }

    fn fast_profile() -> ModelConfig {
        ModelConfig::new("gpt-4o-mini", 0.7, 8192)
    }

    #[test]
    fn test_remote_backend_new_missing_api_key() {
        unsafe { env::remove_var("STRATA_REMOTE_TEST_MISSING_KEY") };

        let config = create_test_config(
            "https://api.example.com/v1".to_string(),
            "STRATA_REMOTE_TEST_MISSING_KEY",
        );
        let err = RemoteBackend::new(&config).unwrap_err().to_string();
        assert!(err.contains("STRATA_REMOTE_TEST_MISSING_KEY"));
    }

    #[tokio::test]
    async fn test_invoke_sends_model_profile() {
        let mock_server = MockServer::start().await;

        let response_body = serde_json::json!({
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{ "message": { "content": "4" } }]
        });

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 8192,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .expect(1)
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("STRATA_REMOTE_TEST_KEY", "test-key") };
        let config = create_test_config(mock_server.uri(), "STRATA_REMOTE_TEST_KEY");
        let backend = RemoteBackend::new(&config).unwrap();

        let reply = backend.invoke("What is 2+2?", &fast_profile()).await.unwrap();
        assert_eq!(reply.content, "4");
        assert_eq!(reply.model, "gpt-4o-mini-2024-07-18");
    }

    #[tokio::test]
    async fn test_invoke_without_reported_model_uses_profile() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "hello" } }]
            })))
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("STRATA_REMOTE_TEST_KEY", "test-key") };
        let config = create_test_config(mock_server.uri(), "STRATA_REMOTE_TEST_KEY");
        let backend = RemoteBackend::new(&config).unwrap();

        let reply = backend.invoke("hi", &fast_profile()).await.unwrap();
        assert_eq!(reply.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_invoke_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("STRATA_REMOTE_TEST_KEY", "test-key") };
        let config = create_test_config(mock_server.uri(), "STRATA_REMOTE_TEST_KEY");
        let backend = RemoteBackend::new(&config).unwrap();

        let err = backend.invoke("Test", &fast_profile()).await.unwrap_err();
        assert!(matches!(err, BackendError::Api(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_invoke_rate_limited_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("STRATA_REMOTE_TEST_KEY", "test-key") };
        let config = create_test_config(mock_server.uri(), "STRATA_REMOTE_TEST_KEY");
        let backend = RemoteBackend::new(&config).unwrap();

        let err = backend.invoke("Test", &fast_profile()).await.unwrap_err();
        assert!(matches!(err, BackendError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_invoke_empty_choices() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("STRATA_REMOTE_TEST_KEY", "test-key") };
        let config = create_test_config(mock_server.uri(), "STRATA_REMOTE_TEST_KEY");
        let backend = RemoteBackend::new(&config).unwrap();

        let err = backend.invoke("Test", &fast_profile()).await.unwrap_err();
        assert!(matches!(err, BackendError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_invoke_malformed_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("STRATA_REMOTE_TEST_KEY", "test-key") };
        let config = create_test_config(mock_server.uri(), "STRATA_REMOTE_TEST_KEY");
        let backend = RemoteBackend::new(&config).unwrap();

        let err = backend.invoke("Test", &fast_profile()).await.unwrap_err();
        assert!(matches!(err, BackendError::Parse(_)));
    }

    #[test]
    fn test_remote_backend_name() {
        unsafe { env::set_var("STRATA_REMOTE_TEST_KEY", "test-key") };
        let config = create_test_config(
            "https://api.example.com/v1/".to_string(),
            "STRATA_REMOTE_TEST_KEY",
        );
        let backend = RemoteBackend::new(&config).unwrap();
        assert_eq!(backend.name(), "remote");
        assert_eq!(backend.api_url, "https://api.example.com/v1");
    }
}
