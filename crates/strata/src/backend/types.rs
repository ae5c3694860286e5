//! Reply and error types shared by every model backend

/// Text produced by a backend invocation
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    /// Completion text
    pub content: String,
    /// Model that produced the text, as reported by the backend
    pub model: String,
}

impl BackendReply {
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
        }
    }
}

/// Backend-specific errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited by backend: {0}")]
    RateLimited(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Backend returned an empty response")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_reply_new() {
        let reply = BackendReply::new("4", "gpt-4o-mini");
        assert_eq!(reply.content, "4");
        assert_eq!(reply.model, "gpt-4o-mini");
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Api("API returned 500".to_string());
        assert_eq!(err.to_string(), "API error: API returned 500");

        assert_eq!(
            BackendError::EmptyResponse.to_string(),
            "Backend returned an empty response"
        );
    }
}
