//! Completion provider abstraction.

use async_trait::async_trait;
use proto::CompletionError;

/// One single-turn completion request.
///
/// Carries the credential and model captured when the send started, so a
/// later settings change never leaks into an in-flight request.
#[derive(Clone)]
pub struct CompletionRequest {
    pub api_key: String,
    pub model: String,
    /// User message text, sent as the only `user` role entry.
    pub prompt: String,
}

impl std::fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("model", &self.model)
            .field("prompt_chars", &self.prompt.chars().count())
            .finish_non_exhaustive()
    }
}

/// Completion provider trait
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Sends one request and returns the text of the first choice.
    async fn complete(&self, req: CompletionRequest) -> Result<String, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_debug_hides_credential_and_prompt() {
        let req = CompletionRequest {
            api_key: "sk-secret".to_string(),
            model: "openai/gpt-4o".to_string(),
            prompt: "private words".to_string(),
        };
        let debug = format!("{req:?}");
        assert!(debug.contains("openai/gpt-4o"));
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("private words"));
    }
}
