use thiserror::Error;

use crate::message::{MessageId, SessionId};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// Session store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The referenced session is not present in the store.
    #[error("Session not found: {0}")]
    UnknownSession(SessionId),

    /// The referenced message is not part of the session.
    #[error("Message {message} not found in session {session}")]
    UnknownMessage {
        session: SessionId,
        message: MessageId,
    },

    /// A completion request is already outstanding for the session.
    #[error("A request is already in flight for session {0}")]
    RequestInFlight(SessionId),

    /// User message text was empty or whitespace only.
    #[error("Message text is empty")]
    EmptyMessage,
}

/// Completion endpoint errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// No API credential configured.
    #[error("API key is required")]
    MissingCredential,

    /// No model selected.
    #[error("Model is required")]
    MissingModel,

    /// Network failure or non-success HTTP status.
    #[error("{0}")]
    Transport(String),

    /// Provider throttled the request.
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Success status but the body did not match the expected shape.
    #[error("Invalid response from completion endpoint: {0}")]
    MalformedResponse(String),

    /// The request was cancelled through its cancellation token.
    #[error("Request cancelled")]
    Cancelled,
}

/// Model catalog errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The catalog endpoint could not be reached or returned garbage.
    #[error("Failed to load models: {0}")]
    FetchFailed(String),
}

/// Key-value storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem read/write error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_config_error_variant() {
        let err = ConfigError::InvalidValue {
            field: "api.base_url".to_string(),
            reason: "expected an http(s) URL".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for api.base_url: expected an http(s) URL"
        );
    }

    #[test]
    fn session_errors_name_the_session() {
        let err = SessionError::UnknownSession(SessionId::from("s1"));
        assert_eq!(err.to_string(), "Session not found: s1");
        let err = SessionError::RequestInFlight(SessionId::from("s1"));
        assert!(err.to_string().contains("s1"));
    }

    #[test]
    fn completion_errors_render_user_facing_text() {
        assert_eq!(
            CompletionError::MissingCredential.to_string(),
            "API key is required"
        );
        assert_eq!(CompletionError::MissingModel.to_string(), "Model is required");
        assert_eq!(
            CompletionError::Transport("HTTP 500: boom".to_string()).to_string(),
            "HTTP 500: boom"
        );
    }

    #[test]
    fn catalog_and_storage_errors_render_context() {
        let err = CatalogError::FetchFailed("timeout".to_string());
        assert_eq!(err.to_string(), "Failed to load models: timeout");

        let err = StorageError::Serialization("bad json".to_string());
        assert!(err.to_string().contains("bad json"));
    }

    #[test]
    fn unknown_message_names_both_ids() {
        let err = SessionError::UnknownMessage {
            session: SessionId::from("chat-1"),
            message: MessageId(7),
        };
        let text = err.to_string();
        assert!(text.contains("chat-1"));
        assert!(text.contains('7'));
    }
}
