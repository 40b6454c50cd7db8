//! Generative assistant client interface.
//!
//! The engine sends the session transcript to a remote text-generation
//! service through the [`AssistantClient`] trait. Implementations can range
//! from canned local replies to full remote model backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use prism_core::types::MessageRole;

/// One transcript entry as sent to the assistant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Assistant call failure. Always surfaced to the user as a visible error
/// message, since the user is actively waiting on the reply.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("generation timed out")]
    Timeout,
    #[error("quota exhausted")]
    Quota,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Client for a remote text-generation service.
///
/// Object-safe so the engine can hold `Arc<dyn AssistantClient>`.
#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Generate a reply for the transcript, given the session's context
    /// snapshot. The transcript is in strict order, oldest first.
    async fn complete(
        &self,
        transcript: &[TranscriptMessage],
        context: &serde_json::Value,
    ) -> Result<String, AssistantError>;
}

// =============================================================================
// CannedAssistant
// =============================================================================

/// Deterministic local assistant.
///
/// Echo-style stand-in wired by the composition root when no remote model is
/// configured: it restates the latest user message, and emits a fenced chart
/// directive when the message asks for one. Useful for demos and tests.
#[derive(Default)]
pub struct CannedAssistant;

impl CannedAssistant {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AssistantClient for CannedAssistant {
    async fn complete(
        &self,
        transcript: &[TranscriptMessage],
        _context: &serde_json::Value,
    ) -> Result<String, AssistantError> {
        let last_user = transcript
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .ok_or_else(|| AssistantError::Malformed("transcript has no user turn".into()))?;

        let lower = last_user.content.to_lowercase();
        if lower.contains("chart") || lower.contains("plot") || lower.contains("graph") {
            return Ok(format!(
                "Here is a chart for \"{}\".\n```chart\n{{\"type\": \"bar\", \"title\": {:?}}}\n```",
                last_user.content, last_user.content
            ));
        }
        Ok(format!(
            "You asked: \"{}\". I can build charts or pull record previews from \
             your synchronized data sources.",
            last_user.content
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turn(role: MessageRole, content: &str) -> TranscriptMessage {
        TranscriptMessage {
            role,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_canned_echoes_last_user_turn() {
        let assistant = CannedAssistant::new();
        let reply = assistant
            .complete(
                &[
                    turn(MessageRole::System, "greeting"),
                    turn(MessageRole::User, "older question"),
                    turn(MessageRole::Assistant, "older answer"),
                    turn(MessageRole::User, "what is revenue"),
                ],
                &json!({}),
            )
            .await
            .unwrap();
        assert!(reply.contains("what is revenue"));
        assert!(!reply.contains("older question"));
    }

    #[tokio::test]
    async fn test_canned_emits_chart_directive() {
        let assistant = CannedAssistant::new();
        let reply = assistant
            .complete(
                &[turn(MessageRole::User, "show me a chart of sales")],
                &json!({}),
            )
            .await
            .unwrap();
        assert!(reply.contains("```chart"));
    }

    #[tokio::test]
    async fn test_canned_rejects_empty_transcript() {
        let assistant = CannedAssistant::new();
        let err = assistant.complete(&[], &json!({})).await.unwrap_err();
        assert!(matches!(err, AssistantError::Malformed(_)));
    }

    #[test]
    fn test_assistant_error_display() {
        assert_eq!(AssistantError::Timeout.to_string(), "generation timed out");
        assert_eq!(AssistantError::Quota.to_string(), "quota exhausted");
        assert_eq!(
            AssistantError::Upstream("503".to_string()).to_string(),
            "upstream error: 503"
        );
    }
}
