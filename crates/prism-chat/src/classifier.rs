//! Reply classification: detect structured directives in generated text.
//!
//! A generated reply may carry a fenced directive block asking Prism to
//! attach a chart configuration or a data preview. Detection is heuristic,
//! so it lives behind the [`ReplyClassifier`] trait; the engine's state
//! machine does not depend on how good the heuristic is.

use std::sync::LazyLock;

use regex::Regex;

use prism_core::types::MessageContentType;

/// Classification result for one reply.
#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    pub content_type: MessageContentType,
    /// The parsed directive body, when one was recognized.
    pub payload: Option<serde_json::Value>,
}

impl Directive {
    /// Plain text, no structured payload.
    pub fn text() -> Self {
        Self {
            content_type: MessageContentType::Text,
            payload: None,
        }
    }
}

/// Classifies a generated reply into a content type plus optional payload.
pub trait ReplyClassifier: Send + Sync {
    fn classify(&self, reply_text: &str) -> Directive;
}

// =============================================================================
// RuleClassifier
// =============================================================================

static CHART_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```chart\s+(\{.*?\})\s*```").unwrap());

static DATA_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```data\s+(\{.*?\})\s*```").unwrap());

/// Rule-based classifier recognizing fenced ```chart and ```data blocks
/// whose body is a JSON object.
///
/// A block with invalid JSON is ignored and the reply falls back to plain
/// text. Chart wins when both block kinds are present.
#[derive(Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl ReplyClassifier for RuleClassifier {
    fn classify(&self, reply_text: &str) -> Directive {
        if let Some(payload) = extract_block(&CHART_BLOCK_RE, reply_text) {
            return Directive {
                content_type: MessageContentType::Chart,
                payload: Some(payload),
            };
        }
        if let Some(payload) = extract_block(&DATA_BLOCK_RE, reply_text) {
            return Directive {
                content_type: MessageContentType::Data,
                payload: Some(payload),
            };
        }
        Directive::text()
    }
}

fn extract_block(re: &Regex, text: &str) -> Option<serde_json::Value> {
    let captures = re.captures(text)?;
    let body = captures.get(1)?.as_str();
    serde_json::from_str(body).ok()
}

// =============================================================================
// Tests
// =============================================================================
