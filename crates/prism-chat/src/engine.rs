//! Chat session engine.
//!
//! Owns the turn-taking protocol between a user and the assistant:
//! `active <-> awaiting-reply` per session, terminal deactivated. Posting a
//! user message returns immediately; reply generation runs as a spawned
//! task that may suspend on the remote call without blocking other
//! sessions. Every user message ends in exactly one follow-up message:
//! an assistant reply, or a system error message when generation fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use prism_core::config::ChatConfig;
use prism_core::events::DomainEvent;
use prism_core::types::{
    ChatMessage, ChatSession, DataSource, MessageContentType, MessageRole, TurnState,
};
use prism_storage::{ChatStore, DataSourceRepository, Database, RecordStore};

use crate::classifier::{Directive, ReplyClassifier};
use crate::client::{AssistantClient, AssistantError, TranscriptMessage};
use crate::error::ChatError;

/// Default number of preview rows attached to a data reply.
const DEFAULT_PREVIEW_ROWS: u64 = 10;

/// Coordinates sessions, transcripts, and reply generation.
///
/// Cheap to clone; every clone shares the same database handles, clients,
/// and event channel. Reply tasks run on a clone.
#[derive(Clone)]
pub struct ChatEngine {
    store: ChatStore,
    records: RecordStore,
    sources: DataSourceRepository,
    assistant: Arc<dyn AssistantClient>,
    classifier: Arc<dyn ReplyClassifier>,
    config: ChatConfig,
    events: Option<broadcast::Sender<DomainEvent>>,
}

impl ChatEngine {
    pub fn new(
        db: Arc<Database>,
        assistant: Arc<dyn AssistantClient>,
        classifier: Arc<dyn ReplyClassifier>,
        config: ChatConfig,
        events: Option<broadcast::Sender<DomainEvent>>,
    ) -> Self {
        Self {
            store: ChatStore::new(db.clone()),
            records: RecordStore::new(db.clone()),
            sources: DataSourceRepository::new(db),
            assistant,
            classifier,
            config,
            events,
        }
    }

    /// Create a new session in the `active` state and seed the greeting.
    pub fn create_session(
        &self,
        user_id: &str,
        context: serde_json::Value,
    ) -> Result<Uuid, ChatError> {
        if !self.config.enabled {
            return Err(ChatError::Disabled);
        }
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: "New chat".to_string(),
            is_active: true,
            turn_state: TurnState::Active,
            context,
            created_at: now,
            last_activity: now,
        };
        self.store.create_session(&session)?;
        self.store.append_message(&ChatMessage {
            id: Uuid::new_v4(),
            session_id: session.id,
            seq: 0,
            role: MessageRole::System,
            content: self.config.greeting.clone(),
            content_type: MessageContentType::Text,
            payload: None,
            source_query: None,
            processing_ms: None,
            created_at: now,
        })?;
        self.emit(DomainEvent::SessionCreated {
            session_id: session.id,
            user_id: user_id.to_string(),
        });
        info!(session = %session.id, user = user_id, "Chat session created");
        Ok(session.id)
    }

    /// Append a user message and dispatch reply generation.
    ///
    /// Returns the user message id as soon as the message is durably
    /// recorded; the caller never waits on the remote call. Fails with
    /// [`ChatError::InvalidSessionState`] when the session is deactivated
    /// or already awaiting a reply; concurrent posts on one session are
    /// not interleaved, the second caller is rejected.
    pub fn post_user_message(&self, session_id: Uuid, text: &str) -> Result<Uuid, ChatError> {
        if !self.config.enabled {
            return Err(ChatError::Disabled);
        }
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.len() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }

        let message = ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            seq: 0,
            role: MessageRole::User,
            content: text.to_string(),
            content_type: MessageContentType::Text,
            payload: None,
            source_query: None,
            processing_ms: None,
            created_at: Utc::now(),
        };

        if self.store.begin_turn(&message)?.is_none() {
            // The conditional flip failed; find out why for the caller.
            return match self.store.find_session(session_id)? {
                None => Err(ChatError::SessionNotFound(session_id)),
                Some(s) if !s.is_active => {
                    Err(ChatError::InvalidSessionState("session is deactivated".into()))
                }
                Some(_) => Err(ChatError::InvalidSessionState(
                    "a reply is already being generated".into(),
                )),
            };
        }

        self.emit(DomainEvent::UserMessagePosted {
            session_id,
            message_id: message.id,
        });

        let engine = self.clone();
        tokio::spawn(async move {
            engine.generate_reply(session_id).await;
        });

        Ok(message.id)
    }

    /// The ordered transcript. Pure read, no side effects.
    pub fn get_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, ChatError> {
        if self.store.find_session(session_id)?.is_none() {
            return Err(ChatError::SessionNotFound(session_id));
        }
        Ok(self.store.messages_for_session(session_id)?)
    }

    /// Look up a session.
    pub fn get_session(&self, session_id: Uuid) -> Result<Option<ChatSession>, ChatError> {
        Ok(self.store.find_session(session_id)?)
    }

    /// Sessions for one user, most recently active first.
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, ChatError> {
        Ok(self.store.sessions_for_user(user_id)?)
    }

    /// Deactivate a session. Terminal; an in-flight generation for this
    /// session completes but its result is discarded.
    pub fn deactivate_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.store
            .deactivate_session(session_id)
            .map_err(|e| match e {
                prism_core::PrismError::NotFound(_) => ChatError::SessionNotFound(session_id),
                other => other.into(),
            })?;
        self.emit(DomainEvent::SessionDeactivated { session_id });
        info!(session = %session_id, "Chat session deactivated");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Reply generation
    // -----------------------------------------------------------------

    /// Generate and append the follow-up for the pending user message.
    ///
    /// Runs as a spawned task. Either an assistant reply or a system error
    /// message is appended, so the session is never left awaiting forever.
    async fn generate_reply(&self, session_id: Uuid) {
        let started = Instant::now();

        let session = match self.store.find_session(session_id) {
            Ok(Some(s)) => s,
            Ok(None) => {
                warn!(session = %session_id, "Session vanished before generation");
                return;
            }
            Err(e) => {
                error!(session = %session_id, error = %e, "Failed to load session");
                return;
            }
        };

        let transcript = match self.store.messages_for_session(session_id) {
            Ok(messages) => messages
                .iter()
                .map(|m| TranscriptMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect::<Vec<_>>(),
            Err(e) => {
                error!(session = %session_id, error = %e, "Failed to load transcript");
                return;
            }
        };

        let timeout = Duration::from_secs(self.config.generation_timeout_secs);
        let result = match tokio::time::timeout(
            timeout,
            self.assistant.complete(&transcript, &session.context),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AssistantError::Timeout),
        };

        let mut reply = match result {
            Ok(text) => self.build_reply(session_id, text),
            Err(err) => {
                warn!(session = %session_id, error = %err, "Generation failed");
                ChatMessage {
                    id: Uuid::new_v4(),
                    session_id,
                    seq: 0,
                    role: MessageRole::System,
                    content: format!("The assistant could not reply: {}", err),
                    content_type: MessageContentType::Error,
                    payload: None,
                    source_query: None,
                    processing_ms: None,
                    created_at: Utc::now(),
                }
            }
        };

        // Session state governs visibility: a deactivation that raced the
        // generation wins, and the result is dropped.
        match self.store.find_session(session_id) {
            Ok(Some(s)) if !s.is_active => {
                debug!(session = %session_id, "Discarding reply for deactivated session");
                self.emit(DomainEvent::ReplyDiscarded { session_id });
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                self.emit(DomainEvent::ReplyDiscarded { session_id });
                return;
            }
            Err(e) => {
                error!(session = %session_id, error = %e, "Failed to re-check session");
                return;
            }
        }

        reply.processing_ms = Some(started.elapsed().as_millis() as i64);

        match self.store.complete_turn(&reply) {
            Ok(_) => {
                self.emit(DomainEvent::ReplyAppended {
                    session_id,
                    message_id: reply.id,
                    content_type: reply.content_type,
                });
            }
            Err(e) => {
                error!(session = %session_id, error = %e, "Failed to append reply");
            }
        }
    }

    /// Classify the generated text and attach structured payloads.
    fn build_reply(&self, session_id: Uuid, text: String) -> ChatMessage {
        let directive = self.classifier.classify(&text);

        let (content_type, payload, source_query) = match directive {
            Directive {
                content_type: MessageContentType::Data,
                payload: Some(body),
            } => match self.ground_data_directive(&body) {
                Some((payload, query)) => (MessageContentType::Data, Some(payload), query),
                None => {
                    debug!(session = %session_id, "Unresolvable data directive, treating as text");
                    (MessageContentType::Text, None, None)
                }
            },
            Directive {
                content_type,
                payload,
            } => (content_type, payload, None),
        };

        ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            seq: 0,
            role: MessageRole::Assistant,
            content: text,
            content_type,
            payload,
            source_query,
            processing_ms: None,
            created_at: Utc::now(),
        }
    }

    /// Execute a data directive against the synced-record store.
    ///
    /// The directive body names a data source by id or name and an optional
    /// row limit; the preview rows are merged into the payload.
    fn ground_data_directive(
        &self,
        body: &serde_json::Value,
    ) -> Option<(serde_json::Value, Option<String>)> {
        let source_ref = body.get("source")?.as_str()?;
        let source = self.resolve_source(source_ref)?;
        let limit = body
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_PREVIEW_ROWS);
        let query = body
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let preview = match self.records.preview(source.id, limit) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(source = %source.id, error = %e, "Preview query failed");
                return None;
            }
        };

        let rows: Vec<serde_json::Value> = preview
            .into_iter()
            .map(|r| {
                serde_json::json!({
                    "external_id": r.external_id,
                    "values": r.values,
                })
            })
            .collect();

        let mut payload = body.clone();
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("source_id".to_string(), serde_json::json!(source.id));
            obj.insert("records".to_string(), serde_json::Value::Array(rows));
        }
        Some((payload, query))
    }

    fn resolve_source(&self, source_ref: &str) -> Option<DataSource> {
        if let Ok(id) = Uuid::parse_str(source_ref) {
            return self.sources.find_by_id(id).ok().flatten();
        }
        self.sources
            .list()
            .ok()?
            .into_iter()
            .find(|s| s.name == source_ref)
    }

    fn emit(&self, event: DomainEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
