use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MessageContentType, RefreshOutcome, RefreshTrigger};

/// All domain events that can occur in the Prism system.
///
/// Events are emitted by the refresh executor and the chat engine after
/// state changes and consumed by:
/// - The application's event logging task
/// - Cross-context listeners (tests subscribe to observe async completions)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DomainEvent {
    // =========================================================================
    // Refresh pipeline events
    // =========================================================================
    /// The scheduler found a source due and spawned an executor run.
    RefreshEnqueued {
        data_source_id: Uuid,
    },

    /// An executor acquired the lock and began fetching.
    RefreshStarted {
        data_source_id: Uuid,
        trigger: RefreshTrigger,
    },

    /// An executor run finished; the audit entry carries the counts.
    RefreshFinished {
        data_source_id: Uuid,
        outcome: RefreshOutcome,
        records_fetched: i64,
    },

    /// A run found the lock already held and recorded a skip.
    RefreshSkipped {
        data_source_id: Uuid,
    },

    /// A stale `running` status was reset to `failed` at startup.
    RefreshRecovered {
        data_source_id: Uuid,
    },

    // =========================================================================
    // Chat events
    // =========================================================================
    /// A new chat session was created.
    SessionCreated {
        session_id: Uuid,
        user_id: String,
    },

    /// A user message was appended and reply generation dispatched.
    UserMessagePosted {
        session_id: Uuid,
        message_id: Uuid,
    },

    /// A reply (assistant or system/error) was appended for a user message.
    ReplyAppended {
        session_id: Uuid,
        message_id: Uuid,
        content_type: MessageContentType,
    },

    /// A completed generation was discarded because the session had been
    /// deactivated while the call was in flight.
    ReplyDiscarded {
        session_id: Uuid,
    },

    /// A session was deactivated.
    SessionDeactivated {
        session_id: Uuid,
    },
}

/// Capacity of the broadcast channel carrying domain events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Create the broadcast channel used to fan out domain events.
pub fn event_channel() -> (
    tokio::sync::broadcast::Sender<DomainEvent>,
    tokio::sync::broadcast::Receiver<DomainEvent>,
) {
    tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RefreshOutcome;

    #[test]
    fn test_event_serialization() {
        let event = DomainEvent::RefreshFinished {
            data_source_id: Uuid::new_v4(),
            outcome: RefreshOutcome::Success,
            records_fetched: 12,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("RefreshFinished"));
        assert!(json.contains("success"));
    }

    #[tokio::test]
    async fn test_event_channel_delivery() {
        let (tx, mut rx) = event_channel();
        tx.send(DomainEvent::RefreshSkipped {
            data_source_id: Uuid::new_v4(),
        })
        .unwrap();
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, DomainEvent::RefreshSkipped { .. }));
    }

    #[tokio::test]
    async fn test_event_channel_multiple_subscribers() {
        let (tx, mut rx1) = event_channel();
        let mut rx2 = tx.subscribe();
        tx.send(DomainEvent::SessionDeactivated {
            session_id: Uuid::new_v4(),
        })
        .unwrap();
        assert!(matches!(
            rx1.recv().await.unwrap(),
            DomainEvent::SessionDeactivated { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            DomainEvent::SessionDeactivated { .. }
        ));
    }
}
