use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageId, SpoolId, ThreadId, ThreadType, UserId};

/// Events published to the pub/sub transport.
///
/// Serialized as `{"type": "...", "payload": {...}}`. Thread lifecycle events
/// go to each member's user channel; `MessageCreated` goes once to the thread channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// A message was appended to a thread
    #[serde(rename = "message.created")]
    MessageCreated {
        message_id: MessageId,
        thread_id: ThreadId,
        user_id: UserId,
        username: String,
        content: String,
        payloads: Vec<String>,
        created_at: i64,
    },

    /// The recipient became a member of a new thread. Carries a subscribe
    /// token for the thread channel so the client can subscribe right away.
    #[serde(rename = "thread.created")]
    ThreadCreated {
        thread_id: ThreadId,
        spool_id: SpoolId,
        title: String,
        thread_type: ThreadType,
        created_at: i64,
        channel: String,
        token: String,
    },

    /// Title or type changed
    #[serde(rename = "thread.updated")]
    ThreadUpdated {
        thread_id: ThreadId,
        title: String,
        thread_type: ThreadType,
        updated_at: i64,
    },

    /// Thread closed by its creator. May arrive more than once.
    #[serde(rename = "thread.closed")]
    ThreadClosed { thread_id: ThreadId },

    /// The recipient was invited into a private thread
    #[serde(rename = "thread.invited")]
    ThreadInvited {
        thread_id: ThreadId,
        spool_id: SpoolId,
        title: String,
        channel: String,
        token: String,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageCreated { .. } => "message.created",
            Self::ThreadCreated { .. } => "thread.created",
            Self::ThreadUpdated { .. } => "thread.updated",
            Self::ThreadClosed { .. } => "thread.closed",
            Self::ThreadInvited { .. } => "thread.invited",
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        match self {
            Self::MessageCreated { thread_id, .. }
            | Self::ThreadCreated { thread_id, .. }
            | Self::ThreadUpdated { thread_id, .. }
            | Self::ThreadClosed { thread_id }
            | Self::ThreadInvited { thread_id, .. } => *thread_id,
        }
    }
}

/// Who an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Target {
    User(UserId),
    Thread(ThreadId),
}

/// What actually goes over the wire. `id` is fresh per publish so clients
/// can drop redeliveries.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a> {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: &'a Event,
    pub target: Target,
}

impl<'a> Envelope<'a> {
    pub fn new(event: &'a Event, target: Target) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            target,
        }
    }
}
