//! Database row types. These map directly to SQLite rows and are converted
//! into `threadbook-types` models at the edge.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use threadbook_types::models::{Message, Payload, Thread, ThreadType};
use threadbook_types::{MessageId, SpoolId, ThreadId, UserId};

pub struct ThreadRow {
    pub id: ThreadId,
    pub creator_id: UserId,
    pub spool_id: SpoolId,
    pub title: String,
    pub thread_type: String,
    pub is_closed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadRow {
    pub fn into_thread(self) -> Result<Thread> {
        let thread_type = ThreadType::parse(&self.thread_type)
            .ok_or_else(|| anyhow!("thread {} has unknown type '{}'", self.id, self.thread_type))?;
        Ok(Thread {
            id: self.id,
            creator_id: self.creator_id,
            spool_id: self.spool_id,
            title: self.title,
            thread_type,
            is_closed: self.is_closed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct MessageRow {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub user_id: UserId,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payloads: Vec<PayloadRow>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            thread_id: row.thread_id,
            user_id: row.user_id,
            username: row.username,
            content: row.content,
            payloads: row.payloads.into_iter().map(Payload::from).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PayloadRow {
    pub id: i64,
    pub message_id: MessageId,
    pub file_link: String,
    pub created_at: DateTime<Utc>,
}

impl From<PayloadRow> for Payload {
    fn from(row: PayloadRow) -> Self {
        Payload {
            id: row.id,
            message_id: row.message_id,
            file_link: row.file_link,
            created_at: row.created_at,
        }
    }
}

/// Result of a creator-only mutation that ran inside one transaction.
pub enum Guarded<T> {
    NotFound,
    NotCreator,
    Done(T),
}

/// Result of appending to a thread, decided inside the insert transaction.
pub enum Posted<T> {
    NotMember,
    Closed,
    Stored(T),
}

/// Per-username result of an invite batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteOutcome {
    Added(UserId),
    AlreadyMember(UserId),
    UserNotFound,
    NotInSpool(UserId),
}
