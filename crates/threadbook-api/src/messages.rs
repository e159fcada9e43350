use std::sync::Arc;

use tracing::debug;

use threadbook_db::Database;
use threadbook_db::models::Posted;
use threadbook_gateway::EventFanout;
use threadbook_types::events::Event;
use threadbook_types::models::Message;
use threadbook_types::{ThreadId, UserId};

use crate::blocking;
use crate::error::{CoreError, CoreResult};
use crate::membership::MembershipOracle;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;
const MAX_CONTENT_LEN: usize = 4000;

/// Append-only message log per thread, readable and writable by members only.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
    oracle: MembershipOracle,
    fanout: EventFanout,
}

impl MessageStore {
    pub fn new(db: Arc<Database>, oracle: MembershipOracle, fanout: EventFanout) -> Self {
        Self { db, oracle, fanout }
    }

    /// Persist a message with its payload links, then publish it once to the
    /// thread channel.
    ///
    /// Non-members get `Forbidden` whether or not the thread exists. Membership
    /// and the closed flag are decided in the insert transaction.
    pub async fn send_message(
        &self,
        thread_id: ThreadId,
        user_id: UserId,
        content: &str,
        payloads: &[String],
    ) -> CoreResult<Message> {
        let content = content.trim().to_string();
        let payloads: Vec<String> = payloads.iter().map(|p| p.trim().to_string()).collect();
        if payloads.iter().any(String::is_empty) {
            return Err(CoreError::InvalidInput("empty payload link".into()));
        }
        if content.is_empty() && payloads.is_empty() {
            return Err(CoreError::InvalidInput("message has no content".into()));
        }
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(CoreError::InvalidInput("message too long".into()));
        }

        let posted = blocking(&self.db, "insert message", move |db| {
            db.insert_message(thread_id, user_id, &content, &payloads)
        })
        .await?;
        let message = match posted {
            Posted::NotMember => return Err(CoreError::Forbidden),
            Posted::Closed => return Err(CoreError::ThreadClosed),
            Posted::Stored(row) => Message::from(row),
        };
        debug!(thread_id, message_id = message.id, "message stored");

        let event = Event::MessageCreated {
            message_id: message.id,
            thread_id,
            user_id,
            username: message.username.clone(),
            content: message.content.clone(),
            payloads: message.payloads.iter().map(|p| p.file_link.clone()).collect(),
            created_at: message.created_at.timestamp(),
        };
        self.fanout.publish_to_thread(thread_id, &event).await;

        Ok(message)
    }

    /// Oldest first. `limit <= 0` means the default page size; larger values
    /// are capped. Negative offsets count as zero.
    pub async fn get_messages(
        &self,
        thread_id: ThreadId,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<Message>> {
        if !self.oracle.is_member(user_id, thread_id).await? {
            return Err(CoreError::Forbidden);
        }

        let (limit, offset) = page_bounds(limit, offset);
        let rows = blocking(&self.db, "list messages", move |db| db.get_messages(thread_id, limit, offset)).await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    pub async fn count_messages(&self, thread_id: ThreadId, user_id: UserId) -> CoreResult<i64> {
        if !self.oracle.is_member(user_id, thread_id).await? {
            return Err(CoreError::Forbidden);
        }
        Ok(blocking(&self.db, "count messages", move |db| db.count_messages(thread_id)).await?)
    }
}

fn page_bounds(limit: i64, offset: i64) -> (u32, u32) {
    let limit = if limit <= 0 { DEFAULT_PAGE_SIZE } else { limit.min(MAX_PAGE_SIZE) };
    let offset = offset.clamp(0, u32::MAX as i64);
    (limit as u32, offset as u32)
}
