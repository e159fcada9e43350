use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use tracing::{debug, warn};

use threadbook_types::events::{Envelope, Event, Target};
use threadbook_types::{ThreadId, UserId};

use crate::channels;
use crate::publisher::Publisher;

/// Publishes domain events to user and thread channels.
///
/// Delivery is best-effort: it runs after the triggering write has committed,
/// and a failed publish is logged and dropped. There is no retry or queue.
#[derive(Clone)]
pub struct EventFanout {
    publisher: Arc<dyn Publisher>,
}

impl EventFanout {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    pub async fn publish_to_user(&self, user_id: UserId, event: &Event) {
        self.publish_logged(Target::User(user_id), event).await;
    }

    pub async fn publish_to_thread(&self, thread_id: ThreadId, event: &Event) {
        self.publish_logged(Target::Thread(thread_id), event).await;
    }

    /// Same as the logged variants but hands the error back.
    pub async fn publish(&self, target: Target, event: &Event) -> Result<()> {
        let channel = channels::for_target(target);
        let body = serde_json::to_vec(&Envelope::new(event, target))
            .with_context(|| format!("serialize {} event", event.kind()))?;

        self.publisher
            .publish(&channel, Bytes::from(body))
            .await
            .with_context(|| format!("publish {} to {}", event.kind(), channel))?;

        debug!(channel = %channel, kind = event.kind(), "event published");
        Ok(())
    }

    async fn publish_logged(&self, target: Target, event: &Event) {
        if let Err(e) = self.publish(target, event).await {
            warn!(thread_id = event.thread_id(), "event dropped: {:#}", e);
        }
    }
}
