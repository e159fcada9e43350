use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, trace};

use crate::publisher::Publisher;
use crate::tokens::{TokenVerifier, TransportClaims};

/// Per-channel buffer. Slow subscribers lag and lose the oldest events.
const CHANNEL_CAPACITY: usize = 256;

/// In-process pub/sub transport.
///
/// Stands in for the external broker in development and tests. Subscribing
/// requires a subscribe token for the exact channel, verified with the same
/// shared secret the real transport uses.
#[derive(Clone)]
pub struct LocalBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    verifier: TokenVerifier,

    /// channel name -> fan-out sender
    channels: RwLock<HashMap<String, broadcast::Sender<Bytes>>>,
}

/// A live subscription to one channel.
pub struct Subscription {
    pub claims: TransportClaims,
    pub receiver: broadcast::Receiver<Bytes>,
}

impl LocalBroker {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                verifier,
                channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Check a connect token, as the transport does when a client opens a
    /// connection.
    pub fn authenticate(&self, token: &str) -> Result<TransportClaims> {
        self.inner.verifier.verify_connect(token)
    }

    /// Subscribe to `channel` with a token minted for it.
    pub async fn subscribe(&self, channel: &str, token: &str) -> Result<Subscription> {
        let claims = self.inner.verifier.verify_subscribe(token, channel)?;

        let mut channels = self.inner.channels.write().await;
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);

        debug!(channel, user = %claims.sub, "subscribed");
        Ok(Subscription {
            claims,
            receiver: sender.subscribe(),
        })
    }

    /// Number of live receivers on a channel.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .read()
            .await
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Number of channels with a live sender.
    pub async fn channel_count(&self) -> usize {
        self.inner.channels.read().await.len()
    }
}

#[async_trait]
impl Publisher for LocalBroker {
    async fn publish(&self, channel: &str, data: Bytes) -> Result<()> {
        {
            let channels = self.inner.channels.read().await;
            match channels.get(channel) {
                None => return Ok(()),
                Some(tx) if tx.receiver_count() > 0 => {
                    let delivered = tx.send(data).unwrap_or(0);
                    trace!(channel, delivered, "local publish");
                    return Ok(());
                }
                Some(_) => {}
            }
        }

        // Every subscriber went away. Recheck under the write lock since a
        // subscribe may have raced in.
        let mut channels = self.inner.channels.write().await;
        if channels.get(channel).is_some_and(|tx| tx.receiver_count() == 0) {
            channels.remove(channel);
            debug!(channel, "dropped idle channel");
        }
        Ok(())
    }
}
