//! Websocket front for the in-process broker.
//!
//! Clients open `/connection/websocket?token=<connect token>` and then send
//! JSON commands, one per text frame:
//!
//! ```text
//! {"subscribe": {"channel": "thread#7", "token": "<subscribe token>"}}
//! {"unsubscribe": {"channel": "thread#7"}}
//! ```
//!
//! Every command gets a reply frame. Published envelopes arrive as text
//! frames, byte for byte as they were published.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::LocalBroker;

/// Server pings every 15 seconds so idle proxies keep the socket open.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const OUTBOUND_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Subscribe { channel: String, token: String },
    Unsubscribe { channel: String },
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Subscribed { channel: String },
    Unsubscribed { channel: String },
    Error { message: String },
}

/// Subscriptions held by one connected client. Each subscribed channel has a
/// task copying broker traffic into the client's outbound queue.
pub struct ClientSession {
    broker: LocalBroker,
    user: String,
    outbound: mpsc::Sender<Bytes>,
    forwards: HashMap<String, JoinHandle<()>>,
}

impl ClientSession {
    pub fn new(broker: LocalBroker, user: String, outbound: mpsc::Sender<Bytes>) -> Self {
        Self {
            broker,
            user,
            outbound,
            forwards: HashMap::new(),
        }
    }

    pub async fn handle(&mut self, raw: &str) -> Reply {
        match serde_json::from_str::<Command>(raw) {
            Ok(Command::Subscribe { channel, token }) => self.subscribe(channel, &token).await,
            Ok(Command::Unsubscribe { channel }) => self.unsubscribe(channel).await,
            Err(e) => Reply::Error {
                message: format!("malformed command: {}", e),
            },
        }
    }

    async fn subscribe(&mut self, channel: String, token: &str) -> Reply {
        if self.forwards.contains_key(&channel) {
            return Reply::Subscribed { channel };
        }

        let subscription = match self.broker.subscribe(&channel, token).await {
            Ok(subscription) => subscription,
            Err(e) => {
                debug!(channel, user = %self.user, "subscribe refused: {:#}", e);
                return Reply::Error {
                    message: format!("subscribe to {} refused", channel),
                };
            }
        };
        // A subscribe token only counts on the connection of its own subject.
        if subscription.claims.sub != self.user {
            warn!(channel, user = %self.user, owner = %subscription.claims.sub, "foreign subscribe token");
            return Reply::Error {
                message: format!("subscribe to {} refused", channel),
            };
        }

        let task = tokio::spawn(forward(channel.clone(), subscription.receiver, self.outbound.clone()));
        self.forwards.insert(channel.clone(), task);
        Reply::Subscribed { channel }
    }

    async fn unsubscribe(&mut self, channel: String) -> Reply {
        if let Some(task) = self.forwards.remove(&channel) {
            task.abort();
            let _ = task.await;
        }
        Reply::Unsubscribed { channel }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        for task in self.forwards.values() {
            task.abort();
        }
    }
}

async fn forward(channel: String, mut receiver: broadcast::Receiver<Bytes>, outbound: mpsc::Sender<Bytes>) {
    loop {
        match receiver.recv().await {
            Ok(data) => {
                if outbound.send(data).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(channel, skipped, "client lagging, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[derive(Deserialize)]
struct ConnectQuery {
    token: String,
}

/// Router serving the websocket endpoint for `broker`.
pub fn routes(broker: LocalBroker) -> Router {
    Router::new()
        .route("/connection/websocket", get(upgrade))
        .with_state(broker)
}

async fn upgrade(
    State(broker): State<LocalBroker>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match broker.authenticate(&query.token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("websocket connect refused: {:#}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    ws.on_upgrade(move |socket| run_connection(socket, broker, claims.sub))
}

async fn run_connection(socket: WebSocket, broker: LocalBroker, user: String) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut events) = mpsc::channel::<Bytes>(OUTBOUND_CAPACITY);
    let mut session = ClientSession::new(broker, user.clone(), outbound);
    info!(user, "transport client connected");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            Some(data) = events.recv() => {
                let Ok(text) = String::from_utf8(data.to_vec()) else {
                    warn!(user, "dropping non-utf8 event");
                    continue;
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = session.handle(text.as_str()).await;
                    let Ok(json) = serde_json::to_string(&reply) else {
                        break;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(user, "transport client disconnected");
}
