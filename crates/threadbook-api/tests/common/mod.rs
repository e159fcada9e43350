#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;

use threadbook_api::{AppState, AppStateInner, VoiceBackend};
use threadbook_db::Database;
use threadbook_gateway::{EventFanout, LocalBroker, MediaRooms, Publisher, TokenIssuer, TokenVerifier, VoiceGrants};
use threadbook_types::{SpoolId, UserId};

pub const TRANSPORT_SECRET: &str = "transport-test-secret";
pub const SESSION_SECRET: &str = "session-test-secret";
pub const LIVEKIT_KEY: &str = "APItest";
pub const LIVEKIT_SECRET: &str = "livekit-test-secret";

/// Forwards to the in-process broker and keeps a copy of every publish.
pub struct RecordingPublisher {
    pub broker: LocalBroker,
    sent: Mutex<Vec<(String, serde_json::Value)>>,
    down: AtomicBool,
}

impl RecordingPublisher {
    pub fn sent(&self) -> Vec<(String, serde_json::Value)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, channel: &str) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn of_type(&self, kind: &str) -> Vec<(String, serde_json::Value)> {
        self.sent().into_iter().filter(|(_, v)| v["type"] == kind).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Make every later publish fail.
    pub fn go_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, channel: &str, data: Bytes) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            bail!("broker unreachable");
        }
        let value = serde_json::from_slice(&data)?;
        self.sent.lock().unwrap().push((channel.to_string(), value));
        self.broker.publish(channel, data).await
    }
}

/// Media service double that remembers which rooms were ensured.
#[derive(Default)]
pub struct FakeRooms {
    ensured: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl FakeRooms {
    pub fn ensured(&self) -> Vec<String> {
        self.ensured.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaRooms for FakeRooms {
    async fn ensure_room(&self, name: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("media service returned HTTP 503");
        }
        self.ensured.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// alice, bob and carol share spool `team`; dave only belongs to `other`.
pub struct Harness {
    pub db: Arc<Database>,
    pub state: AppState,
    pub publisher: Arc<RecordingPublisher>,
    pub rooms: Arc<FakeRooms>,
    pub verifier: TokenVerifier,
    pub team: SpoolId,
    pub other: SpoolId,
    pub alice: UserId,
    pub bob: UserId,
    pub carol: UserId,
    pub dave: UserId,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());

        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();
        let carol = db.create_user("carol").unwrap();
        let dave = db.create_user("dave").unwrap();
        let team = db.create_spool("team").unwrap();
        let other = db.create_spool("other").unwrap();
        for user in [alice, bob, carol] {
            db.add_spool_member(team, user).unwrap();
        }
        db.add_spool_member(other, dave).unwrap();

        let verifier = TokenVerifier::new(TRANSPORT_SECRET, None);
        let publisher = Arc::new(RecordingPublisher {
            broker: LocalBroker::new(verifier.clone()),
            sent: Mutex::new(Vec::new()),
            down: AtomicBool::new(false),
        });
        let rooms = Arc::new(FakeRooms::default());

        let state = AppStateInner::new(
            db.clone(),
            EventFanout::new(publisher.clone()),
            TokenIssuer::new(TRANSPORT_SECRET, None, Duration::from_secs(3600)),
            Some(VoiceBackend {
                rooms: rooms.clone(),
                grants: VoiceGrants::new(LIVEKIT_KEY, LIVEKIT_SECRET, Duration::from_secs(900)),
            }),
            SESSION_SECRET,
        );

        Self {
            db,
            state,
            publisher,
            rooms,
            verifier,
            team,
            other,
            alice,
            bob,
            carol,
            dave,
        }
    }
}
