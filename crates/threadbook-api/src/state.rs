use std::sync::Arc;

use jsonwebtoken::DecodingKey;

use threadbook_db::Database;
use threadbook_gateway::{EventFanout, TokenIssuer};

use crate::membership::MembershipOracle;
use crate::messages::MessageStore;
use crate::threads::ThreadDirectory;
use crate::tokens::TokenService;
use crate::voice::{VoiceBackend, VoiceRoomGate};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub oracle: MembershipOracle,
    pub threads: ThreadDirectory,
    pub messages: MessageStore,
    pub tokens: TokenService,
    pub voice: VoiceRoomGate,
    /// Verifies session JWTs from the auth service.
    pub session_key: DecodingKey,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        fanout: EventFanout,
        issuer: TokenIssuer,
        voice: Option<VoiceBackend>,
        session_secret: &str,
    ) -> AppState {
        let oracle = MembershipOracle::new(db.clone());
        Arc::new(Self {
            threads: ThreadDirectory::new(db.clone(), oracle.clone(), fanout.clone(), issuer.clone()),
            messages: MessageStore::new(db.clone(), oracle.clone(), fanout),
            tokens: TokenService::new(oracle.clone(), issuer),
            voice: VoiceRoomGate::new(db, oracle.clone(), voice),
            oracle,
            session_key: DecodingKey::from_secret(session_secret.as_bytes()),
        })
    }
}
