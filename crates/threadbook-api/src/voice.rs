use std::sync::Arc;

use anyhow::anyhow;
use tracing::{error, info};

use threadbook_db::Database;
use threadbook_gateway::{MediaRooms, VoiceGrants, channels};
use threadbook_types::api::VoiceTokenResponse;
use threadbook_types::{ThreadId, UserId};

use crate::blocking;
use crate::error::{CoreError, CoreResult};
use crate::membership::MembershipOracle;

/// The media service and the key its join tokens are signed with.
#[derive(Clone)]
pub struct VoiceBackend {
    pub rooms: Arc<dyn MediaRooms>,
    pub grants: VoiceGrants,
}

/// Admits thread members into the thread's voice room.
///
/// Without a backend every admitted request fails with `FailedToEnsureRoom`.
#[derive(Clone)]
pub struct VoiceRoomGate {
    db: Arc<Database>,
    oracle: MembershipOracle,
    backend: Option<VoiceBackend>,
}

impl VoiceRoomGate {
    pub fn new(db: Arc<Database>, oracle: MembershipOracle, backend: Option<VoiceBackend>) -> Self {
        Self { db, oracle, backend }
    }

    /// Ensure the room `thread_<id>` exists and return a join token for it,
    /// with the username as participant identity.
    pub async fn get_voice_token(
        &self,
        user_id: UserId,
        username: &str,
        thread_id: ThreadId,
    ) -> CoreResult<VoiceTokenResponse> {
        if user_id <= 0 || thread_id <= 0 || username.trim().is_empty() {
            return Err(CoreError::InvalidInput("user, username and thread are required".into()));
        }

        let exists = blocking(&self.db, "load thread", move |db| db.get_thread(thread_id))
            .await?
            .is_some();
        if !exists {
            return Err(CoreError::ThreadNotFound);
        }
        if !self.oracle.is_member(user_id, thread_id).await? {
            return Err(CoreError::NoRightsOnJoinRoom);
        }

        let room = channels::voice_room(thread_id);
        let Some(backend) = &self.backend else {
            return Err(CoreError::FailedToEnsureRoom(anyhow!("voice is disabled")));
        };
        if let Err(e) = backend.rooms.ensure_room(&room).await {
            error!(room = %room, "ensure room failed: {:#}", e);
            return Err(CoreError::FailedToEnsureRoom(e));
        }

        let token = backend.grants.join_token(username, &room)?;
        info!(user_id, room = %room, "voice token issued");
        Ok(VoiceTokenResponse { room, token })
    }
}
