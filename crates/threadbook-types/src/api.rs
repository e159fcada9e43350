use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{SpoolId, ThreadId, UserId};

// -- Session --

/// Claims of the session JWT minted by the external auth service.
/// The core trusts `(sub, username)` without re-checking credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,
    pub username: String,
    pub exp: usize,
}

// -- Threads --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateThreadRequest {
    pub spool_id: SpoolId,
    pub title: String,
    #[serde(rename = "type")]
    pub thread_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateThreadRequest {
    pub id: ThreadId,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub thread_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseThreadRequest {
    pub thread_id: ThreadId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InviteRequest {
    pub thread_id: ThreadId,
    pub usernames: Vec<String>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    /// Links returned by the file store.
    #[serde(default)]
    pub payloads: Vec<String>,
}

// -- Tokens --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectAndSubscribeTokens {
    pub connect_token: String,
    /// channel name -> subscribe token
    pub channel_tokens: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeTokenResponse {
    pub channel: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoiceTokenRequest {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceTokenResponse {
    pub room: String,
    pub token: String,
}
