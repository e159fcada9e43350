//! Media-routing service (LiveKit): room provisioning and join grants.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Sources a voice participant may publish.
const PUBLISH_SOURCES: &[&str] = &["camera", "microphone", "screen_share"];

#[async_trait]
pub trait MediaRooms: Send + Sync {
    /// Create the room if it does not exist. An existing room is success.
    async fn ensure_room(&self, name: &str) -> Result<()>;
}

/// Room lifecycle settings, fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub empty_timeout_secs: u32,
    pub max_participants: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            empty_timeout_secs: 300,
            max_participants: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_create: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_join: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_publish_data: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub can_publish_sources: Vec<String>,
}

/// LiveKit access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantClaims {
    pub iss: String,
    pub sub: String,
    pub nbf: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub video: VideoGrant,
}

/// Signs LiveKit grants with the API key/secret pair.
#[derive(Clone)]
pub struct VoiceGrants {
    api_key: String,
    key: EncodingKey,
    ttl: Duration,
}

impl VoiceGrants {
    pub fn new(api_key: impl Into<String>, api_secret: &str, ttl: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            key: EncodingKey::from_secret(api_secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Join grant for one room with publish, subscribe and data rights.
    pub fn join_token(&self, identity: &str, room: &str) -> Result<String> {
        let grant = VideoGrant {
            room_join: true,
            room: Some(room.to_string()),
            can_publish: Some(true),
            can_subscribe: Some(true),
            can_publish_data: Some(true),
            can_publish_sources: PUBLISH_SOURCES.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        self.sign(identity, Some(identity.to_string()), grant, self.ttl)
            .with_context(|| format!("sign voice token for room {}", room))
    }

    /// Short-lived server credential for the room service API.
    fn admin_token(&self) -> Result<String> {
        let grant = VideoGrant {
            room_create: true,
            ..Default::default()
        };
        self.sign(&self.api_key, None, grant, Duration::from_secs(60))
    }

    fn sign(&self, identity: &str, name: Option<String>, video: VideoGrant, ttl: Duration) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = GrantClaims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            nbf: now,
            exp: now + ttl.as_secs() as i64,
            name,
            video,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.key)?)
    }
}

#[derive(Deserialize)]
struct TwirpError {
    code: String,
    #[serde(default)]
    msg: String,
}

/// LiveKit room service client over its Twirp JSON API.
pub struct LiveKitRooms {
    http: reqwest::Client,
    base_url: String,
    grants: VoiceGrants,
    settings: RoomSettings,
}

impl LiveKitRooms {
    pub fn new(url: &str, grants: VoiceGrants, settings: RoomSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build livekit http client")?;
        Ok(Self {
            http,
            base_url: http_base_url(url),
            grants,
            settings,
        })
    }
}

/// LiveKit URLs are usually given as ws(s):// for clients.
fn http_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else {
        url.to_string()
    }
}

#[async_trait]
impl MediaRooms for LiveKitRooms {
    async fn ensure_room(&self, name: &str) -> Result<()> {
        let token = self.grants.admin_token()?;
        let body = serde_json::json!({
            "name": name,
            "empty_timeout": self.settings.empty_timeout_secs,
            "max_participants": self.settings.max_participants,
        });

        let resp = self
            .http
            .post(format!("{}/twirp/livekit.RoomService/CreateRoom", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("create room {}", name))?;

        let status = resp.status();
        if status.is_success() {
            info!(room = name, "media room ready");
            return Ok(());
        }
        if status == StatusCode::CONFLICT {
            debug!(room = name, "media room already exists");
            return Ok(());
        }

        match resp.json::<TwirpError>().await {
            Ok(err) if err.code == "already_exists" => Ok(()),
            Ok(err) => bail!("create room {} failed: {} ({}, HTTP {})", name, err.msg, err.code, status),
            Err(_) => bail!("create room {} failed with HTTP {}", name, status),
        }
    }
}
