//! Capability tokens for the pub/sub transport.
//!
//! Tokens are HS256 JWTs signed with the secret shared with the transport.
//! Nothing is stored: a token lives until `exp`, and the only way to revoke
//! outstanding tokens is to rotate the secret.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use threadbook_types::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Stateless signer for connect and subscribe tokens.
///
/// It does not check membership. Callers must prove the subject may see a
/// channel before asking for a subscribe token for it.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    issuer: Option<String>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, issuer: Option<String>, ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            issuer,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Permission to open a transport connection. Grants no channel.
    pub fn connect_token(&self, user_id: UserId) -> Result<String> {
        self.sign(user_id, None).context("sign connect token")
    }

    /// Permission to subscribe `user_id` to exactly `channel`.
    pub fn subscribe_token(&self, user_id: UserId, channel: &str) -> Result<String> {
        self.sign(user_id, Some(channel))
            .with_context(|| format!("sign subscribe token for {}", channel))
    }

    fn sign(&self, user_id: UserId, channel: Option<&str>) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = TransportClaims {
            sub: user_id.to_string(),
            channel: channel.map(str::to_string),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
            iss: self.issuer.clone(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.key)?)
    }
}

/// Transport-side verification of the tokens above, as the pub/sub server
/// performs it. Used by the in-process broker.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    issuer: Option<String>,
}

impl TokenVerifier {
    pub fn new(secret: &str, issuer: Option<String>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
        }
    }

    /// Channel-scoped tokens do not open connections.
    pub fn verify_connect(&self, token: &str) -> Result<TransportClaims> {
        let claims = self.decode(token)?;
        if claims.channel.is_some() {
            bail!("subscribe token used to connect");
        }
        Ok(claims)
    }

    /// Accepts the token only if its `channel` claim is exactly `channel`.
    pub fn verify_subscribe(&self, token: &str, channel: &str) -> Result<TransportClaims> {
        let claims = self.decode(token)?;
        match claims.channel.as_deref() {
            Some(scoped) if scoped == channel => Ok(claims),
            Some(scoped) => bail!("token is scoped to {}, not {}", scoped, channel),
            None => bail!("token carries no channel claim"),
        }
    }

    fn decode(&self, token: &str) -> Result<TransportClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }
        let data = decode::<TransportClaims>(token, &self.key, &validation).context("invalid transport token")?;
        Ok(data.claims)
    }
}
