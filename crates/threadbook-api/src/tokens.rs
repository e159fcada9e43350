use std::collections::BTreeMap;

use anyhow::Context;
use tracing::{debug, warn};

use threadbook_gateway::{TokenIssuer, channels};
use threadbook_types::api::{ConnectAndSubscribeTokens, SubscribeTokenResponse};
use threadbook_types::{SpoolId, ThreadId, UserId};

use crate::error::{CoreError, CoreResult};
use crate::membership::MembershipOracle;

/// Hands out transport tokens, checking membership before any thread
/// channel is granted.
#[derive(Clone)]
pub struct TokenService {
    oracle: MembershipOracle,
    issuer: TokenIssuer,
}

impl TokenService {
    pub fn new(oracle: MembershipOracle, issuer: TokenIssuer) -> Self {
        Self { oracle, issuer }
    }

    /// Connect token plus a subscribe token for the caller's own user channel.
    pub fn user_tokens(&self, user_id: UserId) -> CoreResult<ConnectAndSubscribeTokens> {
        let connect_token = self.issuer.connect_token(user_id)?;
        let channel = channels::user_channel(user_id);
        let token = self.issuer.subscribe_token(user_id, &channel)?;

        Ok(ConnectAndSubscribeTokens {
            connect_token,
            channel_tokens: BTreeMap::from([(channel, token)]),
        })
    }

    /// Like [`Self::user_tokens`], plus one subscribe token per thread of the
    /// spool the user belongs to. A thread whose token fails to sign is left out.
    pub async fn spool_tokens(&self, user_id: UserId, spool_id: SpoolId) -> CoreResult<ConnectAndSubscribeTokens> {
        let mut tokens = self.user_tokens(user_id)?;

        let thread_ids = self.oracle.accessible_thread_ids(user_id, spool_id).await?;
        for thread_id in thread_ids {
            let channel = channels::thread_channel(thread_id);
            match self.issuer.subscribe_token(user_id, &channel) {
                Ok(token) => {
                    tokens.channel_tokens.insert(channel, token);
                }
                Err(e) => warn!(user_id, thread_id, "thread token skipped: {:#}", e),
            }
        }

        debug!(user_id, spool_id, channels = tokens.channel_tokens.len(), "spool tokens issued");
        Ok(tokens)
    }

    /// Subscribe token for one thread channel. Members only.
    pub async fn thread_subscribe_token(
        &self,
        user_id: UserId,
        thread_id: ThreadId,
    ) -> CoreResult<SubscribeTokenResponse> {
        if !self.oracle.is_member(user_id, thread_id).await? {
            return Err(CoreError::Forbidden);
        }
        let channel = channels::thread_channel(thread_id);
        let token = self
            .issuer
            .subscribe_token(user_id, &channel)
            .context("thread subscribe token")?;
        Ok(SubscribeTokenResponse { channel, token })
    }
}
