use std::sync::Arc;

use tracing::{debug, info, warn};

use threadbook_db::Database;
use threadbook_db::models::{Guarded, InviteOutcome, ThreadRow};
use threadbook_gateway::{EventFanout, TokenIssuer, channels};
use threadbook_types::events::Event;
use threadbook_types::models::{Thread, ThreadType};
use threadbook_types::{SpoolId, ThreadId, UserId};

use crate::blocking;
use crate::error::{CoreError, CoreResult};
use crate::membership::MembershipOracle;

const MAX_TITLE_LEN: usize = 128;

/// Thread lifecycle: create, update, close, invite, list.
///
/// Each mutation commits first and announces afterwards. Lifecycle events go
/// to the user channel of every member, one publish per member.
#[derive(Clone)]
pub struct ThreadDirectory {
    db: Arc<Database>,
    oracle: MembershipOracle,
    fanout: EventFanout,
    issuer: TokenIssuer,
}

impl ThreadDirectory {
    pub fn new(db: Arc<Database>, oracle: MembershipOracle, fanout: EventFanout, issuer: TokenIssuer) -> Self {
        Self {
            db,
            oracle,
            fanout,
            issuer,
        }
    }

    /// Public threads start with every active spool member, private ones with
    /// the creator alone.
    pub async fn create_thread(
        &self,
        creator_id: UserId,
        spool_id: SpoolId,
        title: &str,
        thread_type: &str,
    ) -> CoreResult<Thread> {
        let thread_type = parse_type(thread_type)?;
        let title = normalize_title(title)?;
        if spool_id <= 0 {
            return Err(CoreError::InvalidInput("spool id".into()));
        }
        if !self.oracle.is_spool_member(creator_id, spool_id).await? {
            return Err(CoreError::Forbidden);
        }

        let (row, members) = blocking(&self.db, "create thread", move |db| {
            db.create_thread(creator_id, spool_id, &title, thread_type)
        })
        .await?;
        let thread = row.into_thread()?;

        info!(
            thread_id = thread.id,
            spool_id,
            thread_type = %thread.thread_type,
            members = members.len(),
            "thread created"
        );

        let channel = channels::thread_channel(thread.id);
        for member in members {
            let Some(token) = self.mint_for(member, &channel) else {
                continue;
            };
            let event = Event::ThreadCreated {
                thread_id: thread.id,
                spool_id: thread.spool_id,
                title: thread.title.clone(),
                thread_type: thread.thread_type,
                created_at: thread.created_at.timestamp(),
                channel: channel.clone(),
                token,
            };
            self.fanout.publish_to_user(member, &event).await;
        }

        Ok(thread)
    }

    /// Creator-only. Absent fields keep their stored value. Changing the type
    /// does not add or remove members.
    pub async fn update_thread(
        &self,
        thread_id: ThreadId,
        editor_id: UserId,
        title: Option<&str>,
        thread_type: Option<&str>,
    ) -> CoreResult<Thread> {
        let thread_type = thread_type.map(parse_type).transpose()?;
        let title = title.map(normalize_title).transpose()?;

        let guarded = blocking(&self.db, "update thread", move |db| {
            db.update_thread(thread_id, editor_id, title.as_deref(), thread_type)
        })
        .await?;
        let thread = unguard(guarded)?;

        debug!(thread_id, "thread updated");
        let event = Event::ThreadUpdated {
            thread_id: thread.id,
            title: thread.title.clone(),
            thread_type: thread.thread_type,
            updated_at: thread.updated_at.timestamp(),
        };
        self.announce(thread.id, &event).await;

        Ok(thread)
    }

    /// Creator-only. Closing twice succeeds and announces twice.
    pub async fn close_thread(&self, thread_id: ThreadId, user_id: UserId) -> CoreResult<Thread> {
        let guarded = blocking(&self.db, "close thread", move |db| db.close_thread(thread_id, user_id)).await?;
        let thread = unguard(guarded)?;

        info!(thread_id, "thread closed");
        self.announce(thread.id, &Event::ThreadClosed { thread_id: thread.id }).await;

        Ok(thread)
    }

    /// Add members to a private thread. Only the creator may invite.
    ///
    /// Unknown usernames and users outside the spool are logged and skipped;
    /// the rest of the batch still goes through. Re-inviting a member is a no-op.
    pub async fn invite_to_thread(
        &self,
        inviter_id: UserId,
        usernames: &[String],
        thread_id: ThreadId,
    ) -> CoreResult<()> {
        let usernames: Vec<String> = usernames
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if usernames.is_empty() {
            return Err(CoreError::InvalidInput("no usernames to invite".into()));
        }

        let thread = self.load(thread_id).await?;
        if thread.thread_type != ThreadType::Private || !thread.is_creator(inviter_id) {
            return Err(CoreError::Forbidden);
        }

        let spool_id = thread.spool_id;
        let outcomes = blocking(&self.db, "invite thread members", move |db| {
            db.invite_members(thread_id, spool_id, &usernames)
        })
        .await?;

        let channel = channels::thread_channel(thread.id);
        for (username, outcome) in outcomes {
            let user_id = match outcome {
                InviteOutcome::Added(user_id) => user_id,
                InviteOutcome::AlreadyMember(user_id) => {
                    debug!(thread_id, user_id, "invitee already a member");
                    continue;
                }
                InviteOutcome::UserNotFound => {
                    warn!(thread_id, "invite skipped: {}", CoreError::UserNotFound(username));
                    continue;
                }
                InviteOutcome::NotInSpool(user_id) => {
                    warn!(thread_id, user_id, "invite skipped: {}", CoreError::UserNotInSpool(username));
                    continue;
                }
            };

            info!(thread_id, user_id, "member invited");
            let Some(token) = self.mint_for(user_id, &channel) else {
                continue;
            };
            let event = Event::ThreadInvited {
                thread_id: thread.id,
                spool_id: thread.spool_id,
                title: thread.title.clone(),
                channel: channel.clone(),
                token,
            };
            self.fanout.publish_to_user(user_id, &event).await;
        }

        Ok(())
    }

    /// Threads of the spool the user belongs to. Private threads without a
    /// membership never appear.
    pub async fn get_by_spool_id(&self, user_id: UserId, spool_id: SpoolId) -> CoreResult<Vec<Thread>> {
        let rows = blocking(&self.db, "list spool threads", move |db| {
            db.threads_for_member(user_id, spool_id)
        })
        .await?;
        Ok(rows.into_iter().map(ThreadRow::into_thread).collect::<anyhow::Result<_>>()?)
    }

    async fn load(&self, thread_id: ThreadId) -> CoreResult<Thread> {
        let row = blocking(&self.db, "load thread", move |db| db.get_thread(thread_id)).await?;
        Ok(row.ok_or(CoreError::ThreadNotFound)?.into_thread()?)
    }

    async fn announce(&self, thread_id: ThreadId, event: &Event) {
        let members = match self.oracle.thread_members(thread_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(thread_id, "{} not announced: {:#}", event.kind(), e);
                return;
            }
        };
        for member in members {
            self.fanout.publish_to_user(member, event).await;
        }
    }

    fn mint_for(&self, user_id: UserId, channel: &str) -> Option<String> {
        match self.issuer.subscribe_token(user_id, channel) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(user_id, channel, "subscribe token not minted: {:#}", e);
                None
            }
        }
    }
}

fn parse_type(raw: &str) -> CoreResult<ThreadType> {
    ThreadType::parse(raw).ok_or_else(|| CoreError::InvalidType(raw.to_string()))
}

fn normalize_title(raw: &str) -> CoreResult<String> {
    let title = raw.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::InvalidInput(format!(
            "title must be 1 to {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

fn unguard(guarded: Guarded<ThreadRow>) -> CoreResult<Thread> {
    match guarded {
        Guarded::NotFound => Err(CoreError::ThreadNotFound),
        Guarded::NotCreator => Err(CoreError::Forbidden),
        Guarded::Done(row) => Ok(row.into_thread()?),
    }
}
