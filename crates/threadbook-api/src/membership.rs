use std::sync::Arc;

use anyhow::Result;
use threadbook_db::Database;
use threadbook_types::{SpoolId, ThreadId, UserId};

use crate::blocking;

/// Answers "may this user see this thread" from the membership table.
///
/// Every read and write of thread-scoped data goes through here first.
/// Storage failures are returned as errors and never read as "not a member".
#[derive(Clone)]
pub struct MembershipOracle {
    db: Arc<Database>,
}

impl MembershipOracle {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn is_member(&self, user_id: UserId, thread_id: ThreadId) -> Result<bool> {
        blocking(&self.db, "check thread membership", move |db| {
            db.is_thread_member(user_id, thread_id)
        })
        .await
    }

    pub async fn is_spool_member(&self, user_id: UserId, spool_id: SpoolId) -> Result<bool> {
        blocking(&self.db, "check spool membership", move |db| {
            db.is_spool_member(user_id, spool_id)
        })
        .await
    }

    pub async fn thread_members(&self, thread_id: ThreadId) -> Result<Vec<UserId>> {
        blocking(&self.db, "list thread members", move |db| db.thread_member_ids(thread_id)).await
    }

    /// Threads of `spool_id` the user currently belongs to.
    pub async fn accessible_thread_ids(&self, user_id: UserId, spool_id: SpoolId) -> Result<Vec<ThreadId>> {
        blocking(&self.db, "list accessible threads", move |db| {
            db.accessible_thread_ids(user_id, spool_id)
        })
        .await
    }
}
