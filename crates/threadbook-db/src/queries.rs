use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use threadbook_types::models::ThreadType;
use threadbook_types::{MessageId, SpoolId, ThreadId, UserId};

use crate::Database;
use crate::models::{Guarded, InviteOutcome, MessageRow, PayloadRow, Posted, ThreadRow};

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str) -> Result<UserId> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
                params![username, Utc::now()],
            )
            .with_context(|| format!("insert user '{}'", username))?;
            Ok(conn.last_insert_rowid())
        })
    }

    // -- Spools --

    pub fn create_spool(&self, name: &str) -> Result<SpoolId> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO spools (name, created_at) VALUES (?1, ?2)",
                params![name, Utc::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Add (or re-activate) a spool member.
    pub fn add_spool_member(&self, spool_id: SpoolId, user_id: UserId) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO user_spools (user_id, spool_id, is_deleted) VALUES (?1, ?2, 0)
                 ON CONFLICT(user_id, spool_id) DO UPDATE SET is_deleted = 0",
                params![user_id, spool_id],
            )?;
            Ok(())
        })
    }

    /// Remove a user from a spool together with their memberships of its threads.
    pub fn leave_spool(&self, spool_id: SpoolId, user_id: UserId) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE user_spools SET is_deleted = 1 WHERE user_id = ?1 AND spool_id = ?2",
                params![user_id, spool_id],
            )?;
            tx.execute(
                "DELETE FROM thread_users
                 WHERE user_id = ?1
                   AND thread_id IN (SELECT id FROM threads WHERE spool_id = ?2)",
                params![user_id, spool_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn is_spool_member(&self, user_id: UserId, spool_id: SpoolId) -> Result<bool> {
        self.with_conn(|conn| query_is_spool_member(conn, user_id, spool_id))
    }

    // -- Thread membership --

    pub fn is_thread_member(&self, user_id: UserId, thread_id: ThreadId) -> Result<bool> {
        self.with_conn(|conn| query_is_thread_member(conn, user_id, thread_id))
    }

    pub fn thread_member_ids(&self, thread_id: ThreadId) -> Result<Vec<UserId>> {
        self.with_conn(|conn| query_thread_member_ids(conn, thread_id))
    }

    /// Ids of the threads in `spool_id` the user is a member of.
    pub fn accessible_thread_ids(&self, user_id: UserId, spool_id: SpoolId) -> Result<Vec<ThreadId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id FROM threads t
                 JOIN thread_users tu ON tu.thread_id = t.id
                 WHERE t.spool_id = ?1 AND tu.user_id = ?2 AND tu.is_member = 1
                 ORDER BY t.id",
            )?;
            let ids = stmt
                .query_map(params![spool_id, user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Threads --

    /// Insert a thread and its initial memberships in one transaction.
    /// Public threads get every active spool member, private ones only the creator.
    /// Returns the stored row and the resulting member ids.
    pub fn create_thread(
        &self,
        creator_id: UserId,
        spool_id: SpoolId,
        title: &str,
        thread_type: ThreadType,
    ) -> Result<(ThreadRow, Vec<UserId>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = Utc::now();

            tx.execute(
                "INSERT INTO threads (creator_id, spool_id, title, type, is_closed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                params![creator_id, spool_id, title, thread_type.as_str(), now],
            )?;
            let thread_id = tx.last_insert_rowid();

            if thread_type == ThreadType::Public {
                tx.execute(
                    "INSERT INTO thread_users (user_id, thread_id, is_member)
                     SELECT user_id, ?1, 1 FROM user_spools
                     WHERE spool_id = ?2 AND is_deleted = 0",
                    params![thread_id, spool_id],
                )?;
            }
            tx.execute(
                "INSERT OR IGNORE INTO thread_users (user_id, thread_id, is_member) VALUES (?1, ?2, 1)",
                params![creator_id, thread_id],
            )?;

            let members = query_thread_member_ids(&tx, thread_id)?;
            let row = query_thread(&tx, thread_id)?
                .with_context(|| format!("thread {} vanished inside its own transaction", thread_id))?;

            tx.commit()?;
            Ok((row, members))
        })
    }

    pub fn get_thread(&self, thread_id: ThreadId) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| query_thread(conn, thread_id))
    }

    /// Apply the provided fields if `editor_id` created the thread, then re-read
    /// the row, all inside one transaction.
    pub fn update_thread(
        &self,
        thread_id: ThreadId,
        editor_id: UserId,
        title: Option<&str>,
        thread_type: Option<ThreadType>,
    ) -> Result<Guarded<ThreadRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(existing) = query_thread(&tx, thread_id)? else {
                return Ok(Guarded::NotFound);
            };
            if existing.creator_id != editor_id {
                return Ok(Guarded::NotCreator);
            }

            tx.execute(
                "UPDATE threads
                 SET title = COALESCE(?1, title), type = COALESCE(?2, type), updated_at = ?3
                 WHERE id = ?4",
                params![title, thread_type.map(|t| t.as_str()), Utc::now(), thread_id],
            )?;

            let row = query_thread(&tx, thread_id)?
                .with_context(|| format!("thread {} vanished during update", thread_id))?;
            tx.commit()?;
            Ok(Guarded::Done(row))
        })
    }

    /// Set the closed flag. Closing an already closed thread succeeds again.
    pub fn close_thread(&self, thread_id: ThreadId, user_id: UserId) -> Result<Guarded<ThreadRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(existing) = query_thread(&tx, thread_id)? else {
                return Ok(Guarded::NotFound);
            };
            if existing.creator_id != user_id {
                return Ok(Guarded::NotCreator);
            }

            tx.execute(
                "UPDATE threads SET is_closed = 1, updated_at = ?1 WHERE id = ?2",
                params![Utc::now(), thread_id],
            )?;

            let row = query_thread(&tx, thread_id)?
                .with_context(|| format!("thread {} vanished during close", thread_id))?;
            tx.commit()?;
            Ok(Guarded::Done(row))
        })
    }

    /// Threads of a spool joined through the user's memberships. Private
    /// threads the user was never invited to do not show up.
    pub fn threads_for_member(&self, user_id: UserId, spool_id: SpoolId) -> Result<Vec<ThreadRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.creator_id, t.spool_id, t.title, t.type, t.is_closed, t.created_at, t.updated_at
                 FROM threads t
                 JOIN thread_users tu ON tu.thread_id = t.id
                 WHERE t.spool_id = ?1 AND tu.user_id = ?2 AND tu.is_member = 1
                 ORDER BY t.id",
            )?;
            let rows = stmt
                .query_map(params![spool_id, user_id], thread_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Resolve and add each username to the thread in one transaction.
    /// Never fails on a single invitee; the outcome per username is returned instead.
    pub fn invite_members(
        &self,
        thread_id: ThreadId,
        spool_id: SpoolId,
        usernames: &[String],
    ) -> Result<Vec<(String, InviteOutcome)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut outcomes = Vec::with_capacity(usernames.len());

            for username in usernames {
                let Some(user_id) = query_user_id(&tx, username)? else {
                    outcomes.push((username.clone(), InviteOutcome::UserNotFound));
                    continue;
                };

                if !query_is_spool_member(&tx, user_id, spool_id)? {
                    outcomes.push((username.clone(), InviteOutcome::NotInSpool(user_id)));
                    continue;
                }

                let inserted = tx.execute(
                    "INSERT INTO thread_users (user_id, thread_id, is_member) VALUES (?1, ?2, 1)
                     ON CONFLICT(user_id, thread_id) DO UPDATE SET is_member = 1
                     WHERE thread_users.is_member = 0",
                    params![user_id, thread_id],
                )?;

                let outcome = if inserted > 0 {
                    InviteOutcome::Added(user_id)
                } else {
                    InviteOutcome::AlreadyMember(user_id)
                };
                outcomes.push((username.clone(), outcome));
            }

            tx.commit()?;
            Ok(outcomes)
        })
    }

    // -- Messages --

    /// Insert a message and its payload rows atomically. Membership and the
    /// closed flag are checked inside the same transaction as the insert, so a
    /// close or spool leave that commits first always wins.
    pub fn insert_message(
        &self,
        thread_id: ThreadId,
        user_id: UserId,
        content: &str,
        payload_links: &[String],
    ) -> Result<Posted<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !query_is_thread_member(&tx, user_id, thread_id)? {
                return Ok(Posted::NotMember);
            }
            let Some(thread) = query_thread(&tx, thread_id)? else {
                return Ok(Posted::NotMember);
            };
            if thread.is_closed {
                return Ok(Posted::Closed);
            }

            let now = Utc::now();

            tx.execute(
                "INSERT INTO messages (thread_id, user_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![thread_id, user_id, content, now],
            )?;
            let message_id = tx.last_insert_rowid();

            let mut payloads = Vec::with_capacity(payload_links.len());
            for link in payload_links {
                tx.execute(
                    "INSERT INTO message_payloads (message_id, file_link, created_at) VALUES (?1, ?2, ?3)",
                    params![message_id, link, now],
                )?;
                payloads.push(PayloadRow {
                    id: tx.last_insert_rowid(),
                    message_id,
                    file_link: link.clone(),
                    created_at: now,
                });
            }

            let username: Option<String> = tx
                .query_row("SELECT username FROM users WHERE id = ?1", [user_id], |row| row.get(0))
                .optional()?;

            tx.commit()?;

            Ok(Posted::Stored(MessageRow {
                id: message_id,
                thread_id,
                user_id,
                username: username.unwrap_or_else(|| "unknown".to_string()),
                content: content.to_string(),
                created_at: now,
                updated_at: now,
                payloads,
            }))
        })
    }

    /// Oldest first.
    pub fn get_messages(&self, thread_id: ThreadId, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut messages = query_messages(conn, thread_id, limit, offset)?;
            let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();

            let mut by_message: HashMap<MessageId, Vec<PayloadRow>> = HashMap::new();
            for payload in query_payloads(conn, &ids)? {
                by_message.entry(payload.message_id).or_default().push(payload);
            }
            for message in &mut messages {
                message.payloads = by_message.remove(&message.id).unwrap_or_default();
            }

            Ok(messages)
        })
    }

    pub fn count_messages(&self, thread_id: ThreadId) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE thread_id = ?1",
                [thread_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn query_user_id(conn: &Connection, username: &str) -> Result<Option<UserId>> {
    let id = conn
        .query_row("SELECT id FROM users WHERE username = ?1", [username], |row| row.get(0))
        .optional()?;
    Ok(id)
}

fn query_is_spool_member(conn: &Connection, user_id: UserId, spool_id: SpoolId) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM user_spools
            WHERE user_id = ?1 AND spool_id = ?2 AND is_deleted = 0
         )",
        params![user_id, spool_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn query_is_thread_member(conn: &Connection, user_id: UserId, thread_id: ThreadId) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM thread_users
            WHERE user_id = ?1 AND thread_id = ?2 AND is_member = 1
         )",
        params![user_id, thread_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn query_thread_member_ids(conn: &Connection, thread_id: ThreadId) -> Result<Vec<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM thread_users WHERE thread_id = ?1 AND is_member = 1 ORDER BY user_id",
    )?;
    let ids = stmt
        .query_map([thread_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn query_thread(conn: &Connection, thread_id: ThreadId) -> Result<Option<ThreadRow>> {
    let row = conn
        .query_row(
            "SELECT id, creator_id, spool_id, title, type, is_closed, created_at, updated_at
             FROM threads WHERE id = ?1",
            [thread_id],
            thread_from_row,
        )
        .optional()?;
    Ok(row)
}

fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<ThreadRow> {
    Ok(ThreadRow {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        spool_id: row.get(2)?,
        title: row.get(3)?,
        thread_type: row.get(4)?,
        is_closed: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn query_messages(conn: &Connection, thread_id: ThreadId, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
    // JOIN users to fetch the author's username in the same query
    let mut stmt = conn.prepare(
        "SELECT m.id, m.thread_id, m.user_id, u.username, m.content, m.created_at, m.updated_at
         FROM messages m
         LEFT JOIN users u ON m.user_id = u.id
         WHERE m.thread_id = ?1
         ORDER BY m.created_at ASC, m.id ASC
         LIMIT ?2 OFFSET ?3",
    )?;

    let rows = stmt
        .query_map(params![thread_id, limit, offset], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                thread_id: row.get(1)?,
                user_id: row.get(2)?,
                username: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
                content: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
                payloads: Vec::new(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Batch-fetch payloads for a set of message ids.
fn query_payloads(conn: &Connection, message_ids: &[MessageId]) -> Result<Vec<PayloadRow>> {
    if message_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT id, message_id, file_link, created_at FROM message_payloads
         WHERE message_id IN ({}) ORDER BY id",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(message_ids.iter()), |row| {
            Ok(PayloadRow {
                id: row.get(0)?,
                message_id: row.get(1)?,
                file_link: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Seed {
        db: Database,
        spool: SpoolId,
        alice: UserId,
        bob: UserId,
        carol: UserId,
    }

    /// alice and bob are in the spool, carol exists but is not.
    fn seed() -> Seed {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();
        let carol = db.create_user("carol").unwrap();
        let spool = db.create_spool("crew").unwrap();
        db.add_spool_member(spool, alice).unwrap();
        db.add_spool_member(spool, bob).unwrap();
        Seed { db, spool, alice, bob, carol }
    }

    #[test]
    fn public_thread_joins_every_spool_member() {
        let s = seed();
        let (row, members) = s.db.create_thread(s.alice, s.spool, "general", ThreadType::Public).unwrap();
        assert_eq!(row.thread_type, "public");
        assert!(!row.is_closed);
        assert_eq!(members, vec![s.alice, s.bob]);
        assert!(!s.db.is_thread_member(s.carol, row.id).unwrap());
    }

    #[test]
    fn private_thread_starts_with_creator_only() {
        let s = seed();
        let (row, members) = s.db.create_thread(s.alice, s.spool, "dm", ThreadType::Private).unwrap();
        assert_eq!(members, vec![s.alice]);
        assert!(!s.db.is_thread_member(s.bob, row.id).unwrap());
    }

    #[test]
    fn threads_for_member_hides_private_threads() {
        let s = seed();
        let (public, _) = s.db.create_thread(s.alice, s.spool, "general", ThreadType::Public).unwrap();
        s.db.create_thread(s.alice, s.spool, "dm", ThreadType::Private).unwrap();

        let bobs: Vec<ThreadId> = s.db.threads_for_member(s.bob, s.spool).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(bobs, vec![public.id]);
        assert_eq!(s.db.threads_for_member(s.alice, s.spool).unwrap().len(), 2);
        assert!(s.db.threads_for_member(s.carol, s.spool).unwrap().is_empty());
        assert_eq!(s.db.accessible_thread_ids(s.bob, s.spool).unwrap(), vec![public.id]);
    }

    #[test]
    fn update_is_guarded_by_creator() {
        let s = seed();
        let (row, _) = s.db.create_thread(s.alice, s.spool, "general", ThreadType::Public).unwrap();

        assert!(matches!(s.db.update_thread(row.id, s.bob, Some("x"), None).unwrap(), Guarded::NotCreator));
        assert!(matches!(s.db.update_thread(999, s.alice, Some("x"), None).unwrap(), Guarded::NotFound));

        let Guarded::Done(updated) = s.db.update_thread(row.id, s.alice, Some("renamed"), None).unwrap() else {
            panic!("creator update should succeed");
        };
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.thread_type, "public");
        assert!(updated.updated_at >= row.updated_at);
    }

    #[test]
    fn close_twice_succeeds_both_times() {
        let s = seed();
        let (row, _) = s.db.create_thread(s.alice, s.spool, "general", ThreadType::Public).unwrap();
        assert!(matches!(s.db.close_thread(row.id, s.bob).unwrap(), Guarded::NotCreator));
        assert!(matches!(s.db.close_thread(row.id, s.alice).unwrap(), Guarded::Done(ref t) if t.is_closed));
        assert!(matches!(s.db.close_thread(row.id, s.alice).unwrap(), Guarded::Done(ref t) if t.is_closed));
    }

    #[test]
    fn invite_reports_each_username() {
        let s = seed();
        let (row, _) = s.db.create_thread(s.alice, s.spool, "dm", ThreadType::Private).unwrap();
        let names = vec!["bob".to_string(), "nobody".to_string(), "carol".to_string(), "bob".to_string()];

        let outcomes = s.db.invite_members(row.id, s.spool, &names).unwrap();
        assert_eq!(
            outcomes,
            vec![
                ("bob".to_string(), InviteOutcome::Added(s.bob)),
                ("nobody".to_string(), InviteOutcome::UserNotFound),
                ("carol".to_string(), InviteOutcome::NotInSpool(s.carol)),
                ("bob".to_string(), InviteOutcome::AlreadyMember(s.bob)),
            ]
        );
        assert_eq!(s.db.thread_member_ids(row.id).unwrap(), vec![s.alice, s.bob]);
    }

    #[test]
    fn leaving_spool_drops_thread_memberships() {
        let s = seed();
        let (row, _) = s.db.create_thread(s.alice, s.spool, "general", ThreadType::Public).unwrap();
        s.db.leave_spool(s.spool, s.bob).unwrap();
        assert!(!s.db.is_spool_member(s.bob, s.spool).unwrap());
        assert!(!s.db.is_thread_member(s.bob, row.id).unwrap());

        s.db.add_spool_member(s.spool, s.bob).unwrap();
        assert!(s.db.is_spool_member(s.bob, s.spool).unwrap());
    }

    #[test]
    fn messages_come_back_oldest_first_with_payloads() {
        let s = seed();
        let (row, _) = s.db.create_thread(s.alice, s.spool, "general", ThreadType::Public).unwrap();

        let Posted::Stored(first) = s.db.insert_message(row.id, s.alice, "hi", &["https://files/a.png".to_string()]).unwrap()
        else {
            panic!("alice is a member of an open thread");
        };
        assert_eq!(first.username, "alice");
        assert_eq!(first.payloads.len(), 1);
        s.db.insert_message(row.id, s.bob, "hey", &[]).unwrap();
        s.db.insert_message(row.id, s.alice, "bye", &[]).unwrap();

        let all = s.db.get_messages(row.id, 50, 0).unwrap();
        let contents: Vec<&str> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hey", "bye"]);
        assert_eq!(all[0].payloads[0].file_link, "https://files/a.png");
        assert_eq!(all[0].payloads[0].message_id, first.id);
        assert!(all[1].payloads.is_empty());

        let page = s.db.get_messages(row.id, 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].content, "hey");
        assert_eq!(page[0].username, "bob");

        assert_eq!(s.db.count_messages(row.id).unwrap(), 3);
    }

    #[test]
    fn insert_is_refused_for_outsiders_and_closed_threads() {
        let s = seed();
        let (row, _) = s.db.create_thread(s.alice, s.spool, "dm", ThreadType::Private).unwrap();

        assert!(matches!(s.db.insert_message(row.id, s.bob, "hi", &[]).unwrap(), Posted::NotMember));
        assert!(matches!(s.db.insert_message(9999, s.alice, "hi", &[]).unwrap(), Posted::NotMember));

        s.db.close_thread(row.id, s.alice).unwrap();
        assert!(matches!(s.db.insert_message(row.id, s.alice, "late", &[]).unwrap(), Posted::Closed));
        assert_eq!(s.db.count_messages(row.id).unwrap(), 0);
    }

    #[test]
    fn thread_row_converts_to_model() {
        let s = seed();
        let (row, _) = s.db.create_thread(s.alice, s.spool, "general", ThreadType::Private).unwrap();
        let thread = row.into_thread().unwrap();
        assert_eq!(thread.thread_type, ThreadType::Private);
        assert!(thread.is_creator(s.alice));
    }
}
