use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, spools, threads, messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE spools (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE user_spools (
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                spool_id    INTEGER NOT NULL REFERENCES spools(id) ON DELETE CASCADE,
                is_deleted  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, spool_id)
            );

            CREATE TABLE threads (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                creator_id  INTEGER NOT NULL REFERENCES users(id),
                spool_id    INTEGER NOT NULL REFERENCES spools(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                type        TEXT NOT NULL CHECK (type IN ('public', 'private')),
                is_closed   INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_threads_spool ON threads(spool_id);

            CREATE TABLE thread_users (
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                thread_id   INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                is_member   INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (user_id, thread_id)
            );

            CREATE INDEX idx_thread_users_thread ON thread_users(thread_id, is_member);

            CREATE TABLE messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id   INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_thread ON messages(thread_id, created_at);

            CREATE TABLE message_payloads (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                file_link   TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_message_payloads_message ON message_payloads(message_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
