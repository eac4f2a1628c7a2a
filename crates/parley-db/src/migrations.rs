use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id          BLOB PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                photo_url   TEXT,
                created_at  TEXT NOT NULL
            );

            -- pair_low/pair_high hold the sorted member pair of a private
            -- conversation; the partial index makes the pair unique.
            CREATE TABLE conversations (
                id              BLOB PRIMARY KEY,
                kind            TEXT NOT NULL CHECK (kind IN ('private', 'group')),
                name            TEXT,
                photo_url       TEXT,
                last_message_id BLOB,
                pair_low        BLOB,
                pair_high       BLOB,
                created_at      TEXT NOT NULL,
                CHECK ((kind = 'private') = (pair_low IS NOT NULL AND pair_high IS NOT NULL))
            );

            CREATE UNIQUE INDEX idx_conversations_private_pair
                ON conversations(pair_low, pair_high) WHERE kind = 'private';

            CREATE TABLE memberships (
                conversation_id BLOB NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id         BLOB NOT NULL REFERENCES users(id),
                joined_at       TEXT NOT NULL,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX idx_memberships_user ON memberships(user_id);

            CREATE TABLE messages (
                id                  BLOB PRIMARY KEY,
                conversation_id     BLOB NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id           BLOB NOT NULL REFERENCES users(id),
                content             TEXT,
                photo_data          BLOB,
                photo_mime_type     TEXT,
                timestamp           TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'sent' CHECK (status IN ('sent', 'read')),
                is_deleted          INTEGER NOT NULL DEFAULT 0,
                is_reply            INTEGER NOT NULL DEFAULT 0,
                is_forwarded        INTEGER NOT NULL DEFAULT 0,
                original_message_id BLOB REFERENCES messages(id) ON DELETE SET NULL,
                CHECK ((content IS NULL) <> (photo_data IS NULL)),
                CHECK ((photo_data IS NULL) = (photo_mime_type IS NULL))
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, timestamp);

            CREATE TABLE reactions (
                message_id  BLOB NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id     BLOB NOT NULL REFERENCES users(id),
                emoticon    TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE read_status (
                message_id  BLOB NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id     BLOB NOT NULL REFERENCES users(id),
                is_read     INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE INDEX idx_read_status_user ON read_status(user_id, is_read);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
