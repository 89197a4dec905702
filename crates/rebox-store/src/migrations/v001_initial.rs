//! v001 -- Initial schema creation.
//!
//! Creates the six domain tables (`users`, `items`, `likes`, `dislikes`,
//! `matches`, `messages`) and the `kv` table for singleton values.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,
    email         TEXT UNIQUE,                 -- NULL for anonymous users
    name          TEXT NOT NULL,
    photo_url     TEXT,
    is_anonymous  INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    password_hash TEXT,                        -- only for email/password accounts
    created_at    TEXT NOT NULL,               -- RFC-3339, fixed width
    updated_at    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Items
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS items (
    id          TEXT PRIMARY KEY NOT NULL,
    user_id     TEXT NOT NULL,                 -- owner, never changes
    title       TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    category    TEXT NOT NULL,
    photo_url   TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_user_created
    ON items(user_id, created_at DESC);

-- ----------------------------------------------------------------
-- Likes / dislikes (one per user and item)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS likes (
    id           TEXT PRIMARY KEY NOT NULL,
    from_user_id TEXT NOT NULL,
    to_item_id   TEXT NOT NULL,
    to_user_id   TEXT NOT NULL,                -- owner of to_item_id at like time
    created_at   TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_likes_unique
    ON likes(from_user_id, to_item_id);
CREATE INDEX IF NOT EXISTS idx_likes_pair
    ON likes(from_user_id, to_user_id, created_at);

CREATE TABLE IF NOT EXISTS dislikes (
    id           TEXT PRIMARY KEY NOT NULL,
    from_user_id TEXT NOT NULL,
    to_item_id   TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_dislikes_unique
    ON dislikes(from_user_id, to_item_id);

-- ----------------------------------------------------------------
-- Matches (one per unordered user pair)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS matches (
    id              TEXT PRIMARY KEY NOT NULL,
    user_a_id       TEXT NOT NULL,
    user_b_id       TEXT NOT NULL,
    item_a_id       TEXT NOT NULL,             -- owned by user_a_id, liked by user_b_id
    item_b_id       TEXT NOT NULL,             -- owned by user_b_id, liked by user_a_id
    created_at      TEXT NOT NULL,
    last_message_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_matches_pair
    ON matches(min(user_a_id, user_b_id), max(user_a_id, user_b_id));
CREATE INDEX IF NOT EXISTS idx_matches_user_a ON matches(user_a_id);
CREATE INDEX IF NOT EXISTS idx_matches_user_b ON matches(user_b_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,
    match_id   TEXT NOT NULL,
    sender_id  TEXT NOT NULL,
    text       TEXT NOT NULL,
    is_read    INTEGER NOT NULL DEFAULT 0,     -- boolean 0/1, only ever set to 1
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_match_created
    ON messages(match_id, created_at);

-- ----------------------------------------------------------------
-- Singleton values (JSON text)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
