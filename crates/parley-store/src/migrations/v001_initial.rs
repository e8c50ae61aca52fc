//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `profiles` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id         TEXT PRIMARY KEY NOT NULL,     -- opaque identity id
    username   TEXT NOT NULL,
    avatar_url TEXT,
    created_at TEXT NOT NULL                  -- RFC-3339
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at   TEXT NOT NULL,               -- RFC-3339, fixed width (micros, Z)
    user_id      TEXT NOT NULL,               -- sender, FK -> profiles(id)
    recipient_id TEXT NOT NULL,               -- FK -> profiles(id)
    content      TEXT,
    image_url    TEXT,                        -- signed attachment URL
    file_name    TEXT,
    file_type    TEXT,
    file_size    INTEGER,
    status       TEXT NOT NULL DEFAULT 'sent' CHECK (status IN ('sent', 'read')),

    CHECK (content IS NOT NULL OR image_url IS NOT NULL),
    FOREIGN KEY (user_id) REFERENCES profiles(id),
    FOREIGN KEY (recipient_id) REFERENCES profiles(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(user_id, recipient_id, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
