//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `documents`, `checkpoints` and
//! `media_assets`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Documents
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS documents (
    id             TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    name           TEXT NOT NULL,
    kind           TEXT NOT NULL,              -- standard | collaboration | local
    created_at     TEXT NOT NULL,              -- ISO-8601 / RFC-3339
    updated_at     TEXT NOT NULL,
    in_trash       INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    storage_path   TEXT,                       -- relative path in the content tier
    inline_content BLOB                        -- bytes pending (or kept after) migration
);

-- ----------------------------------------------------------------
-- Checkpoints
-- ----------------------------------------------------------------
-- seq is the insertion-order tie-breaker for equal timestamps; retention
-- pruning orders by (timestamp, seq) so eviction is deterministic.
CREATE TABLE IF NOT EXISTS checkpoints (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    id             TEXT NOT NULL UNIQUE,       -- UUID v4
    document_id    TEXT NOT NULL,              -- FK -> documents(id)
    timestamp      TEXT NOT NULL,
    storage_path   TEXT,
    inline_content BLOB,

    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_document_ts
    ON checkpoints(document_id, timestamp DESC);

-- ----------------------------------------------------------------
-- Media assets
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS media_assets (
    id                TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    mime_type         TEXT NOT NULL,
    storage_path      TEXT,
    inline_data_url   TEXT,                       -- data:<mime>;base64,<payload>
    last_retrieved_at TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
