//! Checkpoint rows: bounded per-document version history.
//!
//! Ordering is always `(timestamp, seq)` — `seq` is the AUTOINCREMENT
//! insertion counter, so equal timestamps fall back to insertion order and
//! retention pruning stays deterministic.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::documents::parse_ts;
use crate::error::{Result, StoreError};
use crate::models::Checkpoint;

const CHECKPOINT_COLUMNS: &str = "id, document_id, seq, timestamp, storage_path, inline_content";

impl Database {
    /// Append a checkpoint row.  `seq` on the passed struct is ignored; the
    /// database assigns it and the stored value is returned.
    pub fn insert_checkpoint(&self, cp: &Checkpoint) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO checkpoints (id, document_id, timestamp, storage_path, inline_content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                cp.id.to_string(),
                cp.document_id.to_string(),
                cp.timestamp.to_rfc3339(),
                cp.storage_path,
                cp.inline_content,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn get_checkpoint(&self, id: Uuid) -> Result<Checkpoint> {
        self.conn()
            .query_row(
                &format!("SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE id = ?1"),
                params![id.to_string()],
                row_to_checkpoint,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The checkpoint with the maximum `(timestamp, seq)`, or `None` when
    /// the document has no history yet (not an error).
    pub fn latest_checkpoint(&self, document_id: Uuid) -> Result<Option<Checkpoint>> {
        let res = self.conn().query_row(
            &format!(
                "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints
                 WHERE document_id = ?1
                 ORDER BY timestamp DESC, seq DESC
                 LIMIT 1"
            ),
            params![document_id.to_string()],
            row_to_checkpoint,
        );
        match res {
            Ok(cp) => Ok(Some(cp)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(StoreError::Sqlite(other)),
        }
    }

    /// All checkpoints for a document, newest first.
    pub fn list_checkpoints(&self, document_id: Uuid) -> Result<Vec<Checkpoint>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints
             WHERE document_id = ?1
             ORDER BY timestamp DESC, seq DESC"
        ))?;

        let rows = stmt.query_map(params![document_id.to_string()], row_to_checkpoint)?;

        let mut checkpoints = Vec::new();
        for row in rows {
            checkpoints.push(row?);
        }
        Ok(checkpoints)
    }

    pub fn count_checkpoints(&self, document_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM checkpoints WHERE document_id = ?1",
            params![document_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Overwrite a checkpoint in place: content replaced, timestamp
    /// refreshed.  Models continuous autosave within one editing burst.
    pub fn amend_checkpoint(
        &self,
        id: Uuid,
        timestamp: DateTime<Utc>,
        storage_path: Option<&str>,
        inline_content: Option<&[u8]>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE checkpoints
             SET timestamp = ?2, storage_path = ?3, inline_content = ?4
             WHERE id = ?1",
            params![id.to_string(), timestamp.to_rfc3339(), storage_path, inline_content],
        )?;
        Ok(affected > 0)
    }

    /// Delete the oldest checkpoints until at most `ceiling` remain.
    /// Returns the evicted rows so the caller can remove their backing
    /// files.
    pub fn prune_checkpoints(&self, document_id: Uuid, ceiling: u64) -> Result<Vec<Checkpoint>> {
        let total = self.count_checkpoints(document_id)?;
        if total <= ceiling {
            return Ok(Vec::new());
        }
        let excess = total - ceiling;

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints
             WHERE document_id = ?1
             ORDER BY timestamp ASC, seq ASC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(
            params![document_id.to_string(), excess as i64],
            row_to_checkpoint,
        )?;

        let mut evicted = Vec::new();
        for row in rows {
            evicted.push(row?);
        }

        for cp in &evicted {
            self.conn().execute(
                "DELETE FROM checkpoints WHERE id = ?1",
                params![cp.id.to_string()],
            )?;
        }
        Ok(evicted)
    }

    pub fn delete_checkpoint(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM checkpoints WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Checkpoints still holding inline content with no file-backed path.
    pub fn pending_migration_checkpoints(&self, limit: u32) -> Result<Vec<Checkpoint>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints
             WHERE inline_content IS NOT NULL AND storage_path IS NULL
             ORDER BY seq ASC
             LIMIT ?1"
        ))?;

        let rows = stmt.query_map(params![limit], row_to_checkpoint)?;

        let mut checkpoints = Vec::new();
        for row in rows {
            checkpoints.push(row?);
        }
        Ok(checkpoints)
    }

    pub fn count_pending_migration_checkpoints(&self) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM checkpoints
             WHERE inline_content IS NOT NULL AND storage_path IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Point a checkpoint at file-backed content, keeping the inline copy.
    pub fn set_checkpoint_storage_path(&self, id: Uuid, path: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE checkpoints SET storage_path = ?2 WHERE id = ?1",
            params![id.to_string(), path],
        )?;
        Ok(affected > 0)
    }

    /// Null out inline copies of checkpoints that already have file-backed
    /// content.  Invoked only by the explicit cleanup pass.
    pub fn clear_migrated_checkpoint_inline(&self) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE checkpoints SET inline_content = NULL
             WHERE inline_content IS NOT NULL AND storage_path IS NOT NULL",
            [],
        )?;
        Ok(affected)
    }
}

fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    let id_str: String = row.get(0)?;
    let document_id_str: String = row.get(1)?;
    let seq: i64 = row.get(2)?;
    let ts_str: String = row.get(3)?;
    let storage_path: Option<String> = row.get(4)?;
    let inline_content: Option<Vec<u8>> = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let document_id = Uuid::parse_str(&document_id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let timestamp = parse_ts(&ts_str, 3)?;

    Ok(Checkpoint {
        id,
        document_id,
        seq,
        timestamp,
        storage_path,
        inline_content,
    })
}
