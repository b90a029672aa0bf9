use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Document, DocumentKind};

const DOCUMENT_COLUMNS: &str =
    "id, name, kind, created_at, updated_at, in_trash, storage_path, inline_content";

impl Database {
    pub fn insert_document(&self, doc: &Document) -> Result<()> {
        self.conn().execute(
            "INSERT INTO documents (id, name, kind, created_at, updated_at, in_trash, storage_path, inline_content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                doc.id.to_string(),
                doc.name,
                doc.kind.as_str(),
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
                doc.in_trash as i32,
                doc.storage_path,
                doc.inline_content,
            ],
        )?;
        Ok(())
    }

    pub fn get_document(&self, id: Uuid) -> Result<Document> {
        self.conn()
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                params![id.to_string()],
                row_to_document,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_documents(&self, include_trashed: bool) -> Result<Vec<Document>> {
        let sql = if include_trashed {
            format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY updated_at DESC")
        } else {
            format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE in_trash = 0 ORDER BY updated_at DESC"
            )
        };
        let mut stmt = self.conn().prepare(&sql)?;

        let rows = stmt.query_map([], row_to_document)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    /// Point a document at file-backed content and refresh its edit time.
    /// The inline copy (if any) is left untouched as a rollback fallback.
    pub fn set_document_storage_path(
        &self,
        id: Uuid,
        path: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE documents SET storage_path = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), path, updated_at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Make inline bytes authoritative for a document: the fallback path
    /// when the content tier rejects a write.  Any existing storage path
    /// is cleared — it would point at a stale version of the content.
    pub fn set_document_inline_content(
        &self,
        id: Uuid,
        content: &[u8],
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE documents SET inline_content = ?2, storage_path = NULL, updated_at = ?3
             WHERE id = ?1",
            params![id.to_string(), content, updated_at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    pub fn set_document_trashed(&self, id: Uuid, in_trash: bool) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE documents SET in_trash = ?2 WHERE id = ?1",
            params![id.to_string(), in_trash as i32],
        )?;
        Ok(affected > 0)
    }

    // only removes the db record, not the file in the content tier
    pub fn delete_document(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    /// Documents still holding inline content with no file-backed path, in
    /// bounded batches.  The migration coordinator's unit of work.
    pub fn pending_migration_documents(&self, limit: u32) -> Result<Vec<Document>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE inline_content IS NOT NULL AND storage_path IS NULL
             ORDER BY created_at ASC
             LIMIT ?1"
        ))?;

        let rows = stmt.query_map(params![limit], row_to_document)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    pub fn count_pending_migration_documents(&self) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM documents
             WHERE inline_content IS NOT NULL AND storage_path IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Null out inline copies of documents that already have file-backed
    /// content.  Invoked only by the explicit cleanup pass.
    pub fn clear_migrated_document_inline(&self) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE documents SET inline_content = NULL
             WHERE inline_content IS NOT NULL AND storage_path IS NOT NULL",
            [],
        )?;
        Ok(affected)
    }
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let created_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;
    let in_trash_int: i32 = row.get(5)?;
    let storage_path: Option<String> = row.get(6)?;
    let inline_content: Option<Vec<u8>> = row.get(7)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let kind = DocumentKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown document kind: {kind_str}").into(),
        )
    })?;

    let created_at = parse_ts(&created_str, 3)?;
    let updated_at = parse_ts(&updated_str, 4)?;

    Ok(Document {
        id,
        name,
        kind,
        created_at,
        updated_at,
        in_trash: in_trash_int != 0,
        storage_path,
        inline_content,
    })
}

pub(crate) fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc(kind: DocumentKind) -> Document {
        let now = Utc::now();
        Document {
            id: Uuid::new_v4(),
            name: "Sketch".to_string(),
            kind,
            created_at: now,
            updated_at: now,
            in_trash: false,
            storage_path: None,
            inline_content: Some(b"payload".to_vec()),
        }
    }

    #[test]
    fn insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let doc = sample_doc(DocumentKind::Standard);

        db.insert_document(&doc).unwrap();
        let fetched = db.get_document(doc.id).unwrap();
        assert_eq!(fetched.name, "Sketch");
        assert_eq!(fetched.kind, DocumentKind::Standard);
        assert_eq!(fetched.inline_content.as_deref(), Some(&b"payload"[..]));
    }

    #[test]
    fn get_missing_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_document(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn trash_excluded_from_default_listing() {
        let db = Database::open_in_memory().unwrap();
        let doc = sample_doc(DocumentKind::Collaboration);
        db.insert_document(&doc).unwrap();
        db.set_document_trashed(doc.id, true).unwrap();

        assert!(db.list_documents(false).unwrap().is_empty());
        assert_eq!(db.list_documents(true).unwrap().len(), 1);
    }

    #[test]
    fn pending_query_skips_file_backed_rows() {
        let db = Database::open_in_memory().unwrap();
        let pending = sample_doc(DocumentKind::Standard);
        let mut migrated = sample_doc(DocumentKind::Standard);
        migrated.storage_path = Some("Files/x.sketch".to_string());

        db.insert_document(&pending).unwrap();
        db.insert_document(&migrated).unwrap();

        let rows = db.pending_migration_documents(50).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, pending.id);
        assert_eq!(db.count_pending_migration_documents().unwrap(), 1);
    }

    #[test]
    fn storage_path_flip_keeps_inline_copy() {
        let db = Database::open_in_memory().unwrap();
        let doc = sample_doc(DocumentKind::Standard);
        db.insert_document(&doc).unwrap();

        db.set_document_storage_path(doc.id, "Files/a.sketch", Utc::now())
            .unwrap();

        let fetched = db.get_document(doc.id).unwrap();
        assert_eq!(fetched.storage_path.as_deref(), Some("Files/a.sketch"));
        assert!(fetched.inline_content.is_some());

        assert_eq!(db.clear_migrated_document_inline().unwrap(), 1);
        assert!(db.get_document(doc.id).unwrap().inline_content.is_none());
    }
}
