use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::documents::parse_ts;
use crate::error::{Result, StoreError};
use crate::models::MediaAsset;

const MEDIA_COLUMNS: &str = "id, mime_type, storage_path, inline_data_url, last_retrieved_at";

impl Database {
    pub fn insert_media_asset(&self, asset: &MediaAsset) -> Result<()> {
        self.conn().execute(
            "INSERT INTO media_assets (id, mime_type, storage_path, inline_data_url, last_retrieved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                asset.id.to_string(),
                asset.mime_type,
                asset.storage_path,
                asset.inline_data_url,
                asset.last_retrieved_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_media_asset(&self, id: Uuid) -> Result<MediaAsset> {
        self.conn()
            .query_row(
                &format!("SELECT {MEDIA_COLUMNS} FROM media_assets WHERE id = ?1"),
                params![id.to_string()],
                row_to_media_asset,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn touch_media_asset(&self, id: Uuid, retrieved_at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE media_assets SET last_retrieved_at = ?2 WHERE id = ?1",
            params![id.to_string(), retrieved_at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_media_asset(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM media_assets WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Media assets still holding an inline data URL with no file-backed
    /// path.
    pub fn pending_migration_media(&self, limit: u32) -> Result<Vec<MediaAsset>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media_assets
             WHERE inline_data_url IS NOT NULL AND storage_path IS NULL
             ORDER BY id ASC
             LIMIT ?1"
        ))?;

        let rows = stmt.query_map(params![limit], row_to_media_asset)?;

        let mut assets = Vec::new();
        for row in rows {
            assets.push(row?);
        }
        Ok(assets)
    }

    pub fn count_pending_migration_media(&self) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM media_assets
             WHERE inline_data_url IS NOT NULL AND storage_path IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Point a media asset at file-backed content, keeping the inline copy.
    pub fn set_media_storage_path(&self, id: Uuid, path: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE media_assets SET storage_path = ?2 WHERE id = ?1",
            params![id.to_string(), path],
        )?;
        Ok(affected > 0)
    }

    /// Null out inline data URLs of assets that already have file-backed
    /// content.  Invoked only by the explicit cleanup pass.
    pub fn clear_migrated_media_inline(&self) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE media_assets SET inline_data_url = NULL
             WHERE inline_data_url IS NOT NULL AND storage_path IS NOT NULL",
            [],
        )?;
        Ok(affected)
    }
}

fn row_to_media_asset(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaAsset> {
    let id_str: String = row.get(0)?;
    let mime_type: String = row.get(1)?;
    let storage_path: Option<String> = row.get(2)?;
    let inline_data_url: Option<String> = row.get(3)?;
    let retrieved_str: String = row.get(4)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let last_retrieved_at = parse_ts(&retrieved_str, 4)?;

    Ok(MediaAsset {
        id,
        mime_type,
        storage_path,
        inline_data_url,
        last_retrieved_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_asset() -> MediaAsset {
        MediaAsset {
            id: Uuid::new_v4(),
            mime_type: "image/png".to_string(),
            storage_path: None,
            inline_data_url: Some("data:image/png;base64,iVBORw0KGgo=".to_string()),
            last_retrieved_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let asset = sample_asset();

        db.insert_media_asset(&asset).unwrap();
        let fetched = db.get_media_asset(asset.id).unwrap();
        assert_eq!(fetched.mime_type, "image/png");
        assert!(fetched.inline_data_url.is_some());
    }

    #[test]
    fn pending_and_flip() {
        let db = Database::open_in_memory().unwrap();
        let asset = sample_asset();
        db.insert_media_asset(&asset).unwrap();

        assert_eq!(db.count_pending_migration_media().unwrap(), 1);
        db.set_media_storage_path(asset.id, "MediaItems/x.png").unwrap();
        assert_eq!(db.count_pending_migration_media().unwrap(), 0);

        // inline copy survives the flip until cleanup
        assert!(db.get_media_asset(asset.id).unwrap().inline_data_url.is_some());
        assert_eq!(db.clear_migrated_media_inline().unwrap(), 1);
        assert!(db.get_media_asset(asset.id).unwrap().inline_data_url.is_none());
    }
}
