//! SQLite persistence
//!
//! Timestamps are stored as RFC 3339 TEXT, ids as UUID strings. The
//! chunk registry's append-only contract and the share counter's
//! atomic increment both lean on SQL rather than application locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::{
    ChunkRecord, ChunkStore, FileRecord, FileStore, FolderRecord, FolderStore, ShareLimits,
    ShareRecord, ShareStore, ShareTarget, StorageRecord, StorageStore,
};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables if they do not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS storages (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                mime_type TEXT,
                storage_id TEXT,
                folder_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_files_folder ON files(folder_id);
            CREATE INDEX IF NOT EXISTS idx_files_storage ON files(storage_id);

            CREATE TABLE IF NOT EXISTS file_chunks (
                file_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                chunk_size INTEGER NOT NULL,
                identity_index INTEGER NOT NULL,
                message_ref TEXT NOT NULL,
                content_ref TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (file_id, chunk_index)
            );

            CREATE TABLE IF NOT EXISTS folders (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                path TEXT NOT NULL,
                parent_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);

            CREATE TABLE IF NOT EXISTS shares (
                token TEXT PRIMARY KEY,
                file_id TEXT,
                folder_id TEXT,
                expires_at TEXT,
                max_downloads INTEGER,
                password_hash TEXT,
                download_count INTEGER NOT NULL DEFAULT 0,
                created_by TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| AppError::Internal(format!("corrupt uuid in database: {}", e)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("corrupt timestamp in database: {}", e)))
}

#[derive(sqlx::FromRow)]
struct StorageRow {
    id: String,
    name: String,
    channel_id: String,
    created_at: String,
}

impl StorageRow {
    fn into_record(self) -> Result<StorageRecord> {
        Ok(StorageRecord {
            id: parse_uuid(&self.id)?,
            name: self.name,
            channel_id: self.channel_id,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: String,
    name: String,
    size: i64,
    mime_type: Option<String>,
    storage_id: Option<String>,
    folder_id: Option<String>,
    created_at: String,
}

impl FileRow {
    fn into_record(self) -> Result<FileRecord> {
        Ok(FileRecord {
            id: parse_uuid(&self.id)?,
            name: self.name,
            size: self.size as u64,
            mime_type: self.mime_type,
            storage_id: self.storage_id.as_deref().map(parse_uuid).transpose()?,
            folder_id: self.folder_id.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    file_id: String,
    chunk_index: i64,
    chunk_size: i64,
    identity_index: i64,
    message_ref: String,
    content_ref: String,
}

impl ChunkRow {
    fn into_record(self) -> Result<ChunkRecord> {
        Ok(ChunkRecord {
            file_id: parse_uuid(&self.file_id)?,
            chunk_index: self.chunk_index as u64,
            chunk_size: self.chunk_size as u64,
            identity_index: self.identity_index as usize,
            message_ref: self.message_ref,
            content_ref: self.content_ref,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FolderRow {
    id: String,
    name: String,
    path: String,
    parent_id: Option<String>,
    created_at: String,
}

impl FolderRow {
    fn into_record(self) -> Result<FolderRecord> {
        Ok(FolderRecord {
            id: parse_uuid(&self.id)?,
            name: self.name,
            path: self.path,
            parent_id: self.parent_id.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ShareRow {
    token: String,
    file_id: Option<String>,
    folder_id: Option<String>,
    expires_at: Option<String>,
    max_downloads: Option<i64>,
    password_hash: Option<String>,
    download_count: i64,
    created_by: Option<String>,
    created_at: String,
}

impl ShareRow {
    fn into_record(self) -> Result<ShareRecord> {
        let target = match (&self.file_id, &self.folder_id) {
            (Some(id), _) => ShareTarget::File(parse_uuid(id)?),
            (None, Some(id)) => ShareTarget::Folder(parse_uuid(id)?),
            (None, None) => {
                return Err(AppError::Internal(format!(
                    "share {} has no target",
                    self.token
                )))
            }
        };

        Ok(ShareRecord {
            token: self.token,
            target,
            expires_at: self.expires_at.as_deref().map(parse_timestamp).transpose()?,
            max_downloads: self.max_downloads.map(|m| m as u32),
            password_hash: self.password_hash,
            download_count: self.download_count as u32,
            created_by: self.created_by,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[async_trait]
impl FileStore for SqliteStore {
    async fn create_file(&self, record: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (id, name, size, mime_type, storage_id, folder_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.name)
        .bind(record.size as i64)
        .bind(&record.mime_type)
        .bind(record.storage_id.map(|id| id.to_string()))
        .bind(record.folder_id.map(|id| id.to_string()))
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>> {
        let row: Option<FileRow> = sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(FileRow::into_record).transpose()
    }

    async fn list_files(&self, folder_id: Option<Uuid>) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = match folder_id {
            Some(folder_id) => {
                sqlx::query_as("SELECT * FROM files WHERE folder_id = ? ORDER BY name")
                    .bind(folder_id.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM files WHERE folder_id IS NULL ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(FileRow::into_record).collect()
    }

    async fn rename_file(&self, id: Uuid, name: &str) -> Result<()> {
        sqlx::query("UPDATE files SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_file(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn count_files_in_storage(&self, storage_id: Uuid) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE storage_id = ?")
            .bind(storage_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0 as u64)
    }
}

#[async_trait]
impl StorageStore for SqliteStore {
    async fn create_storage(&self, record: &StorageRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO storages (id, name, channel_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.name)
        .bind(&record.channel_id)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_storage(&self, id: Uuid) -> Result<Option<StorageRecord>> {
        let row: Option<StorageRow> = sqlx::query_as("SELECT * FROM storages WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(StorageRow::into_record).transpose()
    }

    async fn list_storages(&self) -> Result<Vec<StorageRecord>> {
        let rows: Vec<StorageRow> = sqlx::query_as("SELECT * FROM storages ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(StorageRow::into_record).collect()
    }

    async fn delete_storage(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM storages WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn append_chunk(&self, record: &ChunkRecord) -> Result<bool> {
        // INSERT OR IGNORE keeps the registry append-only: a duplicate
        // index leaves the existing row untouched.
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO file_chunks
                (file_id, chunk_index, chunk_size, identity_index, message_ref, content_ref, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.file_id.to_string())
        .bind(record.chunk_index as i64)
        .bind(record.chunk_size as i64)
        .bind(record.identity_index as i64)
        .bind(&record.message_ref)
        .bind(&record.content_ref)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_chunks(&self, file_id: Uuid) -> Result<Vec<ChunkRecord>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(
            r#"
            SELECT file_id, chunk_index, chunk_size, identity_index, message_ref, content_ref
            FROM file_chunks
            WHERE file_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(file_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChunkRow::into_record).collect()
    }

    async fn delete_chunks(&self, file_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM file_chunks WHERE file_id = ?")
            .bind(file_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl FolderStore for SqliteStore {
    async fn create_folder(&self, record: &FolderRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO folders (id, name, path, parent_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.name)
        .bind(&record.path)
        .bind(record.parent_id.map(|id| id.to_string()))
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_folder(&self, id: Uuid) -> Result<Option<FolderRecord>> {
        let row: Option<FolderRow> = sqlx::query_as("SELECT * FROM folders WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(FolderRow::into_record).transpose()
    }

    async fn list_folders(&self, parent_id: Option<Uuid>) -> Result<Vec<FolderRecord>> {
        let rows: Vec<FolderRow> = match parent_id {
            Some(parent_id) => {
                sqlx::query_as("SELECT * FROM folders WHERE parent_id = ? ORDER BY name")
                    .bind(parent_id.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM folders WHERE parent_id IS NULL ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(FolderRow::into_record).collect()
    }

    async fn delete_folder(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ShareStore for SqliteStore {
    async fn create_share(&self, record: &ShareRecord) -> Result<()> {
        let (file_id, folder_id) = match record.target {
            ShareTarget::File(id) => (Some(id.to_string()), None),
            ShareTarget::Folder(id) => (None, Some(id.to_string())),
        };

        sqlx::query(
            r#"
            INSERT INTO shares
                (token, file_id, folder_id, expires_at, max_downloads, password_hash,
                 download_count, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.token)
        .bind(file_id)
        .bind(folder_id)
        .bind(record.expires_at.map(|t| t.to_rfc3339()))
        .bind(record.max_downloads.map(|m| m as i64))
        .bind(&record.password_hash)
        .bind(record.download_count as i64)
        .bind(&record.created_by)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_share(&self, token: &str) -> Result<Option<ShareRecord>> {
        let row: Option<ShareRow> = sqlx::query_as("SELECT * FROM shares WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ShareRow::into_record).transpose()
    }

    async fn update_share(&self, token: &str, limits: &ShareLimits) -> Result<Option<ShareRecord>> {
        if let Some(expires_at) = &limits.expires_at {
            sqlx::query("UPDATE shares SET expires_at = ? WHERE token = ?")
                .bind(expires_at.map(|t| t.to_rfc3339()))
                .bind(token)
                .execute(&self.pool)
                .await?;
        }
        if let Some(max_downloads) = &limits.max_downloads {
            sqlx::query("UPDATE shares SET max_downloads = ? WHERE token = ?")
                .bind(max_downloads.map(|m| m as i64))
                .bind(token)
                .execute(&self.pool)
                .await?;
        }
        if let Some(password_hash) = &limits.password_hash {
            sqlx::query("UPDATE shares SET password_hash = ? WHERE token = ?")
                .bind(password_hash)
                .bind(token)
                .execute(&self.pool)
                .await?;
        }

        self.get_share(token).await
    }

    async fn delete_share(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM shares WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn try_consume_download(&self, token: &str) -> Result<bool> {
        // Single guarded UPDATE: the row only moves when the quota
        // still has room, so concurrent requests cannot jointly
        // overshoot it.
        let result = sqlx::query(
            r#"
            UPDATE shares
            SET download_count = download_count + 1
            WHERE token = ?
              AND (max_downloads IS NULL OR download_count < max_downloads)
            "#,
        )
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> SqliteStore {
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let pool = crate::db::create_pool(&url).await.unwrap();
        let store = SqliteStore::new(pool);
        store.init().await.unwrap();
        store
    }

    fn file(name: &str) -> FileRecord {
        FileRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            size: 42,
            mime_type: Some("text/plain".to_string()),
            storage_id: None,
            folder_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let record = file("notes.txt");
        store.create_file(&record).await.unwrap();

        let loaded = store.get_file(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "notes.txt");
        assert_eq!(loaded.size, 42);
        assert_eq!(loaded.created_at, record.created_at);
    }

    #[tokio::test]
    async fn test_storage_round_trip_and_file_count() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let storage = StorageRecord {
            id: Uuid::new_v4(),
            name: "vault".to_string(),
            channel_id: "-100456".to_string(),
            created_at: Utc::now(),
        };
        store.create_storage(&storage).await.unwrap();

        let loaded = store.get_storage(storage.id).await.unwrap().unwrap();
        assert_eq!(loaded.channel_id, "-100456");
        assert_eq!(store.list_storages().await.unwrap().len(), 1);

        let mut record = file("owned.bin");
        record.storage_id = Some(storage.id);
        store.create_file(&record).await.unwrap();
        assert_eq!(store.count_files_in_storage(storage.id).await.unwrap(), 1);

        let reloaded = store.get_file(record.id).await.unwrap().unwrap();
        assert_eq!(reloaded.storage_id, Some(storage.id));
    }

    #[tokio::test]
    async fn test_append_chunk_ignores_duplicate_index() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let record = ChunkRecord {
            file_id: Uuid::new_v4(),
            chunk_index: 0,
            chunk_size: 10,
            identity_index: 1,
            message_ref: "m".to_string(),
            content_ref: "c".to_string(),
        };

        assert!(store.append_chunk(&record).await.unwrap());
        assert!(!store.append_chunk(&record).await.unwrap());

        let chunks = store.list_chunks(record.file_id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].identity_index, 1);
    }

    #[tokio::test]
    async fn test_guarded_consume_stops_at_quota() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let share = ShareRecord {
            token: "t".to_string(),
            target: ShareTarget::File(Uuid::new_v4()),
            expires_at: None,
            max_downloads: Some(2),
            password_hash: None,
            download_count: 0,
            created_by: None,
            created_at: Utc::now(),
        };
        store.create_share(&share).await.unwrap();

        assert!(store.try_consume_download("t").await.unwrap());
        assert!(store.try_consume_download("t").await.unwrap());
        assert!(!store.try_consume_download("t").await.unwrap());

        let stored = store.get_share("t").await.unwrap().unwrap();
        assert_eq!(stored.download_count, 2);
    }

    #[tokio::test]
    async fn test_share_target_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let folder_id = Uuid::new_v4();
        let share = ShareRecord {
            token: "f".to_string(),
            target: ShareTarget::Folder(folder_id),
            expires_at: Some(Utc::now()),
            max_downloads: None,
            password_hash: Some("hash".to_string()),
            download_count: 0,
            created_by: None,
            created_at: Utc::now(),
        };
        store.create_share(&share).await.unwrap();

        let loaded = store.get_share("f").await.unwrap().unwrap();
        assert!(matches!(loaded.target, ShareTarget::Folder(id) if id == folder_id));
        assert_eq!(loaded.password_hash.as_deref(), Some("hash"));
    }
}
