//! SQLite-backed chunk store with vector search via `sqlite-vec`.
//!
//! Layout: a `chunks` table for the document rows and a `vec0` virtual
//! table for the embeddings, joined by rowid. The vector dimension is
//! fixed by the first inserted batch.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use tokio_rusqlite::{Connection, ffi};
use tracing::debug;

use super::{Backend, ChunkRecord};
use crate::types::QaError;

/// One open collection database.
#[derive(Clone)]
pub struct SqliteChunkStore {
    conn: Connection,
}

impl SqliteChunkStore {
    /// Opens (creating if needed) the collection database at `path` and
    /// verifies the sqlite-vec extension is loadable.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QaError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path.as_ref().to_path_buf())
            .await
            .map_err(|err| QaError::Storage(err.to_string()))?;
        conn.call(|conn| {
            let result = conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0));
            match result {
                Ok(_) => Ok(()),
                Err(err) => Err(err),
            }
        })
        .await
        .map_err(storage_err)?;
        Ok(Self { conn })
    }

    async fn ensure_schema(&self, dimensions: usize) -> Result<(), QaError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS chunks (
                        id TEXT PRIMARY KEY,
                        url TEXT,
                        title TEXT,
                        chunk_index INTEGER,
                        total_chunks INTEGER,
                        content TEXT
                    )",
                    [],
                )?;
                conn.execute(
                    "CREATE INDEX IF NOT EXISTS idx_chunks_url ON chunks(url)",
                    [],
                )?;
                conn.execute(
                    &format!(
                        "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_embeddings \
                         USING vec0(embedding float[{dimensions}])"
                    ),
                    [],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    /// Whether the schema has been created, i.e. anything was ever inserted.
    async fn is_initialized(&self) -> Result<bool, QaError> {
        self.conn
            .call(|conn| {
                let table_exists = conn
                    .query_row(
                        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'chunks'",
                        [],
                        |_| Ok(()),
                    )
                    .is_ok();
                Ok(table_exists)
            })
            .await
            .map_err(storage_err)
    }
}

#[async_trait]
impl Backend for SqliteChunkStore {
    async fn insert_chunks(&self, records: Vec<ChunkRecord>) -> Result<(), QaError> {
        let mut rows = Vec::with_capacity(records.len());
        let mut dimensions = 0usize;
        for record in records {
            let Some(embedding) = record.embedding.clone() else {
                continue;
            };
            dimensions = embedding.len();
            let vector = serde_json::to_string(&embedding)
                .map_err(|err| QaError::Storage(err.to_string()))?;
            rows.push((record, vector));
        }
        if rows.is_empty() {
            return Ok(());
        }

        self.ensure_schema(dimensions).await?;

        let inserted = rows.len();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (record, vector) in rows {
                    tx.execute(
                        "INSERT INTO chunks (id, url, title, chunk_index, total_chunks, content) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        (
                            record.id,
                            record.source_url,
                            record.page_title,
                            record.chunk_index as i64,
                            record.total_chunks as i64,
                            record.content,
                        ),
                    )?;
                    let rowid = tx.last_insert_rowid();
                    tx.execute(
                        "INSERT INTO chunks_embeddings (rowid, embedding) VALUES (?1, ?2)",
                        (rowid, vector),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;

        debug!(chunks = inserted, "persisted chunk batch");
        Ok(())
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, QaError> {
        if !self.is_initialized().await? {
            return Ok(Vec::new());
        }

        let vector = serde_json::to_string(query_embedding)
            .map_err(|err| QaError::Storage(err.to_string()))?;
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT c.id, c.url, c.title, c.chunk_index, c.total_chunks, c.content, \
                     vec_distance_cosine(e.embedding, vec_f32(?1)) AS distance \
                     FROM chunks c \
                     JOIN chunks_embeddings e ON e.rowid = c.rowid \
                     ORDER BY distance ASC, c.rowid ASC \
                     LIMIT {top_k}"
                ))?;

                let rows = stmt.query_map([&vector], |row| {
                    let record = ChunkRecord {
                        id: row.get(0)?,
                        source_url: row.get(1)?,
                        page_title: row.get(2)?,
                        chunk_index: row.get::<_, i64>(3)? as usize,
                        total_chunks: row.get::<_, i64>(4)? as usize,
                        content: row.get(5)?,
                        embedding: None,
                    };
                    let distance: f32 = row.get(6)?;
                    Ok((record, distance))
                })?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(storage_err)
    }

    async fn count(&self) -> Result<usize, QaError> {
        if !self.is_initialized().await? {
            return Ok(0);
        }
        self.conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(storage_err)
    }
}

fn storage_err(err: tokio_rusqlite::Error) -> QaError {
    QaError::Storage(err.to_string())
}

/// Registers the sqlite-vec auto-extension exactly once per process.
fn register_sqlite_vec() -> Result<(), QaError> {
    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(QaError::Storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, index: usize, content: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            source_url: "https://example.com".to_string(),
            page_title: "Example".to_string(),
            chunk_index: index,
            total_chunks: 3,
            content: content.to_string(),
            embedding: Some(embedding),
        }
    }

    #[tokio::test]
    async fn insert_then_search_orders_by_distance() {
        let dir = tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("c.sqlite"))
            .await
            .unwrap();

        store
            .insert_chunks(vec![
                record("a", 0, "about cats", vec![1.0, 0.0, 0.0]),
                record("b", 1, "about dogs", vec![0.0, 1.0, 0.0]),
                record("c", 2, "about birds", vec![0.9, 0.1, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search_similar(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, "a");
        assert_eq!(results[1].0.id, "c");
        assert!(results[0].1 <= results[1].1);
    }

    #[tokio::test]
    async fn search_never_exceeds_row_count() {
        let dir = tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("c.sqlite"))
            .await
            .unwrap();
        store
            .insert_chunks(vec![record("only", 0, "solo", vec![0.5, 0.5])])
            .await
            .unwrap();

        let results = store.search_similar(&[0.5, 0.5], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fresh_store_searches_empty() {
        let dir = tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("c.sqlite"))
            .await
            .unwrap();
        assert!(store.search_similar(&[1.0, 0.0], 5).await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn records_without_embeddings_are_skipped() {
        let dir = tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("c.sqlite"))
            .await
            .unwrap();

        let mut skipped = record("s", 0, "no vector", vec![]);
        skipped.embedding = None;
        store
            .insert_chunks(vec![skipped, record("kept", 1, "has vector", vec![1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
    }
}
