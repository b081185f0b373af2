use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use storyloom_core::{GameSnapshot, SequenceToken};
use thiserror::Error;
use tokio::sync::Notify;

use crate::feed::Operation;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid game document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("Game not found: {0}")]
    NotFound(String),

    #[error("Game already exists: {0}")]
    AlreadyExists(String),
}

/// A game as currently stored, with the sequence of its latest change.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredGame {
    pub snapshot: GameSnapshot,
    pub sequence: SequenceToken,
}

#[derive(sqlx::FromRow)]
struct GameRow {
    document: String,
    seq: i64,
}

/// Persisted game records.
///
/// Every write appends to the `game_changes` log inside the same transaction
/// and wakes in-process change-feed cursors.
#[derive(Debug, Clone)]
pub struct GameStore {
    pool: SqlitePool,
    changes: Arc<Notify>,
}

impl GameStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            changes: Arc::new(Notify::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Notified after every committed write made through this store.
    pub fn change_notifier(&self) -> Arc<Notify> {
        self.changes.clone()
    }

    /// Writes read before they write, so they take the write lock up front
    /// and wait on `busy_timeout` instead of failing on upgrade.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin_with("BEGIN IMMEDIATE").await
    }

    pub async fn insert(&self, snapshot: &GameSnapshot) -> Result<SequenceToken, StoreError> {
        let mut tx = self.begin_write().await?;

        if Self::load(&mut tx, &snapshot.id).await?.is_some() {
            return Err(StoreError::AlreadyExists(snapshot.id.clone()));
        }

        let document = serde_json::to_string(snapshot)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO games (id, document, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&snapshot.id)
        .bind(&document)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let seq =
            Self::record_change(&mut tx, &snapshot.id, Operation::Inserted, &document, None).await?;
        tx.commit().await?;

        self.changes.notify_waiters();
        Ok(seq)
    }

    /// Overwrites the whole document of an existing game.
    pub async fn replace(&self, snapshot: &GameSnapshot) -> Result<SequenceToken, StoreError> {
        let mut tx = self.begin_write().await?;

        let before = Self::load(&mut tx, &snapshot.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(snapshot.id.clone()))?;

        let document = serde_json::to_string(snapshot)?;
        Self::write_document(&mut tx, &snapshot.id, &document).await?;
        let seq = Self::record_change(
            &mut tx,
            &snapshot.id,
            Operation::Replaced,
            &document,
            Some(&before),
        )
        .await?;
        tx.commit().await?;

        self.changes.notify_waiters();
        Ok(seq)
    }

    /// Read-modify-write of an existing game.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<SequenceToken, StoreError>
    where
        F: FnOnce(&mut GameSnapshot),
    {
        let mut tx = self.begin_write().await?;

        let before = Self::load(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut snapshot: GameSnapshot = serde_json::from_str(&before)?;
        mutate(&mut snapshot);
        // The record id is the key; a mutation cannot move it
        snapshot.id = id.to_string();

        let document = serde_json::to_string(&snapshot)?;
        Self::write_document(&mut tx, id, &document).await?;
        let seq =
            Self::record_change(&mut tx, id, Operation::Updated, &document, Some(&before)).await?;
        tx.commit().await?;

        self.changes.notify_waiters();
        Ok(seq)
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoredGame>, StoreError> {
        let row: Option<GameRow> = sqlx::query_as(
            r#"
            SELECT g.document AS document,
                   COALESCE((SELECT MAX(c.seq) FROM game_changes c WHERE c.game_id = g.id), 0) AS seq
            FROM games g
            WHERE g.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::hydrate).transpose()
    }

    pub async fn list(&self) -> Result<Vec<StoredGame>, StoreError> {
        let rows: Vec<GameRow> = sqlx::query_as(
            r#"
            SELECT g.document AS document,
                   COALESCE((SELECT MAX(c.seq) FROM game_changes c WHERE c.game_id = g.id), 0) AS seq
            FROM games g
            ORDER BY g.created_at, g.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::hydrate).collect()
    }

    fn hydrate(row: GameRow) -> Result<StoredGame, StoreError> {
        Ok(StoredGame {
            snapshot: serde_json::from_str(&row.document)?,
            sequence: SequenceToken::new(row.seq),
        })
    }

    async fn load(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT document FROM games WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.map(|r| r.0))
    }

    async fn write_document(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        document: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE games SET document = ?, updated_at = ? WHERE id = ?")
            .bind(document)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn record_change(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        operation: Operation,
        after: &str,
        before: Option<&str>,
    ) -> Result<SequenceToken, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO game_changes (game_id, operation, document_after, document_before, committed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(operation.as_str())
        .bind(after)
        .bind(before)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await?;

        Ok(SequenceToken::new(result.last_insert_rowid()))
    }
}
