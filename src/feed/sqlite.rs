//! Change source tailing the `game_changes` log.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use storyloom_core::SequenceToken;
use tokio::sync::Notify;

use super::{ChangeCursor, ChangeSource, FeedError, Operation, OperationFilter, RawChange};
use crate::store::GameStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_BATCH_SIZE: u32 = 64;

#[derive(Debug, Clone)]
pub struct SqliteChangeSource {
    pool: SqlitePool,
    notify: Arc<Notify>,
    poll_interval: Duration,
    batch_size: u32,
}

impl SqliteChangeSource {
    /// Source over the store's pool, woken by the store's own writes.
    pub fn new(store: &GameStore) -> Self {
        Self {
            pool: store.pool().clone(),
            notify: store.change_notifier(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl ChangeSource for SqliteChangeSource {
    type Cursor = SqliteChangeCursor;

    async fn open(
        &self,
        resume_after: Option<SequenceToken>,
        filter: &OperationFilter,
    ) -> Result<Self::Cursor, FeedError> {
        let position = match resume_after {
            Some(token) => token,
            None => {
                let (head,): (i64,) =
                    sqlx::query_as("SELECT COALESCE(MAX(seq), 0) FROM game_changes")
                        .fetch_one(&self.pool)
                        .await?;
                SequenceToken::new(head)
            }
        };

        tracing::debug!("Opened change cursor after {}", position);

        Ok(SqliteChangeCursor {
            pool: self.pool.clone(),
            notify: self.notify.clone(),
            poll_interval: self.poll_interval,
            batch_size: self.batch_size,
            filter: filter.clone(),
            position,
            buffer: VecDeque::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChangeRow {
    seq: i64,
    game_id: String,
    operation: String,
    document_after: Option<String>,
    document_before: Option<String>,
}

pub struct SqliteChangeCursor {
    pool: SqlitePool,
    notify: Arc<Notify>,
    poll_interval: Duration,
    batch_size: u32,
    filter: OperationFilter,
    position: SequenceToken,
    buffer: VecDeque<RawChange>,
}

impl SqliteChangeCursor {
    async fn fetch(&mut self) -> Result<(), FeedError> {
        let rows: Vec<ChangeRow> = sqlx::query_as(
            r#"
            SELECT seq, game_id, operation, document_after, document_before
            FROM game_changes
            WHERE seq > ?
            ORDER BY seq
            LIMIT ?
            "#,
        )
        .bind(self.position.value())
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let sequence = SequenceToken::new(row.seq);
            let operation = Operation::parse(&row.operation).ok_or_else(|| {
                FeedError::Fatal(format!(
                    "unknown operation '{}' at change {}",
                    row.operation, sequence
                ))
            })?;
            self.position = sequence;

            if !self.filter.matches(operation) {
                continue;
            }
            self.buffer.push_back(RawChange {
                sequence,
                record_id: row.game_id,
                operation,
                document_after: row.document_after,
                document_before: row.document_before,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ChangeCursor for SqliteChangeCursor {
    fn position(&self) -> SequenceToken {
        self.position
    }

    async fn next_change(&mut self) -> Result<RawChange, FeedError> {
        loop {
            if let Some(change) = self.buffer.pop_front() {
                return Ok(change);
            }

            // Register for wakeups before reading so a commit between the
            // read and the wait is not missed
            let notify = self.notify.clone();
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.fetch().await?;

            if self.buffer.is_empty() {
                tokio::select! {
                    _ = &mut notified => {}
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
    }
}
