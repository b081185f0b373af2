//! Resumable consumer over a [`ChangeSource`].

use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use storyloom_core::SequenceToken;

use super::{ChangeCursor, ChangeSource, FeedError, MutationEvent, OperationFilter, RawChange};

pub const DEFAULT_MAX_RESUME_ATTEMPTS: u32 = 5;
pub const DEFAULT_RESUME_BACKOFF: Duration = Duration::from_millis(250);

/// How a watch is opened and how hard it tries to stay open.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Start after this token instead of the current end of the feed.
    pub resume_after: Option<SequenceToken>,
    pub filter: OperationFilter,
    /// Consecutive reopen attempts before a resumable failure becomes fatal.
    pub max_resume_attempts: u32,
    pub resume_backoff: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            resume_after: None,
            filter: OperationFilter::all(),
            max_resume_attempts: DEFAULT_MAX_RESUME_ATTEMPTS,
            resume_backoff: DEFAULT_RESUME_BACKOFF,
        }
    }
}

#[derive(Debug, Default)]
struct StatusInner {
    watching: AtomicBool,
    token: Mutex<Option<SequenceToken>>,
    last_error: Mutex<Option<String>>,
}

/// Shared, read-only view of a consumer's state for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct FeedStatus {
    inner: Arc<StatusInner>,
}

impl FeedStatus {
    pub fn is_watching(&self) -> bool {
        self.inner.watching.load(Ordering::Acquire)
    }

    pub fn sequence_token(&self) -> Option<SequenceToken> {
        *lock(&self.inner.token)
    }

    /// Message of the failure that last stopped the watch.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }

    fn set_watching(&self, watching: bool) {
        self.inner.watching.store(watching, Ordering::Release);
    }

    fn set_token(&self, token: SequenceToken) {
        *lock(&self.inner.token) = Some(token);
    }

    fn set_error(&self, error: &FeedError) {
        *lock(&self.inner.last_error) = Some(error.to_string());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Watches one collection and yields its mutations in commit order.
pub struct ChangeFeedConsumer<S: ChangeSource, T> {
    source: S,
    config: WatchConfig,
    cursor: Option<S::Cursor>,
    status: FeedStatus,
    _record: PhantomData<fn() -> T>,
}

impl<S, T> ChangeFeedConsumer<S, T>
where
    S: ChangeSource,
    T: DeserializeOwned,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            config: WatchConfig::default(),
            cursor: None,
            status: FeedStatus::default(),
            _record: PhantomData,
        }
    }

    pub fn status(&self) -> FeedStatus {
        self.status.clone()
    }

    pub fn is_watching(&self) -> bool {
        self.status.is_watching()
    }

    /// Position the watch resumes after: the last delivered token, or where
    /// the cursor was opened if nothing has been delivered yet.
    pub fn current_sequence_token(&self) -> Option<SequenceToken> {
        self.status.sequence_token()
    }

    /// Opens the watch. A no-op while already watching.
    pub async fn start_watch(&mut self, config: WatchConfig) -> Result<(), FeedError> {
        if self.cursor.is_some() {
            tracing::debug!("Change feed already watched, ignoring start");
            return Ok(());
        }

        let resume_after = config.resume_after.or(self.status.sequence_token());
        self.config = config;
        self.open(resume_after).await?;

        tracing::info!(
            "Watching change feed after {}",
            self.status
                .sequence_token()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "head".to_string())
        );
        Ok(())
    }

    /// Reopens the watch positioned after `token`.
    pub async fn resume_from(&mut self, token: SequenceToken) -> Result<(), FeedError> {
        self.cursor = None;
        self.open(Some(token)).await
    }

    /// Releases the cursor. `fatal` marks a stop forced by an error.
    pub fn stop_watch(&mut self, fatal: bool) {
        let had_cursor = self.cursor.take().is_some();
        self.status.set_watching(false);

        if fatal {
            tracing::error!(
                "Change feed stopped after failure at {:?}",
                self.status.sequence_token()
            );
        } else if had_cursor {
            tracing::info!("Change feed stopped");
        }
    }

    /// Waits for the next mutation, reopening the cursor across resumable
    /// failures.
    pub async fn next_event(&mut self) -> Result<MutationEvent<T>, FeedError> {
        if !self.status.is_watching() {
            return Err(FeedError::NotWatching);
        }

        let mut failures = 0u32;
        loop {
            let outcome = match self.cursor.as_mut() {
                Some(cursor) => cursor.next_change().await,
                None => match self.open(self.status.sequence_token()).await {
                    Ok(()) => continue,
                    Err(e) => Err(e),
                },
            };

            match outcome {
                Ok(change) => {
                    return match Self::decode(change) {
                        Ok(event) => {
                            self.status.set_token(event.sequence_token);
                            Ok(event)
                        }
                        Err(e) => Err(self.fail(e)),
                    };
                }
                Err(e) if e.is_resumable() => {
                    self.cursor = None;
                    failures += 1;
                    if failures > self.config.max_resume_attempts {
                        let exhausted = FeedError::ResumeExhausted {
                            attempts: self.config.max_resume_attempts,
                            source: Box::new(e),
                        };
                        return Err(self.fail(exhausted));
                    }

                    tracing::warn!(
                        attempt = failures,
                        resume_after = ?self.status.sequence_token(),
                        "Change feed interrupted, resuming: {e}"
                    );
                    tokio::time::sleep(self.config.resume_backoff).await;
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    async fn open(&mut self, resume_after: Option<SequenceToken>) -> Result<(), FeedError> {
        let cursor = self.source.open(resume_after, &self.config.filter).await?;
        self.status.set_token(resume_after.unwrap_or_else(|| cursor.position()));
        self.cursor = Some(cursor);
        self.status.set_watching(true);
        Ok(())
    }

    fn fail(&mut self, error: FeedError) -> FeedError {
        tracing::error!("Change feed failed: {error}");
        self.status.set_error(&error);
        self.stop_watch(true);
        error
    }

    fn decode(change: RawChange) -> Result<MutationEvent<T>, FeedError> {
        let token = change.sequence;
        let after = change
            .document_after
            .ok_or(FeedError::MissingDocument { token })?;

        let snapshot_after =
            serde_json::from_str(&after).map_err(|source| FeedError::Decode { token, source })?;
        let snapshot_before = change
            .document_before
            .map(|before| serde_json::from_str(&before))
            .transpose()
            .map_err(|source| FeedError::Decode { token, source })?;

        Ok(MutationEvent {
            sequence_token: token,
            operation: change.operation,
            snapshot_after,
            snapshot_before,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Operation;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use storyloom_core::GameSnapshot;

    /// Scripted step handed out to cursors in order.
    enum Step {
        Change(RawChange),
        Fail(FeedError),
    }

    #[derive(Default)]
    struct Script {
        steps: VecDeque<Step>,
        opens: Vec<Option<SequenceToken>>,
        open_failures: VecDeque<FeedError>,
    }

    #[derive(Clone, Default)]
    struct MockSource {
        script: Arc<Mutex<Script>>,
    }

    impl MockSource {
        fn push_change(&self, seq: i64, id: &str) {
            let document = serde_json::to_string(&GameSnapshot::new(id, "p")).unwrap();
            self.push(Step::Change(RawChange {
                sequence: SequenceToken::new(seq),
                record_id: id.to_string(),
                operation: Operation::Updated,
                document_after: Some(document),
                document_before: None,
            }));
        }

        fn push(&self, step: Step) {
            self.script.lock().unwrap().steps.push_back(step);
        }

        fn fail_next_open(&self, error: FeedError) {
            self.script.lock().unwrap().open_failures.push_back(error);
        }

        fn opens(&self) -> Vec<Option<SequenceToken>> {
            self.script.lock().unwrap().opens.clone()
        }
    }

    struct MockCursor {
        script: Arc<Mutex<Script>>,
        position: SequenceToken,
    }

    #[async_trait]
    impl ChangeSource for MockSource {
        type Cursor = MockCursor;

        async fn open(
            &self,
            resume_after: Option<SequenceToken>,
            _filter: &OperationFilter,
        ) -> Result<MockCursor, FeedError> {
            let mut script = self.script.lock().unwrap();
            script.opens.push(resume_after);
            if let Some(e) = script.open_failures.pop_front() {
                return Err(e);
            }
            Ok(MockCursor {
                script: self.script.clone(),
                position: resume_after.unwrap_or(SequenceToken::new(0)),
            })
        }
    }

    #[async_trait]
    impl ChangeCursor for MockCursor {
        fn position(&self) -> SequenceToken {
            self.position
        }

        async fn next_change(&mut self) -> Result<RawChange, FeedError> {
            let step = self.script.lock().unwrap().steps.pop_front();
            match step {
                Some(Step::Change(change)) => {
                    self.position = change.sequence;
                    Ok(change)
                }
                Some(Step::Fail(e)) => Err(e),
                None => std::future::pending().await,
            }
        }
    }

    fn fast_config() -> WatchConfig {
        WatchConfig {
            resume_backoff: Duration::from_millis(1),
            ..WatchConfig::default()
        }
    }

    fn consumer(source: &MockSource) -> ChangeFeedConsumer<MockSource, GameSnapshot> {
        ChangeFeedConsumer::new(source.clone())
    }

    #[tokio::test]
    async fn test_start_watch_opens_once() {
        let source = MockSource::default();
        let mut consumer = consumer(&source);

        consumer.start_watch(fast_config()).await.unwrap();
        consumer.start_watch(fast_config()).await.unwrap();

        assert!(consumer.is_watching());
        assert_eq!(source.opens().len(), 1);
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let source = MockSource::default();
        source.push_change(1, "a");
        source.push_change(2, "b");
        let mut consumer = consumer(&source);
        consumer.start_watch(fast_config()).await.unwrap();

        let first = consumer.next_event().await.unwrap();
        let second = consumer.next_event().await.unwrap();

        assert_eq!(first.snapshot_after.id, "a");
        assert_eq!(second.snapshot_after.id, "b");
        assert_eq!(consumer.current_sequence_token(), Some(SequenceToken::new(2)));
    }

    #[tokio::test]
    async fn test_resumable_failure_reopens_after_last_token() {
        let source = MockSource::default();
        source.push_change(7, "a");
        source.push(Step::Fail(FeedError::Resumable("database is locked".into())));
        source.push_change(8, "a");
        let mut consumer = consumer(&source);
        consumer.start_watch(fast_config()).await.unwrap();

        let first = consumer.next_event().await.unwrap();
        let second = consumer.next_event().await.unwrap();

        assert!(second.sequence_token > first.sequence_token);
        assert_eq!(source.opens(), vec![None, Some(SequenceToken::new(7))]);
        assert!(consumer.is_watching());
    }

    #[tokio::test]
    async fn test_resume_attempts_are_bounded() {
        let source = MockSource::default();
        let mut consumer = consumer(&source);
        consumer.start_watch(fast_config()).await.unwrap();

        source.push(Step::Fail(FeedError::Resumable("busy".into())));
        for _ in 0..DEFAULT_MAX_RESUME_ATTEMPTS {
            source.fail_next_open(FeedError::Resumable("busy".into()));
        }

        let err = consumer.next_event().await.unwrap_err();

        assert!(matches!(
            err,
            FeedError::ResumeExhausted { attempts, .. } if attempts == DEFAULT_MAX_RESUME_ATTEMPTS
        ));
        assert_eq!(source.opens().len(), 1 + DEFAULT_MAX_RESUME_ATTEMPTS as usize);
        assert!(!consumer.is_watching());
        assert!(consumer.status().last_error().is_some());
    }

    #[tokio::test]
    async fn test_fatal_failure_stops_watch() {
        let source = MockSource::default();
        source.push(Step::Fail(FeedError::Fatal("no such table".into())));
        let mut consumer = consumer(&source);
        consumer.start_watch(fast_config()).await.unwrap();

        let err = consumer.next_event().await.unwrap_err();

        assert!(matches!(err, FeedError::Fatal(_)));
        assert!(!consumer.is_watching());
        assert_eq!(source.opens().len(), 1);
        assert!(matches!(
            consumer.next_event().await,
            Err(FeedError::NotWatching)
        ));
    }

    #[tokio::test]
    async fn test_missing_document_is_fatal() {
        let source = MockSource::default();
        source.push(Step::Change(RawChange {
            sequence: SequenceToken::new(3),
            record_id: "a".to_string(),
            operation: Operation::Replaced,
            document_after: None,
            document_before: None,
        }));
        let mut consumer = consumer(&source);
        consumer.start_watch(fast_config()).await.unwrap();

        let err = consumer.next_event().await.unwrap_err();

        assert!(matches!(err, FeedError::MissingDocument { token } if token.value() == 3));
        assert!(!consumer.is_watching());
    }

    #[tokio::test]
    async fn test_undecodable_document_is_fatal() {
        let source = MockSource::default();
        source.push(Step::Change(RawChange {
            sequence: SequenceToken::new(3),
            record_id: "a".to_string(),
            operation: Operation::Inserted,
            document_after: Some("{not json".to_string()),
            document_before: None,
        }));
        let mut consumer = consumer(&source);
        consumer.start_watch(fast_config()).await.unwrap();

        assert!(matches!(
            consumer.next_event().await,
            Err(FeedError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_and_resume_from() {
        let source = MockSource::default();
        let mut consumer = consumer(&source);
        consumer.start_watch(fast_config()).await.unwrap();

        consumer.stop_watch(false);
        assert!(!consumer.is_watching());
        assert!(consumer.status().last_error().is_none());

        consumer.resume_from(SequenceToken::new(40)).await.unwrap();
        assert!(consumer.is_watching());
        assert_eq!(source.opens().last(), Some(&Some(SequenceToken::new(40))));
        assert_eq!(consumer.current_sequence_token(), Some(SequenceToken::new(40)));
    }
}
