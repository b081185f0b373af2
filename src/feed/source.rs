use async_trait::async_trait;
use storyloom_core::SequenceToken;

use super::{FeedError, OperationFilter, RawChange};

/// Something that can open an ordered cursor over a collection's changes.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    type Cursor: ChangeCursor;

    /// Opens a cursor positioned after `resume_after`, or at the current end
    /// of the feed when `None`.
    async fn open(
        &self,
        resume_after: Option<SequenceToken>,
        filter: &OperationFilter,
    ) -> Result<Self::Cursor, FeedError>;
}

#[async_trait]
pub trait ChangeCursor: Send {
    /// Last position this cursor has read past.
    fn position(&self) -> SequenceToken;

    /// Waits for the next matching change.
    async fn next_change(&mut self) -> Result<RawChange, FeedError>;
}
