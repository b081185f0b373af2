use storyloom_core::SequenceToken;
use thiserror::Error;

/// SQLite primary result codes a reopened cursor can get past.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Error, Debug)]
pub enum FeedError {
    /// The cursor broke but a reopen from the last token can continue.
    #[error("Change feed interrupted: {0}")]
    Resumable(String),

    #[error("Change feed failed: {0}")]
    Fatal(String),

    #[error("Change {token} has no post-mutation document")]
    MissingDocument { token: SequenceToken },

    #[error("Undecodable document at change {token}: {source}")]
    Decode {
        token: SequenceToken,
        #[source]
        source: serde_json::Error,
    },

    #[error("Change feed could not be resumed after {attempts} attempts: {source}")]
    ResumeExhausted {
        attempts: u32,
        #[source]
        source: Box<FeedError>,
    },

    #[error("Change feed is not being watched")]
    NotWatching,
}

impl FeedError {
    pub fn is_resumable(&self) -> bool {
        matches!(self, FeedError::Resumable(_))
    }
}

impl From<sqlx::Error> for FeedError {
    fn from(e: sqlx::Error) -> Self {
        let resumable = match &e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
            sqlx::Error::Database(db) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
                .unwrap_or(false),
            _ => false,
        };

        if resumable {
            FeedError::Resumable(e.to_string())
        } else {
            FeedError::Fatal(e.to_string())
        }
    }
}
