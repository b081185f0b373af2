use serde::{Deserialize, Serialize};
use std::fmt;
use storyloom_core::SequenceToken;

/// Kind of write observed on the watched collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Inserted,
    Updated,
    Replaced,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Inserted, Operation::Updated, Operation::Replaced];

    /// Name stored in the change log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Inserted => "insert",
            Operation::Updated => "update",
            Operation::Replaced => "replace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(Operation::Inserted),
            "update" => Some(Operation::Updated),
            "replace" => Some(Operation::Replaced),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which operations a watch delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFilter {
    operations: Vec<Operation>,
}

impl OperationFilter {
    pub fn all() -> Self {
        Self {
            operations: Operation::ALL.to_vec(),
        }
    }

    pub fn only(operations: &[Operation]) -> Self {
        Self {
            operations: operations.to_vec(),
        }
    }

    pub fn matches(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }
}

impl Default for OperationFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// One change as read from a source, documents still encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChange {
    pub sequence: SequenceToken,
    pub record_id: String,
    pub operation: Operation,
    pub document_after: Option<String>,
    pub document_before: Option<String>,
}

/// A decoded mutation on the watched collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent<T> {
    pub sequence_token: SequenceToken,
    pub operation: Operation,
    pub snapshot_after: T,
    pub snapshot_before: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        for op in Operation::ALL {
            assert_eq!(Operation::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operation::parse("delete"), None);
    }

    #[test]
    fn test_filter() {
        let filter = OperationFilter::only(&[Operation::Updated]);
        assert!(filter.matches(Operation::Updated));
        assert!(!filter.matches(Operation::Inserted));

        assert!(Operation::ALL
            .iter()
            .all(|op| OperationFilter::default().matches(*op)));
    }
}
