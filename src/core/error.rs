use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Flash node '{addr}' is inactive, last report at {last_report}")]
    StaleNode {
        addr: String,
        last_report: DateTime<Utc>,
    },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Slot allocation failed: {0}")]
    Allocation(String),

    #[error("Insufficient capacity: found {found}, requested {requested}")]
    InsufficientCapacity { found: usize, requested: usize },

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A sequential batch stopped at `failed_host`; `succeeded` stay committed.
    #[error("Batch stopped at '{failed_host}' after {succeeded:?}: {source}")]
    BatchFailed {
        succeeded: Vec<String>,
        failed_host: String,
        source: Box<TopologyError>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TopologyError {
    /// Returns the error that actually stopped a batch, or `self` otherwise.
    pub fn root_cause(&self) -> &TopologyError {
        match self {
            TopologyError::BatchFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Maps any failure of a log submission to `Persistence`.
    pub fn into_persistence(self) -> TopologyError {
        match self {
            TopologyError::Persistence(msg) => TopologyError::Persistence(msg),
            other => TopologyError::Persistence(other.to_string()),
        }
    }

    /// Hosts committed before a batch stopped. Empty for non-batch errors.
    pub fn succeeded_hosts(&self) -> &[String] {
        match self {
            TopologyError::BatchFailed { succeeded, .. } => succeeded,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, TopologyError>;

impl<T> From<std::sync::PoisonError<T>> for TopologyError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for TopologyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_batches() {
        let err = TopologyError::BatchFailed {
            succeeded: vec!["a:1".to_string()],
            failed_host: "b:1".to_string(),
            source: Box::new(TopologyError::Conflict("already assigned".to_string())),
        };

        assert!(matches!(err.root_cause(), TopologyError::Conflict(_)));
        assert_eq!(err.succeeded_hosts(), &["a:1".to_string()]);
        assert!(err.to_string().contains("b:1"));
    }

    #[test]
    fn test_capacity_message_reports_counts() {
        let err = TopologyError::InsufficientCapacity {
            found: 2,
            requested: 3,
        };
        assert_eq!(err.to_string(), "Insufficient capacity: found 2, requested 3");
        assert!(err.succeeded_hosts().is_empty());
    }
}
