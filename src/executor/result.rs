//! Per-host results.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::warn;

use crate::error::{AdminError, Result};

/// Key used when a task ran once without any host.
pub const LOCAL_ONLY: &str = "<local-only>";

/// Per-host outcomes keyed by host string, in the order they were stored.
pub type ResultMap = IndexMap<String, HostResult>;

/// What a task body returns.
#[derive(Debug, Clone, Default)]
pub enum TaskValue {
    #[default]
    None,
    Text(String),
    /// The task dispatched to other hosts itself.
    Nested(ResultMap),
}

#[derive(Debug, Clone)]
pub enum HostResult {
    Success(TaskValue),
    Failed(Arc<AdminError>),
    /// The worker went away without a regular result, e.g. it panicked.
    Terminated(String),
}

impl HostResult {
    pub fn from_outcome(outcome: Result<TaskValue>) -> Self {
        match outcome {
            Ok(value) => HostResult::Success(value),
            Err(err) => HostResult::Failed(Arc::new(err)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HostResult::Success(_))
    }

    pub fn error(&self) -> Option<&AdminError> {
        match self {
            HostResult::Failed(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&TaskValue> {
        match self {
            HostResult::Success(value) => Some(value),
            _ => None,
        }
    }
}

/// Stores exactly one result per host.
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: ResultMap,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `result` for `host`. A second result for the same host is
    /// dropped; the first report wins.
    pub fn insert(&mut self, host: String, result: HostResult) {
        if self.results.contains_key(&host) {
            warn!(host = %host, "Dropping duplicate result");
            return;
        }
        self.results.insert(host, result);
    }

    pub fn contains(&self, host: &str) -> bool {
        self.results.contains_key(host)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_map(self) -> ResultMap {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_keeps_first_result() {
        let mut collector = ResultCollector::new();
        collector.insert("a".to_string(), HostResult::Success(TaskValue::None));
        collector.insert(
            "a".to_string(),
            HostResult::Failed(Arc::new(AdminError::abort("late"))),
        );
        collector.insert("b".to_string(), HostResult::Terminated("gone".to_string()));

        let map = collector.into_map();
        assert_eq!(map.len(), 2);
        assert!(map["a"].is_success());
        assert!(!map["b"].is_success());
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
