//! Operation counters.

use crate::error::ResultCode;
use crate::operation::OperationKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct KindCounters {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    canceled: AtomicU64,
}

/// Per-kind request counters, updated without locking.
#[derive(Debug, Default)]
pub struct OperationStatistics {
    counters: [KindCounters; OperationKind::ALL.len()],
}

/// Point-in-time copy of the counters for one operation kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStatistics {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub canceled: u64,
}

fn index(kind: OperationKind) -> usize {
    match kind {
        OperationKind::Add => 0,
        OperationKind::Delete => 1,
        OperationKind::Modify => 2,
        OperationKind::ModifyDn => 3,
        OperationKind::Search => 4,
        OperationKind::Bind => 5,
        OperationKind::Compare => 6,
        OperationKind::Abandon => 7,
    }
}

impl OperationStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a completed operation. Non-error codes such as `CompareFalse`
    /// and `NoOperation` count as successes.
    pub fn record(&self, kind: OperationKind, result: Option<ResultCode>) {
        let counters = &self.counters[index(kind)];
        counters.requests.fetch_add(1, Ordering::Relaxed);
        match result {
            Some(ResultCode::Canceled) => counters.canceled.fetch_add(1, Ordering::Relaxed),
            Some(code) if code.is_non_error() => {
                counters.successes.fetch_add(1, Ordering::Relaxed)
            }
            _ => counters.failures.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn get(&self, kind: OperationKind) -> KindStatistics {
        let counters = &self.counters[index(kind)];
        KindStatistics {
            requests: counters.requests.load(Ordering::Relaxed),
            successes: counters.successes.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            canceled: counters.canceled.load(Ordering::Relaxed),
        }
    }

    /// Counters for every kind, keyed by kind name.
    pub fn snapshot(&self) -> BTreeMap<String, KindStatistics> {
        OperationKind::ALL
            .iter()
            .map(|kind| (kind.to_string(), self.get(*kind)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_outcome() {
        let stats = OperationStatistics::new();
        stats.record(OperationKind::Add, Some(ResultCode::Success));
        stats.record(OperationKind::Add, Some(ResultCode::NoOperation));
        stats.record(OperationKind::Add, Some(ResultCode::NoSuchObject));
        stats.record(OperationKind::Add, Some(ResultCode::Canceled));
        stats.record(OperationKind::Compare, Some(ResultCode::CompareFalse));

        let add = stats.get(OperationKind::Add);
        assert_eq!(add.requests, 4);
        assert_eq!(add.successes, 2);
        assert_eq!(add.failures, 1);
        assert_eq!(add.canceled, 1);
        assert_eq!(stats.get(OperationKind::Compare).successes, 1);

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["add"]["requests"], 4);
    }
}
