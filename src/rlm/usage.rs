//! Usage Aggregator: thread-safe per-depth and aggregate token accounting.
//!
//! Grounded on `types/usage_metrics.rs`'s `UsageMetrics`/`add_usage_metrics`,
//! generalized from a single flat counter to a per-depth map since helper
//! calls at arbitrary depths may be in flight concurrently during a batch.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Token and call counts accumulated at a single recursion depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub calls: u64,
}

impl DepthUsage {
    fn add(&mut self, prompt_tokens: u64, completion_tokens: u64) {
        self.prompt_tokens += prompt_tokens;
        self.completion_tokens += completion_tokens;
        self.calls += 1;
    }
}

/// A snapshot of accumulated usage: per-depth breakdown plus grand totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Usage at each depth, indexed by depth (0 = root completion).
    pub by_depth: Vec<DepthUsage>,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_calls: u64,
}

/// Thread-safe accumulator updated after every call into the Model Adapter,
/// root or nested helper. Safe to share across concurrently in-flight
/// helper calls during a batched request.
#[derive(Debug, Default)]
pub struct UsageAggregator {
    by_depth: DashMap<u32, DepthUsage>,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one model reply's usage at the given depth.
    pub fn record(&self, depth: u32, prompt_tokens: u64, completion_tokens: u64) {
        self.by_depth
            .entry(depth)
            .or_default()
            .add(prompt_tokens, completion_tokens);
    }

    /// Snapshot the current totals into an immutable [`UsageRecord`].
    pub fn snapshot(&self) -> UsageRecord {
        let max_depth = self.by_depth.iter().map(|e| *e.key()).max().unwrap_or(0);
        let mut by_depth = vec![DepthUsage::default(); max_depth as usize + 1];
        let mut total_prompt_tokens = 0;
        let mut total_completion_tokens = 0;
        let mut total_calls = 0;

        for entry in self.by_depth.iter() {
            let usage = *entry.value();
            by_depth[*entry.key() as usize] = usage;
            total_prompt_tokens += usage.prompt_tokens;
            total_completion_tokens += usage.completion_tokens;
            total_calls += usage.calls;
        }

        UsageRecord {
            by_depth,
            total_prompt_tokens,
            total_completion_tokens,
            total_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn single_record_updates_depth_and_totals() {
        let agg = UsageAggregator::new();
        agg.record(0, 10, 20);
        let snap = agg.snapshot();
        assert_eq!(snap.by_depth[0], DepthUsage { prompt_tokens: 10, completion_tokens: 20, calls: 1 });
        assert_eq!(snap.total_prompt_tokens, 10);
        assert_eq!(snap.total_completion_tokens, 20);
    }

    #[test]
    fn multiple_depths_are_kept_separate() {
        let agg = UsageAggregator::new();
        agg.record(0, 100, 50);
        agg.record(1, 5, 5);
        agg.record(1, 5, 5);
        let snap = agg.snapshot();
        assert_eq!(snap.by_depth.len(), 2);
        assert_eq!(snap.by_depth[1].calls, 2);
        assert_eq!(snap.total_prompt_tokens, 110);
        assert_eq!(snap.total_calls, 3);
    }

    #[test]
    fn concurrent_batched_updates_are_not_lost() {
        let agg = Arc::new(UsageAggregator::new());
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || agg.record(1, 1, 1))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(agg.snapshot().by_depth[1].calls, 50);
    }
}
