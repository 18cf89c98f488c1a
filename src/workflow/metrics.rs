// SPDX-License-Identifier: MIT

//! Run-level metrics for external aggregation
//!
//! Emitted once per run through an [AnalyticsSink]; the core keeps nothing.

use serde::Serialize;

/// Wall-clock spent in one node
#[derive(Debug, Clone, Serialize)]
pub struct NodeTiming {
    pub node: &'static str,
    pub millis: u128,
}

/// Everything downstream analytics needs to distinguish adaptive-path
/// answers from degraded ones
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub total_millis: u128,
    pub nodes: Vec<NodeTiming>,
    pub rewrite_count: u32,
    pub used_fallback: bool,
    pub retrieved_chunks: usize,
    pub relevant_chunks: usize,
}

/// Receiver for per-run metrics
pub trait AnalyticsSink: Send + Sync {
    fn record(&self, metrics: &RunMetrics);
}

/// Default sink: one info line per run
pub struct LogSink;

impl AnalyticsSink for LogSink {
    fn record(&self, metrics: &RunMetrics) {
        log::info!(
            "run finished in {}ms: rewrites={} fallback={} chunks={}/{} relevant, nodes={}",
            metrics.total_millis,
            metrics.rewrite_count,
            metrics.used_fallback,
            metrics.relevant_chunks,
            metrics.retrieved_chunks,
            metrics
                .nodes
                .iter()
                .map(|t| format!("{}:{}ms", t.node, t.millis))
                .collect::<Vec<_>>()
                .join(" ")
        );
    }
}
