// SPDX-License-Identifier: MIT

//! The adaptive query workflow
//!
//! A query runs through a closed decision graph: decide whether to
//! retrieve, grade what came back, rewrite and retry within a bounded
//! budget, then answer. When the adaptive path hits an unrecoverable
//! capability error the run degrades to a single-pass fallback pipeline.

pub mod engine;
pub mod fallback;
pub mod metrics;
pub mod nodes;
pub mod state;

pub use engine::{EngineOptions, RunEvent, WorkflowEngine};
pub use metrics::{AnalyticsSink, LogSink, RunMetrics};
pub use state::{Answer, ContextChunk, Role, RunResult, Turn, Verdict, WorkflowState};
