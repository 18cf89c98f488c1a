// SPDX-License-Identifier: MIT

//! mixrag - agentic retrieval-augmented question answering
//!
//! The crate orchestrates an adaptive workflow over four external
//! capability boundaries (text generation, relevance grading, query
//! rewriting, retrieval): decide whether a question needs the knowledge
//! base, grade what retrieval returns, rewrite and retry within a bounded
//! budget, and stream the final answer with citations. A single-pass
//! fallback pipeline covers runs the adaptive path cannot finish.

pub mod capability;
pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod workflow;

pub use error::{CapabilityError, MixragError};
pub use workflow::{RunEvent, RunResult, WorkflowEngine};
