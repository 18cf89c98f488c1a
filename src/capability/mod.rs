// SPDX-License-Identifier: MIT

//! Capability adapters - the external service boundaries of the workflow
//!
//! The orchestrator treats text generation, relevance grading, query
//! rewriting, and retrieval as opaque, possibly-failing calls behind these
//! traits. Concrete adapters:
//! - [openai] - OpenAI-compatible chat completions (generation, grading,
//!   rewriting)
//! - [retriever] - HTTP client for the external retrieval service

pub mod openai;
pub mod retriever;

use crate::error::CapabilityError;
use crate::workflow::state::{ContextChunk, Turn};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Wire-level outcome of a routing call: either the capability signaled
/// that retrieval is needed, or it answered the question directly.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteSignal {
    NeedsRetrieval,
    Direct(String),
}

/// Text-generation capability
#[async_trait]
pub trait Generator: Send + Sync {
    /// Ask whether `query` needs the knowledge base or can be answered from
    /// the conversation alone.
    async fn decide(
        &self,
        conversation: &[Turn],
        query: &str,
    ) -> Result<RouteSignal, CapabilityError>;

    /// Produce an answer for `query` grounded in `chunks`.
    async fn generate(
        &self,
        conversation: &[Turn],
        query: &str,
        chunks: &[ContextChunk],
    ) -> Result<String, CapabilityError>;

    /// Produce the answer as a sequence of text fragments sent through `tx`,
    /// returning the concatenated result. A failed send means the consumer
    /// is gone; implementations must stop and report `Canceled`.
    async fn generate_stream(
        &self,
        conversation: &[Turn],
        query: &str,
        chunks: &[ContextChunk],
        tx: mpsc::Sender<String>,
    ) -> Result<String, CapabilityError> {
        // Default implementation degrades to a single fragment
        let text = self.generate(conversation, query, chunks).await?;
        if tx.send(text.clone()).await.is_err() {
            return Err(CapabilityError::Canceled);
        }
        Ok(text)
    }
}

/// Binary relevance-grading capability
#[async_trait]
pub trait Grader: Send + Sync {
    /// `true` when `chunk` is relevant to `query`
    async fn grade(&self, query: &str, chunk: &str) -> Result<bool, CapabilityError>;
}

/// Query-rewrite capability
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, conversation: &[Turn], query: &str) -> Result<String, CapabilityError>;
}

/// Retrieval capability; a pure query against the external index
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Top `k` chunks for `query`, best first. An empty result is valid.
    async fn retrieve(&self, query: &str, k: usize)
        -> Result<Vec<ContextChunk>, CapabilityError>;
}

/// The four capability boundaries a workflow engine needs
#[derive(Clone)]
pub struct Capabilities {
    pub generator: Arc<dyn Generator>,
    pub grader: Arc<dyn Grader>,
    pub rewriter: Arc<dyn Rewriter>,
    pub retriever: Arc<dyn Retriever>,
}

/// Bound a capability call with the configured timeout.
///
/// Elapsed timers surface as [CapabilityError::Timeout] and route exactly
/// like any other capability failure.
pub async fn with_timeout<T, F>(
    capability: &str,
    limit: Duration,
    call: F,
) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::timeout(capability, limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let ok = with_timeout("generation", Duration::from_secs(1), async { Ok(42) }).await;
        assert_eq!(ok.unwrap(), 42);

        let err: Result<i32, _> = with_timeout("generation", Duration::from_secs(1), async {
            Err(CapabilityError::unavailable("generation", "down"))
        })
        .await;
        assert!(matches!(err, Err(CapabilityError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed() {
        let result: Result<(), _> =
            with_timeout("grading", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(CapabilityError::Timeout { capability, .. }) => assert_eq!(capability, "grading"),
            other => panic!("Expected timeout, got {:?}", other),
        }
    }
}
