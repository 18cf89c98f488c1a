// SPDX-License-Identifier: MIT

//! Fallback pipeline: single-pass retrieve-then-generate
//!
//! Used when the adaptive path signals an unrecoverable capability error.
//! No grading, no rewriting, no branching, and no further fallback: the
//! only thing that can fail the run here is its own generation call.

use crate::capability::{with_timeout, Capabilities};
use crate::error::{CapabilityError, MixragError};
use crate::workflow::engine::{EngineOptions, RunEvent};
use crate::workflow::nodes::answer::stream_generation;
use crate::workflow::state::{citations, Answer, WorkflowState};
use tokio::sync::mpsc;

/// Retrieve once, generate once with whatever came back.
///
/// A retrieval error here degrades to zero chunks instead of failing, so
/// the pipeline still gets an answer out when only generation works.
pub async fn run(
    caps: &Capabilities,
    options: &EngineOptions,
    state: &mut WorkflowState,
    events: Option<&mpsc::Sender<RunEvent>>,
) -> Result<Answer, MixragError> {
    log::info!("fallback pipeline: single-pass retrieve and generate");

    match with_timeout(
        "retrieval",
        options.capability_timeout,
        caps.retriever.retrieve(&state.query, options.top_k),
    )
    .await
    {
        Ok(chunks) => state.set_chunks(chunks),
        Err(e) => {
            log::warn!("fallback retrieval failed, continuing without context: {}", e);
            state.set_chunks(Vec::new());
        }
    }

    let chunks = state.chunks().to_vec();
    let generated = match events {
        Some(tx) => {
            stream_generation(caps, options, &state.conversation, &state.query, &chunks, tx).await
        }
        None => {
            with_timeout(
                "generation",
                options.capability_timeout,
                caps.generator.generate(&state.conversation, &state.query, &chunks),
            )
            .await
        }
    };

    match generated {
        Ok(text) => Ok(Answer {
            text,
            citations: citations(&chunks),
        }),
        Err(CapabilityError::Canceled) => Err(MixragError::Canceled),
        Err(source) => Err(MixragError::Fallback { source }),
    }
}
