// SPDX-License-Identifier: MIT

//! Retrieval node: fetch candidate context for the current query

use crate::capability::{with_timeout, Capabilities};
use crate::error::CapabilityError;
use crate::workflow::engine::EngineOptions;
use crate::workflow::state::WorkflowState;

/// Populate the state with fresh chunks for the current query.
///
/// Overwrites any chunks from an earlier retrieval this run. An empty
/// result is a valid state for grading to consume; a capability error
/// propagates to the orchestrator, which degrades to the fallback pipeline.
pub async fn run(
    caps: &Capabilities,
    options: &EngineOptions,
    state: &mut WorkflowState,
) -> Result<(), CapabilityError> {
    let chunks = with_timeout(
        "retrieval",
        options.capability_timeout,
        caps.retriever.retrieve(&state.query, options.top_k),
    )
    .await?;

    log::info!("retrieved {} chunks", chunks.len());
    state.set_chunks(chunks);
    Ok(())
}
