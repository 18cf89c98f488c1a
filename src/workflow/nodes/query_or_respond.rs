// SPDX-License-Identifier: MIT

//! Entry node: answer directly or go fetch documents

use super::QueryRouting;
use crate::capability::{with_timeout, Capabilities, RouteSignal};
use crate::workflow::engine::EngineOptions;
use crate::workflow::state::{Answer, WorkflowState};

/// Decide whether the query needs retrieval.
///
/// A direct answer is written into the terminal slot with no citations.
/// This node never fails the run: a capability error or unparseable reply
/// defaults to retrieval, preferring grounding over guessing.
pub async fn run(
    caps: &Capabilities,
    options: &EngineOptions,
    state: &mut WorkflowState,
) -> QueryRouting {
    let decision = with_timeout(
        "generation",
        options.capability_timeout,
        caps.generator.decide(&state.conversation, &state.query),
    )
    .await;

    match decision {
        Ok(RouteSignal::Direct(text)) => {
            log::info!("query answered directly without retrieval");
            state.finish(Answer {
                text,
                citations: Vec::new(),
            });
            QueryRouting::RespondDirectly
        }
        Ok(RouteSignal::NeedsRetrieval) => QueryRouting::Retrieve,
        Err(e) => {
            log::warn!("routing call failed, defaulting to retrieval: {}", e);
            QueryRouting::Retrieve
        }
    }
}
