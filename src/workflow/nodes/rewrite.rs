// SPDX-License-Identifier: MIT

//! Rewrite node: reformulate the query for better recall

use crate::capability::{with_timeout, Capabilities};
use crate::workflow::engine::EngineOptions;
use crate::workflow::state::WorkflowState;

/// Replace the query with a rewritten form and consume one rewrite cycle.
///
/// Always routes back to retrieval. A failed rewrite call reuses the
/// unmodified query but still consumes a cycle, so the loop bound makes
/// progress either way.
pub async fn run(caps: &Capabilities, options: &EngineOptions, state: &mut WorkflowState) {
    let rewritten = with_timeout(
        "rewrite",
        options.capability_timeout,
        caps.rewriter.rewrite(&state.conversation, &state.query),
    )
    .await;

    match rewritten {
        Ok(query) => {
            log::info!("rewrote query to: {:.100}", query);
            state.accept_rewrite(query);
        }
        Err(e) => {
            log::warn!("rewrite failed, reusing unmodified query: {}", e);
            state.accept_rewrite(state.query.clone());
        }
    }
}
