// SPDX-License-Identifier: MIT

//! Grading node: per-chunk binary relevance, then route

use super::GradeRouting;
use crate::capability::{with_timeout, Capabilities};
use crate::workflow::engine::EngineOptions;
use crate::workflow::state::{Verdict, WorkflowState};

/// Grade every chunk and pick the next step.
///
/// One grading call per chunk; a failed call marks that chunk irrelevant
/// (conservative) and the node continues. Routing: any relevant chunk means
/// answer; none relevant means rewrite, unless the rewrite budget is spent,
/// in which case answer anyway with whatever exists so the run terminates.
pub async fn run(
    caps: &Capabilities,
    options: &EngineOptions,
    state: &mut WorkflowState,
) -> GradeRouting {
    let query = state.query.clone();

    for chunk in state.chunks_mut() {
        let graded = with_timeout(
            "grading",
            options.capability_timeout,
            caps.grader.grade(&query, &chunk.text),
        )
        .await;

        chunk.verdict = match graded {
            Ok(true) => Verdict::Relevant,
            Ok(false) => Verdict::Irrelevant,
            Err(e) => {
                log::warn!(
                    "grading failed for chunk {}:{}, treating as irrelevant: {}",
                    chunk.source,
                    chunk.index,
                    e
                );
                Verdict::Irrelevant
            }
        };
    }

    let relevant = state.relevant_chunks().len();
    log::info!("graded {} chunks, {} relevant", state.chunks().len(), relevant);

    if relevant > 0 {
        GradeRouting::GenerateAnswer
    } else if state.rewrite_count() >= options.max_rewrites {
        log::info!(
            "no relevant chunks and rewrite budget ({}) spent, answering with best effort",
            options.max_rewrites
        );
        GradeRouting::GenerateAnswer
    } else {
        GradeRouting::RewriteQuestion
    }
}
