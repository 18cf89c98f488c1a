// SPDX-License-Identifier: MIT

//! Terminal node: produce the final answer with citations

use crate::capability::{with_timeout, Capabilities};
use crate::error::CapabilityError;
use crate::workflow::engine::{EngineOptions, RunEvent};
use crate::workflow::state::{citations, Answer, ContextChunk, Turn, WorkflowState};
use tokio::sync::mpsc;

/// Generate the answer from the relevant chunk subset and end the run.
///
/// When no chunk was graded relevant (the budget-exhausted path), whatever
/// chunks exist are passed as best-effort context. A generation failure is
/// not retried here; the orchestrator decides what happens next.
pub async fn run(
    caps: &Capabilities,
    options: &EngineOptions,
    state: &mut WorkflowState,
    events: Option<&mpsc::Sender<RunEvent>>,
) -> Result<(), CapabilityError> {
    let context: Vec<ContextChunk> = if state.has_relevant() {
        state.relevant_chunks().into_iter().cloned().collect()
    } else {
        state.chunks().to_vec()
    };

    let text = match events {
        Some(tx) => {
            stream_generation(caps, options, &state.conversation, &state.query, &context, tx)
                .await?
        }
        None => {
            with_timeout(
                "generation",
                options.capability_timeout,
                caps.generator.generate(&state.conversation, &state.query, &context),
            )
            .await?
        }
    };

    state.finish(Answer {
        text,
        citations: citations(&context),
    });
    Ok(())
}

/// Run a streaming generation call, forwarding fragments to the caller.
///
/// Fragments that are empty after trimming are not forwarded. If the caller
/// stops listening the generator sees its channel close, stops consuming
/// the capability, and this returns `Canceled`.
pub(crate) async fn stream_generation(
    caps: &Capabilities,
    options: &EngineOptions,
    conversation: &[Turn],
    query: &str,
    chunks: &[ContextChunk],
    events: &mpsc::Sender<RunEvent>,
) -> Result<String, CapabilityError> {
    let (tx, mut rx) = mpsc::channel::<String>(16);

    let events = events.clone();
    let forward = tokio::spawn(async move {
        while let Some(fragment) = rx.recv().await {
            if fragment.trim().is_empty() {
                continue;
            }
            if events.send(RunEvent::Fragment(fragment)).await.is_err() {
                // Dropping rx closes the generator's channel
                break;
            }
        }
    });

    let result = with_timeout(
        "generation",
        options.capability_timeout,
        caps.generator.generate_stream(conversation, query, chunks, tx),
    )
    .await;

    let _ = forward.await;
    result
}
