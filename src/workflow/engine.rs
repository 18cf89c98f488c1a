// SPDX-License-Identifier: MIT

//! Orchestrator: executes the node sequence per the closed transition table
//!
//! The graph is compiled into a `Step` state machine rather than looked up
//! through string-keyed edges, so there is no such thing as an unknown edge
//! at runtime. Transitions:
//!
//! | from                      | condition                         | to        |
//! |---------------------------|-----------------------------------|-----------|
//! | generate_query_or_respond | direct answer                     | terminal  |
//! | generate_query_or_respond | needs retrieval                   | retrieve  |
//! | retrieve_documents        | always                            | grade     |
//! | grade_documents           | relevant found or budget spent    | answer    |
//! | grade_documents           | none relevant, budget remaining   | rewrite   |
//! | rewrite_question          | always                            | retrieve  |
//! | generate_answer           | success                           | terminal  |
//! | any                       | unrecoverable capability error    | fallback  |

use crate::capability::Capabilities;
use crate::config::AppConfig;
use crate::error::{CapabilityError, MixragError};
use crate::workflow::fallback;
use crate::workflow::metrics::{AnalyticsSink, LogSink, NodeTiming, RunMetrics};
use crate::workflow::nodes::{self, GradeRouting, QueryRouting};
use crate::workflow::state::{RunResult, Turn, WorkflowState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Hard ceiling on node executions per run; the rewrite bound terminates
/// runs long before this, it only guards against routing bugs
const MAX_STEPS: u32 = 64;

/// Events delivered to a streaming caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    /// One incremental piece of the answer text
    Fragment(String),
    /// The run finished; carries the canonical result
    Completed(RunResult),
    /// The run failed with no answer
    Error(String),
}

/// Tunable bounds for the engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub max_rewrites: u32,
    pub top_k: usize,
    pub capability_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_rewrites: 2,
            top_k: 5,
            capability_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_rewrites: config.workflow.max_rewrites,
            top_k: config.retrieval.top_k,
            capability_timeout: config.workflow.capability_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    QueryOrRespond,
    Retrieve,
    Grade,
    Rewrite,
    Answer,
}

impl Step {
    fn name(self) -> &'static str {
        match self {
            Step::QueryOrRespond => "generate_query_or_respond",
            Step::Retrieve => "retrieve_documents",
            Step::Grade => "grade_documents",
            Step::Rewrite => "rewrite_question",
            Step::Answer => "generate_answer",
        }
    }
}

/// The workflow engine; one instance serves any number of concurrent runs
pub struct WorkflowEngine {
    caps: Capabilities,
    options: EngineOptions,
    analytics: Arc<dyn AnalyticsSink>,
}

impl WorkflowEngine {
    pub fn new(caps: Capabilities, options: EngineOptions) -> Self {
        Self {
            caps,
            options,
            analytics: Arc::new(LogSink),
        }
    }

    pub fn with_analytics(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = sink;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run one query to a terminal answer.
    ///
    /// `history` is the caller-owned conversation; the engine reads it and
    /// never stores it. Appending the new user/assistant turns after a
    /// successful run is the caller's job.
    pub async fn run_query(
        &self,
        history: &[Turn],
        query: &str,
    ) -> Result<RunResult, MixragError> {
        self.run(history, query, None).await
    }

    /// Like [run_query], delivering the answer incrementally through `tx`.
    ///
    /// The terminal outcome is also sent as a [RunEvent::Completed] or
    /// [RunEvent::Error]; dropping the receiver cancels the run.
    ///
    /// [run_query]: WorkflowEngine::run_query
    pub async fn run_query_stream(
        &self,
        history: &[Turn],
        query: &str,
        tx: mpsc::Sender<RunEvent>,
    ) -> Result<RunResult, MixragError> {
        let result = self.run(history, query, Some(&tx)).await;

        match &result {
            Ok(run_result) => {
                let _ = tx.send(RunEvent::Completed(run_result.clone())).await;
            }
            Err(MixragError::Canceled) => {}
            Err(e) => {
                let _ = tx.send(RunEvent::Error(e.to_string())).await;
            }
        }

        result
    }

    async fn run(
        &self,
        history: &[Turn],
        query: &str,
        events: Option<&mpsc::Sender<RunEvent>>,
    ) -> Result<RunResult, MixragError> {
        let started_at = chrono::Utc::now();
        let run_timer = Instant::now();

        let mut state = WorkflowState::new(history, query);
        let mut timings: Vec<NodeTiming> = Vec::new();
        let mut step = Step::QueryOrRespond;
        let mut steps_taken = 0u32;

        let failure = loop {
            steps_taken += 1;
            if steps_taken > MAX_STEPS {
                log::error!("workflow exceeded {} steps, abandoning adaptive path", MAX_STEPS);
                break Some(CapabilityError::unavailable(
                    "workflow",
                    format!("step limit of {} exceeded", MAX_STEPS),
                ));
            }

            let name = step.name();
            log::info!("executing node: {}", name);
            let timer = Instant::now();

            let outcome: Result<Option<Step>, CapabilityError> = match step {
                Step::QueryOrRespond => Ok(
                    match nodes::query_or_respond::run(&self.caps, &self.options, &mut state)
                        .await
                    {
                        QueryRouting::RespondDirectly => None,
                        QueryRouting::Retrieve => Some(Step::Retrieve),
                    },
                ),
                Step::Retrieve => nodes::retrieve::run(&self.caps, &self.options, &mut state)
                    .await
                    .map(|_| Some(Step::Grade)),
                Step::Grade => Ok(Some(
                    match nodes::grade::run(&self.caps, &self.options, &mut state).await {
                        GradeRouting::GenerateAnswer => Step::Answer,
                        GradeRouting::RewriteQuestion => Step::Rewrite,
                    },
                )),
                Step::Rewrite => {
                    nodes::rewrite::run(&self.caps, &self.options, &mut state).await;
                    Ok(Some(Step::Retrieve))
                }
                Step::Answer => nodes::answer::run(&self.caps, &self.options, &mut state, events)
                    .await
                    .map(|_| None),
            };

            timings.push(NodeTiming {
                node: name,
                millis: timer.elapsed().as_millis(),
            });

            match outcome {
                Ok(Some(next)) => step = next,
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };

        if let Some(error) = failure {
            if error.is_canceled() {
                log::info!("run canceled during streaming, discarding state");
                return Err(MixragError::Canceled);
            }

            log::warn!("adaptive path failed ({}), degrading to fallback pipeline", error);
            state.mark_fallback();

            let timer = Instant::now();
            let fallback_answer =
                fallback::run(&self.caps, &self.options, &mut state, events).await;
            timings.push(NodeTiming {
                node: "fallback",
                millis: timer.elapsed().as_millis(),
            });

            match fallback_answer {
                Ok(answer) => state.finish(answer),
                Err(MixragError::Canceled) => return Err(MixragError::Canceled),
                Err(e) => {
                    self.emit_metrics(started_at, &run_timer, &timings, &state);
                    return Err(e);
                }
            }
        }

        self.emit_metrics(started_at, &run_timer, &timings, &state);

        state
            .into_result()
            .ok_or_else(|| MixragError::other("run ended without a terminal answer"))
    }

    fn emit_metrics(
        &self,
        started_at: chrono::DateTime<chrono::Utc>,
        run_timer: &Instant,
        timings: &[NodeTiming],
        state: &WorkflowState,
    ) {
        let metrics = RunMetrics {
            started_at,
            total_millis: run_timer.elapsed().as_millis(),
            nodes: timings.to_vec(),
            rewrite_count: state.rewrite_count(),
            used_fallback: state.used_fallback(),
            retrieved_chunks: state.chunks().len(),
            relevant_chunks: state.relevant_chunks().len(),
        };
        self.analytics.record(&metrics);
    }
}
