// SPDX-License-Identifier: MIT

//! Workflow state threaded through the decision graph
//!
//! One [WorkflowState] exists per run. The node currently executing is the
//! only mutator; everything except the conversation history dies with the
//! run. The mutators encode the state invariants: retrieval replaces chunks
//! wholesale, the rewrite counter only grows, and a terminal answer latches.

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Relevance verdict assigned to a chunk by grading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    #[default]
    Unset,
    Relevant,
    Irrelevant,
}

/// A retrieved span of source text, owned by the run
#[derive(Debug, Clone)]
pub struct ContextChunk {
    pub text: String,
    /// Source document identifier
    pub source: String,
    /// Sequence index within the source document
    pub index: u32,
    pub verdict: Verdict,
}

impl ContextChunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>, index: u32) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            index,
            verdict: Verdict::Unset,
        }
    }

    pub fn is_relevant(&self) -> bool {
        self.verdict == Verdict::Relevant
    }
}

/// Terminal answer with the source identifiers that contributed to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<String>,
}

/// What a completed run hands back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub answer: String,
    pub citations: Vec<String>,
    pub used_fallback: bool,
    pub rewrite_count: u32,
}

/// Mutable record threaded through the graph for one run
#[derive(Debug)]
pub struct WorkflowState {
    /// Prior turns of the session; the current question is in `query`
    pub conversation: Vec<Turn>,
    /// Question under consideration; replaced by rewriting
    pub query: String,
    chunks: Vec<ContextChunk>,
    rewrite_count: u32,
    used_fallback: bool,
    terminal: Option<Answer>,
}

impl WorkflowState {
    pub fn new(history: &[Turn], query: impl Into<String>) -> Self {
        Self {
            conversation: history.to_vec(),
            query: query.into(),
            chunks: Vec::new(),
            rewrite_count: 0,
            used_fallback: false,
            terminal: None,
        }
    }

    pub fn chunks(&self) -> &[ContextChunk] {
        &self.chunks
    }

    pub fn chunks_mut(&mut self) -> &mut [ContextChunk] {
        &mut self.chunks
    }

    /// Replace the retrieved chunks wholesale; no cross-retrieval accumulation
    pub fn set_chunks(&mut self, chunks: Vec<ContextChunk>) {
        self.chunks = chunks;
    }

    /// Relevant chunks in original retrieval order
    pub fn relevant_chunks(&self) -> Vec<&ContextChunk> {
        self.chunks.iter().filter(|c| c.is_relevant()).collect()
    }

    pub fn has_relevant(&self) -> bool {
        self.chunks.iter().any(|c| c.is_relevant())
    }

    pub fn rewrite_count(&self) -> u32 {
        self.rewrite_count
    }

    /// Install a rewritten query and consume one rewrite cycle.
    ///
    /// Called even when the rewrite capability failed and the query is
    /// reused unmodified, so the loop bound always makes progress.
    pub fn accept_rewrite(&mut self, query: String) {
        self.query = query;
        self.rewrite_count += 1;
    }

    /// Record that the fallback pipeline was invoked; never reset mid-run
    pub fn mark_fallback(&mut self) {
        self.used_fallback = true;
    }

    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    /// Latch the terminal answer; a second call is ignored
    pub fn finish(&mut self, answer: Answer) {
        if self.terminal.is_none() {
            self.terminal = Some(answer);
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn terminal(&self) -> Option<&Answer> {
        self.terminal.as_ref()
    }

    /// Consume the state into the caller-facing result, if terminal
    pub fn into_result(self) -> Option<RunResult> {
        let rewrite_count = self.rewrite_count;
        let used_fallback = self.used_fallback;
        self.terminal.map(|answer| RunResult {
            answer: answer.text,
            citations: answer.citations,
            used_fallback,
            rewrite_count,
        })
    }
}

/// Deduplicated source identifiers of `chunks`, in retrieval order
pub fn citations(chunks: &[ContextChunk]) -> Vec<String> {
    let mut seen = Vec::new();
    for chunk in chunks {
        if !seen.contains(&chunk.source) {
            seen.push(chunk.source.clone());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, index: u32) -> ContextChunk {
        ContextChunk::new(format!("text {index}"), source, index)
    }

    #[test]
    fn test_new_state_is_clean() {
        let history = vec![Turn::user("hi"), Turn::assistant("hello")];
        let state = WorkflowState::new(&history, "what is the refund policy?");

        assert_eq!(state.conversation.len(), 2);
        assert_eq!(state.query, "what is the refund policy?");
        assert!(state.chunks().is_empty());
        assert_eq!(state.rewrite_count(), 0);
        assert!(!state.used_fallback());
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_set_chunks_replaces() {
        let mut state = WorkflowState::new(&[], "q");

        state.set_chunks(vec![chunk("a.pdf", 0), chunk("a.pdf", 1)]);
        assert_eq!(state.chunks().len(), 2);

        state.set_chunks(vec![chunk("b.pdf", 0)]);
        assert_eq!(state.chunks().len(), 1);
        assert_eq!(state.chunks()[0].source, "b.pdf");
    }

    #[test]
    fn test_relevant_chunks_preserve_order() {
        let mut state = WorkflowState::new(&[], "q");
        state.set_chunks(vec![chunk("a.pdf", 0), chunk("b.pdf", 0), chunk("c.pdf", 0)]);

        state.chunks_mut()[0].verdict = Verdict::Irrelevant;
        state.chunks_mut()[1].verdict = Verdict::Relevant;
        state.chunks_mut()[2].verdict = Verdict::Relevant;

        let relevant = state.relevant_chunks();
        assert_eq!(relevant.len(), 2);
        assert_eq!(relevant[0].source, "b.pdf");
        assert_eq!(relevant[1].source, "c.pdf");
        assert!(state.has_relevant());
    }

    #[test]
    fn test_unset_verdict_is_not_relevant() {
        let mut state = WorkflowState::new(&[], "q");
        state.set_chunks(vec![chunk("a.pdf", 0)]);

        assert!(!state.has_relevant());
        assert!(state.relevant_chunks().is_empty());
    }

    #[test]
    fn test_accept_rewrite_counts() {
        let mut state = WorkflowState::new(&[], "original");

        state.accept_rewrite("better question".to_string());
        assert_eq!(state.query, "better question");
        assert_eq!(state.rewrite_count(), 1);

        // Reusing the unmodified query still consumes a cycle
        state.accept_rewrite(state.query.clone());
        assert_eq!(state.rewrite_count(), 2);
    }

    #[test]
    fn test_terminal_latches() {
        let mut state = WorkflowState::new(&[], "q");

        state.finish(Answer {
            text: "first".to_string(),
            citations: vec![],
        });
        state.finish(Answer {
            text: "second".to_string(),
            citations: vec![],
        });

        assert_eq!(state.terminal().unwrap().text, "first");
    }

    #[test]
    fn test_into_result() {
        let mut state = WorkflowState::new(&[], "q");
        state.accept_rewrite("q2".to_string());
        state.mark_fallback();
        state.finish(Answer {
            text: "done".to_string(),
            citations: vec!["a.pdf".to_string()],
        });

        let result = state.into_result().unwrap();
        assert_eq!(result.answer, "done");
        assert_eq!(result.citations, vec!["a.pdf"]);
        assert!(result.used_fallback);
        assert_eq!(result.rewrite_count, 1);
    }

    #[test]
    fn test_into_result_requires_terminal() {
        let state = WorkflowState::new(&[], "q");
        assert!(state.into_result().is_none());
    }

    #[test]
    fn test_citations_dedup_in_order() {
        let chunks = vec![
            chunk("guide.pdf", 0),
            chunk("faq.md", 3),
            chunk("guide.pdf", 1),
        ];

        assert_eq!(citations(&chunks), vec!["guide.pdf", "faq.md"]);
        assert!(citations(&[]).is_empty());
    }
}
