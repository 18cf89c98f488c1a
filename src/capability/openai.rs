// SPDX-License-Identifier: MIT

//! OpenAI-compatible chat-completions adapter
//!
//! Implements the generation, grading, and rewrite capabilities against one
//! endpoint. Prompts for the three duties live here; the workflow nodes
//! only see the trait contracts.

use super::{Generator, Grader, Rewriter, RouteSignal};
use crate::config::ModelConfig;
use crate::error::{CapabilityError, MixragError};
use crate::workflow::state::{ContextChunk, Role, Turn};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use tokio::sync::mpsc;

/// Sentinel the routing prompt asks the model to emit when the question
/// needs the knowledge base.
const RETRIEVE_SIGNAL: &str = "RETRIEVE";

const ROUTE_INSTRUCTIONS: &str = "You decide whether a user question needs the document knowledge base. \
If the question can be answered from the conversation alone - a greeting, small talk, \
or something already covered in earlier turns - reply with that answer directly. \
Otherwise reply with the single word RETRIEVE and nothing else.";

const ANSWER_INSTRUCTIONS: &str = "You are an assistant for question-answering tasks. \
Use the retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.";

const GRADE_INSTRUCTIONS: &str = "You are a grader assessing the relevance of a retrieved document to a user question. \
If the document contains keywords or semantic meaning related to the question, grade it as relevant. \
Reply with a JSON object {\"binary_score\": \"yes\"} or {\"binary_score\": \"no\"}.";

const REWRITE_INSTRUCTIONS: &str = "Look at the question and try to reason about the underlying semantic intent. \
Formulate an improved question that will retrieve better documents. \
Reply with the improved question only.";

/// OpenAI chat-completions client
///
/// Requires `OPENAI_API_KEY` in the environment; the base URL comes from
/// configuration so OpenAI-compatible endpoints work unchanged.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    response_model: String,
    grading_model: String,
    rewrite_model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(config: &ModelConfig) -> Result<Self, MixragError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| MixragError::config("OPENAI_API_KEY must be set"))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            response_model: config.response_model.clone(),
            grading_model: config.grading_model().to_string(),
            rewrite_model: config.rewrite_model().to_string(),
            temperature: config.temperature,
        })
    }

    /// Convert conversation turns to chat messages
    fn turn_messages(conversation: &[Turn]) -> Vec<Value> {
        conversation
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({ "role": role, "content": turn.text })
            })
            .collect()
    }

    /// Render chunks into the context block of the answer prompt
    fn format_context(chunks: &[ContextChunk]) -> String {
        if chunks.is_empty() {
            return "(no relevant context was found)".to_string();
        }
        chunks
            .iter()
            .map(|c| format!("[{}] {}", c.source, c.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Parse a routing reply into a signal
    fn parse_route(text: &str) -> Result<RouteSignal, CapabilityError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CapabilityError::malformed("generation", "empty routing response"));
        }

        let token = trimmed.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        if token.eq_ignore_ascii_case(RETRIEVE_SIGNAL) {
            Ok(RouteSignal::NeedsRetrieval)
        } else {
            Ok(RouteSignal::Direct(trimmed.to_string()))
        }
    }

    /// Parse a grading reply: a `binary_score` JSON object or a bare yes/no
    fn parse_binary_score(text: &str) -> Result<bool, CapabilityError> {
        let trimmed = text.trim();

        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            let score = value
                .get("binary_score")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    CapabilityError::malformed("grading", format!("missing binary_score in: {trimmed}"))
                })?;
            return match score.to_ascii_lowercase().as_str() {
                "yes" => Ok(true),
                "no" => Ok(false),
                other => Err(CapabilityError::malformed(
                    "grading",
                    format!("binary_score must be yes or no, got: {other}"),
                )),
            };
        }

        let token = trimmed
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_lowercase();
        match token.as_str() {
            "yes" => Ok(true),
            "no" => Ok(false),
            _ => Err(CapabilityError::malformed(
                "grading",
                format!("expected yes/no, got: {trimmed}"),
            )),
        }
    }

    /// Extract the delta fragment from one SSE data payload
    fn parse_stream_chunk(data: &str) -> Result<Option<String>, CapabilityError> {
        let value: Value = serde_json::from_str(data).map_err(|e| {
            CapabilityError::malformed("generation", format!("bad stream chunk: {e}"))
        })?;

        Ok(value["choices"][0]["delta"]["content"]
            .as_str()
            .map(str::to_string))
    }

    fn answer_messages(
        conversation: &[Turn],
        query: &str,
        chunks: &[ContextChunk],
    ) -> Vec<Value> {
        let mut messages = vec![json!({ "role": "system", "content": ANSWER_INSTRUCTIONS })];
        messages.extend(Self::turn_messages(conversation));
        messages.push(json!({
            "role": "user",
            "content": format!(
                "Question: {}\n\nContext:\n{}",
                query,
                Self::format_context(chunks)
            )
        }));
        messages
    }

    fn request_body(&self, model: &str, messages: &[Value], stream: bool) -> Value {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(
        &self,
        capability: &str,
        body: &Value,
    ) -> Result<reqwest::Response, CapabilityError> {
        let url = format!("{}/chat/completions", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| CapabilityError::unavailable(capability, e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CapabilityError::unavailable(
                capability,
                format!("API error ({status}): {text}"),
            ));
        }

        Ok(resp)
    }

    /// One non-streaming chat completion, returning the message content
    async fn chat(
        &self,
        capability: &str,
        model: &str,
        messages: &[Value],
    ) -> Result<String, CapabilityError> {
        let body = self.request_body(model, messages, false);
        log::debug!("{} request: {}", capability, body);

        let resp = self.send(capability, &body).await?;
        let resp_json: Value = resp
            .json()
            .await
            .map_err(|e| CapabilityError::malformed(capability, e.to_string()))?;

        resp_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                CapabilityError::malformed(capability, "no message content in response")
            })
    }
}

#[async_trait]
impl Generator for OpenAiClient {
    async fn decide(
        &self,
        conversation: &[Turn],
        query: &str,
    ) -> Result<RouteSignal, CapabilityError> {
        let mut messages = vec![json!({ "role": "system", "content": ROUTE_INSTRUCTIONS })];
        messages.extend(Self::turn_messages(conversation));
        messages.push(json!({ "role": "user", "content": query }));

        let reply = self.chat("generation", &self.response_model, &messages).await?;
        Self::parse_route(&reply)
    }

    async fn generate(
        &self,
        conversation: &[Turn],
        query: &str,
        chunks: &[ContextChunk],
    ) -> Result<String, CapabilityError> {
        let messages = Self::answer_messages(conversation, query, chunks);
        let answer = self.chat("generation", &self.response_model, &messages).await?;
        Ok(answer.trim().to_string())
    }

    async fn generate_stream(
        &self,
        conversation: &[Turn],
        query: &str,
        chunks: &[ContextChunk],
        tx: mpsc::Sender<String>,
    ) -> Result<String, CapabilityError> {
        let messages = Self::answer_messages(conversation, query, chunks);
        let body = self.request_body(&self.response_model, &messages, true);

        let resp = self.send("generation", &body).await?;
        let mut stream = resp.bytes_stream();

        let mut buffer = String::new();
        let mut answer = String::new();

        while let Some(part) = stream.next().await {
            let bytes = part.map_err(|e| {
                CapabilityError::unavailable("generation", format!("stream error: {e}"))
            })?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // SSE frames are newline-delimited; a network read may split one
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end_matches('\r').to_string();
                buffer.drain(..=pos);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim_start();
                if data == "[DONE]" {
                    return Ok(answer.trim().to_string());
                }

                if let Some(fragment) = Self::parse_stream_chunk(data)? {
                    answer.push_str(&fragment);
                    if !fragment.is_empty() && tx.send(fragment).await.is_err() {
                        // Consumer is gone; stop pulling from the API
                        return Err(CapabilityError::Canceled);
                    }
                }
            }
        }

        Ok(answer.trim().to_string())
    }
}

#[async_trait]
impl Grader for OpenAiClient {
    async fn grade(&self, query: &str, chunk: &str) -> Result<bool, CapabilityError> {
        let messages = vec![
            json!({ "role": "system", "content": GRADE_INSTRUCTIONS }),
            json!({
                "role": "user",
                "content": format!("Retrieved document:\n{chunk}\n\nUser question: {query}")
            }),
        ];

        let reply = self.chat("grading", &self.grading_model, &messages).await?;
        Self::parse_binary_score(&reply)
    }
}

#[async_trait]
impl Rewriter for OpenAiClient {
    async fn rewrite(&self, conversation: &[Turn], query: &str) -> Result<String, CapabilityError> {
        let mut messages = vec![json!({ "role": "system", "content": REWRITE_INSTRUCTIONS })];
        messages.extend(Self::turn_messages(conversation));
        messages.push(json!({
            "role": "user",
            "content": format!("Here is the initial question:\n{query}")
        }));

        let reply = self.chat("rewrite", &self.rewrite_model, &messages).await?;
        let improved = reply.trim().trim_matches('"').trim();
        if improved.is_empty() {
            return Err(CapabilityError::malformed("rewrite", "empty rewritten question"));
        }
        Ok(improved.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_messages_roles() {
        let conversation = vec![Turn::user("hi"), Turn::assistant("hello")];

        let messages = OpenAiClient::turn_messages(&conversation);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "hi");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[test]
    fn test_parse_route_retrieve() {
        assert_eq!(
            OpenAiClient::parse_route("RETRIEVE").unwrap(),
            RouteSignal::NeedsRetrieval
        );
        assert_eq!(
            OpenAiClient::parse_route("  retrieve.\n").unwrap(),
            RouteSignal::NeedsRetrieval
        );
        assert_eq!(
            OpenAiClient::parse_route("\"RETRIEVE\"").unwrap(),
            RouteSignal::NeedsRetrieval
        );
    }

    #[test]
    fn test_parse_route_direct_answer() {
        match OpenAiClient::parse_route("Hello! How can I help you today?").unwrap() {
            RouteSignal::Direct(text) => assert!(text.starts_with("Hello!")),
            other => panic!("Expected direct answer, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_route_rejects_empty() {
        assert!(OpenAiClient::parse_route("   \n").is_err());
    }

    #[test]
    fn test_parse_binary_score_json() {
        assert!(OpenAiClient::parse_binary_score(r#"{"binary_score": "yes"}"#).unwrap());
        assert!(!OpenAiClient::parse_binary_score(r#"{"binary_score": "no"}"#).unwrap());
        assert!(OpenAiClient::parse_binary_score(r#"{"binary_score": "maybe"}"#).is_err());
        assert!(OpenAiClient::parse_binary_score(r#"{"score": "yes"}"#).is_err());
    }

    #[test]
    fn test_parse_binary_score_bare_token() {
        assert!(OpenAiClient::parse_binary_score("yes").unwrap());
        assert!(OpenAiClient::parse_binary_score("Yes.").unwrap());
        assert!(!OpenAiClient::parse_binary_score("NO").unwrap());
        assert!(OpenAiClient::parse_binary_score("definitely").is_err());
    }

    #[test]
    fn test_format_context_labels_sources() {
        let chunks = vec![
            ContextChunk::new("Refunds within 30 days.", "policy.pdf", 0),
            ContextChunk::new("Contact support first.", "faq.md", 2),
        ];

        let context = OpenAiClient::format_context(&chunks);
        assert!(context.contains("[policy.pdf] Refunds within 30 days."));
        assert!(context.contains("[faq.md] Contact support first."));
    }

    #[test]
    fn test_format_context_empty() {
        assert_eq!(
            OpenAiClient::format_context(&[]),
            "(no relevant context was found)"
        );
    }

    #[test]
    fn test_parse_stream_chunk() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(
            OpenAiClient::parse_stream_chunk(data).unwrap(),
            Some("Hel".to_string())
        );

        // Role-only delta carries no content
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(OpenAiClient::parse_stream_chunk(data).unwrap(), None);

        assert!(OpenAiClient::parse_stream_chunk("not json").is_err());
    }

    #[test]
    fn test_answer_messages_shape() {
        let conversation = vec![Turn::user("earlier question"), Turn::assistant("earlier answer")];
        let chunks = vec![ContextChunk::new("chunk text", "doc.pdf", 0)];

        let messages = OpenAiClient::answer_messages(&conversation, "current question", &chunks);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        let last = messages.last().unwrap();
        let content = last["content"].as_str().unwrap();
        assert!(content.contains("Question: current question"));
        assert!(content.contains("[doc.pdf] chunk text"));
    }
}
