// SPDX-License-Identifier: MIT

//! HTTP adapter for the external retrieval service
//!
//! The index, embeddings, and similarity search live in the retrieval
//! collaborator; this client only sends the query and maps the ranked
//! results into context chunks.

use super::Retriever;
use crate::config::RetrievalConfig;
use crate::error::{CapabilityError, MixragError};
use crate::workflow::state::ContextChunk;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Debug, Deserialize)]
struct RetrievedItem {
    text: String,
    source: String,
    #[serde(default)]
    index: u32,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    results: Vec<RetrievedItem>,
}

pub struct HttpRetriever {
    client: Client,
    endpoint: String,
}

impl HttpRetriever {
    pub fn new(config: &RetrievalConfig) -> Result<Self, MixragError> {
        url::Url::parse(&config.endpoint).map_err(|e| {
            MixragError::config(format!(
                "invalid retrieval endpoint '{}': {}",
                config.endpoint, e
            ))
        })?;

        Ok(Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
        })
    }

    /// Map service results into chunks, keeping at most `k`
    fn to_chunks(items: Vec<RetrievedItem>, k: usize) -> Vec<ContextChunk> {
        if items.len() > k {
            log::info!("retrieval returned {} results, keeping top {}", items.len(), k);
        }
        items
            .into_iter()
            .take(k)
            .map(|item| ContextChunk::new(item.text, item.source, item.index))
            .collect()
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ContextChunk>, CapabilityError> {
        log::info!("retrieving top {} chunks for query: {:.100}", k, query);

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&RetrieveRequest { query, k })
            .send()
            .await
            .map_err(|e| CapabilityError::unavailable("retrieval", e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CapabilityError::unavailable(
                "retrieval",
                format!("service error ({status}): {text}"),
            ));
        }

        let parsed: RetrieveResponse = resp
            .json()
            .await
            .map_err(|e| CapabilityError::malformed("retrieval", e.to_string()))?;

        Ok(Self::to_chunks(parsed.results, k))
    }
}
