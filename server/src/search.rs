use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;

/// Optional web-search enrichment for the user prompt.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Option<String>>;
}

#[derive(Serialize, Debug)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct SearchResponse {
    pub answer: Option<serde_json::Value>,
    pub results: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct SearchHit {
    title: Option<String>,
    url: Option<String>,
    content: Option<String>,
}

impl SearchResponse {
    /// Answer first, then numbered snippets; `None` when nothing usable came back.
    pub fn enrichment(&self, max_results: usize) -> Option<String> {
        let answer = self
            .answer
            .as_ref()
            .and_then(|a| a.as_str())
            .unwrap_or_default()
            .to_string();

        let hits: Vec<SearchHit> = self
            .results
            .as_ref()
            .and_then(|r| r.as_array())
            .map(|items| {
                items
                    .iter()
                    .map(|item| serde_json::from_value(item.clone()).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        let snippets = hits
            .iter()
            .take(max_results)
            .enumerate()
            .map(|(i, hit)| {
                format!(
                    "[{}] {} - {}\n{}",
                    i + 1,
                    hit.title.as_deref().unwrap_or_default(),
                    hit.url.as_deref().unwrap_or_default(),
                    hit.content.as_deref().unwrap_or_default(),
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let combined = [answer, snippets]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        if combined.is_empty() {
            None
        } else {
            Some(combined)
        }
    }
}

pub struct TavilyClient {
    client: Client,
    endpoint: String,
    api_key: String,
    max_results: usize,
}

impl TavilyClient {
    pub fn new(config: &SearchConfig, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_string(),
            max_results: config.max_results,
        }
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, query: &str) -> Result<Option<String>> {
        let request = SearchRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
            include_answer: true,
        };

        let res = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .context("Failed to send search request")?;

        if !res.status().is_success() {
            bail!("Search provider returned status {}", res.status());
        }

        let payload: SearchResponse = res
            .json()
            .await
            .context("Failed to decode search response")?;
        Ok(payload.enrichment(self.max_results))
    }
}
