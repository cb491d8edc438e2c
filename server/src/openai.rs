use std::pin::Pin;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use esg_shared::Role;
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[derive(Serialize, Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// What one completion attempt produced.
pub enum CompletionOutcome {
    Streaming {
        status: StatusCode,
        content_type: Option<String>,
        body: ByteStream,
    },
    Failed {
        status: StatusCode,
        body: String,
    },
}

impl std::fmt::Debug for CompletionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionOutcome::Streaming {
                status,
                content_type,
                ..
            } => f
                .debug_struct("Streaming")
                .field("status", status)
                .field("content_type", content_type)
                .finish_non_exhaustive(),
            CompletionOutcome::Failed { status, body } => f
                .debug_struct("Failed")
                .field("status", status)
                .field("body", body)
                .finish(),
        }
    }
}

/// An upstream chat-completion service that can stream an answer.
///
/// Non-success HTTP statuses are reported as [`CompletionOutcome::Failed`];
/// `Err` is reserved for transport failures.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn stream_completion(&self, request: &ChatRequest) -> Result<CompletionOutcome>;
}

pub struct OAIClient {
    client: Client,
    endpoint: String,
    api_key: String,
    referer: String,
    title: String,
}

impl OAIClient {
    pub fn new(config: &CompletionConfig, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_string(),
            referer: config.referer.clone(),
            title: config.title.clone(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OAIClient {
    async fn stream_completion(&self, request: &ChatRequest) -> Result<CompletionOutcome> {
        let res = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(request)
            .send()
            .await
            .context("Failed to send request to completion provider")?;

        let status = StatusCode::from_u16(res.status().as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Ok(CompletionOutcome::Failed { status, body });
        }

        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = res
            .bytes_stream()
            .map(|item| item.map_err(anyhow::Error::from));

        Ok(CompletionOutcome::Streaming {
            status,
            content_type,
            body: Box::pin(body),
        })
    }
}
