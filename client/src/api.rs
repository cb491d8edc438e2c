use bytes::Bytes;
use esg_shared::{ChatRequest, MODEL_HEADER};
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ClientError;
use crate::session::StreamEvent;
use crate::sse::{SseDecoder, SseFrame};

pub struct ChatClient {
    client: Client,
    endpoint: String,
}

impl ChatClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Sends one question and forwards the answer as [`StreamEvent`]s.
    ///
    /// Always ends with exactly one `Finished` or `Failed` event.
    pub async fn ask(&self, request: &ChatRequest, tx: mpsc::UnboundedSender<StreamEvent>) {
        let outcome = self.exchange(request, &tx).await;
        let last = match outcome {
            Ok(()) => StreamEvent::Finished,
            Err(e) => StreamEvent::Failed(e),
        };
        let _ = tx.send(last);
    }

    async fn exchange(
        &self,
        request: &ChatRequest,
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<(), ClientError> {
        let res = self.client.post(&self.endpoint).json(request).send().await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!("API Error from {}: {}", self.endpoint, body);
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        if let Some(model) = res.headers().get(MODEL_HEADER).and_then(|v| v.to_str().ok()) {
            let _ = tx.send(StreamEvent::Model(model.to_string()));
        }

        let is_stream = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));

        if is_stream {
            return consume_stream(res.bytes_stream(), |text| {
                let _ = tx.send(StreamEvent::Delta(text));
            })
            .await;
        }

        let data: Value = res.json().await?;
        let answer = json_answer(&data)?;
        let _ = tx.send(StreamEvent::Delta(answer));
        Ok(())
    }
}

/// Reads an SSE body to its end or `[DONE]`, handing each text delta to
/// `on_delta` in arrival order.
pub async fn consume_stream<S, E>(
    body: S,
    mut on_delta: impl FnMut(String),
) -> Result<(), ClientError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut decoder = SseDecoder::new();
    let mut received = false;
    let mut body = std::pin::pin!(body);

    let mut handle = |frames: Vec<SseFrame>, received: &mut bool| {
        for frame in frames {
            if let SseFrame::Delta(text) = frame {
                *received = true;
                on_delta(text);
            }
        }
    };

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ClientError::Stream(e.to_string()))?;
        handle(decoder.push(&chunk), &mut received);
        if decoder.is_done() {
            break;
        }
    }
    handle(decoder.finish(), &mut received);

    if !received {
        return Err(ClientError::EmptyResponse);
    }
    Ok(())
}

/// Answer text of a non-streamed JSON reply.
fn json_answer(data: &Value) -> Result<String, ClientError> {
    if let Some(error) = data.get("error") {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("API returned an error")
                .to_string(),
        };
        return Err(ClientError::Upstream(message));
    }

    let answer = ["answer", "content", "message"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .or_else(|| data.pointer("/choices/0/message/content").and_then(Value::as_str))
        .unwrap_or_default();

    if answer.trim().is_empty() {
        return Err(ClientError::EmptyResponse);
    }
    Ok(answer.to_string())
}
