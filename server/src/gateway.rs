use std::sync::Arc;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use esg_shared::{PageType, MODEL_HEADER};
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::{FailureClass, GatewayError};
use crate::openai::{ByteStream, ChatRequest, CompletionOutcome, CompletionProvider, Message};
use crate::prompt;
use crate::search::SearchProvider;

/// Normalised inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Inquiry {
    pub question: String,
    pub context_data: String,
    pub page: PageType,
}

impl Inquiry {
    /// Lenient decode: non-string fields are treated as absent.
    pub fn from_body(body: &[u8]) -> Result<Self, GatewayError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| GatewayError::BadRequest("Invalid JSON body in request.".to_string()))?;

        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };

        let inquiry = Inquiry {
            question: text("question"),
            context_data: text("contextData"),
            page: PageType::from_label(&text("pageType")),
        };

        if inquiry.question.is_empty() {
            return Err(GatewayError::BadRequest("Question is required.".to_string()));
        }
        Ok(inquiry)
    }
}

/// A successful upstream stream, passed through untouched.
pub struct RelayedStream {
    pub model: String,
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl IntoResponse for RelayedStream {
    fn into_response(self) -> Response {
        let content_type = self
            .content_type
            .unwrap_or_else(|| "text/event-stream".to_string());
        let built = Response::builder()
            .status(self.status)
            .header(CONTENT_TYPE, content_type)
            .header(MODEL_HEADER, self.model)
            .body(Body::from_stream(self.body));
        match built {
            Ok(response) => response,
            Err(e) => GatewayError::Internal(e.into()).into_response(),
        }
    }
}

pub struct Gateway {
    config: Arc<AppConfig>,
    completion: Arc<dyn CompletionProvider>,
    search: Option<Arc<dyn SearchProvider>>,
}

impl Gateway {
    pub fn new(
        config: Arc<AppConfig>,
        completion: Arc<dyn CompletionProvider>,
        search: Option<Arc<dyn SearchProvider>>,
    ) -> Self {
        Self {
            config,
            completion,
            search,
        }
    }

    pub async fn relay(&self, body: &[u8]) -> Result<RelayedStream, GatewayError> {
        if !self.config.has_completion_key() {
            return Err(GatewayError::Misconfigured(
                "Completion provider API key not configured on the server.".to_string(),
            ));
        }

        let inquiry = Inquiry::from_body(body)?;
        let enrichment = self.enrich(&inquiry.question).await;
        let messages = prompt::build_messages(
            inquiry.page,
            &inquiry.context_data,
            enrichment.as_deref(),
            &inquiry.question,
        );

        self.stream_with_fallback(messages).await
    }

    async fn enrich(&self, question: &str) -> Option<String> {
        let provider = self.search.as_ref()?;
        if self.config.search.api_key.is_none() {
            return None;
        }
        match provider.search(question).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Web search failed, continuing without it: {:#}", e);
                None
            }
        }
    }

    async fn stream_with_fallback(
        &self,
        messages: Vec<Message>,
    ) -> Result<RelayedStream, GatewayError> {
        let completion = &self.config.completion;
        let mut last_status = StatusCode::INTERNAL_SERVER_ERROR;
        let mut last_details = String::new();

        for candidate in &completion.models {
            let request = ChatRequest {
                model: candidate.id.clone(),
                messages: messages.clone(),
                temperature: completion.temperature,
                max_tokens: completion.max_tokens,
                stream: true,
            };

            let attempt = tokio::time::timeout(
                completion.candidate_timeout,
                self.completion.stream_completion(&request),
            )
            .await;

            let (status, details) = match attempt {
                Ok(Ok(CompletionOutcome::Streaming {
                    status,
                    content_type,
                    body,
                })) => {
                    tracing::info!("Using model: {}", candidate.id);
                    return Ok(RelayedStream {
                        model: candidate.id.clone(),
                        status,
                        content_type,
                        body,
                    });
                }
                Ok(Ok(CompletionOutcome::Failed { status, body })) => {
                    tracing::error!(
                        "Upstream error for {}: {} {}",
                        candidate.id,
                        status,
                        body
                    );
                    (status, body)
                }
                Ok(Err(e)) => return Err(GatewayError::Internal(e)),
                Err(_) => {
                    tracing::warn!(
                        "Model {} did not respond within {:?}",
                        candidate.id,
                        completion.candidate_timeout
                    );
                    (
                        StatusCode::GATEWAY_TIMEOUT,
                        format!("{} timed out", candidate.id),
                    )
                }
            };

            if FailureClass::of(status) == FailureClass::Fatal {
                return Err(GatewayError::UpstreamFatal {
                    model: candidate.id.clone(),
                    status,
                    details,
                });
            }
            last_status = status;
            last_details = details;
        }

        Err(GatewayError::UpstreamExhausted {
            status: last_status,
            details: last_details,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;

    use super::*;
    use crate::config::ModelCandidate;

    enum Scripted {
        Stream(&'static str),
        Fail(u16, &'static str),
        Hang,
        Broken,
    }

    struct FakeCompletion {
        script: Mutex<VecDeque<Scripted>>,
        calls: Mutex<Vec<ChatRequest>>,
    }

    impl FakeCompletion {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn models_called(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.model.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CompletionProvider for FakeCompletion {
        async fn stream_completion(&self, request: &ChatRequest) -> Result<CompletionOutcome> {
            self.calls.lock().unwrap().push(request.clone());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Stream(text)) => Ok(CompletionOutcome::Streaming {
                    status: StatusCode::OK,
                    content_type: Some("text/event-stream".to_string()),
                    body: Box::pin(futures::stream::iter(vec![Ok::<_, anyhow::Error>(Bytes::from(
                        text,
                    ))])),
                }),
                Some(Scripted::Fail(code, body)) => Ok(CompletionOutcome::Failed {
                    status: StatusCode::from_u16(code).unwrap(),
                    body: body.to_string(),
                }),
                Some(Scripted::Hang) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(anyhow!("unreachable"))
                }
                Some(Scripted::Broken) | None => Err(anyhow!("connection reset")),
            }
        }
    }

    struct FakeSearch {
        answer: Result<Option<String>, String>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl SearchProvider for FakeSearch {
        async fn search(&self, _query: &str) -> Result<Option<String>> {
            *self.calls.lock().unwrap() += 1;
            self.answer.clone().map_err(|e| anyhow!(e))
        }
    }

    fn config(with_key: bool, with_search_key: bool) -> Arc<AppConfig> {
        let mut config = AppConfig::default();
        config.completion.models = ModelCandidate::ordered(["first", "second", "third"]);
        config.completion.candidate_timeout = Duration::from_millis(50);
        if with_key {
            config.completion.api_key = Some("secret".to_string());
        }
        if with_search_key {
            config.search.api_key = Some("search".to_string());
        }
        Arc::new(config)
    }

    fn gateway(config: Arc<AppConfig>, fake: &Arc<FakeCompletion>) -> Gateway {
        Gateway::new(config, fake.clone(), None)
    }

    async fn collect(body: ByteStream) -> String {
        let chunks: Vec<Bytes> = body.map(|c| c.unwrap()).collect().await;
        chunks.iter().map(|c| String::from_utf8_lossy(c)).collect()
    }

    const QUESTION: &[u8] = br#"{"question":"What are Scope 1 emissions?"}"#;

    #[tokio::test]
    async fn missing_credential_never_reaches_upstream() {
        let fake = FakeCompletion::new(vec![Scripted::Stream("data: [DONE]\n\n")]);
        let err = gateway(config(false, false), &fake)
            .relay(QUESTION)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::Misconfigured(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(fake.models_called().is_empty());
    }

    #[tokio::test]
    async fn empty_or_missing_question_is_rejected() {
        let fake = FakeCompletion::new(vec![]);
        let gw = gateway(config(true, false), &fake);
        let bodies: [&[u8]; 3] = [b"{}", br#"{"question":"   "}"#, br#"{"question":7}"#];
        for body in bodies {
            match gw.relay(body).await {
                Err(GatewayError::BadRequest(msg)) => assert_eq!(msg, "Question is required."),
                other => panic!("unexpected {:?}", other.err()),
            }
        }
        match gw.relay(b"{not json").await {
            Err(GatewayError::BadRequest(msg)) => assert_eq!(msg, "Invalid JSON body in request."),
            other => panic!("unexpected {:?}", other.err()),
        }
        assert!(fake.models_called().is_empty());
    }

    #[tokio::test]
    async fn rate_limited_candidate_falls_through_to_next() {
        let fake = FakeCompletion::new(vec![
            Scripted::Fail(429, "slow down"),
            Scripted::Stream("data: {}\n\ndata: [DONE]\n\n"),
        ]);
        let relayed = gateway(config(true, false), &fake)
            .relay(QUESTION)
            .await
            .unwrap();
        assert_eq!(relayed.model, "second");
        assert_eq!(fake.models_called(), vec!["first", "second"]);
        assert_eq!(collect(relayed.body).await, "data: {}\n\ndata: [DONE]\n\n");

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls[0].messages, calls[1].messages);
        assert_eq!(
            calls[0].messages[1].content,
            "User question: What are Scope 1 emissions?"
        );
        assert!(calls[0].stream);
    }

    #[tokio::test]
    async fn malformed_request_stops_the_chain() {
        let fake = FakeCompletion::new(vec![
            Scripted::Fail(400, "bad payload"),
            Scripted::Stream("data: [DONE]\n\n"),
        ]);
        let err = gateway(config(true, false), &fake)
            .relay(QUESTION)
            .await
            .err()
            .unwrap();
        assert_eq!(fake.models_called(), vec!["first"]);
        match err {
            GatewayError::UpstreamFatal { status, details, .. } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(details, "bad payload");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn exhausted_chain_reports_last_failure() {
        let fake = FakeCompletion::new(vec![
            Scripted::Fail(500, "one"),
            Scripted::Fail(503, "two"),
            Scripted::Fail(500, "three"),
        ]);
        let err = gateway(config(true, false), &fake)
            .relay(QUESTION)
            .await
            .err()
            .unwrap();
        assert_eq!(fake.models_called(), vec!["first", "second", "third"]);
        match err {
            GatewayError::UpstreamExhausted { status, details } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(details, "three");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn unresponsive_candidate_is_skipped_after_timeout() {
        let fake = FakeCompletion::new(vec![Scripted::Hang, Scripted::Stream("data: [DONE]\n\n")]);
        let relayed = gateway(config(true, false), &fake)
            .relay(QUESTION)
            .await
            .unwrap();
        assert_eq!(relayed.model, "second");
    }

    #[tokio::test]
    async fn transport_errors_become_internal() {
        let fake = FakeCompletion::new(vec![Scripted::Broken]);
        let err = gateway(config(true, false), &fake)
            .relay(QUESTION)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::Internal(_)));
        assert_eq!(fake.models_called(), vec!["first"]);
    }

    #[tokio::test]
    async fn search_failures_are_swallowed() {
        let fake = FakeCompletion::new(vec![Scripted::Stream("data: [DONE]\n\n")]);
        let search = Arc::new(FakeSearch {
            answer: Err("503".to_string()),
            calls: Mutex::new(0),
        });
        let gw = Gateway::new(config(true, true), fake.clone(), Some(search.clone()));
        assert!(gw.relay(QUESTION).await.is_ok());
        assert_eq!(*search.calls.lock().unwrap(), 1);
        let calls = fake.calls.lock().unwrap();
        assert!(!calls[0].messages[1].content.contains("web search results"));
    }

    #[tokio::test]
    async fn search_results_and_context_enrich_the_prompt() {
        let fake = FakeCompletion::new(vec![Scripted::Stream("data: [DONE]\n\n")]);
        let search = Arc::new(FakeSearch {
            answer: Ok(Some("[1] GHG - https://ghg.example\nScope 1".to_string())),
            calls: Mutex::new(0),
        });
        let gw = Gateway::new(config(true, true), fake.clone(), Some(search));
        let body = br#"{"question":" Compare scopes ","contextData":"{\"total\":42}","pageType":"ghg-report"}"#;
        gw.relay(body).await.unwrap();

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls[0].messages[0].content, prompt::system_prompt(PageType::Report));
        assert_eq!(
            calls[0].messages[1].content,
            "Here is the current GHG Report data:\n{\"total\":42}\n\n\
             Here are web search results you can rely on:\n[1] GHG - https://ghg.example\nScope 1\n\n\
             User question: Compare scopes"
        );
    }

    #[tokio::test]
    async fn search_is_skipped_without_a_key() {
        let fake = FakeCompletion::new(vec![Scripted::Stream("data: [DONE]\n\n")]);
        let search = Arc::new(FakeSearch {
            answer: Ok(Some("unused".to_string())),
            calls: Mutex::new(0),
        });
        let gw = Gateway::new(config(true, false), fake, Some(search.clone()));
        gw.relay(QUESTION).await.unwrap();
        assert_eq!(*search.calls.lock().unwrap(), 0);
    }

    #[test]
    fn relayed_response_carries_model_header() {
        let relayed = RelayedStream {
            model: "second".to_string(),
            status: StatusCode::OK,
            content_type: None,
            body: Box::pin(futures::stream::empty::<Result<Bytes>>()),
        };
        let response = relayed.into_response();
        assert_eq!(response.headers()[MODEL_HEADER], "second");
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
    }
}
