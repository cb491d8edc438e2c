use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response header naming the model candidate that served a relayed stream.
pub const MODEL_HEADER: &str = "x-upstream-model";

/// Discriminator value carried by a structured analysis answer.
pub const ANALYSIS_FORMAT: &str = "analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One side of a question/answer exchange.
///
/// The assistant side starts empty and grows while its stream is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatExchange {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatExchange {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.timestamp = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageType {
    #[default]
    Dashboard,
    #[serde(alias = "ghg-report")]
    Report,
}

impl PageType {
    /// Lenient label lookup; anything unrecognised is the dashboard.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "report" | "ghg-report" => PageType::Report,
            _ => PageType::Dashboard,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PageType::Dashboard => "dashboard",
            PageType::Report => "report",
        }
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_type: Option<PageType>,
}

/// Structured pros/cons answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub positives: Vec<String>,
    pub negatives: Vec<String>,
    pub summary: String,
}

/// JSON error envelope returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            status: None,
        }
    }
}
