#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API Error: {status}")]
    Api { status: u16, body: String },
    #[error("{0}")]
    Upstream(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("Empty response from AI model")]
    EmptyResponse,
}
