use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;

const DEFAULT_COMPLETION_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.tavily.com/search";
const DEFAULT_MODELS: &[&str] = &[
    "openai/gpt-oss-120b:free",
    "upstage/solar-pro-3:free",
    "meta-llama/llama-3.1-8b-instruct:free",
];

/// Read once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: SocketAddr,
    pub completion: CompletionConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub models: Vec<ModelCandidate>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub referer: String,
    pub title: String,
    pub candidate_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidate {
    pub id: String,
    pub priority: usize,
}

impl ModelCandidate {
    pub fn ordered<I, S>(ids: I) -> Vec<ModelCandidate>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter()
            .enumerate()
            .map(|(priority, id)| ModelCandidate {
                id: id.into(),
                priority,
            })
            .collect()
    }
}

/// On-disk shape; every field is optional so a partial file works.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    listen: Option<SocketAddr>,
    completion: FileCompletion,
    search: FileSearch,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileCompletion {
    endpoint: Option<String>,
    models: Option<Vec<String>>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    referer: Option<String>,
    title: Option<String>,
    candidate_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSearch {
    endpoint: Option<String>,
    max_results: Option<usize>,
}

/// Credentials and overrides taken from the environment.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub completion_key: Option<String>,
    pub search_key: Option<String>,
    pub listen: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            completion_key: non_empty(var("OPENROUTER_API_KEY"))
                .or_else(|| non_empty(var("OPENROUTER_FALLBACK_API_KEY"))),
            search_key: non_empty(var("TAVILY_API_KEY")),
            listen: non_empty(var("ESG_CHAT_LISTEN")),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_parts(FileConfig::default(), EnvOverrides::default(), None)
    }
}

impl AppConfig {
    fn from_parts(file: FileConfig, env: EnvOverrides, listen: Option<SocketAddr>) -> Self {
        let listen = listen
            .or(file.listen)
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3001)));

        let models = match file.completion.models {
            Some(models) if !models.is_empty() => ModelCandidate::ordered(models),
            _ => ModelCandidate::ordered(DEFAULT_MODELS.iter().copied()),
        };

        Self {
            listen,
            completion: CompletionConfig {
                endpoint: file
                    .completion
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_COMPLETION_ENDPOINT.to_string()),
                api_key: env.completion_key,
                models,
                temperature: file.completion.temperature.unwrap_or(0.7),
                max_tokens: file.completion.max_tokens.unwrap_or(8000),
                referer: file
                    .completion
                    .referer
                    .unwrap_or_else(|| "http://localhost:3000".to_string()),
                title: file
                    .completion
                    .title
                    .unwrap_or_else(|| "ESGtech.ai Dashboard".to_string()),
                candidate_timeout: Duration::from_secs(
                    file.completion.candidate_timeout_secs.unwrap_or(60),
                ),
            },
            search: SearchConfig {
                endpoint: file
                    .search
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_SEARCH_ENDPOINT.to_string()),
                api_key: env.search_key,
                max_results: file.search.max_results.unwrap_or(5),
            },
        }
    }

    pub fn has_completion_key(&self) -> bool {
        self.completion.api_key.is_some()
    }
}

pub async fn load_config(path: impl AsRef<Path>, env: EnvOverrides) -> Result<AppConfig> {
    let path = path.as_ref();
    let file = if fs::try_exists(path).await.unwrap_or(false) {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        tracing::info!("No config file at {}, using defaults", path.display());
        FileConfig::default()
    };
    let listen = match env.listen.as_deref() {
        Some(addr) => Some(
            addr.parse()
                .with_context(|| format!("Invalid ESG_CHAT_LISTEN address: {}", addr))?,
        ),
        None => None,
    };
    Ok(AppConfig::from_parts(file, env, listen))
}
