use crate::config::{Config, Credentials};
use anyhow::{Context, Result};
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    CreateEmbeddingRequestArgs,
};
use async_openai::{Client, config::OpenAIConfig};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

const JUDGE_SYSTEM_PROMPT: &str = "You are a strict evaluator of retrieval-augmented generation systems. \
Follow the instructions exactly and reply with a single JSON object and nothing else.";

/// Language model the evaluation engine prompts for verdicts
pub trait JudgeModel {
    /// Send a prompt and return the raw text reply
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Embed each text, returning vectors in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Judge backed by OpenAI-compatible chat and embeddings endpoints
pub struct OpenAiJudge {
    chat: Client<OpenAIConfig>,
    embeddings: Client<OpenAIConfig>,
    model: String,
    embedding_model: String,
    temperature: f32,
    max_tokens: u16,
    rate_limit_rps: f64,
    /// Time of the last request, shared by chat and embeddings
    last_request: Mutex<Option<Instant>>,
}

impl OpenAiJudge {
    /// Create a judge bound to the configured endpoints and model
    pub fn new(config: &Config, credentials: &Credentials) -> Result<Self> {
        let http_client = Self::build_http_client(config)?;

        let chat_config = OpenAIConfig::new()
            .with_api_key(credentials.api_key.clone())
            .with_api_base(&config.api_endpoint);
        let embedding_config = OpenAIConfig::new()
            .with_api_key(credentials.embedding_api_key.clone())
            .with_api_base(&config.embedding_api_endpoint);

        let max_tokens = u16::try_from(config.max_tokens)
            .with_context(|| format!("max_tokens {} does not fit a request", config.max_tokens))?;

        Ok(Self {
            chat: Client::with_config(chat_config)
                .with_http_client(http_client.clone())
                .with_backoff(no_retry()),
            embeddings: Client::with_config(embedding_config)
                .with_http_client(http_client)
                .with_backoff(no_retry()),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            temperature: config.temperature as f32,
            max_tokens,
            rate_limit_rps: config.rate_limit_rps,
            last_request: Mutex::new(None),
        })
    }

    /// Build the HTTP client shared by both endpoints
    fn build_http_client(config: &Config) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        builder.build().context("Failed to build HTTP client")
    }

    /// Enforce rate limiting for API requests
    async fn enforce_rate_limit(last_request: &mut Option<Instant>, rate_limit_rps: f64) {
        if rate_limit_rps <= 0.0 {
            return;
        }

        let min_interval = Duration::from_secs_f64(1.0 / rate_limit_rps);

        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }

        *last_request = Some(Instant::now());
    }

    async fn throttle(&self) {
        let mut last_request = self.last_request.lock().await;
        Self::enforce_rate_limit(&mut last_request, self.rate_limit_rps).await;
    }

    /// Build the chat completion request for a judge prompt
    fn build_request(&self, prompt: &str) -> Result<CreateChatCompletionRequest> {
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(JUDGE_SYSTEM_PROMPT.to_string())
            .build()
            .context("Failed to build system message")?
            .into();

        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .context("Failed to build user message")?
            .into();

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([system_message, user_message])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .context("Failed to build chat completion request")
    }

    /// Extract the reply text from a completion
    fn extract_content(response: CreateChatCompletionResponse) -> Result<String> {
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Judge returned no content")
    }
}

impl JudgeModel for OpenAiJudge {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.throttle().await;

        let request = self.build_request(prompt)?;
        tracing::debug!(model = %self.model, "Sending judge request");

        let response = self
            .chat
            .chat()
            .create(request)
            .await
            .context("Failed to generate judgement")?;

        Self::extract_content(response)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.throttle().await;

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(texts.to_vec())
            .build()
            .context("Failed to build embedding request")?;
        tracing::debug!(model = %self.embedding_model, inputs = texts.len(), "Sending embedding request");

        let response = self
            .embeddings
            .embeddings()
            .create(request)
            .await
            .context("Failed to create embeddings")?;

        let mut data = response.data;
        if data.len() != texts.len() {
            anyhow::bail!(
                "Expected {} embeddings, received {}",
                texts.len(),
                data.len()
            );
        }
        data.sort_by_key(|embedding| embedding.index);

        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }
}

/// Backoff policy that gives up on the first failure
///
/// async-openai retries rate-limited requests by default; a run must fail on
/// the first quota error instead.
fn no_retry() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

/// Parse a judge reply as JSON, handling JSON embedded in prose
pub fn parse_judge_json(reply: &str) -> Result<Value> {
    match serde_json::from_str(reply.trim()) {
        Ok(parsed) => Ok(parsed),
        Err(_) => try_extract_embedded_json(reply),
    }
}

/// Try to extract JSON that might be embedded in text
fn try_extract_embedded_json(reply: &str) -> Result<Value> {
    match reply.find('{') {
        Some(start) => match reply.rfind('}') {
            Some(end) if end > start => serde_json::from_str(&reply[start..=end])
                .context("Failed to parse extracted JSON"),
            _ => anyhow::bail!("Found opening brace but no closing brace in judge reply"),
        },
        None => anyhow::bail!("No JSON found in judge reply"),
    }
}
