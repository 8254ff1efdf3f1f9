use crate::error::EvalError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for an evaluation run
///
/// Every field has a default, so an empty file (or no file at all) targets
/// the GitHub Models gateway with `openai/gpt-4o-mini` as the judge.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// OpenAI-compatible endpoint used for judge completions
    pub api_endpoint: String,
    /// Environment variable name containing the judge API key
    pub env_var_api_key: String,
    /// Model used as the judge
    pub model: String,
    /// OpenAI-compatible endpoint used for embeddings
    pub embedding_api_endpoint: String,
    /// Environment variable checked first for the embeddings API key
    pub embedding_env_var_api_key: String,
    /// Model used for embeddings
    pub embedding_model: String,
    /// Sampling temperature for judge completions
    pub temperature: f64,
    /// Maximum tokens per judge completion
    pub max_tokens: u32,
    /// Client-side request rate limit; zero disables it
    pub rate_limit_rps: f64,
    /// Per-request timeout in seconds; unset means no timeout
    pub request_timeout_secs: Option<u64>,
    /// Weights of factuality and semantic similarity in answer correctness
    pub answer_correctness_weights: [f64; 2],
    /// Optional local path to store the payload as JSON
    pub storage_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_endpoint: "https://models.github.ai/inference".to_string(),
            env_var_api_key: "GITHUB_MODELS_TOKEN".to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            embedding_api_endpoint: "https://api.openai.com/v1".to_string(),
            embedding_env_var_api_key: "OPENAI_API_KEY".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            rate_limit_rps: 0.0,
            request_timeout_secs: None,
            answer_correctness_weights: [0.75, 0.25],
            storage_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the evaluation cannot work with
    pub fn validate(&self) -> Result<(), EvalError> {
        let [factuality, similarity] = self.answer_correctness_weights;
        if factuality < 0.0 || similarity < 0.0 || factuality + similarity <= 0.0 {
            return Err(EvalError::Config(format!(
                "answer_correctness_weights must be non-negative with a positive sum, got [{}, {}]",
                factuality, similarity
            )));
        }

        if self.rate_limit_rps < 0.0 {
            return Err(EvalError::Config(format!(
                "rate_limit_rps must not be negative, got {}",
                self.rate_limit_rps
            )));
        }

        if self.max_tokens == 0 || self.max_tokens > u32::from(u16::MAX) {
            return Err(EvalError::Config(format!(
                "max_tokens must be between 1 and {}, got {}",
                u16::MAX,
                self.max_tokens
            )));
        }

        Ok(())
    }
}

/// API keys resolved once at startup and handed to the model client
#[derive(Clone)]
pub struct Credentials {
    /// Bearer token for the judge endpoint
    pub api_key: String,
    /// Bearer token for the embeddings endpoint
    pub embedding_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("embedding_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Resolve credentials from the process environment
    pub fn from_env(config: &Config) -> Result<Self, EvalError> {
        Self::resolve(config, |name| std::env::var(name).ok())
    }

    /// Resolve credentials through an arbitrary variable lookup
    ///
    /// The embeddings key falls back to the judge key when its own variable
    /// is unset, without touching the environment.
    pub fn resolve<F>(config: &Config, lookup: F) -> Result<Self, EvalError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(&config.env_var_api_key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| EvalError::MissingCredential(config.env_var_api_key.clone()))?;

        let embedding_api_key = lookup(&config.embedding_env_var_api_key)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| api_key.clone());

        Ok(Self {
            api_key,
            embedding_api_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_config_parsing() {
        let toml_content = r#"
api_endpoint = "http://localhost:8080/v1"
env_var_api_key = "JUDGE_KEY"
model = "gpt-4"
temperature = 0.5
max_tokens = 200
rate_limit_rps = 5.0
request_timeout_secs = 30
answer_correctness_weights = [1.0, 0.0]
storage_path = "/tmp/ragas.json"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.api_endpoint, "http://localhost:8080/v1");
        assert_eq!(config.env_var_api_key, "JUDGE_KEY");
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.max_tokens, 200);
        assert_eq!(config.rate_limit_rps, 5.0);
        assert_eq!(config.request_timeout_secs, Some(30));
        assert_eq!(config.answer_correctness_weights, [1.0, 0.0]);
        assert_eq!(config.storage_path, Some(PathBuf::from("/tmp/ragas.json")));
        // untouched keys keep their defaults
        assert_eq!(config.embedding_model, "text-embedding-ada-002");
    }

    #[test]
    fn test_config_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "").unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();
        assert_eq!(config.api_endpoint, "https://models.github.ai/inference");
        assert_eq!(config.env_var_api_key, "GITHUB_MODELS_TOKEN");
        assert_eq!(config.model, "openai/gpt-4o-mini");
        assert_eq!(config.embedding_env_var_api_key, "OPENAI_API_KEY");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.rate_limit_rps, 0.0);
        assert_eq!(config.request_timeout_secs, None);
        assert_eq!(config.answer_correctness_weights, [0.75, 0.25]);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_config_rejects_bad_weights() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "answer_correctness_weights = [0.0, 0.0]").unwrap();

        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("answer_correctness_weights"));
    }

    #[test]
    fn test_config_rejects_negative_rate_limit() {
        let config = Config {
            rate_limit_rps: -1.0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(EvalError::Config(_))));
    }

    #[test]
    fn test_config_rejects_oversized_max_tokens() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "max_tokens = 70000").unwrap();

        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("max_tokens must be between 1 and 65535, got 70000"));
    }

    #[test]
    fn test_config_max_tokens_bounds() {
        let zero = Config {
            max_tokens: 0,
            ..Config::default()
        };
        assert!(matches!(zero.validate(), Err(EvalError::Config(_))));

        let largest = Config {
            max_tokens: 65535,
            ..Config::default()
        };
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_config_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/rag-eval.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_credentials_missing_key() {
        let config = Config::default();
        let err = Credentials::resolve(&config, lookup_from(&[])).unwrap_err();
        assert!(matches!(err, EvalError::MissingCredential(ref name) if name == "GITHUB_MODELS_TOKEN"));
    }

    #[test]
    fn test_credentials_empty_key_is_missing() {
        let config = Config::default();
        let result = Credentials::resolve(&config, lookup_from(&[("GITHUB_MODELS_TOKEN", "")]));
        assert!(matches!(result, Err(EvalError::MissingCredential(_))));
    }

    #[test]
    fn test_credentials_embedding_key_falls_back() {
        let config = Config::default();
        let creds =
            Credentials::resolve(&config, lookup_from(&[("GITHUB_MODELS_TOKEN", "ghp_token")]))
                .unwrap();
        assert_eq!(creds.api_key, "ghp_token");
        assert_eq!(creds.embedding_api_key, "ghp_token");
    }

    #[test]
    fn test_credentials_existing_embedding_key_wins() {
        let config = Config::default();
        let creds = Credentials::resolve(
            &config,
            lookup_from(&[("GITHUB_MODELS_TOKEN", "ghp_token"), ("OPENAI_API_KEY", "sk-own")]),
        )
        .unwrap();
        assert_eq!(creds.api_key, "ghp_token");
        assert_eq!(creds.embedding_api_key, "sk-own");
    }

    #[test]
    fn test_credentials_from_env_missing_var() {
        let config = Config {
            env_var_api_key: "RAG_EVAL_TEST_UNSET_TOKEN".to_string(),
            ..Config::default()
        };

        unsafe {
            std::env::remove_var(&config.env_var_api_key);
        }

        let err = Credentials::from_env(&config).unwrap_err();
        assert!(err.to_string().contains("RAG_EVAL_TEST_UNSET_TOKEN is not set"));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            api_key: "secret".to_string(),
            embedding_api_key: "secret".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("secret"));
    }
}
