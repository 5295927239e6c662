use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_TOP_K: usize = 4;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REMOTE_MAX_RETRIES: u32 = 2;
const DEFAULT_REMOTE_RETRY_BASE_MS: u64 = 250;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// An explicitly requested env file could not be read.
    #[error("Failed to read env file {path}: {source}")]
    EnvFile {
        /// Path passed on the command line or through `DOCQA_ENV_FILE`.
        path: String,
        /// Underlying read or parse failure.
        source: dotenvy::Error,
    },
}

/// Runtime configuration for the document question-answering server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime (embeddings and/or generation).
    pub ollama_url: String,
    /// API key for the OpenAI-compatible embeddings endpoint.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible embeddings endpoint.
    pub openai_base_url: String,
    /// How answers are composed from retrieved chunks.
    pub answer_mode: AnswerMode,
    /// Language model backend used in generative mode.
    pub llm_provider: LlmProvider,
    /// Language model identifier used in generative mode.
    pub llm_model: String,
    /// API key for the Gemini generative language API.
    pub gemini_api_key: Option<String>,
    /// Base URL of the Gemini generative language API.
    pub gemini_base_url: String,
    /// Maximum chunk length, measured in `text_splitter_unit`.
    pub text_splitter_chunk_size: usize,
    /// Overlap between consecutive chunks, measured in `text_splitter_unit`.
    pub text_splitter_chunk_overlap: usize,
    /// Unit used to measure chunk lengths.
    pub text_splitter_unit: ChunkUnit,
    /// Number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Optional cap on the number of indexed documents kept in memory.
    pub registry_max_documents: Option<usize>,
    /// Maximum accepted upload body size in bytes.
    pub max_upload_bytes: usize,
    /// Directory for per-upload temporary files; the system temp dir when unset.
    pub upload_temp_dir: Option<std::path::PathBuf>,
    /// Extra origins allowed by the CORS policy.
    pub cors_allowed_origins: Vec<String>,
    /// Per-request timeout applied to remote providers.
    pub remote_timeout_secs: u64,
    /// Retries attempted for transient remote failures.
    pub remote_max_retries: u32,
    /// Base delay of the exponential retry backoff, in milliseconds.
    pub remote_retry_base_ms: u64,
    /// Optional bind address override.
    pub server_host: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// In-process hashing encoder.
    Local,
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
}

/// Answer composition strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Return retrieved chunks verbatim.
    Extractive,
    /// Ask a language model to answer from the retrieved chunks.
    Generative,
}

/// Language model backends available in generative mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google Gemini generative language API.
    Gemini,
    /// Local Ollama runtime.
    Ollama,
}

/// Unit used to measure chunk windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    /// Unicode scalar values.
    Characters,
    /// `cl100k_base` tokens.
    Tokens,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider = parse_env_or("EMBEDDING_PROVIDER", EmbeddingProvider::Local)?;
        let answer_mode = parse_env_or("ANSWER_MODE", AnswerMode::Extractive)?;
        let llm_provider = parse_env_or("LLM_PROVIDER", LlmProvider::Gemini)?;

        let config = Self {
            embedding_provider,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_env_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?,
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            answer_mode,
            llm_provider,
            llm_model: load_env_optional("LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            gemini_api_key: load_env_optional("GEMINI_API_KEY"),
            gemini_base_url: load_env_optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            text_splitter_chunk_size: parse_env_or("TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            text_splitter_chunk_overlap: parse_env_or(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                DEFAULT_CHUNK_OVERLAP,
            )?,
            text_splitter_unit: parse_env_or("TEXT_SPLITTER_UNIT", ChunkUnit::Characters)?,
            retrieval_top_k: parse_env_or("RETRIEVAL_TOP_K", DEFAULT_TOP_K)?,
            registry_max_documents: parse_env_optional("REGISTRY_MAX_DOCUMENTS")?,
            max_upload_bytes: parse_env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            upload_temp_dir: load_env_optional("UPLOAD_TEMP_DIR").map(Into::into),
            cors_allowed_origins: load_env_optional("CORS_ALLOWED_ORIGINS")
                .map(|value| split_origins(&value))
                .unwrap_or_default(),
            remote_timeout_secs: parse_env_or("REMOTE_TIMEOUT_SECS", DEFAULT_REMOTE_TIMEOUT_SECS)?,
            remote_max_retries: parse_env_or("REMOTE_MAX_RETRIES", DEFAULT_REMOTE_MAX_RETRIES)?,
            remote_retry_base_ms: parse_env_or(
                "REMOTE_RETRY_BASE_MS",
                DEFAULT_REMOTE_RETRY_BASE_MS,
            )?,
            server_host: load_env_optional("SERVER_HOST"),
            server_port: parse_env_optional("SERVER_PORT")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints and required credentials.
    ///
    /// Missing credentials for the selected providers are reported here so the server refuses to
    /// start instead of failing on the first upload or question.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".into(),
            ));
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        if self.registry_max_documents == Some(0) {
            return Err(ConfigError::InvalidValue("REGISTRY_MAX_DOCUMENTS".into()));
        }
        if self.embedding_provider == EmbeddingProvider::OpenAI && self.openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }
        if self.answer_mode == AnswerMode::Generative
            && self.llm_provider == LlmProvider::Gemini
            && self.gemini_api_key.is_none()
        {
            return Err(ConfigError::MissingVariable("GEMINI_API_KEY".into()));
        }
        Ok(())
    }

    /// Timeout applied to each remote provider request.
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs.max(1))
    }

    /// Emit the effective settings at debug level. Call once tracing is installed.
    pub fn log_summary(&self) {
        tracing::debug!(
            embedding_provider = ?self.embedding_provider,
            embedding_model = %self.embedding_model,
            answer_mode = self.answer_mode.as_str(),
            chunk_size = self.text_splitter_chunk_size,
            chunk_overlap = self.text_splitter_chunk_overlap,
            top_k = self.retrieval_top_k,
            server_port = ?self.server_port,
            "Loaded configuration"
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_provider: EmbeddingProvider::Local,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            answer_mode: AnswerMode::Extractive,
            llm_provider: LlmProvider::Gemini,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            text_splitter_chunk_size: DEFAULT_CHUNK_SIZE,
            text_splitter_chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            text_splitter_unit: ChunkUnit::Characters,
            retrieval_top_k: DEFAULT_TOP_K,
            registry_max_documents: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_temp_dir: None,
            cors_allowed_origins: Vec::new(),
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            remote_max_retries: DEFAULT_REMOTE_MAX_RETRIES,
            remote_retry_base_ms: DEFAULT_REMOTE_RETRY_BASE_MS,
            server_host: None,
            server_port: None,
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_env_optional(key)?.unwrap_or(default))
}

fn split_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "hashing" => Ok(Self::Local),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl FromStr for AnswerMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extractive" => Ok(Self::Extractive),
            "generative" => Ok(Self::Generative),
            _ => Err(()),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl FromStr for ChunkUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "characters" | "chars" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

impl AnswerMode {
    /// Lowercase label used in responses and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extractive => "extractive",
            Self::Generative => "generative",
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
///
/// Reads `.env` from the working directory when present. A file named through `env_file` must
/// exist and parse. Runs before tracing is installed (the env file may set `RUST_LOG`), so
/// failures are returned rather than logged.
pub fn init_config(env_file: Option<&std::path::Path>) -> Result<&'static Config, ConfigError> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path).map_err(|source| ConfigError::EnvFile {
                path: path.display().to_string(),
                source,
            })?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_env_file_is_an_error() {
        let error = init_config(Some(std::path::Path::new("/nonexistent/docqa-missing.env")))
            .unwrap_err();
        assert!(
            matches!(error, ConfigError::EnvFile { ref path, .. } if path.ends_with("docqa-missing.env"))
        );
        assert!(error.to_string().starts_with("Failed to read env file"));
    }

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().expect("defaults validate");
    }

    #[test]
    fn validate_rejects_overlap_not_smaller_than_chunk() {
        let config = Config {
            text_splitter_chunk_size: 100,
            text_splitter_chunk_overlap: 100,
            ..Config::default()
        };
        let error = config.validate().unwrap_err();
        assert!(
            matches!(error, ConfigError::InvalidValue(ref key) if key == "TEXT_SPLITTER_CHUNK_OVERLAP")
        );
    }

    #[test]
    fn validate_requires_gemini_key_in_generative_mode() {
        let config = Config {
            answer_mode: AnswerMode::Generative,
            llm_provider: LlmProvider::Gemini,
            gemini_api_key: None,
            ..Config::default()
        };
        let error = config.validate().unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(ref key) if key == "GEMINI_API_KEY"));

        let ollama = Config {
            answer_mode: AnswerMode::Generative,
            llm_provider: LlmProvider::Ollama,
            ..Config::default()
        };
        ollama.validate().expect("ollama needs no key");
    }

    #[test]
    fn validate_requires_openai_key_for_openai_embeddings() {
        let config = Config {
            embedding_provider: EmbeddingProvider::OpenAI,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingVariable(ref key)) if key == "OPENAI_API_KEY"
        ));
    }

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("OpenAI".parse(), Ok(EmbeddingProvider::OpenAI));
        assert_eq!("LOCAL".parse(), Ok(EmbeddingProvider::Local));
        assert_eq!("Generative".parse(), Ok(AnswerMode::Generative));
        assert_eq!("tokens".parse(), Ok(ChunkUnit::Tokens));
        assert!("qdrant".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn split_origins_trims_entries() {
        let origins = split_origins(" https://app.example.com/ ,, http://localhost:4000 ");
        assert_eq!(
            origins,
            vec!["https://app.example.com", "http://localhost:4000"]
        );
    }
}
