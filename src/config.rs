//! Configuration management for Strata.
//!
//! Loads configuration from environment variables (and an optional `.env`
//! file) with support for:
//! - Vector store backend selection and collection naming
//! - Multiple embedding providers with fallback priority
//! - Query defaults and collaborator timeouts
//!
//! The configuration is built once in `main` and handed to the services
//! that need it.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use strata_embeddings::{
    default_endpoint, default_model, EmbeddingConfig, EmbeddingProviderConfig,
};

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub memory: MemoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub mode: ServerMode,
    pub host: String,
    pub port: u16,
}

/// Transport the MCP server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServerMode {
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// JSON-RPC over `POST /mcp`, plus health routes.
    Http,
}

impl FromStr for ServerMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" | "sse" => Ok(Self::Http),
            _ => Err(format!("Unknown server mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: VectorBackend,
    pub url: String,
    pub collection_prefix: String,
}

impl StoreConfig {
    pub fn clusters_collection(&self) -> String {
        format!("{}clusters", self.collection_prefix)
    }

    pub fn chunks_collection(&self) -> String {
        format!("{}chunks", self.collection_prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    Qdrant,
    /// In-process store; contents are lost on exit.
    Memory,
}

impl FromStr for VectorBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown vector backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Token budget when a query gives none.
    pub default_max_tokens: usize,
    /// Chunks scanned per cluster when a query gives no `k`.
    pub default_k: usize,
    /// Upper bound on every embedder and store call.
    pub operation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub json: bool,
}

/// Local Ollama server used when `OLLAMA_URL` is unset.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Environment lookup; `None` means unset.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                mode: ServerMode::Stdio,
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            store: StoreConfig {
                backend: VectorBackend::Qdrant,
                url: "http://localhost:6334".to_string(),
                collection_prefix: "dev_".to_string(),
            },
            embedding: EmbeddingConfig {
                providers: vec![EmbeddingProviderConfig::ollama(
                    DEFAULT_OLLAMA_URL,
                    &default_model("ollama"),
                )],
                ..EmbeddingConfig::default()
            },
            memory: MemoryConfig {
                default_max_tokens: 1000,
                default_k: 24,
                operation_timeout: Duration::from_millis(30_000),
            },
            logging: LoggingConfig { json: false },
        }
    }
}

impl Config {
    /// Load `.env` (if present) and read the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self> {
        Ok(Self {
            server: ServerConfig {
                mode: parse_env(lookup, "SERVER_MODE", "stdio")?,
                host: env_or(lookup, "SERVER_HOST", "0.0.0.0"),
                port: parse_env(lookup, "SERVER_PORT", "8080")?,
            },
            store: StoreConfig {
                backend: parse_env(lookup, "STRATA_VECTOR_BACKEND", "qdrant")?,
                url: env_or(lookup, "QDRANT_URL", "http://localhost:6334"),
                collection_prefix: env_or(lookup, "COLLECTION_PREFIX", "dev_"),
            },
            embedding: Self::parse_embedding_config(lookup)?,
            memory: MemoryConfig {
                default_max_tokens: parse_env(lookup, "DEFAULT_MAX_TOKENS", "1000")?,
                default_k: parse_env(lookup, "DEFAULT_K", "24")?,
                operation_timeout: Duration::from_millis(parse_env(
                    lookup,
                    "STRATA_OPERATION_TIMEOUT_MS",
                    "30000",
                )?),
            },
            logging: LoggingConfig {
                json: env_or(lookup, "STRATA_LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
            },
        })
    }

    /// Parse embedding providers from environment.
    /// A local Ollama server is preferred, then Gemini, then OpenAI.
    ///
    /// Ollama is on by default; an empty `OLLAMA_URL` or one of
    /// `off`/`none`/`disabled` turns it off.
    fn parse_embedding_config(lookup: Lookup<'_>) -> Result<EmbeddingConfig> {
        let mut providers = Vec::new();

        let ollama_url = env_or(lookup, "OLLAMA_URL", DEFAULT_OLLAMA_URL);
        let ollama_url = ollama_url.trim();
        let ollama_off = ollama_url.is_empty()
            || ["off", "none", "disabled"]
                .iter()
                .any(|word| ollama_url.eq_ignore_ascii_case(word));
        if !ollama_off {
            let model = env_or(lookup, "EMBED_MODEL", &default_model("ollama"));
            providers.push(EmbeddingProviderConfig::ollama(ollama_url, &model));
        }

        if let Some(api_key) = lookup("GOOGLE_API_KEY") {
            providers.push(EmbeddingProviderConfig {
                name: "gemini".to_string(),
                base_url: default_endpoint("gemini"),
                model: env_or(lookup, "GEMINI_EMBEDDING_MODEL", &default_model("gemini")),
                api_key,
                priority: 2,
            });
        }

        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            providers.push(EmbeddingProviderConfig {
                name: "openai".to_string(),
                base_url: default_endpoint("openai"),
                model: env_or(lookup, "OPENAI_EMBEDDING_MODEL", &default_model("openai")),
                api_key,
                priority: 3,
            });
        }

        providers.sort_by_key(|p| p.priority);

        let dimension: usize = parse_env(lookup, "EMBED_DIM", "1024")?;
        if dimension == 0 {
            return Err(Error::Config("EMBED_DIM must be positive".into()));
        }

        Ok(EmbeddingConfig {
            providers,
            dimension,
            auto_pull: parse_env(lookup, "OLLAMA_AUTO_PULL", "true")?,
        })
    }
}

fn env_or(lookup: Lookup<'_>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(lookup: Lookup<'_>, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_or(lookup, key, default);
    raw.parse()
        .map_err(|e| Error::Config(format!("Invalid {}={:?}: {}", key, raw, e)))
}
