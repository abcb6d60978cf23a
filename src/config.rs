use std::path::PathBuf;
use std::time::Duration;

use crate::clustering::{DbscanParams, DEFAULT_EPS, DEFAULT_MIN_SAMPLES};
use crate::environment::{get_env_var, get_env_var_or};
use crate::pipeline::Stage;
use crate::vector::{DEFAULT_EMBEDDING_MODEL, MAX_EMBED_CHARS};

pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";
pub const ARTIFACT_DIR_ENV: &str = "ARTIFACT_DIR";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_OLLAMA_MODEL: &str = "llama3";
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Attempts per generation request before giving up.
pub const LLM_MAX_RETRIES: u32 = 3;

/// Which service produces issue titles and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    Ollama,
}

/// Bounds applied to every batch of external calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Runtime configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_path: String,
    pub artifact_dir: PathBuf,
    pub openai_api_key: Option<String>,
    pub embedding_model: String,
    pub llm_backend: LlmBackend,
    pub llm_model: String,
    pub ollama_host: String,
    pub ollama_port: u16,
    pub dbscan: DbscanParams,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub max_embed_chars: usize,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let llm_backend = match get_env_var("LLM_TYPE")
            .unwrap_or_else(|| "openai".to_string())
            .to_lowercase()
            .as_str()
        {
            "ollama" => LlmBackend::Ollama,
            _ => LlmBackend::OpenAI,
        };
        let default_model = match llm_backend {
            LlmBackend::OpenAI => DEFAULT_OPENAI_MODEL,
            LlmBackend::Ollama => DEFAULT_OLLAMA_MODEL,
        };

        Self {
            database_path: get_env_var(DATABASE_PATH_ENV)
                .unwrap_or_else(|| "issuedesk.db".to_string()),
            artifact_dir: PathBuf::from(
                get_env_var(ARTIFACT_DIR_ENV).unwrap_or_else(|| ".".to_string()),
            ),
            openai_api_key: get_env_var(OPENAI_API_KEY_ENV),
            embedding_model: get_env_var("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            llm_backend,
            llm_model: get_env_var("LLM_MODEL").unwrap_or_else(|| default_model.to_string()),
            ollama_host: get_env_var("OLLAMA_HOST").unwrap_or_else(|| "localhost".to_string()),
            ollama_port: get_env_var_or("OLLAMA_PORT", 11434u16),
            dbscan: DbscanParams {
                eps: get_env_var_or("CLUSTER_EPS", DEFAULT_EPS),
                min_samples: get_env_var_or("CLUSTER_MIN_SAMPLES", DEFAULT_MIN_SAMPLES),
            },
            concurrency: get_env_var_or("REQUEST_CONCURRENCY", DEFAULT_CONCURRENCY).max(1),
            request_timeout: Duration::from_secs(get_env_var_or(
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )),
            max_embed_chars: get_env_var_or("MAX_EMBED_CHARS", MAX_EMBED_CHARS),
        }
    }

    pub fn request_limits(&self) -> RequestLimits {
        RequestLimits {
            concurrency: self.concurrency.max(1),
            timeout: self.request_timeout,
        }
    }

    /// Limits for generation calls, which retry internally with backoff
    /// (2s, 4s, ...), so the outer bound covers every attempt.
    pub fn generation_limits(&self) -> RequestLimits {
        let backoff = Duration::from_secs(2u64.pow(LLM_MAX_RETRIES));
        RequestLimits {
            concurrency: self.concurrency.max(1),
            timeout: self.request_timeout * LLM_MAX_RETRIES + backoff,
        }
    }

    /// Lists the environment variables a stage needs that are not set.
    pub fn missing_credentials(&self, stage: Stage) -> Vec<String> {
        let mut missing = Vec::new();
        let needs_openai = match stage {
            Stage::Vectorize => true,
            Stage::Synthesize => self.llm_backend == LlmBackend::OpenAI,
            Stage::Group | Stage::Reconcile => false,
        };
        if needs_openai && self.openai_api_key.is_none() {
            missing.push(OPENAI_API_KEY_ENV.to_string());
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: LlmBackend, key: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            database_path: ":memory:".to_string(),
            artifact_dir: PathBuf::from("."),
            openai_api_key: key.map(str::to_string),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            llm_backend: backend,
            llm_model: "test".to_string(),
            ollama_host: "localhost".to_string(),
            ollama_port: 11434,
            dbscan: DbscanParams::default(),
            concurrency: 1,
            request_timeout: Duration::from_secs(1),
            max_embed_chars: MAX_EMBED_CHARS,
        }
    }

    #[test]
    fn test_vectorize_requires_openai_key() {
        let cfg = config(LlmBackend::Ollama, None);
        assert_eq!(cfg.missing_credentials(Stage::Vectorize), vec![OPENAI_API_KEY_ENV]);
        assert!(cfg.missing_credentials(Stage::Synthesize).is_empty());
    }

    #[test]
    fn test_openai_backend_needs_key_for_synthesis() {
        let cfg = config(LlmBackend::OpenAI, None);
        assert_eq!(cfg.missing_credentials(Stage::Synthesize), vec![OPENAI_API_KEY_ENV]);
        assert!(cfg.missing_credentials(Stage::Group).is_empty());
        assert!(cfg.missing_credentials(Stage::Reconcile).is_empty());
    }

    #[test]
    fn test_generation_limits_cover_retries() {
        let cfg = config(LlmBackend::OpenAI, None);
        let limits = cfg.generation_limits();
        assert_eq!(limits.timeout, Duration::from_secs(3 + 8));
        assert_eq!(cfg.request_limits().timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_key_present_satisfies_everything() {
        let cfg = config(LlmBackend::OpenAI, Some("sk-test"));
        for stage in Stage::ALL {
            assert!(cfg.missing_credentials(stage).is_empty());
        }
    }
}
