pub mod clustering;
pub mod config;
pub mod db;
pub mod environment;
pub mod error;
pub mod ingest;
pub mod issue;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod reconcile;
pub mod traits;
pub mod types;
pub mod vector;

use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use ollama_rs::Ollama;

pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_DB: &str = "db_query";
pub const TARGET_VECTOR: &str = "article-embeddings";
pub const TARGET_PIPELINE: &str = "pipeline";

#[derive(Clone, Debug)]
pub enum LLMClient {
    Ollama(Ollama),
    OpenAI(OpenAIClient<OpenAIConfig>),
}

#[derive(Clone)]
pub struct LLMParams {
    pub llm_client: LLMClient,
    pub model: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

pub use error::PipelineError;
pub use types::*;
