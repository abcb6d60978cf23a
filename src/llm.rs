use anyhow::{anyhow, Result};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::models::ModelOptions as GenerationOptions;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::{LlmBackend, PipelineConfig, LLM_MAX_RETRIES};
use crate::traits::{CompletionRequest, TextGenerator};
use crate::{LLMClient, LLMParams, TARGET_LLM_REQUEST};

impl LLMParams {
    /// Builds generation parameters for the configured backend.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let llm_client = match config.llm_backend {
            LlmBackend::Ollama => LLMClient::Ollama(ollama_rs::Ollama::new(
                format!("http://{}", config.ollama_host),
                config.ollama_port,
            )),
            LlmBackend::OpenAI => {
                let openai_config = async_openai::config::OpenAIConfig::new()
                    .with_api_key(config.openai_api_key.clone().unwrap_or_default());
                LLMClient::OpenAI(async_openai::Client::with_config(openai_config))
            }
        };

        LLMParams {
            llm_client,
            model: config.llm_model.clone(),
            max_retries: LLM_MAX_RETRIES,
            timeout_secs: config.request_timeout.as_secs().max(1),
        }
    }
}

/// Text generation backed by either Ollama or the OpenAI chat API.
#[derive(Clone)]
pub struct LlmGenerator {
    params: LLMParams,
}

impl LlmGenerator {
    pub fn new(params: LLMParams) -> Self {
        Self { params }
    }
}

impl TextGenerator for LlmGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        generate_llm_response(request, &self.params).await
    }
}

async fn request_once(request: &CompletionRequest, params: &LLMParams) -> Result<String> {
    match &params.llm_client {
        LLMClient::Ollama(ollama) => {
            // Ollama's completion endpoint takes one prompt, so the instruction leads it
            let prompt = format!("{}\n\n{}", request.system, request.prompt);
            let mut generation = GenerationRequest::new(params.model.clone(), prompt);
            generation.options = Some(
                GenerationOptions::default()
                    .temperature(request.temperature)
                    .num_predict(request.max_tokens as i32),
            );
            let response = ollama.generate(generation).await?;
            Ok(response.response)
        }
        LLMClient::OpenAI(client) => {
            let messages: Vec<ChatCompletionRequestMessage> = vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system.clone())
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.prompt.clone())
                    .build()?
                    .into(),
            ];
            let chat = CreateChatCompletionRequestArgs::default()
                .model(params.model.clone())
                .messages(messages)
                .max_completion_tokens(request.max_tokens)
                .temperature(request.temperature)
                .build()?;

            let response = client.chat().create(chat).await?;
            Ok(response
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
                .unwrap_or_default())
        }
    }
}

/// Sends a generation request, retrying with exponential backoff on errors and timeouts.
///
/// An empty completion is returned as-is: deciding what to do with it is the
/// caller's business. Only exhausted retries produce an error.
pub async fn generate_llm_response(
    request: &CompletionRequest,
    params: &LLMParams,
) -> Result<String> {
    let max_retries = params.max_retries.max(1);
    let mut backoff = 2;

    debug!(target: TARGET_LLM_REQUEST, "Starting LLM response generation with model {}: {}", params.model, request.prompt);

    for retry_count in 0..max_retries {
        match timeout(
            Duration::from_secs(params.timeout_secs),
            request_once(request, params),
        )
        .await
        {
            Ok(Ok(response_text)) => {
                debug!(target: TARGET_LLM_REQUEST, "LLM response received: {}", response_text);
                return Ok(clean_response(&response_text));
            }
            Ok(Err(e)) => {
                warn!(target: TARGET_LLM_REQUEST, "Error generating response: {}", e);
            }
            Err(_) => {
                warn!(target: TARGET_LLM_REQUEST, "LLM request timed out after {}s", params.timeout_secs);
            }
        }

        if retry_count < max_retries - 1 {
            info!(target: TARGET_LLM_REQUEST, "Retrying LLM request in {}s... ({}/{})", backoff, retry_count + 1, max_retries);
            sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }

    error!(target: TARGET_LLM_REQUEST, "Failed to generate response after {} attempts", max_retries);
    Err(anyhow!(
        "no response from {} after {} attempts",
        params.model,
        max_retries
    ))
}

fn think_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think pattern"))
}

/// Strips reasoning blocks emitted by thinking models and surrounding whitespace.
pub fn clean_response(text: &str) -> String {
    think_block_pattern().replace_all(text, "").trim().to_string()
}
