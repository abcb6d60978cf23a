use anyhow::{anyhow, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use tracing::debug;

use crate::traits::EmbeddingProvider;
use crate::TARGET_VECTOR;

/// Embeddings from the OpenAI embeddings endpoint.
#[derive(Clone, Debug)]
pub struct OpenAIEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIEmbedder {
    pub fn new(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl EmbeddingProvider for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(text.to_string())
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding data returned"))?
            .embedding;

        debug!(target: TARGET_VECTOR, "Received {}-dimensional embedding from {}", embedding.len(), self.model);
        Ok(embedding)
    }
}
