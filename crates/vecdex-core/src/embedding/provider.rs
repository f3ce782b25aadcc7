//! The terminal stage of the embedding pipeline: an OpenAI-compatible HTTP
//! embeddings endpoint (§4.2).

use super::{BatchEmbedResult, EmbedResult, EmbeddingPipeline};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Speaks `POST {base_url}/embeddings` in the OpenAI request/response
/// shape.
pub struct ProviderHttp {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: Option<usize>,
}

impl ProviderHttp {
    /// Builds a provider client. `base_url` must not have a trailing slash.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimensions: Option<usize>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            dimensions,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequestBody<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Deserialize)]
struct EmbeddingResponseBody {
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    usage: Usage,
}

#[async_trait]
impl EmbeddingPipeline for ProviderHttp {
    async fn embed(&self, text: &str) -> Result<EmbedResult> {
        let texts = vec![text.to_string()];
        let batch = self.batch_embed(&texts).await?;
        Ok(EmbedResult {
            embedding: batch.embeddings.into_iter().next().unwrap_or_default(),
            prompt_tokens: batch.prompt_tokens,
            total_tokens: batch.total_tokens,
        })
    }

    async fn batch_embed(&self, texts: &[String]) -> Result<BatchEmbedResult> {
        let body = EmbeddingRequestBody {
            model: &self.model,
            input: texts,
            encoding_format: "float",
            user: None,
            dimensions: self.dimensions,
        };

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::EmbeddingProviderError(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::RateLimited(detail));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingProviderError(format!(
                "embedding provider returned {status}: {detail}"
            )));
        }

        let parsed: EmbeddingResponseBody = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingProviderError(e.to_string()))?;

        let mut embeddings = vec![Vec::new(); parsed.data.len()];
        for datum in parsed.data {
            if let Some(slot) = embeddings.get_mut(datum.index) {
                *slot = datum.embedding;
            }
        }

        Ok(BatchEmbedResult {
            embeddings,
            prompt_tokens: parsed.usage.prompt_tokens,
            total_tokens: parsed.usage.total_tokens,
        })
    }
}
