//! Remote embedder backed by Google's `embedContent` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{EmbedError, Embedder};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "text-embedding-004";

/// Connection settings for [`GeminiEmbedder`].
#[derive(Debug, Clone)]
pub struct GeminiOptions {
	pub base_url: String,
	pub model: String,
	/// Missing keys are reported on each call, not at construction.
	pub api_key: Option<String>,
	pub timeout: Duration,
}

impl Default for GeminiOptions {
	fn default() -> Self {
		Self {
			base_url: DEFAULT_BASE_URL.to_string(),
			model: DEFAULT_MODEL.to_string(),
			api_key: None,
			timeout: Duration::from_secs(30),
		}
	}
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
	model: String,
	content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
	parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
	text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
	embedding: Option<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
	values: Option<Vec<f32>>,
}

/// Embedder that calls the Generative Language API over HTTPS.
pub struct GeminiEmbedder {
	client: reqwest::Client,
	options: GeminiOptions,
}

impl GeminiEmbedder {
	pub fn new(options: GeminiOptions) -> Result<Self, EmbedError> {
		let client = reqwest::Client::builder()
			.timeout(options.timeout)
			.build()
			.map_err(|e| EmbedError::Configuration(format!("http client: {}", e)))?;
		Ok(Self { client, options })
	}

	fn endpoint(&self, api_key: &str) -> String {
		format!(
			"{}/v1beta/models/{}:embedContent?key={}",
			self.options.base_url.trim_end_matches('/'),
			urlencoding::encode(&self.options.model),
			urlencoding::encode(api_key),
		)
	}
}

#[async_trait]
impl Embedder for GeminiEmbedder {
	async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
		let api_key = self
			.options
			.api_key
			.as_deref()
			.map(str::trim)
			.filter(|k| !k.is_empty())
			.ok_or_else(|| EmbedError::Configuration("GOOGLE_API_KEY is not set".to_string()))?;

		let text = text.trim();
		if text.is_empty() {
			return Err(EmbedError::Validation("text cannot be empty".to_string()));
		}

		let body = EmbedContentRequest {
			model: format!("models/{}", self.options.model),
			content: Content { parts: vec![Part { text }] },
		};

		debug!("embedding {} chars with {}", text.chars().count(), self.options.model);
		let response = self
			.client
			.post(self.endpoint(api_key))
			.json(&body)
			.send()
			.await
			.map_err(|e| EmbedError::Provider(format!("embedding request failed: {}", e)))?;

		let status = response.status();
		if !status.is_success() {
			let detail = response.text().await.unwrap_or_default();
			return Err(EmbedError::Provider(format!(
				"embedding request failed with status {}: {}",
				status.as_u16(),
				detail
			)));
		}

		let payload: EmbedContentResponse = response
			.json()
			.await
			.map_err(|e| EmbedError::Provider(format!("invalid embedding response: {}", e)))?;

		payload
			.embedding
			.and_then(|e| e.values)
			.ok_or_else(|| EmbedError::Provider("invalid embedding response: missing values".to_string()))
	}

	fn model_name(&self) -> &str {
		&self.options.model
	}
}
