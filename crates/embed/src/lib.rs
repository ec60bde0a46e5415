//! Embedding abstraction for Crowdspace.
//
// Provides a trait for turning text into vectors, the canonical text format
// for project records, and the remote provider used in production.

use async_trait::async_trait;
use thiserror::Error;

mod gemini;

pub use gemini::{GeminiEmbedder, GeminiOptions, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Descriptions longer than this many characters are cut before embedding.
pub const DESCRIPTION_CHAR_LIMIT: usize = 500;

/// Errors produced while generating an embedding.
#[derive(Debug, Error)]
pub enum EmbedError {
	/// No usable credential or client configuration.
	#[error("configuration error: {0}")]
	Configuration(String),
	/// The input cannot be embedded (e.g. empty text).
	#[error("validation error: {0}")]
	Validation(String),
	/// The remote service answered with an error or a malformed payload.
	#[error("provider error: {0}")]
	Provider(String),
}

/// Fields of a project that feed its embedding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectText<'a> {
	pub title: &'a str,
	pub description: &'a str,
	pub category: Option<&'a str>,
	pub creator_name: Option<&'a str>,
}

/// Build the canonical text for a project.
///
/// Segments come in a fixed order (title, creator, category, description),
/// empty fields are skipped and the description is capped at
/// [`DESCRIPTION_CHAR_LIMIT`] characters. Vectors already stored for other
/// projects were computed from this exact format, so it must not drift.
pub fn format_project_text(project: &ProjectText<'_>) -> String {
	let mut parts = Vec::with_capacity(4);

	let title = project.title.trim();
	if !title.is_empty() {
		parts.push(format!("Title: {}", title));
	}

	if let Some(creator) = project.creator_name.map(str::trim).filter(|s| !s.is_empty()) {
		parts.push(format!("Creator: {}", creator));
	}

	if let Some(category) = project.category.map(str::trim).filter(|s| !s.is_empty()) {
		parts.push(format!("Category: {}", category));
	}

	let description = project.description.trim();
	if !description.is_empty() {
		parts.push(format!("Description: {}", truncate_chars(description, DESCRIPTION_CHAR_LIMIT)));
	}

	parts.join(". ")
}

fn truncate_chars(text: &str, limit: usize) -> String {
	match text.char_indices().nth(limit) {
		Some((cut, _)) => format!("{}...", &text[..cut]),
		None => text.to_string(),
	}
}

/// Trait for generating embeddings from text.
#[async_trait]
pub trait Embedder: Send + Sync {
	/// Embed a single piece of text.
	async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

	/// Identifier of the model behind this embedder.
	fn model_name(&self) -> &str;

	/// Canonicalize a project record and embed it.
	async fn embed_project(&self, project: &ProjectText<'_>) -> Result<Vec<f32>, EmbedError> {
		let text = format_project_text(project);
		if text.is_empty() {
			return Err(EmbedError::Validation(
				"project must have at least a title or description".to_string(),
			));
		}
		self.embed(&text).await
	}
}

/// Offline embedder that hashes words into a small fixed-size vector.
///
/// Deterministic, so identical text always maps to identical vectors, and
/// texts sharing words point in similar directions.
pub struct DummyEmbedder {
	dim: usize,
}

impl DummyEmbedder {
	pub fn new(dim: usize) -> Self {
		Self { dim: dim.max(1) }
	}
}

impl Default for DummyEmbedder {
	fn default() -> Self {
		Self::new(64)
	}
}

#[async_trait]
impl Embedder for DummyEmbedder {
	async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
		let text = text.trim();
		if text.is_empty() {
			return Err(EmbedError::Validation("text cannot be empty".to_string()));
		}

		let mut vector = vec![0.0f32; self.dim];
		for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
			// FNV-1a
			let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
			for byte in word.to_lowercase().bytes() {
				hash ^= u64::from(byte);
				hash = hash.wrapping_mul(0x0100_0000_01b3);
			}
			vector[(hash % self.dim as u64) as usize] += 1.0;
		}
		Ok(vector)
	}

	fn model_name(&self) -> &str {
		"dummy"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample<'a>(description: &'a str) -> ProjectText<'a> {
		ProjectText {
			title: "Solar Kettle",
			description,
			category: Some("Design"),
			creator_name: Some("Ada Works"),
		}
	}

	#[test]
	fn test_format_order_and_separator() {
		let text = format_project_text(&sample("Boils water with sunlight."));
		assert_eq!(
			text,
			"Title: Solar Kettle. Creator: Ada Works. Category: Design. Description: Boils water with sunlight."
		);
	}

	#[test]
	fn test_format_skips_empty_fields() {
		let project = ProjectText {
			title: "  Board Game  ",
			description: "",
			category: Some("   "),
			creator_name: None,
		};
		assert_eq!(format_project_text(&project), "Title: Board Game");
	}

	#[test]
	fn test_description_truncation() {
		let long = "a".repeat(501);
		let text = format_project_text(&sample(&long));
		let expected = format!("Description: {}...", "a".repeat(500));
		assert!(text.ends_with(&expected));

		let exact = "b".repeat(500);
		let text = format_project_text(&sample(&exact));
		assert!(text.ends_with(&format!("Description: {}", exact)));
	}

	#[test]
	fn test_truncation_counts_characters_not_bytes() {
		let long = "é".repeat(600);
		let text = format_project_text(&sample(&long));
		let description = text.split("Description: ").nth(1).unwrap();
		assert_eq!(description.chars().count(), 503);
	}

	#[test]
	fn test_format_is_deterministic() {
		let project = sample("Same input twice");
		assert_eq!(format_project_text(&project), format_project_text(&project));
	}
}
