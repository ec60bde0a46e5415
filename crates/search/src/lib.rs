//! Semantic project search for Crowdspace.
//
// Embeds the query, resolves cached project vectors, ranks by cosine
// similarity and trims the list with a cap + threshold.

use std::sync::Arc;

use embed::{EmbedError, Embedder};
use log::debug;
use store::{Project, ProjectCorpus, ProjectFilter};
use thiserror::Error;

mod cache;
mod ranker;

pub use cache::{project_text, resolve_embeddings};
pub use ranker::{
	cosine_similarity, rank_by_similarity, select_top, Scored, SearchOptions, DEFAULT_MAX_RESULTS,
	DEFAULT_MIN_SCORE,
};

/// A project annotated with its similarity score.
pub type ScoredProject = Scored<Project>;

/// Errors that fail a whole search.
#[derive(Debug, Error)]
pub enum SearchError {
	/// Missing or blank query.
	#[error("{0}")]
	Validation(String),
	/// The query itself could not be embedded.
	#[error(transparent)]
	Embedding(#[from] EmbedError),
	/// Candidates could not be read.
	#[error(transparent)]
	Storage(#[from] anyhow::Error),
}

/// Query + filter pipeline over a project corpus.
pub struct SemanticSearch {
	embedder: Arc<dyn Embedder>,
	corpus: Arc<dyn ProjectCorpus>,
	options: SearchOptions,
}

impl SemanticSearch {
	pub fn new(embedder: Arc<dyn Embedder>, corpus: Arc<dyn ProjectCorpus>) -> Self {
		Self { embedder, corpus, options: SearchOptions::default() }
	}

	pub fn with_options(mut self, options: SearchOptions) -> Self {
		self.options = options;
		self
	}

	pub fn options(&self) -> &SearchOptions {
		&self.options
	}

	/// Run a search. The query is validated before any provider call; a
	/// failure to embed a single candidate only drops that candidate.
	pub async fn search(&self, query: &str, filter: &ProjectFilter) -> Result<Vec<ScoredProject>, SearchError> {
		let query = query.trim();
		if query.is_empty() {
			return Err(SearchError::Validation("query parameter is required".to_string()));
		}

		let query_embedding = self.embedder.embed(query).await?;
		let candidates = self.corpus.list_candidates(filter).await?;
		let total = candidates.len();

		let resolved = resolve_embeddings(self.embedder.as_ref(), self.corpus.as_ref(), candidates).await;
		if resolved.len() < total {
			debug!("{} of {} candidates skipped without an embedding", total - resolved.len(), total);
		}

		let ranked = rank_by_similarity(&query_embedding, resolved);
		let results = select_top(ranked, &self.options);
		debug!("search '{}' -> {} result(s) from {} candidate(s)", query, results.len(), total);
		Ok(results)
	}
}
