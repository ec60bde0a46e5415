//! Application wiring for Crowdspace.
//
// Ties configuration, the SQLite store, the embedding provider and the search
// pipeline together for the HTTP server and the CLI.

use std::sync::Arc;

use anyhow::{Context, Result};
use embed::{Embedder, GeminiEmbedder};
use log::info;
use search::SemanticSearch;

pub mod config;
pub mod directory;

pub use config::CrowdspaceConfig;
pub use directory::{
	BackerInput, CreatorInput, DirectoryError, DirectoryService, PledgeInput, ProjectInput, ReembedEvent,
	ReembedReport, DEFAULT_REEMBED_DELAY,
};
pub use store::SqliteStore;

/// Shared handles used by every entry point.
#[derive(Clone)]
pub struct Crowdspace {
	pub store: Arc<SqliteStore>,
	pub search: Arc<SemanticSearch>,
	pub directory: DirectoryService,
}

impl Crowdspace {
	/// Assemble the application from an already opened store and an embedder.
	pub fn new(store: Arc<SqliteStore>, embedder: Arc<dyn Embedder>, config: &CrowdspaceConfig) -> Self {
		let search = SemanticSearch::new(embedder.clone(), store.clone()).with_options(config.search_options());
		let directory = DirectoryService::new(store.clone(), embedder);
		Self { store, search: Arc::new(search), directory }
	}

	/// Open the configured database and build the Gemini embedder.
	///
	/// A missing API key is not an error here; embedding calls fail with a
	/// configuration error instead, so directory reads keep working.
	pub fn open(config: &CrowdspaceConfig) -> Result<Self> {
		let data_dir = config.data_dir();
		let store = SqliteStore::open(&data_dir)
			.with_context(|| format!("Failed to open store at {}", data_dir.display()))?;
		let embedder = GeminiEmbedder::new(config.gemini_options())?;
		info!("using embedding model {} with data at {}", embedder.model_name(), data_dir.display());
		Ok(Self::new(Arc::new(store), Arc::new(embedder), config))
	}
}
