//! Read-through resolution of per-project embeddings.

use embed::{Embedder, ProjectText};
use log::warn;
use store::{Candidate, Project, ProjectCorpus};

/// The embedding inputs of a stored project.
pub fn project_text(project: &Project) -> ProjectText<'_> {
	ProjectText {
		title: &project.title,
		description: &project.description,
		category: project.category.as_deref(),
		creator_name: Some(&project.creator_name),
	}
}

/// Pair every candidate with a vector, computing and persisting missing ones.
///
/// Candidates whose embedding cannot be computed are logged and left out.
/// A failed write-back is logged but the fresh vector is still used.
pub async fn resolve_embeddings(
	embedder: &dyn Embedder,
	corpus: &dyn ProjectCorpus,
	candidates: Vec<Candidate>,
) -> Vec<(Project, Vec<f32>)> {
	let mut resolved = Vec::with_capacity(candidates.len());

	for Candidate { project, embedding } in candidates {
		let vector = match embedding {
			Some(vector) => vector,
			None => match embedder.embed_project(&project_text(&project)).await {
				Ok(vector) => {
					if let Err(e) = corpus.set_embedding(project.id, &vector).await {
						warn!("failed to cache embedding for project {}: {:#}", project.id, e);
					}
					vector
				}
				Err(e) => {
					warn!("skipping project {} ({}): {}", project.id, project.title, e);
					continue;
				}
			},
		};
		resolved.push((project, vector));
	}

	resolved
}
