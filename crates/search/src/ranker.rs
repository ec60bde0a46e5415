//! Cosine scoring and result selection.

use serde::Serialize;

/// Number of results returned by default.
pub const DEFAULT_MAX_RESULTS: usize = 3;
/// Scores below this are treated as unrelated.
pub const DEFAULT_MIN_SCORE: f32 = 0.15;

/// Cap and threshold applied after ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
	pub max_results: usize,
	pub min_score: f32,
}

impl Default for SearchOptions {
	fn default() -> Self {
		Self {
			max_results: DEFAULT_MAX_RESULTS,
			min_score: DEFAULT_MIN_SCORE,
		}
	}
}

/// An item annotated with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored<T> {
	#[serde(flatten)]
	pub item: T,
	pub score: f32,
}

/// Cosine similarity of two vectors.
///
/// Vectors of different length, with a zero norm, or containing non-finite
/// components score 0 instead of failing the search.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() {
		return 0.0;
	}

	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

	let denominator = norm_a * norm_b;
	if denominator == 0.0 {
		return 0.0;
	}
	let score = dot / denominator;
	if !score.is_finite() {
		return 0.0;
	}
	score.clamp(-1.0, 1.0)
}

/// Score every item against `query` and sort best first.
///
/// The sort is stable: equal scores keep their input order.
pub fn rank_by_similarity<T>(query: &[f32], items: Vec<(T, Vec<f32>)>) -> Vec<Scored<T>> {
	let mut scored: Vec<Scored<T>> = items
		.into_iter()
		.map(|(item, vector)| Scored {
			score: cosine_similarity(query, &vector),
			item,
		})
		.collect();
	scored.sort_by(|a, b| b.score.total_cmp(&a.score));
	scored
}

/// Keep the top `max_results` entries that reach `min_score`.
///
/// When none of them does, the top `max_results` are returned anyway so a
/// non-empty corpus never yields an empty page.
pub fn select_top<T>(ranked: Vec<Scored<T>>, options: &SearchOptions) -> Vec<Scored<T>> {
	let top: Vec<Scored<T>> = ranked.into_iter().take(options.max_results).collect();
	if top.iter().any(|s| s.score >= options.min_score) {
		top.into_iter().filter(|s| s.score >= options.min_score).collect()
	} else {
		top
	}
}
