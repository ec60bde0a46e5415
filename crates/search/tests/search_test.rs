use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use embed::{format_project_text, EmbedError, Embedder};
use search::{project_text, SearchError, SearchOptions, SemanticSearch};
use store::{
    Candidate, NewCreator, NewProject, Platform, Project, ProjectCorpus, ProjectFilter, SqliteStore,
    Status,
};

/// Returns canned vectors keyed by a substring of the input, counting calls.
struct ScriptedEmbedder {
    calls: AtomicUsize,
    vectors: Vec<(&'static str, Vec<f32>)>,
    failing: Vec<&'static str>,
}

impl ScriptedEmbedder {
    fn new(vectors: Vec<(&'static str, Vec<f32>)>) -> Self {
        Self { calls: AtomicUsize::new(0), vectors, failing: Vec::new() }
    }

    fn failing_on(mut self, marker: &'static str) -> Self {
        self.failing.push(marker);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|m| text.contains(m)) {
            return Err(EmbedError::Provider("scripted failure".to_string()));
        }
        self.vectors
            .iter()
            .find(|(marker, _)| text.contains(marker))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| EmbedError::Provider(format!("no vector scripted for '{text}'")))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// In-memory corpus recording write-backs.
#[derive(Default)]
struct MemoryCorpus {
    candidates: Vec<Candidate>,
    writes: Mutex<HashMap<i64, Vec<f32>>>,
}

#[async_trait]
impl ProjectCorpus for MemoryCorpus {
    async fn list_candidates(&self, filter: &ProjectFilter) -> Result<Vec<Candidate>> {
        Ok(self
            .candidates
            .iter()
            .filter(|c| filter.status.map_or(true, |s| c.project.status == s))
            .filter(|c| filter.platform.map_or(true, |p| c.project.platform == p))
            .filter(|c| filter.category.as_ref().map_or(true, |k| c.project.category.as_ref() == Some(k)))
            .cloned()
            .collect())
    }

    async fn set_embedding(&self, project_id: i64, embedding: &[f32]) -> Result<()> {
        self.writes.lock().unwrap().insert(project_id, embedding.to_vec());
        Ok(())
    }
}

fn project(id: i64, title: &str, status: Status) -> Project {
    Project {
        id,
        creator_id: 1,
        creator_name: "Maker".to_string(),
        title: title.to_string(),
        description: format!("{title} description"),
        category: Some("Games".to_string()),
        platform: Platform::Kickstarter,
        status,
        url: "https://example.com".to_string(),
        launch_date: None,
        end_date: None,
        goal_amount: None,
        currency: "USD".to_string(),
        created_at: "2024-01-01T00:00:00.000Z".to_string(),
        total_pledged: 0.0,
        backer_count: 0,
        average_pledge: None,
    }
}

fn candidate(id: i64, title: &str, embedding: Option<Vec<f32>>) -> Candidate {
    Candidate { project: project(id, title, Status::Going), embedding }
}

#[tokio::test]
async fn test_empty_query_is_rejected_without_provider_call() {
    let embedder = Arc::new(ScriptedEmbedder::new(vec![]));
    let corpus = Arc::new(MemoryCorpus::default());
    let engine = SemanticSearch::new(embedder.clone(), corpus);

    for query in ["", "   ", "\n\t"] {
        let err = engine.search(query, &ProjectFilter::default()).await.unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
    }
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_query_embedding_failure_fails_search() {
    let embedder = Arc::new(ScriptedEmbedder::new(vec![]).failing_on("boardgame"));
    let corpus = Arc::new(MemoryCorpus::default());
    let engine = SemanticSearch::new(embedder, corpus);

    let err = engine.search("boardgame", &ProjectFilter::default()).await.unwrap_err();
    assert!(matches!(err, SearchError::Embedding(EmbedError::Provider(_))));
}

#[tokio::test]
async fn test_ranks_and_thresholds_cached_candidates() {
    let embedder = Arc::new(ScriptedEmbedder::new(vec![("query", vec![1.0, 0.0])]));
    let corpus = Arc::new(MemoryCorpus {
        candidates: vec![
            candidate(1, "Orthogonal", Some(vec![0.0, 1.0])),
            candidate(2, "Exact", Some(vec![2.0, 0.0])),
            candidate(3, "Close", Some(vec![1.0, 0.5])),
            candidate(4, "Mismatched", Some(vec![1.0, 0.0, 0.0])),
        ],
        ..Default::default()
    });
    let engine = SemanticSearch::new(embedder.clone(), corpus.clone());

    let results = engine.search("  query  ", &ProjectFilter::default()).await.unwrap();
    let titles: Vec<&str> = results.iter().map(|r| r.item.title.as_str()).collect();
    assert_eq!(titles, vec!["Exact", "Close"]);
    assert!((results[0].score - 1.0).abs() < 1e-6);

    // Only the query was embedded; nothing written back.
    assert_eq!(embedder.calls(), 1);
    assert!(corpus.writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_fallback_returns_top_three_when_all_below_threshold() {
    let embedder = Arc::new(ScriptedEmbedder::new(vec![("query", vec![1.0, 0.0])]));
    let candidates = (1..=5)
        .map(|id| candidate(id, &format!("P{id}"), Some(vec![0.02 * id as f32, 1.0])))
        .collect();
    let corpus = Arc::new(MemoryCorpus { candidates, ..Default::default() });
    let engine = SemanticSearch::new(embedder, corpus);

    let results = engine.search("query", &ProjectFilter::default()).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.score < 0.15));
    let ids: Vec<i64> = results.iter().map(|r| r.item.id).collect();
    assert_eq!(ids, vec![5, 4, 3]);
}

#[tokio::test]
async fn test_failed_candidate_is_skipped_not_fatal() {
    let embedder = Arc::new(
        ScriptedEmbedder::new(vec![("query", vec![1.0, 0.0]), ("Title: Good", vec![1.0, 0.1])])
            .failing_on("Title: Broken"),
    );
    let corpus = Arc::new(MemoryCorpus {
        candidates: vec![candidate(1, "Broken", None), candidate(2, "Good", None)],
        ..Default::default()
    });
    let engine = SemanticSearch::new(embedder.clone(), corpus.clone());

    let results = engine.search("query", &ProjectFilter::default()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].item.id, 2);

    let writes = corpus.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes.get(&2), Some(&vec![1.0, 0.1]));
}

#[tokio::test]
async fn test_filters_reach_the_corpus() {
    let embedder = Arc::new(ScriptedEmbedder::new(vec![("query", vec![1.0])]));
    let mut done = candidate(2, "Done", Some(vec![1.0]));
    done.project.status = Status::Completed;
    let corpus = Arc::new(MemoryCorpus {
        candidates: vec![candidate(1, "Live", Some(vec![1.0])), done],
        ..Default::default()
    });
    let engine = SemanticSearch::new(embedder, corpus);

    let filter = ProjectFilter { status: Some(Status::Completed), ..Default::default() };
    let results = engine.search("query", &filter).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].item.title, "Done");
}

#[tokio::test]
async fn test_custom_options() {
    let embedder = Arc::new(ScriptedEmbedder::new(vec![("query", vec![1.0, 0.0])]));
    let candidates = (1..=5).map(|id| candidate(id, &format!("P{id}"), Some(vec![1.0, 0.0]))).collect();
    let corpus = Arc::new(MemoryCorpus { candidates, ..Default::default() });
    let engine = SemanticSearch::new(embedder, corpus)
        .with_options(SearchOptions { max_results: 5, min_score: 0.5 });

    let results = engine.search("query", &ProjectFilter::default()).await.unwrap();
    assert_eq!(results.len(), 5);
    // Stable order for equal scores
    let ids: Vec<i64> = results.iter().map(|r| r.item.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_lazy_embedding_is_computed_once_and_cached() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let creator = store
        .create_creator(&NewCreator { name: "Orbit Lab".to_string(), bio: None, location: None, website: None })
        .unwrap();
    let created = store
        .create_project(&NewProject {
            creator_id: creator.id,
            title: "Telescope".to_string(),
            description: "Stargazing for everyone".to_string(),
            category: Some("Tech".to_string()),
            platform: Platform::Indiegogo,
            status: Status::Going,
            url: "https://example.com/scope".to_string(),
            launch_date: None,
            end_date: None,
            goal_amount: None,
            currency: "USD".to_string(),
            total_pledged: 0.0,
            backer_count: 0,
        })
        .unwrap();

    // The project's canonical text includes the joined creator name.
    let text = format_project_text(&project_text(&created));
    assert!(text.starts_with("Title: Telescope. Creator: Orbit Lab. Category: Tech."));

    let embedder = Arc::new(ScriptedEmbedder::new(vec![
        ("stars", vec![0.9, 0.1]),
        ("Title: Telescope", vec![1.0, 0.0]),
    ]));
    let engine = SemanticSearch::new(embedder.clone(), store.clone());

    let first = engine.search("stars", &ProjectFilter::default()).await.unwrap();
    assert_eq!(first.len(), 1);
    // query + one project
    assert_eq!(embedder.calls(), 2);
    assert_eq!(store.embedded_count().unwrap(), 1);

    let second = engine.search("stars", &ProjectFilter::default()).await.unwrap();
    assert_eq!(second.len(), 1);
    // only the query again
    assert_eq!(embedder.calls(), 3);
    assert_eq!(first[0].score, second[0].score);
}

#[tokio::test]
async fn test_scored_project_serializes_flat() {
    let scored = search::Scored { item: project(7, "Flat", Status::Upcoming), score: 0.5 };
    let json = serde_json::to_value(&scored).unwrap();
    assert_eq!(json["id"], 7);
    assert_eq!(json["status"], "upcoming");
    assert_eq!(json["score"], 0.5);
}
