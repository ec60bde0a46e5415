use embed::{DummyEmbedder, EmbedError, Embedder, ProjectText};

#[tokio::test]
async fn test_dummy_embedder_dimension() {
    let embedder = DummyEmbedder::default();
    let vec = embedder.embed("hello world").await.unwrap();
    assert_eq!(vec.len(), 64);
    assert!(vec.iter().any(|&x| x != 0.0), "Embedding should not be all zeros");
}

#[tokio::test]
async fn test_dummy_embedder_rejects_blank_text() {
    let embedder = DummyEmbedder::default();
    let err = embedder.embed("   ").await.unwrap_err();
    assert!(matches!(err, EmbedError::Validation(_)));
}

#[tokio::test]
async fn test_embed_project_is_deterministic() {
    let embedder = DummyEmbedder::new(32);
    let project = ProjectText {
        title: "Pocket Telescope",
        description: "A foldable telescope for city astronomers.",
        category: Some("Technology"),
        creator_name: Some("Orbit Lab"),
    };
    let first = embedder.embed_project(&project).await.unwrap();
    let second = embedder.embed_project(&project).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_embed_project_without_text_fails_validation() {
    let embedder = DummyEmbedder::default();
    let project = ProjectText {
        title: "",
        description: " ",
        category: None,
        creator_name: None,
    };
    let err = embedder.embed_project(&project).await.unwrap_err();
    assert!(matches!(err, EmbedError::Validation(_)));
}
