/// End-to-end retrieval against a file-backed SQLite database.
///
/// These tests cover the full path from note and edge writes through query
/// expansion, spreading activation, FTS5 ranking and the dual-channel merge,
/// including persistence across reopen.
use anyhow::Result;
use notegraph::{
    Database, EdgeCandidate, ExpansionConfig, HierarchyKind, NoteService, QueryExpander,
    RetrievalConfig, SkipReason, SqliteGraphStore, TagSource,
};
use tempfile::tempdir;
use time::OffsetDateTime;

/// A small machine-learning vocabulary:
///
/// ```text
/// attention --partitive--> transformer --generic--> neural-network --generic--> machine-learning
/// ```
fn seed_vocabulary(service: &NoteService) -> Result<()> {
    service.create_note(
        "Scaled dot-product attention walkthrough",
        Some(&["attention"]),
    )?;
    service.create_note("Reading the transformer paper", Some(&["transformer"]))?;
    service.create_note("Backpropagation by hand", Some(&["neural-network"]))?;
    service.create_note("Bias and variance", Some(&["machine-learning"]))?;
    service.create_note("Feeding the sourdough starter", Some(&["baking"]))?;

    let attention = service.get_or_create_tag("attention")?;
    let transformer = service.get_or_create_tag("transformer")?;
    let network = service.get_or_create_tag("neural-network")?;
    let ml = service.get_or_create_tag("machine-learning")?;

    service.create_edges_batch(&[
        EdgeCandidate::new(attention, transformer, 0.9).hierarchy_kind(HierarchyKind::Partitive),
        EdgeCandidate::new(transformer, network, 0.9).hierarchy_kind(HierarchyKind::Generic),
        EdgeCandidate::new(network, ml, 0.8).hierarchy_kind(HierarchyKind::Generic),
    ])?;
    service.create_alias("ml", ml, TagSource::User, 1.0, None)?;

    Ok(())
}

#[test]
fn search_survives_reopen_of_file_database() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("notes.db");

    {
        let service = NoteService::new(Database::open(&path)?);
        seed_vocabulary(&service)?;
    }

    let service = NoteService::new(Database::open(&path)?);
    let response = service.search("transformer", 10)?;

    assert_eq!(response.metadata.graph_skipped, None);
    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].note.content(), "Reading the transformer paper");
    assert!(response.results[0].found_by_both);
    assert!(
        response
            .results
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.relevance_score))
    );
    assert!(
        response
            .results
            .iter()
            .all(|r| r.note.content() != "Feeding the sourdough starter")
    );

    Ok(())
}

#[test]
fn alias_query_expands_to_canonical_tag() -> Result<()> {
    let dir = tempdir()?;
    let service = NoteService::new(Database::open(dir.path().join("notes.db"))?);
    seed_vocabulary(&service)?;

    let store = SqliteGraphStore::new(service.database().connection());
    let config = ExpansionConfig::default();
    let terms = QueryExpander::new(&store, &config).expand("ML", None, OffsetDateTime::now_utc())?;

    let ml = service.find_tag("machine-learning")?.expect("tag exists").id();
    assert_eq!(terms.seeds().len(), 1);
    assert_eq!(terms.weight(ml), Some(1.0));

    Ok(())
}

#[test]
fn short_queries_pull_broader_concepts_and_long_queries_do_not() -> Result<()> {
    let dir = tempdir()?;
    let service = NoteService::new(Database::open(dir.path().join("notes.db"))?);
    seed_vocabulary(&service)?;

    let store = SqliteGraphStore::new(service.database().connection());
    let config = ExpansionConfig::default();
    let expander = QueryExpander::new(&store, &config);
    let network = service.find_tag("neural-network")?.expect("tag exists").id();
    let now = OffsetDateTime::now_utc();

    let short = expander.expand("transformer architectures", None, now)?;
    assert_eq!(short.weight(network), Some(0.5));

    let long = expander.expand("transformer architectures for long documents", None, now)?;
    assert_eq!(long.weight(network), None);

    Ok(())
}

#[test]
fn related_notes_follow_the_hierarchy() -> Result<()> {
    let dir = tempdir()?;
    let service = NoteService::new(Database::open(dir.path().join("notes.db"))?);
    seed_vocabulary(&service)?;

    let paper = service
        .search("transformer", 1)?
        .results
        .into_iter()
        .next()
        .expect("transformer note is found")
        .note;

    let related = service.related_to_note(paper.id(), 10)?;

    let contents: Vec<&str> = related.iter().map(|r| r.note.content()).collect();
    assert!(contents.contains(&"Backpropagation by hand"));
    assert!(contents.contains(&"Scaled dot-product attention walkthrough"));
    assert!(!contents.contains(&"Reading the transformer paper"));
    assert!(!contents.contains(&"Feeding the sourdough starter"));
    assert!((related[0].relevance_score - 1.0).abs() < 1e-9);

    Ok(())
}

#[test]
fn unlinking_every_edge_returns_search_to_keyword_only() -> Result<()> {
    let dir = tempdir()?;
    let service = NoteService::new(Database::open(dir.path().join("notes.db"))?);
    seed_vocabulary(&service)?;

    let attention = service.find_tag("attention")?.expect("tag exists").id();
    let transformer = service.find_tag("transformer")?.expect("tag exists").id();
    let network = service.find_tag("neural-network")?.expect("tag exists").id();
    let ml = service.find_tag("machine-learning")?.expect("tag exists").id();

    assert!(service.delete_edge(attention, transformer)?);
    assert!(service.delete_edge(transformer, network)?);
    assert!(service.delete_edge(network, ml)?);

    for name in ["attention", "transformer", "neural-network", "machine-learning"] {
        let tag = service.find_tag(name)?.expect("tag exists");
        assert_eq!(tag.degree_centrality(), 0, "{name} should have no edges left");
    }

    let response = service.search("transformer", 10)?;
    assert_eq!(response.metadata.graph_skipped, Some(SkipReason::ColdStart));
    assert_eq!(response.results.len(), 1);

    Ok(())
}

#[test]
fn graph_only_search_finds_notes_without_keyword_overlap() -> Result<()> {
    let dir = tempdir()?;
    let db = Database::open(dir.path().join("notes.db"))?;
    let service = NoteService::with_config(db, RetrievalConfig::default())?;
    seed_vocabulary(&service)?;

    let results = service.graph_search("attention", 10)?;

    let contents: Vec<&str> = results.iter().map(|r| r.note.content()).collect();
    assert_eq!(contents[0], "Scaled dot-product attention walkthrough");
    assert!(contents.contains(&"Reading the transformer paper"));
    assert!(results.iter().all(|r| r.keyword_score.is_none()));

    Ok(())
}
