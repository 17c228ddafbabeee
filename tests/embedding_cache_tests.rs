// tests/embedding_cache_tests.rs
mod common;

use std::time::Duration;

use common::{test_embedding_config, FakeEmbedder};
use poi_linker_lib::services::embed_services::EmbeddingService;
use poi_linker_lib::services::retry::RecordingSleeper;
use poi_linker_lib::{EmbeddingCache, MatchError};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_only_missing_names_are_embedded_in_one_batch() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut cache = EmbeddingCache::open(dir.path(), "r1").unwrap();
        cache.insert("Acme", &FakeEmbedder::vector_for("Acme")).unwrap();
        cache.insert("Bolt", &FakeEmbedder::vector_for("Bolt")).unwrap();
        cache.persist().unwrap();
    }

    let embedder = FakeEmbedder::new();
    let sleeper = RecordingSleeper::new();
    let service = EmbeddingService::from_config(&embedder, &sleeper, &test_embedding_config(10));

    let wanted = names(&["Acme", "Cord", "Bolt", "Dent", "Edge"]);
    let mut cache = EmbeddingCache::open(dir.path(), "r1").unwrap();
    let vectors = cache.get_vectors(&wanted, &service).unwrap();

    assert_eq!(embedder.calls(), vec![names(&["Cord", "Dent", "Edge"])]);
    assert_eq!(vectors.len(), 5);
    for (name, vector) in wanted.iter().zip(vectors.iter()) {
        assert_eq!(vector, &FakeEmbedder::vector_for(name), "{}", name);
    }

    let reopened = EmbeddingCache::open(dir.path(), "r1").unwrap();
    assert_eq!(reopened.len(), 5);
    assert!(wanted.iter().all(|n| reopened.contains(n)));
    // only the inter-batch pause, no retries
    assert_eq!(sleeper.recorded(), vec![Duration::from_millis(100)]);
}

#[test]
fn test_fully_cached_region_makes_no_calls() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = FakeEmbedder::new();
    let sleeper = RecordingSleeper::new();
    let service = EmbeddingService::from_config(&embedder, &sleeper, &test_embedding_config(10));

    let wanted = names(&["Acme", "Bolt"]);
    EmbeddingCache::open(dir.path(), "r1")
        .unwrap()
        .get_vectors(&wanted, &service)
        .unwrap();
    assert_eq!(embedder.calls().len(), 1);

    EmbeddingCache::open(dir.path(), "r1")
        .unwrap()
        .get_vectors(&wanted, &service)
        .unwrap();
    assert_eq!(embedder.calls().len(), 1);
}

#[test]
fn test_completed_batches_survive_a_failed_batch() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = FakeEmbedder::failing_on(&["Edge"]);
    let sleeper = RecordingSleeper::new();
    let service = EmbeddingService::from_config(&embedder, &sleeper, &test_embedding_config(2));

    let wanted = names(&["Acme", "Bolt", "Cord", "Dent", "Edge"]);
    let mut cache = EmbeddingCache::open(dir.path(), "r1").unwrap();
    let err = cache.get_vectors(&wanted, &service).unwrap_err();
    match err {
        MatchError::RetriesExhausted { batch, attempts, .. } => {
            assert_eq!(batch, 3);
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error {:?}", other),
    }

    // two pauses after good batches, one backoff before the final attempt
    assert_eq!(
        sleeper.recorded(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(100),
            Duration::from_secs(5)
        ]
    );

    let reopened = EmbeddingCache::open(dir.path(), "r1").unwrap();
    assert_eq!(reopened.names(), &names(&["Acme", "Bolt", "Cord", "Dent"])[..]);
}

#[test]
fn test_duplicate_requests_are_embedded_once() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = FakeEmbedder::new();
    let sleeper = RecordingSleeper::new();
    let service = EmbeddingService::from_config(&embedder, &sleeper, &test_embedding_config(10));

    let wanted = names(&["Acme", "Acme", "Bolt"]);
    let vectors = EmbeddingCache::open(dir.path(), "r1")
        .unwrap()
        .get_vectors(&wanted, &service)
        .unwrap();
    assert_eq!(vectors.len(), 3);
    assert_eq!(embedder.embedded_names(), names(&["Acme", "Bolt"]));
}
