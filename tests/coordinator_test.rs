mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{
    build, hashing_provider, hold_lock, sqlite_stores, sqlite_stores_with_vector_db, test_cache,
    test_coordinator, FailingEmbedding, FailingGraphStore, FlakyVectorStore,
    LaggingSearchVectorStore, PatchyMemoryStore, UnreachableVectorStore,
};
use memos::config::MemosConfig;
use memos::error::MemosError;
use memos::memory::coordinator::{MemoryCoordinator, Stores};
use memos::memory::types::{Direction, NodeLabel, OperationalMode, RelType, WriteStatus};
use memos::store::{GraphStore, MemoryStore, VectorStore};
use serde_json::json;

#[tokio::test]
async fn quick_fox_is_found_by_similarity() {
    let (coordinator, _) = test_coordinator();

    let stored = coordinator
        .store_memory("The quick brown fox jumps", Some(json!({"source": "test"})), None)
        .await
        .unwrap();
    assert_eq!(stored.memory_id, 1);
    assert_eq!(stored.embedding_status, WriteStatus::Stored);
    assert_eq!(stored.graph_status, WriteStatus::Stored);
    assert_eq!(stored.concepts, vec!["Quick", "Brown", "Jumps"]);
    assert_eq!(stored.operational_mode, OperationalMode::Full);

    let response = coordinator.query_memory("quick fox", None, None).await.unwrap();
    assert!(!response.cached);
    let top = &response.memories[0];
    assert_eq!(top.id, 1);
    assert_eq!(top.content, "The quick brown fox jumps");
    assert_eq!(top.metadata["source"], "test");
    assert!(top.score > 0.1, "score was {}", top.score);
}

#[tokio::test]
async fn store_then_get_round_trips_metadata() {
    let (coordinator, _) = test_coordinator();

    let stored = coordinator
        .store_memory(
            "Deployed the billing service on Friday",
            Some(json!({" source ": "chat", "priority": 2})),
            None,
        )
        .await
        .unwrap();

    let memory = coordinator.get_memory(stored.memory_id).await.unwrap();
    assert_eq!(memory.content, "Deployed the billing service on Friday");
    assert_eq!(memory.metadata["source"], "chat");
    assert_eq!(memory.metadata["priority"], 2);
    assert_eq!(memory.embedding_ref, stored.point_id);
    assert!(memory.embedding_ref.is_some());
}

#[tokio::test]
async fn invalid_input_writes_nothing() {
    let (coordinator, stores) = test_coordinator();

    let err = coordinator.store_memory("   ", None, None).await.unwrap_err();
    assert!(matches!(err, MemosError::Validation(_)));

    let err = coordinator
        .store_memory("valid content", Some(json!(["not", "an", "object"])), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MemosError::Validation(_)));

    let err = coordinator
        .store_memory("valid content", Some(json!({"  ": 1})), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MemosError::Validation(_)));

    assert_eq!(stores.memories.count().await.unwrap(), 0);
    assert_eq!(stores.vectors.count().await.unwrap(), 0);
}

#[tokio::test]
async fn query_validation() {
    let (coordinator, _) = test_coordinator();

    let err = coordinator.query_memory("  ", None, None).await.unwrap_err();
    assert!(err.to_string().starts_with("validation error:"));

    let err = coordinator.query_memory("anything", Some(0), None).await.unwrap_err();
    assert!(matches!(err, MemosError::Validation(_)));
}

#[tokio::test]
async fn top_k_limits_results() {
    let (coordinator, _) = test_coordinator();
    for text in [
        "rust borrow checker rules",
        "rust async runtime tokio",
        "rust traits and generics",
    ] {
        coordinator.store_memory(text, None, None).await.unwrap();
    }

    let response = coordinator.query_memory("rust", Some(2), None).await.unwrap();
    assert_eq!(response.memories.len(), 2);
}

#[tokio::test]
async fn top_k_is_capped_by_max_top_k() {
    let mut config = MemosConfig::default();
    config.retrieval.default_top_k = 500;
    config.retrieval.max_top_k = 2;
    let coordinator = MemoryCoordinator::new(
        sqlite_stores(),
        hashing_provider(),
        test_cache(),
        Arc::new(config),
    );
    for text in [
        "rust borrow checker rules",
        "rust async runtime tokio",
        "rust traits and generics",
    ] {
        coordinator.store_memory(text, None, None).await.unwrap();
    }

    let response = coordinator.query_memory("rust", Some(1000), None).await.unwrap();
    assert_eq!(response.memories.len(), 2);

    let response = coordinator.query_memory("rust", None, None).await.unwrap();
    assert_eq!(response.memories.len(), 2);
}

#[tokio::test]
async fn batch_lookup_failure_falls_back_to_single_reads() {
    let inner = sqlite_stores();
    let patchy = Arc::new(PatchyMemoryStore::new(Arc::clone(&inner.memories)));
    let stores = Stores {
        memories: patchy.clone(),
        ..inner
    };
    let coordinator = build(stores, hashing_provider(), test_cache());
    for text in [
        "deploy checklist for the api",
        "deploy checklist for the web frontend",
        "lunch menu for friday",
    ] {
        coordinator.store_memory(text, None, None).await.unwrap();
    }

    let batched = coordinator.query_memory("deploy checklist", None, None).await.unwrap();
    assert!(!batched.memories.is_empty());

    patchy.batch_down.store(true, std::sync::atomic::Ordering::SeqCst);
    coordinator.cache_clear();
    let single = coordinator.query_memory("deploy checklist", None, None).await.unwrap();

    let ids = |r: &memos::memory::coordinator::QueryMemoryResponse| {
        r.memories.iter().map(|m| m.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&single), ids(&batched));
    assert!(single.memories.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn structured_failure_aborts_before_secondary_writes() {
    let inner = sqlite_stores();
    let patchy = Arc::new(PatchyMemoryStore::new(Arc::clone(&inner.memories)));
    patchy.writes_down.store(true, std::sync::atomic::Ordering::SeqCst);
    let stores = Stores {
        memories: patchy,
        ..inner
    };
    let coordinator = build(stores.clone(), hashing_provider(), test_cache());

    let err = coordinator
        .store_memory("Release notes for version two", None, None)
        .await
        .unwrap_err();
    match err {
        MemosError::Storage(reason) => assert!(reason.contains("disk I/O error"), "{reason}"),
        other => panic!("expected a storage error, got {other:?}"),
    }
    assert_eq!(stores.memories.count().await.unwrap(), 0);
    assert_eq!(stores.vectors.count().await.unwrap(), 0);
    assert_eq!(stores.graph.count().await.unwrap(), (0, 0));
}

#[tokio::test]
async fn vector_outage_keeps_the_memory() {
    let stores = Stores {
        vectors: Arc::new(UnreachableVectorStore),
        ..sqlite_stores()
    };
    let coordinator = build(stores.clone(), hashing_provider(), test_cache());

    let stored = coordinator
        .store_memory("Meeting notes about the roadmap", None, None)
        .await
        .unwrap();
    assert!(stored.embedding_status.is_failed());
    assert_eq!(stored.graph_status, WriteStatus::Stored);
    assert_eq!(stored.operational_mode, OperationalMode::Degraded);
    assert!(stored.point_id.is_none());

    let memory = coordinator.get_memory(stored.memory_id).await.unwrap();
    assert!(memory.embedding_ref.is_none());

    let response = coordinator
        .query_memory("roadmap meeting notes", None, None)
        .await
        .unwrap();
    assert!(response.memories.is_empty());
}

#[tokio::test]
async fn graph_outage_keeps_the_memory() {
    let stores = Stores {
        graph: Arc::new(FailingGraphStore),
        ..sqlite_stores()
    };
    let coordinator = build(stores, hashing_provider(), test_cache());

    let stored = coordinator
        .store_memory("Customer reported flaky uploads", None, None)
        .await
        .unwrap();
    assert_eq!(stored.embedding_status, WriteStatus::Stored);
    assert!(stored.graph_status.is_failed());
    assert_eq!(stored.operational_mode, OperationalMode::Degraded);

    let response = coordinator.query_memory("flaky uploads", None, None).await.unwrap();
    assert_eq!(response.memories[0].id, stored.memory_id);
}

#[tokio::test]
async fn embedding_failure_aborts_before_any_write() {
    let stores = sqlite_stores();
    let coordinator = build(stores.clone(), Arc::new(FailingEmbedding), test_cache());

    let err = coordinator
        .store_memory("This never lands", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, MemosError::EmbeddingUnavailable(_)));
    assert_eq!(stores.memories.count().await.unwrap(), 0);

    let err = coordinator.query_memory("anything", None, None).await.unwrap_err();
    assert!(matches!(err, MemosError::EmbeddingUnavailable(_)));
}

#[tokio::test]
async fn orphaned_vectors_are_skipped() {
    let (coordinator, stores) = test_coordinator();

    let gone = coordinator
        .store_memory("Temporary scratch note about caching", None, None)
        .await
        .unwrap();
    let kept = coordinator
        .store_memory("Permanent note about caching", None, None)
        .await
        .unwrap();
    assert!(stores.memories.delete(gone.memory_id).await.unwrap());

    let response = coordinator.query_memory("note about caching", None, None).await.unwrap();
    let ids: Vec<i64> = response.memories.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![kept.memory_id]);
}

#[tokio::test]
async fn slow_vector_store_times_out_per_request() {
    let inner = sqlite_stores();
    let stores = Stores {
        vectors: Arc::new(FlakyVectorStore::slow(
            Arc::clone(&inner.vectors),
            Duration::from_millis(300),
        )),
        ..inner
    };
    let coordinator = build(stores, hashing_provider(), test_cache());

    let stored = coordinator
        .store_memory("Slow indexing path", None, Some(Duration::from_millis(50)))
        .await
        .unwrap();
    match stored.embedding_status {
        WriteStatus::Failed(reason) => assert!(reason.contains("timed out"), "{reason}"),
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn timed_out_vector_write_leaves_no_point() {
    let (stores, vectors_db) = sqlite_stores_with_vector_db();
    let coordinator = build(stores.clone(), hashing_provider(), test_cache());

    let holder = hold_lock(&vectors_db, Duration::from_millis(400));
    let stored = coordinator
        .store_memory(
            "Incident review for the payments outage",
            None,
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap();
    match &stored.embedding_status {
        WriteStatus::Failed(reason) => assert!(reason.contains("timed out"), "{reason}"),
        other => panic!("expected a timeout, got {other:?}"),
    }
    holder.join().unwrap();
    // the abandoned write gets the lock now and has to give up
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(stores.vectors.count().await.unwrap(), 0);
    let memory = coordinator.get_memory(stored.memory_id).await.unwrap();
    assert!(memory.embedding_ref.is_none());

    let response = coordinator
        .query_memory("payments outage incident review", None, None)
        .await
        .unwrap();
    assert!(response.memories.is_empty());
}

#[tokio::test]
async fn query_overtaken_by_a_write_is_not_cached() {
    let inner = sqlite_stores();
    let stores = Stores {
        vectors: Arc::new(LaggingSearchVectorStore {
            inner: Arc::clone(&inner.vectors),
            lag: Duration::from_millis(300),
        }),
        ..inner
    };
    let coordinator = build(stores, hashing_provider(), test_cache());

    let (first, stored) = tokio::join!(
        coordinator.query_memory("kubernetes upgrade window", None, None),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            coordinator
                .store_memory("Kubernetes upgrade window is Sunday", None, None)
                .await
        }
    );
    assert!(first.unwrap().memories.is_empty());
    let stored = stored.unwrap();

    let again = coordinator
        .query_memory("kubernetes upgrade window", None, None)
        .await
        .unwrap();
    assert!(!again.cached);
    assert_eq!(again.memories[0].id, stored.memory_id);

    let cached = coordinator
        .query_memory("kubernetes upgrade window", None, None)
        .await
        .unwrap();
    assert!(cached.cached);
}

#[tokio::test]
async fn backfill_indexes_degraded_writes() {
    let inner = sqlite_stores();
    let flaky = Arc::new(FlakyVectorStore::new(Arc::clone(&inner.vectors)));
    let stores = Stores {
        vectors: flaky.clone(),
        ..inner
    };
    let coordinator = build(stores, hashing_provider(), test_cache());

    flaky.set_down(true);
    let stored = coordinator
        .store_memory("Postgres failover runbook", None, None)
        .await
        .unwrap();
    assert!(stored.embedding_status.is_failed());
    assert_eq!(coordinator.unindexed(10).await.unwrap().len(), 1);

    flaky.set_down(false);
    let report = coordinator.backfill(10).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.indexed, 1);
    assert_eq!(report.failed, 0);
    assert!(coordinator.unindexed(10).await.unwrap().is_empty());

    let response = coordinator.query_memory("failover runbook", None, None).await.unwrap();
    assert_eq!(response.memories[0].id, stored.memory_id);
}

#[tokio::test]
async fn patch_metadata_merges_and_removes() {
    let (coordinator, _) = test_coordinator();
    let stored = coordinator
        .store_memory("Quarterly planning", Some(json!({"team": "core", "draft": true})), None)
        .await
        .unwrap();

    let updated = coordinator
        .patch_metadata(stored.memory_id, json!({"draft": null, "owner": "sam"}))
        .await
        .unwrap();
    assert_eq!(updated.metadata.get("team"), Some(&json!("core")));
    assert_eq!(updated.metadata.get("owner"), Some(&json!("sam")));
    assert!(updated.metadata.get("draft").is_none());

    let err = coordinator.patch_metadata(999, json!({"a": 1})).await.unwrap_err();
    assert!(matches!(err, MemosError::NotFound(_)));
}

#[tokio::test]
async fn concepts_are_linked_in_the_graph() {
    let (coordinator, _) = test_coordinator();
    let stored = coordinator
        .store_memory("The quick brown fox jumps", None, None)
        .await
        .unwrap();

    let neighbors = coordinator
        .related_nodes(NodeLabel::Memory, &stored.memory_id.to_string(), Some(RelType::Mentions))
        .await
        .unwrap();
    let mut keys: Vec<&str> = neighbors.iter().map(|n| n.node.key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["brown", "jumps", "quick"]);
    assert!(neighbors.iter().all(|n| n.direction == Direction::Outgoing));

    let mentioned_by = coordinator
        .related_nodes(NodeLabel::Concept, "Quick", None)
        .await
        .unwrap();
    assert_eq!(mentioned_by.len(), 1);
    assert_eq!(mentioned_by[0].direction, Direction::Incoming);
}

#[tokio::test]
async fn memories_connect_through_shared_concepts() {
    let (coordinator, _) = test_coordinator();
    let first = coordinator
        .store_memory("Postgres replication lagged overnight", None, None)
        .await
        .unwrap();
    let second = coordinator
        .store_memory("Investigate replication settings", None, None)
        .await
        .unwrap();

    let path = coordinator
        .shortest_path(
            (NodeLabel::Memory, &first.memory_id.to_string()),
            (NodeLabel::Memory, &second.memory_id.to_string()),
            None,
        )
        .await
        .unwrap();
    let keys: Vec<&str> = path.nodes.iter().map(|n| n.key.as_str()).collect();
    assert_eq!(keys, vec!["1", "replication", "2"]);
    assert_eq!(path.edges.len(), 2);

    let around = coordinator
        .subgraph(NodeLabel::Concept, "Replication", 1)
        .await
        .unwrap();
    assert_eq!(around.nodes.len(), 3);

    let err = coordinator
        .subgraph(NodeLabel::Concept, "Replication", 6)
        .await
        .unwrap_err();
    assert!(matches!(err, MemosError::Validation(_)));

    let err = coordinator
        .subgraph(NodeLabel::Concept, "Nothing", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, MemosError::NotFound(_)));

    let err = coordinator
        .shortest_path((NodeLabel::Memory, "1"), (NodeLabel::Concept, "Overnight"), Some(0))
        .await
        .unwrap_err();
    assert!(matches!(err, MemosError::NotFound(_)));
}

#[tokio::test]
async fn keyword_search_finds_exact_terms() {
    let (coordinator, _) = test_coordinator();
    coordinator.store_memory("Rotate the staging TLS certificate", None, None).await.unwrap();
    coordinator.store_memory("Staging database snapshot", None, None).await.unwrap();

    let found = coordinator.search_memories_text("certificate", None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].content, "Rotate the staging TLS certificate");
    assert_eq!(coordinator.search_memories_text("staging", Some(10)).await.unwrap().len(), 2);

    let err = coordinator.search_memories_text(" ", None).await.unwrap_err();
    assert!(matches!(err, MemosError::Validation(_)));
}

#[tokio::test]
async fn missing_memory_is_not_found() {
    let (coordinator, _) = test_coordinator();
    let err = coordinator.get_memory(42).await.unwrap_err();
    assert_eq!(err.to_string(), "not found: memory 42");
}

#[tokio::test]
async fn stats_and_health_reflect_the_stores() {
    let (coordinator, _) = test_coordinator();
    coordinator.store_memory("Alpha release checklist", None, None).await.unwrap();

    let stats = coordinator.stats().await.unwrap();
    assert_eq!(stats.memories, 1);
    assert_eq!(stats.vectors, 1);
    assert_eq!(stats.unindexed_estimate(), 0);
    // memory node + Alpha, Release, Checklist
    assert_eq!(stats.graph_nodes, 4);
    assert_eq!(stats.graph_edges, 3);

    let health = coordinator.health().await;
    assert_eq!(health.operational_mode, OperationalMode::Full);
    assert_eq!(health.embedding_model, "feature-hash-v1");

    let degraded = build(
        Stores {
            graph: Arc::new(FailingGraphStore),
            ..sqlite_stores()
        },
        hashing_provider(),
        test_cache(),
    );
    let health = degraded.health().await;
    assert!(!health.graph.ok);
    assert!(health.graph.error.as_deref().unwrap_or("").contains("graph unreachable"));
    assert_eq!(health.operational_mode, OperationalMode::Degraded);
}
