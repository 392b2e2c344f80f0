//! End-to-end expansion scenarios against in-memory capabilities
//!
//! Exercises the orchestrator's claim loop, worker pool, depth tracking,
//! crash recovery, and stop conditions with a deterministic source, a
//! keyword-axis embedder, and a scripted LLM.
//!
//! Run with: `cargo test --test expansion_e2e`

mod common;

use common::{test_orchestrator, MapSource};
use std::time::Duration;
use wikigr::{ArticleState, Direction, ExpansionConfig, PackStore};

fn fast_config() -> ExpansionConfig {
    ExpansionConfig::default()
        .with_worker_count(2)
        .with_heartbeat_timeout(Duration::from_secs(5))
}

// === Scenario: tiny bootstrap from a single seed ===

#[tokio::test]
async fn tiny_bootstrap_reaches_target_without_failures() {
    let source = MapSource::new()
        .with_linked_page(
            "Newton's laws of motion",
            &["Force", "Mass", "Acceleration", "Isaac Newton", "Inertia"],
        )
        .with_linked_page("Force", &["Mass"])
        .with_linked_page("Mass", &[])
        .with_linked_page("Acceleration", &[])
        .with_linked_page("Isaac Newton", &["Force"])
        .with_linked_page("Inertia", &[]);

    let config = fast_config().with_target_articles(5).with_max_depth(1);
    let (orchestrator, store) = test_orchestrator(config, source);

    let stats = orchestrator
        .run(&["Newton's laws of motion".to_string()])
        .await
        .unwrap();

    assert!(stats.processed >= 5, "processed = {}", stats.processed);
    assert_eq!(stats.failed, 0);

    // Every processed article sits at depth 0 or 1.
    for title in [
        "Newton's laws of motion",
        "Force",
        "Mass",
        "Acceleration",
        "Isaac Newton",
    ] {
        if let Some(article) = store.article(title).unwrap() {
            if article.state == ArticleState::Processed {
                assert!(article.depth <= 1, "{} at depth {}", title, article.depth);
            }
        }
    }

    // The link graph exists.
    assert!(store.degree("Newton's laws of motion").unwrap() >= 1);
    assert!(!store
        .neighbors("Newton's laws of motion", Direction::Outbound)
        .unwrap()
        .is_empty());
}

// === Scenario: worker crash recovery via heartbeat expiry ===

#[tokio::test]
async fn stale_claim_from_crashed_worker_is_recovered() {
    let source = MapSource::new().with_linked_page("Orphaned article", &[]);
    let config = fast_config()
        .with_target_articles(1)
        .with_heartbeat_timeout(Duration::from_millis(400));
    let (orchestrator, store) = test_orchestrator(config, source);

    // Simulate a worker that claimed the article and died before writing:
    // the claim is timestamped at the dawn of the orchestrator's clock.
    store
        .upsert_article("Orphaned article", "", 0, ArticleState::Discovered)
        .unwrap();
    let crashed = store.claim_batch(1, 0, 1).unwrap();
    assert_eq!(crashed.len(), 1);

    // The orchestrator's own claims start near 0ms too, so the stale claim
    // becomes reclaimable once the clock passes the heartbeat timeout.
    let stats = orchestrator
        .run(&["Orphaned article".to_string()])
        .await
        .unwrap();

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.articles, 1, "no duplicate article rows");
    assert_eq!(
        store.article("Orphaned article").unwrap().unwrap().state,
        ArticleState::Processed
    );
}

// === Scenario: stop condition respected with in-flight slack ===

#[tokio::test]
async fn target_stops_expansion_with_bounded_overshoot() {
    let seeds: Vec<String> = (0..5).map(|i| format!("Seed {}", i)).collect();
    let mut source = MapSource::new();
    for i in 0..5 {
        let children: Vec<String> = (0..4).map(|j| format!("Child {}-{}", i, j)).collect();
        let child_refs: Vec<&str> = children.iter().map(|s| s.as_str()).collect();
        source = source.with_linked_page(&format!("Seed {}", i), &child_refs);
        for child in &children {
            source = source.with_linked_page(child, &[]);
        }
    }

    let worker_count = 2;
    let config = fast_config()
        .with_target_articles(3)
        .with_worker_count(worker_count)
        .with_link_budget(20);
    let (orchestrator, _) = test_orchestrator(config, source);

    let stats = orchestrator.run(&seeds).await.unwrap();

    assert!(stats.processed >= 3);
    assert!(
        stats.processed <= 3 + (worker_count as u64 - 1),
        "processed = {}",
        stats.processed
    );
}

// === Property: depth minimality under converging links ===

#[tokio::test]
async fn depth_takes_shortest_path_when_links_converge() {
    // Seed links to both A and B; A also links to B. B must end at depth 1
    // (direct from the seed), not 2 (through A).
    let source = MapSource::new()
        .with_linked_page("Seed", &["A", "B"])
        .with_linked_page("A", &["B"])
        .with_linked_page("B", &[]);

    let config = fast_config().with_target_articles(3).with_max_depth(3);
    let (orchestrator, store) = test_orchestrator(config, source);

    orchestrator.run(&["Seed".to_string()]).await.unwrap();

    assert_eq!(store.article("B").unwrap().unwrap().depth, 1);
    assert_eq!(store.article("A").unwrap().unwrap().depth, 1);
    assert_eq!(store.article("Seed").unwrap().unwrap().depth, 0);
}

// === Scenario: failures don't stall the queue ===

#[tokio::test]
async fn dead_links_fail_while_the_rest_completes() {
    let source = MapSource::new()
        .with_linked_page("Seed", &["Alive", "Dead link"])
        .with_linked_page("Alive", &[]);

    let config = fast_config().with_target_articles(10);
    let (orchestrator, store) = test_orchestrator(config, source);

    let stats = orchestrator.run(&["Seed".to_string()]).await.unwrap();

    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(
        store.article("Dead link").unwrap().unwrap().state,
        ArticleState::Failed
    );
}

// === Scenario: embeddings are complete for every processed article ===

#[tokio::test]
async fn processed_articles_have_embeddings_on_every_section() {
    let source = MapSource::new().with_linked_page("Well formed", &[]);
    let config = fast_config().with_target_articles(1);
    let (orchestrator, store) = test_orchestrator(config, source);

    orchestrator.run(&["Well formed".to_string()]).await.unwrap();

    let sections = store.sections("Well formed").unwrap();
    assert!(!sections.is_empty());
    for section in sections {
        assert!(
            section.has_embedding,
            "section {} lacks an embedding",
            section.ordinal
        );
    }
}
