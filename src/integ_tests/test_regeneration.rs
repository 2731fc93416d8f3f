use super::common::{
    all, quote, quote_manager, test_config, wait_until_in_progress, FailingSource, GatedSource,
    HOUR_TICKS, NOW_TICKS,
};
use crate::clock::FixedClock;
use crate::config::PromotionStrategy;
use crate::error::SearchIndexError;
use crate::index::IndexManager;
use crate::model::QuoteWriteModel;
use crate::types::{RegenerationStatus, ScopeState, Tree};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[tokio::test]
async fn status_walks_from_not_started_to_completed() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();
    assert_eq!(
        m.status_of_regeneration(&scope).unwrap(),
        RegenerationStatus::NotStarted
    );

    let docs: Vec<_> = (0..20).map(|_| quote("complete")).collect();
    let (source, permits) = GatedSource::new(docs);
    let info = m.regenerate(&scope, source).unwrap();
    assert!(info.id.starts_with("regen_acme/dev/quote_"));

    wait_until_in_progress(&m, &scope).await;
    assert_eq!(
        m.scope_state(&scope).unwrap(),
        ScopeState::NoIndex,
        "a rebuild alone does not create a live generation"
    );
    assert_eq!(
        m.list_generations(Tree::Regeneration, &scope).unwrap().len(),
        1
    );
    assert!(matches!(
        m.regenerate(&scope, Arc::new(Vec::<crate::model::QuoteWriteModel>::new())),
        Err(SearchIndexError::RegenerationInProgress(_))
    ));

    // 20 documents at 8 per page
    for _ in 0..3 {
        permits.send(()).unwrap();
    }
    let done = m.wait_for_regeneration(&info.id).await.unwrap();
    assert!(matches!(
        done.status,
        RegenerationStatus::Completed { indexed: 20, .. }
    ));
    assert_eq!(m.status_of_regeneration(&scope).unwrap(), done.status);
    assert_eq!(m.scope_state(&scope).unwrap(), ScopeState::LiveOnly);
    assert_eq!(m.document_count(&scope).unwrap(), 20);
    assert!(m
        .list_generations(Tree::Regeneration, &scope)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn failed_source_leaves_live_untouched() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();
    m.upsert_sync(&scope, vec![quote("incomplete"), quote("incomplete")])
        .await
        .unwrap();
    let live_before = m.latest_generation(&scope).unwrap().unwrap();

    let source = Arc::new(FailingSource {
        docs: (0..20).map(|_| quote("complete")).collect(),
        fail_on_page: 1,
        served: Mutex::new(0),
    });
    let info = m.regenerate_sync(&scope, source).await.unwrap();
    let RegenerationStatus::Failed(reason) = &info.status else {
        panic!("expected failure, got {:?}", info.status);
    };
    assert!(reason.contains("source of record unavailable"));

    assert_eq!(
        m.latest_generation(&scope).unwrap().unwrap().name(),
        live_before.name()
    );
    assert_eq!(m.scope_state(&scope).unwrap(), ScopeState::LiveOnly);
    assert!(m
        .list_generations(Tree::Regeneration, &scope)
        .unwrap()
        .is_empty());
    let page = m.search(&scope, &all(100)).unwrap();
    assert_eq!(page.total_count, 2);
    assert!(page.items.iter().all(|i| i.state == "incomplete"));

    // restart from scratch
    let retry = m
        .regenerate_sync(&scope, Arc::new(vec![quote("complete")]))
        .await
        .unwrap();
    assert!(matches!(
        retry.status,
        RegenerationStatus::Completed { indexed: 1, .. }
    ));
    assert_eq!(m.document_count(&scope).unwrap(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn failed_promotion_fails_the_job_and_keeps_live() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.promotion = PromotionStrategy::Copy;
    let m = IndexManager::<QuoteWriteModel>::with_clock(
        config,
        Arc::new(FixedClock::at_ticks(NOW_TICKS)),
    )
    .unwrap();
    let scope = m.scope("acme", "dev").unwrap();
    m.upsert_sync(&scope, vec![quote("incomplete")]).await.unwrap();
    let live_before = m.latest_generation(&scope).unwrap().unwrap();

    let (source, permits) = GatedSource::new(vec![quote("complete"), quote("complete")]);
    let info = m.regenerate(&scope, source).unwrap();
    wait_until_in_progress(&m, &scope).await;
    let regen = m
        .list_generations(Tree::Regeneration, &scope)
        .unwrap()
        .pop()
        .unwrap();
    std::os::unix::fs::symlink(tmp.path().join("missing"), regen.path().join("dangling"))
        .unwrap();
    permits.send(()).unwrap();

    let done = m.wait_for_regeneration(&info.id).await.unwrap();
    let RegenerationStatus::Failed(reason) = &done.status else {
        panic!("expected failure, got {:?}", done.status);
    };
    assert!(reason.contains("Promotion failed"), "{reason}");

    assert_eq!(
        m.latest_generation(&scope).unwrap().unwrap().name(),
        live_before.name()
    );
    assert_eq!(m.scope_state(&scope).unwrap(), ScopeState::LiveOnly);
    let page = m.search(&scope, &all(100)).unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].state, "incomplete");
}

#[tokio::test]
async fn cancelled_rebuild_is_discarded() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();
    m.upsert_sync(&scope, vec![quote("incomplete")]).await.unwrap();

    let (source, permits) = GatedSource::new((0..20).map(|_| quote("complete")).collect());
    let info = m.regenerate(&scope, source).unwrap();
    wait_until_in_progress(&m, &scope).await;

    m.cancel_regeneration(&scope).unwrap();
    permits.send(()).unwrap();
    let done = m.wait_for_regeneration(&info.id).await.unwrap();
    assert_eq!(done.status, RegenerationStatus::Cancelled);
    assert!(done.finished_at.is_some());

    assert_eq!(m.scope_state(&scope).unwrap(), ScopeState::LiveOnly);
    assert!(m
        .list_generations(Tree::Regeneration, &scope)
        .unwrap()
        .is_empty());
    let page = m.search(&scope, &all(100)).unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].state, "incomplete");
    assert!(matches!(
        m.cancel_regeneration(&scope),
        Err(SearchIndexError::NoRegenerationInProgress(_))
    ));
}

#[tokio::test]
async fn writes_during_rebuild_survive_promotion() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();

    let originals: Vec<_> = (0..5).map(|_| quote("incomplete")).collect();
    m.upsert_sync(&scope, originals.clone()).await.unwrap();

    // snapshot of the source of record, taken before the edits below
    let snapshot: Vec<_> = originals.clone();
    let (source, permits) = GatedSource::new(snapshot);
    let info = m.regenerate(&scope, source).unwrap();
    wait_until_in_progress(&m, &scope).await;

    let mut edited = originals[0].clone();
    edited.state = "approved".to_string();
    edited.last_modified_ticks = NOW_TICKS;
    let removed = originals[1].id;
    let mut created = quote("incomplete");
    created.last_modified_ticks = NOW_TICKS + HOUR_TICKS;
    m.upsert_sync(&scope, vec![edited.clone(), created.clone()])
        .await
        .unwrap();
    m.delete_sync(&scope, vec![removed], None).await.unwrap();

    // live sees the edits straight away
    assert_eq!(m.document_count(&scope).unwrap(), 5);
    assert_eq!(
        m.get_document(&scope, edited.id).unwrap().unwrap().state,
        "approved"
    );

    permits.send(()).unwrap();
    let done = m.wait_for_regeneration(&info.id).await.unwrap();
    assert!(matches!(
        done.status,
        RegenerationStatus::Completed { indexed: 3, .. }
    ));

    let page = m.search(&scope, &all(100)).unwrap();
    let states: HashMap<_, _> = page
        .items
        .iter()
        .map(|i| (i.id, i.state.clone()))
        .collect();
    assert_eq!(states.len(), 5);
    assert_eq!(states[&edited.id], "approved");
    assert_eq!(states[&created.id], "incomplete");
    assert!(!states.contains_key(&removed));
}

#[tokio::test]
async fn search_retries_once_when_generation_vanishes() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();
    m.upsert_sync(&scope, vec![quote("complete")]).await.unwrap();

    m.vanish_next_generation
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let page = m.search(&scope, &all(10)).unwrap();
    assert_eq!(page.total_count, 1);
}
