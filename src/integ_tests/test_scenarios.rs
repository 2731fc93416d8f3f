use super::common::{all, quote, quote_manager, HOUR_TICKS, NOW_TICKS};
use crate::index::GenerationManager;
use crate::query::StatusId;
use crate::types::{RegenerationStatus, ScopeState};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

#[tokio::test]
async fn expired_status_follows_the_clock_not_the_stored_state() {
    let tmp = TempDir::new().unwrap();
    let (m, clock) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();

    let open_ended = quote("complete");
    let mut expires_later = quote("complete");
    expires_later.expiry_ticks = Some(NOW_TICKS + HOUR_TICKS);
    let mut expired_by_date = quote("complete");
    expired_by_date.expiry_ticks = Some(NOW_TICKS - HOUR_TICKS);
    m.upsert_sync(
        &scope,
        vec![
            open_ended.clone(),
            expires_later.clone(),
            expired_by_date.clone(),
        ],
    )
    .await
    .unwrap();

    let ids = |status: StatusId| -> HashSet<Uuid> {
        m.search(&scope, &all(10).with_statuses([status]))
            .unwrap()
            .items
            .iter()
            .map(|i| i.id)
            .collect()
    };

    assert_eq!(ids(StatusId::expired()), HashSet::from([expired_by_date.id]));
    assert_eq!(
        ids(StatusId::new("complete")),
        HashSet::from([open_ended.id, expires_later.id])
    );

    clock.advance(chrono::Duration::hours(2));
    assert_eq!(
        ids(StatusId::expired()),
        HashSet::from([expired_by_date.id, expires_later.id])
    );
    assert_eq!(ids(StatusId::new("complete")), HashSet::from([open_ended.id]));
}

#[tokio::test]
async fn rebuild_replaces_states_without_count_drift() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();

    let incomplete: Vec<_> = (0..20).map(|_| quote("incomplete")).collect();
    m.upsert_sync(&scope, incomplete.clone()).await.unwrap();
    let first_live = m.latest_generation(&scope).unwrap().unwrap();

    let complete: Vec<_> = incomplete
        .iter()
        .map(|doc| {
            let mut doc = doc.clone();
            doc.state = "complete".to_string();
            doc
        })
        .collect();
    let info = m.regenerate_sync(&scope, Arc::new(complete)).await.unwrap();
    let RegenerationStatus::Completed { indexed, generation } = &info.status else {
        panic!("regeneration did not complete: {:?}", info.status);
    };
    assert_eq!(*indexed, 20);
    assert!(info.finished_at.is_some());

    let live = m.latest_generation(&scope).unwrap().unwrap();
    assert_eq!(live.name(), generation.as_str());
    assert!(live.name() > first_live.name());
    assert_eq!(m.scope_state(&scope).unwrap(), ScopeState::LiveOnly);

    let page = m.search(&scope, &all(100)).unwrap();
    assert_eq!(page.total_count, 20);
    assert!(page.items.iter().all(|i| i.state == "complete"));
    let stale = m
        .search(&scope, &all(100).with_statuses(["incomplete"]))
        .unwrap();
    assert_eq!(stale.total_count, 0);

    // incremental writes keep working against the promoted generation
    m.upsert_sync(&scope, vec![quote("incomplete")]).await.unwrap();
    assert_eq!(m.document_count(&scope).unwrap(), 21);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_and_searches() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();
    m.generations().create_live(&scope).unwrap();

    let submitted = Arc::new(AtomicUsize::new(0));

    let mut writers = Vec::new();
    for _ in 0..4 {
        let m = Arc::clone(&m);
        let scope = scope.clone();
        let submitted = Arc::clone(&submitted);
        writers.push(tokio::spawn(async move {
            for _ in 0..25 {
                submitted.fetch_add(1, Ordering::SeqCst);
                m.upsert_sync(&scope, vec![quote("incomplete")])
                    .await
                    .unwrap();
            }
        }));
    }

    let mut searchers = Vec::new();
    for _ in 0..5 {
        let m = Arc::clone(&m);
        let scope = scope.clone();
        let submitted = Arc::clone(&submitted);
        searchers.push(tokio::task::spawn_blocking(move || {
            let mut last = 0;
            for _ in 0..10 {
                let page = m
                    .search(&scope, &all(10).with_statuses(["incomplete"]))
                    .unwrap();
                let bound = submitted.load(Ordering::SeqCst);
                assert!(
                    page.total_count <= bound,
                    "{} results with only {} documents submitted",
                    page.total_count,
                    bound
                );
                assert!(page.total_count >= last, "result count went backwards");
                last = page.total_count;
                std::thread::sleep(std::time::Duration::from_millis(2));
            }
        }));
    }

    for writer in writers {
        writer.await.unwrap();
    }
    for searcher in searchers {
        searcher.await.unwrap();
    }
    assert_eq!(m.document_count(&scope).unwrap(), 100);
}
