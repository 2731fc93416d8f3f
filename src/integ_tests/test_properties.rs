use super::common::{all, quote, quote_manager};
use crate::index::GenerationManager;
use crate::query::SearchFilters;
use crate::types::RegenerationStatus;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tantivy::query::AllQuery;
use tempfile::TempDir;
use uuid::Uuid;

#[tokio::test]
async fn snapshot_isolation_across_commits() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();
    let generations = m.generations();

    let live = generations.create_live(&scope).unwrap();
    let mut writer = generations.open_writer(&live).unwrap();
    writer.upsert(&quote("incomplete")).unwrap();
    writer.commit().unwrap();

    let before = generations.open_searcher(&live).unwrap();
    writer.upsert(&quote("incomplete")).unwrap();
    writer.commit().unwrap();
    let after = generations.open_searcher(&live).unwrap();

    assert_eq!(before.num_docs(), 1);
    let page = before
        .search(&AllQuery, Default::default(), 1, 10)
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(after.num_docs(), 2);
}

#[tokio::test]
async fn committed_writes_are_visible_to_later_searches() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();

    m.upsert_sync(&scope, vec![quote("incomplete")]).await.unwrap();
    assert_eq!(m.search(&scope, &all(10)).unwrap().total_count, 1);
    m.upsert_sync(&scope, vec![quote("incomplete")]).await.unwrap();
    assert_eq!(m.search(&scope, &all(10)).unwrap().total_count, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn promotion_is_observed_atomically() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();

    let old: Vec<_> = (0..20).map(|_| quote("incomplete")).collect();
    m.upsert_sync(&scope, old).await.unwrap();
    let rebuilt: Vec<_> = (0..30).map(|_| quote("complete")).collect();

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let m = Arc::clone(&m);
        let scope = scope.clone();
        let done = Arc::clone(&done);
        readers.push(tokio::task::spawn_blocking(move || {
            let mut seen_new = false;
            let mut searches = 0usize;
            loop {
                let finished = done.load(Ordering::SeqCst);
                let page = m.search(&scope, &all(100)).unwrap();
                let states: HashSet<String> =
                    page.items.iter().map(|i| i.state.clone()).collect();
                match page.total_count {
                    20 => {
                        assert!(!seen_new, "observed the old generation after the new one");
                        assert_eq!(states, HashSet::from(["incomplete".to_string()]));
                    }
                    30 => {
                        seen_new = true;
                        assert_eq!(states, HashSet::from(["complete".to_string()]));
                    }
                    other => panic!("mixed generation contents: {} documents", other),
                }
                searches += 1;
                if finished {
                    return searches;
                }
            }
        }));
    }

    let info = m.regenerate_sync(&scope, Arc::new(rebuilt)).await.unwrap();
    done.store(true, Ordering::SeqCst);
    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert!(matches!(
        info.status,
        RegenerationStatus::Completed { indexed: 30, .. }
    ));
    assert_eq!(m.search(&scope, &all(100)).unwrap().total_count, 30);
}

#[tokio::test]
async fn upserting_same_id_keeps_one_latest_document() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();

    let mut doc = quote("incomplete");
    doc.quote_number = Some("Q-1".to_string());
    m.upsert_sync(&scope, vec![doc.clone()]).await.unwrap();

    doc.state = "approved".to_string();
    doc.quote_number = Some("Q-2".to_string());
    m.upsert_sync(&scope, vec![doc.clone()]).await.unwrap();

    // twice within one batch as well
    let mut again = doc.clone();
    again.state = "complete".to_string();
    doc.state = "declined".to_string();
    m.upsert_sync(&scope, vec![doc.clone(), again.clone()])
        .await
        .unwrap();

    assert_eq!(m.document_count(&scope).unwrap(), 1);
    assert_eq!(m.get_document(&scope, doc.id).unwrap(), Some(again));
    let page = m
        .search(&scope, &all(10).with_search_terms(["Q-2"]))
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].state, "complete");
}

#[tokio::test]
async fn test_data_excluded_unless_requested() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();

    let mut docs = Vec::new();
    for i in 0..6 {
        let mut doc = quote("complete");
        doc.is_test_data = i % 3 == 0;
        docs.push(doc);
    }
    let real: HashSet<Uuid> = docs
        .iter()
        .filter(|d| !d.is_test_data)
        .map(|d| d.id)
        .collect();
    m.upsert_sync(&scope, docs).await.unwrap();

    let default = m.search(&scope, &SearchFilters::default()).unwrap();
    assert_eq!(
        default.items.iter().map(|i| i.id).collect::<HashSet<_>>(),
        real
    );
    assert!(default.items.iter().all(|i| !i.is_test_data));

    let included = m.search(&scope, &all(100)).unwrap();
    assert_eq!(included.total_count, 6);
}

#[tokio::test]
async fn substring_search_on_email() {
    let tmp = TempDir::new().unwrap();
    let (m, _) = quote_manager(&tmp);
    let scope = m.scope("acme", "dev").unwrap();

    let with_email = |email: &str| {
        let mut doc = quote("complete");
        doc.customer_email = Some(email.to_string());
        doc
    };
    let target = with_email("my.email@ubind.io");
    let sharing_prefix = with_email("my.emailer@ubind.io");
    let unrelated = with_email("someone@elsewhere.org");
    m.upsert_sync(
        &scope,
        vec![target.clone(), sharing_prefix.clone(), unrelated.clone()],
    )
    .await
    .unwrap();

    let ids = |term: &str| -> HashSet<Uuid> {
        m.search(&scope, &all(10).with_search_terms([term]))
            .unwrap()
            .items
            .iter()
            .map(|i| i.id)
            .collect()
    };

    assert_eq!(ids("my.email"), HashSet::from([target.id, sharing_prefix.id]));
    assert_eq!(ids("MY.EMAIL"), HashSet::from([target.id, sharing_prefix.id]));
    assert_eq!(ids("elsewhere"), HashSet::from([unrelated.id]));
    assert_eq!(ids("my.email@ubind.io"), HashSet::from([target.id]));
    assert!(ids("nobody").is_empty());
}
