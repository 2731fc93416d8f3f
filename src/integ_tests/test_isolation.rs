use super::common::{all, quote, test_config, NOW_TICKS};
use crate::clock::FixedClock;
use crate::index::SearchIndex;
use crate::model::{PolicyTransactionWriteModel, PolicyWriteModel};
use crate::query::SearchFilters;
use crate::types::{EntityType, IndexScope, ScopeState};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

fn search_index(tmp: &TempDir) -> SearchIndex {
    SearchIndex::with_clock(test_config(tmp), Arc::new(FixedClock::at_ticks(NOW_TICKS))).unwrap()
}

fn policy(number: &str) -> PolicyWriteModel {
    PolicyWriteModel {
        id: Uuid::new_v4(),
        tenant_id: Uuid::nil(),
        policy_number: Some(number.to_string()),
        state: "issued".to_string(),
        last_modified_ticks: NOW_TICKS,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn environments_do_not_see_each_other() {
    let tmp = TempDir::new().unwrap();
    let index = search_index(&tmp);
    let quotes = Arc::clone(index.quotes());
    let dev = quotes.scope("acme", "development").unwrap();
    let prod = quotes.scope("acme", "production").unwrap();

    let dev_docs: Vec<_> = (0..30).map(|_| quote("incomplete")).collect();
    let prod_docs: Vec<_> = (0..30).map(|_| quote("complete")).collect();
    quotes.upsert_sync(&prod, prod_docs[..1].to_vec()).await.unwrap();

    let writer = {
        let quotes = Arc::clone(&quotes);
        let dev = dev.clone();
        let dev_docs = dev_docs.clone();
        tokio::spawn(async move {
            for chunk in dev_docs.chunks(5) {
                quotes.upsert_sync(&dev, chunk.to_vec()).await.unwrap();
            }
        })
    };
    let reader = {
        let quotes = Arc::clone(&quotes);
        let prod = prod.clone();
        tokio::task::spawn_blocking(move || {
            for _ in 0..20 {
                let page = quotes.search(&prod, &all(100)).unwrap();
                assert!(page.items.iter().all(|i| i.state == "complete"));
            }
        })
    };
    quotes.upsert_sync(&prod, prod_docs[1..].to_vec()).await.unwrap();
    writer.await.unwrap();
    reader.await.unwrap();

    let ids = |scope: &IndexScope| -> HashSet<Uuid> {
        quotes
            .search(scope, &all(100))
            .unwrap()
            .items
            .iter()
            .map(|i| i.id)
            .collect()
    };
    assert_eq!(ids(&dev), dev_docs.iter().map(|d| d.id).collect());
    assert_eq!(ids(&prod), prod_docs.iter().map(|d| d.id).collect());

    let dev_page = index
        .search("acme", "development", EntityType::Quote, &all(100))
        .unwrap();
    assert_eq!(dev_page.total_count, 30);
    index.graceful_shutdown().await;
}

#[tokio::test]
async fn entity_families_have_separate_trees() {
    let tmp = TempDir::new().unwrap();
    let index = search_index(&tmp);
    let policies = index.policies();
    let scope = policies.scope("acme", "production").unwrap();

    let mut with_transaction = policy("P-1001");
    let quote_id = Uuid::new_v4();
    with_transaction.transactions.push(PolicyTransactionWriteModel {
        id: Uuid::new_v4(),
        quote_id: Some(quote_id),
        effective_ticks: NOW_TICKS,
        ..Default::default()
    });
    policies
        .upsert_sync(&scope, vec![with_transaction.clone(), policy("P-2002")])
        .await
        .unwrap();

    let by_number = index
        .search(
            "acme",
            "production",
            EntityType::Policy,
            &SearchFilters::default().with_search_terms(["p-100"]),
        )
        .unwrap();
    assert_eq!(by_number.total_count, 1);
    assert_eq!(by_number.items[0].id, with_transaction.id);
    assert_eq!(by_number.items[0].number.as_deref(), Some("P-1001"));

    let by_quote = policies
        .search(
            &scope,
            &SearchFilters {
                quote_ids: vec![quote_id],
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(by_quote.total_count, 1);

    assert_eq!(
        index
            .scope_state("acme", "production", EntityType::Policy)
            .unwrap(),
        ScopeState::LiveOnly
    );
    assert_eq!(
        index
            .scope_state("acme", "production", EntityType::Quote)
            .unwrap(),
        ScopeState::NoIndex
    );
    assert!(tmp
        .path()
        .join("live/acme/production/policy")
        .is_dir());
    assert!(!tmp.path().join("live/acme/production/quote").exists());
}

#[tokio::test]
async fn tenant_scoped_delete_spares_other_tenants() {
    let tmp = TempDir::new().unwrap();
    let index = search_index(&tmp);
    let quotes = index.quotes();
    let scope = quotes.scope("shared", "production").unwrap();

    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();
    let mut doc = quote("complete");
    doc.tenant_id = tenant_a;
    quotes.upsert_sync(&scope, vec![doc.clone()]).await.unwrap();

    quotes
        .delete_sync(&scope, vec![doc.id], Some(tenant_b))
        .await
        .unwrap();
    assert_eq!(quotes.document_count(&scope).unwrap(), 1);

    quotes
        .delete_sync(&scope, vec![doc.id], Some(tenant_a))
        .await
        .unwrap();
    assert_eq!(quotes.document_count(&scope).unwrap(), 0);
}
