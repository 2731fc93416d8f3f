use crate::clock::{FixedClock, TICKS_PER_SECOND};
use crate::config::IndexConfig;
use crate::error::{Result, SearchIndexError};
use crate::index::{IndexManager, RegenerationSource, SourcePage};
use crate::model::{IndexDocument, QuoteWriteModel};
use crate::query::SearchFilters;
use crate::types::{IndexScope, RegenerationStatus};
use std::sync::{mpsc, Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

/// 2024-01-01T00:00:00Z in ticks.
pub const NOW_TICKS: i64 = 1_704_067_200 * TICKS_PER_SECOND;
pub const HOUR_TICKS: i64 = 3600 * TICKS_PER_SECOND;

pub fn test_config(tmp: &TempDir) -> IndexConfig {
    let mut config = IndexConfig::with_data_dir(tmp.path());
    config.writer_heap_mb = 15;
    config.batch_timeout_ms = 5;
    config.regeneration_batch_size = 8;
    config
}

pub fn quote_manager(tmp: &TempDir) -> (Arc<IndexManager<QuoteWriteModel>>, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::at_ticks(NOW_TICKS));
    let manager = IndexManager::with_clock(test_config(tmp), clock.clone()).unwrap();
    (manager, clock)
}

pub fn quote(state: &str) -> QuoteWriteModel {
    QuoteWriteModel {
        id: Uuid::new_v4(),
        tenant_id: Uuid::nil(),
        organisation_id: Uuid::nil(),
        state: state.to_string(),
        created_ticks: NOW_TICKS - HOUR_TICKS,
        last_modified_ticks: NOW_TICKS - HOUR_TICKS,
        ..Default::default()
    }
}

pub fn all(page_size: usize) -> SearchFilters {
    SearchFilters {
        page_size: Some(page_size),
        include_test_data: true,
        ..Default::default()
    }
}

pub async fn wait_until_in_progress<D: IndexDocument>(
    manager: &IndexManager<D>,
    scope: &IndexScope,
) {
    for _ in 0..500 {
        if matches!(
            manager.status_of_regeneration(scope).unwrap(),
            RegenerationStatus::InProgress { .. }
        ) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("regeneration of {} never started", scope);
}

/// Serves pages from a vector, each one only after a permit is released.
pub struct GatedSource<D> {
    docs: Vec<D>,
    permits: Mutex<mpsc::Receiver<()>>,
}

impl<D: IndexDocument> GatedSource<D> {
    pub fn new(docs: Vec<D>) -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(GatedSource {
                docs,
                permits: Mutex::new(rx),
            }),
            tx,
        )
    }
}

impl<D: IndexDocument> RegenerationSource<D> for GatedSource<D> {
    fn fetch_page(
        &self,
        scope: &IndexScope,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<SourcePage<D>> {
        self.permits
            .lock()
            .map_err(|_| SearchIndexError::IndexWrite("gate poisoned".to_string()))?
            .recv()
            .map_err(|_| SearchIndexError::IndexWrite("gate closed".to_string()))?;
        self.docs.fetch_page(scope, cursor, limit)
    }
}

/// Fails once the given page is requested.
pub struct FailingSource<D> {
    pub docs: Vec<D>,
    pub fail_on_page: usize,
    pub served: Mutex<usize>,
}

impl<D: IndexDocument> RegenerationSource<D> for FailingSource<D> {
    fn fetch_page(
        &self,
        scope: &IndexScope,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<SourcePage<D>> {
        let mut served = self
            .served
            .lock()
            .map_err(|_| SearchIndexError::IndexWrite("poisoned".to_string()))?;
        if *served == self.fail_on_page {
            return Err(SearchIndexError::IndexWrite(
                "source of record unavailable".to_string(),
            ));
        }
        *served += 1;
        self.docs.fetch_page(scope, cursor, limit)
    }
}
