use crate::clock::{Clock, SystemClock};
use crate::config::IndexConfig;
use crate::error::{Result, SearchIndexError};
use crate::index::generation::{FsGenerationManager, GenerationManager};
use crate::index::schema::{build_schema, FieldSet};
use crate::index::searcher::GenerationSearcher;
use crate::index::store::{GenerationHandle, GenerationStore};
use crate::index::write_queue::{
    create_write_queue, request, BatchOutcome, RegenerationCommand, WriteAction, WriteMessage,
    WriteOp, WriteQueue,
};
use crate::model::{IndexDocument, PolicyWriteModel, QuoteWriteModel};
use crate::query::{FilterCompiler, SearchFilters};
use crate::types::{
    EntityType, IndexScope, Page, RegenerationInfo, RegenerationStatus, ResultItem, ScopeState,
    TaskInfo, TaskStatus, Tree,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

const MAX_TASKS_PER_SCOPE: usize = 1000;
const MAX_REGENERATIONS_PER_SCOPE: usize = 100;

/// Source of record for a full rebuild, read page by page.
///
/// Called from a blocking thread, so implementations may do synchronous I/O.
pub trait RegenerationSource<D>: Send + Sync + 'static {
    /// `cursor` is `None` for the first page and otherwise the
    /// `next_cursor` of the previous page.
    fn fetch_page(
        &self,
        scope: &IndexScope,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<SourcePage<D>>;
}

#[derive(Debug, Clone)]
pub struct SourcePage<D> {
    pub items: Vec<D>,
    /// `None` on the last page.
    pub next_cursor: Option<String>,
}

/// In-memory source; the cursor is the offset of the next item.
impl<D: IndexDocument> RegenerationSource<D> for Vec<D> {
    fn fetch_page(
        &self,
        _scope: &IndexScope,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<SourcePage<D>> {
        let start = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| SearchIndexError::InvalidQuery(format!("bad cursor '{}'", c)))?,
            None => 0,
        };
        let end = start.saturating_add(limit.max(1)).min(self.len());
        let items = self.get(start..end).map(<[D]>::to_vec).unwrap_or_default();
        Ok(SourcePage {
            items,
            next_cursor: (end < self.len()).then(|| end.to_string()),
        })
    }
}

struct RegenerationJob {
    id: String,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Index facade for one entity family.
///
/// Writes for a scope are funnelled through a background write queue;
/// searches resolve the latest live generation once per call and never wait
/// on writers. Create one with [`IndexManager::new`], which returns an
/// `Arc` (the manager is `Send + Sync` and meant to be shared).
///
/// ```rust,no_run
/// use searchgen::{IndexConfig, IndexManager, IndexScope, QuoteWriteModel, SearchFilters};
///
/// # async fn run() -> searchgen::Result<()> {
/// let quotes = IndexManager::<QuoteWriteModel>::new(IndexConfig::with_data_dir("./data"))?;
/// let scope = IndexScope::new("acme", "production", searchgen::EntityType::Quote)?;
/// quotes.upsert_sync(&scope, vec![QuoteWriteModel::default()]).await?;
/// let page = quotes.search(&scope, &SearchFilters::default())?;
/// # Ok(())
/// # }
/// ```
pub struct IndexManager<D: IndexDocument> {
    generations: Arc<FsGenerationManager>,
    clock: Arc<dyn Clock>,
    compiler: FilterCompiler,
    write_queues: DashMap<IndexScope, WriteQueue<D>>,
    write_task_handles: DashMap<IndexScope, JoinHandle<Result<()>>>,
    tasks: Arc<DashMap<String, TaskInfo>>,
    regenerations: Arc<DashMap<String, RegenerationInfo>>,
    active_jobs: DashMap<IndexScope, RegenerationJob>,
    #[cfg(test)]
    pub(crate) vanish_next_generation: AtomicBool,
}

impl<D: IndexDocument> IndexManager<D> {
    pub fn new(config: IndexConfig) -> Result<Arc<Self>> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: IndexConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        config.validate()?;
        let store = GenerationStore::new(&config.data_dir, Arc::clone(&clock));
        let generations = Arc::new(FsGenerationManager::new(store, Arc::new(config)));
        Self::with_generations(generations, clock)
    }

    /// Shares generation bookkeeping (writer registry, reader cache) with
    /// other managers over the same data directory.
    pub fn with_generations(
        generations: Arc<FsGenerationManager>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        let config = generations.config();
        let compiler = FilterCompiler::new(
            FieldSet::from_schema(&build_schema())?,
            config.min_gram,
            config.max_gram,
        );
        Ok(Arc::new(IndexManager {
            generations,
            clock,
            compiler,
            write_queues: DashMap::new(),
            write_task_handles: DashMap::new(),
            tasks: Arc::new(DashMap::new()),
            regenerations: Arc::new(DashMap::new()),
            active_jobs: DashMap::new(),
            #[cfg(test)]
            vanish_next_generation: AtomicBool::new(false),
        }))
    }

    pub fn config(&self) -> &IndexConfig {
        self.generations.config()
    }

    pub fn generations(&self) -> &Arc<FsGenerationManager> {
        &self.generations
    }

    /// Scope of this manager's entity family for a tenant and environment.
    pub fn scope(&self, tenant_key: &str, environment: &str) -> Result<IndexScope> {
        IndexScope::new(tenant_key, environment, D::ENTITY_TYPE)
    }

    fn check_scope(&self, scope: &IndexScope) -> Result<()> {
        if scope.entity_type() != D::ENTITY_TYPE {
            return Err(SearchIndexError::InvalidScope(format!(
                "{} is not a {} scope",
                scope,
                D::ENTITY_TYPE
            )));
        }
        Ok(())
    }

    // --- tasks ---

    pub fn get_task(&self, task_id: &str) -> Result<TaskInfo> {
        self.tasks
            .get(task_id)
            .map(|task| task.clone())
            .ok_or_else(|| SearchIndexError::TaskNotFound(task_id.to_string()))
    }

    /// Count tasks in Enqueued or Processing state for a scope.
    pub fn pending_task_count(&self, scope: &IndexScope) -> usize {
        let prefix = format!("task_{}_", scope);
        self.tasks
            .iter()
            .filter(|entry| {
                entry.key().starts_with(&prefix)
                    && matches!(
                        entry.value().status,
                        TaskStatus::Enqueued | TaskStatus::Processing
                    )
            })
            .count()
    }

    fn evict_old_tasks(&self, scope: &IndexScope, max_tasks: usize) {
        let prefix = format!("task_{}_", scope);
        let mut scope_tasks: Vec<_> = self
            .tasks
            .iter()
            .filter(|entry| {
                entry.key().starts_with(&prefix)
                    && !matches!(
                        entry.value().status,
                        TaskStatus::Enqueued | TaskStatus::Processing
                    )
            })
            .map(|entry| (entry.key().clone(), entry.value().created_at))
            .collect();

        if scope_tasks.len() >= max_tasks {
            scope_tasks.sort_by_key(|(_, created_at)| *created_at);
            for (task_id, _) in scope_tasks.iter().take(scope_tasks.len() - max_tasks + 1) {
                self.tasks.remove(task_id);
            }
        }
    }

    // --- incremental writes ---

    fn get_or_create_write_queue(&self, scope: &IndexScope) -> WriteQueue<D> {
        self.write_queues
            .entry(scope.clone())
            .or_insert_with(|| {
                let (queue, handle) = create_write_queue(
                    scope.clone(),
                    Arc::clone(&self.generations),
                    Arc::clone(&self.tasks),
                );
                self.write_task_handles.insert(scope.clone(), handle);
                queue
            })
            .clone()
    }

    fn enqueue(
        &self,
        scope: &IndexScope,
        received: usize,
        actions: Vec<WriteAction<D>>,
    ) -> Result<TaskInfo> {
        self.check_scope(scope)?;
        let task = TaskInfo::new(scope, received);
        self.tasks.insert(task.id.clone(), task.clone());
        self.evict_old_tasks(scope, MAX_TASKS_PER_SCOPE);

        let tx = self.get_or_create_write_queue(scope);
        if let Err(e) = tx.try_send(WriteMessage::Write(WriteOp {
            task_id: task.id.clone(),
            actions,
        })) {
            let (status, err) = match e {
                tokio::sync::mpsc::error::TrySendError::Full(_) => (
                    "Queue full",
                    SearchIndexError::QueueFull(scope.to_string()),
                ),
                tokio::sync::mpsc::error::TrySendError::Closed(_) => (
                    "Queue closed",
                    SearchIndexError::QueueClosed(scope.to_string()),
                ),
            };
            self.tasks.alter(&task.id, |_, mut t| {
                t.status = TaskStatus::Failed(status.to_string());
                t
            });
            return Err(err);
        }

        Ok(task)
    }

    /// Queues upserts. Each model replaces any document with the same id.
    pub fn upsert(&self, scope: &IndexScope, models: Vec<D>) -> Result<TaskInfo> {
        let received = models.len();
        let actions = models.into_iter().map(WriteAction::Upsert).collect();
        self.enqueue(scope, received, actions)
    }

    /// Queues deletes. With a tenant id only that tenant's documents go.
    pub fn delete(
        &self,
        scope: &IndexScope,
        ids: Vec<Uuid>,
        tenant_id: Option<Uuid>,
    ) -> Result<TaskInfo> {
        let received = ids.len();
        let actions = ids
            .into_iter()
            .map(|id| WriteAction::Delete { id, tenant_id })
            .collect();
        self.enqueue(scope, received, actions)
    }

    async fn wait_for_task(&self, task_id: &str) -> Result<TaskInfo> {
        loop {
            let task = self.get_task(task_id)?;
            match task.status {
                TaskStatus::Enqueued | TaskStatus::Processing => {
                    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
                }
                TaskStatus::Succeeded => return Ok(task),
                TaskStatus::Failed(e) => return Err(SearchIndexError::IndexWrite(e)),
            }
        }
    }

    /// Like [`upsert`](Self::upsert), returning once the batch is committed.
    pub async fn upsert_sync(&self, scope: &IndexScope, models: Vec<D>) -> Result<TaskInfo> {
        let task = self.upsert(scope, models)?;
        self.wait_for_task(&task.id).await
    }

    pub async fn delete_sync(
        &self,
        scope: &IndexScope,
        ids: Vec<Uuid>,
        tenant_id: Option<Uuid>,
    ) -> Result<TaskInfo> {
        let task = self.delete(scope, ids, tenant_id)?;
        self.wait_for_task(&task.id).await
    }

    // --- reads ---

    /// Runs `read` against the latest live generation, re-resolving once if
    /// that generation disappears underneath it.
    fn with_latest_live<T>(
        &self,
        scope: &IndexScope,
        read: impl Fn(&GenerationSearcher) -> Result<T>,
    ) -> Result<T> {
        self.check_scope(scope)?;
        let attempt = || -> Result<T> {
            let generation = self
                .generations
                .latest(Tree::Live, scope)?
                .ok_or_else(|| SearchIndexError::NotFound(scope.to_string()))?;
            #[cfg(test)]
            if self.vanish_next_generation.swap(false, Ordering::SeqCst) {
                return Err(SearchIndexError::GenerationNotFound(generation.to_string()));
            }
            let searcher = self.generations.open_searcher(&generation)?;
            read(&searcher)
        };
        match attempt() {
            Err(e) if e.is_retryable() => {
                tracing::debug!("[GEN {}] {}, re-resolving latest", scope, e);
                attempt()
            }
            other => other,
        }
    }

    fn page_bounds(&self, filters: &SearchFilters) -> Result<(usize, usize)> {
        let config = self.config();
        let page_size = filters.page_size.unwrap_or(config.default_page_size);
        if filters.page == 0 {
            return Err(SearchIndexError::InvalidQuery(
                "page is 1-based".to_string(),
            ));
        }
        if page_size == 0 || page_size > config.max_page_size {
            return Err(SearchIndexError::InvalidQuery(format!(
                "page_size must be between 1 and {}",
                config.max_page_size
            )));
        }
        Ok((filters.page, page_size))
    }

    pub fn search(&self, scope: &IndexScope, filters: &SearchFilters) -> Result<Page<ResultItem>> {
        let (page, page_size) = self.page_bounds(filters)?;
        let query = self
            .compiler
            .compile(&filters.to_filters(), self.clock.now_ticks())?;
        self.with_latest_live(scope, |searcher| {
            searcher.search(query.as_ref(), filters.sort, page, page_size)
        })
    }

    pub fn get_document(&self, scope: &IndexScope, id: Uuid) -> Result<Option<D>> {
        self.with_latest_live(scope, |searcher| searcher.get::<D>(id))
    }

    pub fn document_count(&self, scope: &IndexScope) -> Result<u64> {
        self.with_latest_live(scope, |searcher| Ok(searcher.num_docs()))
    }

    pub fn latest_generation(&self, scope: &IndexScope) -> Result<Option<GenerationHandle>> {
        self.check_scope(scope)?;
        self.generations.latest(Tree::Live, scope)
    }

    pub fn list_generations(&self, tree: Tree, scope: &IndexScope) -> Result<Vec<GenerationHandle>> {
        self.check_scope(scope)?;
        self.generations.list(tree, scope)
    }

    pub fn scope_state(&self, scope: &IndexScope) -> Result<ScopeState> {
        self.check_scope(scope)?;
        self.generations.scope_state(scope)
    }

    // --- regeneration ---

    /// Starts rebuilding `scope` from `source` in the background and returns
    /// immediately. Poll with [`regeneration`](Self::regeneration) or
    /// [`status_of_regeneration`](Self::status_of_regeneration).
    pub fn regenerate(
        &self,
        scope: &IndexScope,
        source: Arc<dyn RegenerationSource<D>>,
    ) -> Result<RegenerationInfo> {
        self.check_scope(scope)?;
        let slot = self.active_jobs.entry(scope.clone());
        if let dashmap::mapref::entry::Entry::Occupied(job) = &slot {
            if self.is_running(&job.get().id) {
                return Err(SearchIndexError::RegenerationInProgress(scope.to_string()));
            }
        }

        let info = RegenerationInfo::new(scope.clone(), self.clock.now());
        self.evict_old_regenerations(scope, MAX_REGENERATIONS_PER_SCOPE);
        self.regenerations.insert(info.id.clone(), info.clone());

        let cancel = Arc::new(AtomicBool::new(false));
        let run = RegenerationRun {
            id: info.id.clone(),
            scope: scope.clone(),
            queue: self.get_or_create_write_queue(scope),
            source,
            batch_size: self.config().regeneration_batch_size.max(1),
            cancel: Arc::clone(&cancel),
            regenerations: Arc::clone(&self.regenerations),
            clock: Arc::clone(&self.clock),
        };
        let handle = tokio::spawn(run.run());
        slot.insert(RegenerationJob {
            id: info.id.clone(),
            cancel,
            handle,
        });
        tracing::info!("[REGEN {}] started job {}", scope, info.id);
        Ok(info)
    }

    fn evict_old_regenerations(&self, scope: &IndexScope, max_jobs: usize) {
        let mut finished: Vec<_> = self
            .regenerations
            .iter()
            .filter(|entry| entry.value().scope == *scope && entry.value().status.is_terminal())
            .map(|entry| (entry.key().clone(), entry.value().started_at))
            .collect();

        if finished.len() >= max_jobs {
            finished.sort_by_key(|(_, started_at)| *started_at);
            for (id, _) in finished.iter().take(finished.len() - max_jobs + 1) {
                self.regenerations.remove(id);
            }
        }
    }

    fn is_running(&self, id: &str) -> bool {
        self.regenerations
            .get(id)
            .map(|info| !info.status.is_terminal())
            .unwrap_or(false)
    }

    pub fn regeneration(&self, id: &str) -> Result<RegenerationInfo> {
        self.regenerations
            .get(id)
            .map(|info| info.clone())
            .ok_or_else(|| SearchIndexError::TaskNotFound(id.to_string()))
    }

    /// Status of the most recent rebuild of `scope`.
    pub fn status_of_regeneration(&self, scope: &IndexScope) -> Result<RegenerationStatus> {
        self.check_scope(scope)?;
        let Some(id) = self.active_jobs.get(scope).map(|job| job.id.clone()) else {
            return Ok(RegenerationStatus::NotStarted);
        };
        Ok(self.regeneration(&id)?.status)
    }

    /// Asks the running rebuild of `scope` to stop. It stops between pages
    /// and never after promotion started.
    pub fn cancel_regeneration(&self, scope: &IndexScope) -> Result<()> {
        self.check_scope(scope)?;
        match self.active_jobs.get(scope) {
            Some(job) if self.is_running(&job.id) => {
                job.cancel.store(true, Ordering::SeqCst);
                tracing::info!("[REGEN {}] cancellation requested for {}", scope, job.id);
                Ok(())
            }
            _ => Err(SearchIndexError::NoRegenerationInProgress(scope.to_string())),
        }
    }

    /// Polls until the job reaches a terminal status.
    pub async fn wait_for_regeneration(&self, id: &str) -> Result<RegenerationInfo> {
        loop {
            let info = self.regeneration(id)?;
            if info.status.is_terminal() {
                return Ok(info);
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }
    }

    pub async fn regenerate_sync(
        &self,
        scope: &IndexScope,
        source: Arc<dyn RegenerationSource<D>>,
    ) -> Result<RegenerationInfo> {
        let info = self.regenerate(scope, source)?;
        self.wait_for_regeneration(&info.id).await
    }

    /// Cancels running rebuilds, then closes every write queue, which flushes
    /// and commits what is pending.
    pub async fn graceful_shutdown(&self) {
        let scopes: Vec<_> = self.active_jobs.iter().map(|r| r.key().clone()).collect();
        for scope in scopes {
            if let Some((_, job)) = self.active_jobs.remove(&scope) {
                job.cancel.store(true, Ordering::SeqCst);
                if let Err(e) = job.handle.await {
                    tracing::error!("[shutdown] Regeneration job for '{}' panicked: {}", scope, e);
                }
            }
        }

        // receivers see the closed channel, flush and exit
        self.write_queues.clear();

        let scopes: Vec<_> = self
            .write_task_handles
            .iter()
            .map(|r| r.key().clone())
            .collect();
        for scope in scopes {
            if let Some((_, handle)) = self.write_task_handles.remove(&scope) {
                match handle.await {
                    Ok(Ok(())) => {
                        tracing::info!("[shutdown] Write queue for '{}' drained", scope);
                    }
                    Ok(Err(e)) => {
                        tracing::error!(
                            "[shutdown] Write queue for '{}' exited with error: {}",
                            scope,
                            e
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            "[shutdown] Write queue task for '{}' panicked: {}",
                            scope,
                            e
                        );
                    }
                }
            }
        }
    }
}

enum RunEnd {
    Completed { indexed: usize, generation: String },
    Cancelled,
}

/// Everything a background rebuild needs, detached from the manager.
struct RegenerationRun<D> {
    id: String,
    scope: IndexScope,
    queue: WriteQueue<D>,
    source: Arc<dyn RegenerationSource<D>>,
    batch_size: usize,
    cancel: Arc<AtomicBool>,
    regenerations: Arc<DashMap<String, RegenerationInfo>>,
    clock: Arc<dyn Clock>,
}

impl<D: IndexDocument> RegenerationRun<D> {
    fn set_status(&self, status: RegenerationStatus) {
        let finished = status.is_terminal().then(|| self.clock.now());
        self.regenerations.alter(&self.id, |_, mut info| {
            info.status = status;
            info.finished_at = finished;
            info
        });
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    async fn run(self) {
        if let Err(e) = request(&self.queue, &self.scope, RegenerationCommand::Begin).await {
            tracing::error!("[REGEN {}] job {} could not begin: {}", self.scope, self.id, e);
            self.set_status(RegenerationStatus::Failed(e.to_string()));
            return;
        }
        self.set_status(RegenerationStatus::InProgress { indexed: 0 });

        match self.rebuild().await {
            Ok(RunEnd::Completed {
                indexed,
                generation,
            }) => {
                tracing::info!(
                    "[REGEN {}] job {} promoted {} with {} documents",
                    self.scope,
                    self.id,
                    generation,
                    indexed
                );
                self.set_status(RegenerationStatus::Completed {
                    indexed,
                    generation,
                });
            }
            Ok(RunEnd::Cancelled) => {
                tracing::info!("[REGEN {}] job {} cancelled", self.scope, self.id);
                self.abandon().await;
                self.set_status(RegenerationStatus::Cancelled);
            }
            Err(e) => {
                tracing::error!("[REGEN {}] job {} failed: {}", self.scope, self.id, e);
                self.abandon().await;
                self.set_status(RegenerationStatus::Failed(e.to_string()));
            }
        }
    }

    async fn rebuild(&self) -> Result<RunEnd> {
        let mut indexed = 0;
        let mut cursor: Option<String> = None;
        loop {
            if self.cancelled() {
                return Ok(RunEnd::Cancelled);
            }
            let page = self.fetch(cursor.take()).await?;
            let outcome: BatchOutcome = request(&self.queue, &self.scope, |respond| {
                RegenerationCommand::Batch {
                    models: page.items,
                    respond,
                }
            })
            .await?;
            indexed += outcome.indexed;
            self.set_status(RegenerationStatus::InProgress { indexed });
            tracing::debug!(
                "[REGEN {}] job {} indexed {} (skipped {})",
                self.scope,
                self.id,
                indexed,
                outcome.skipped
            );
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        if self.cancelled() {
            return Ok(RunEnd::Cancelled);
        }
        let promoted = request(&self.queue, &self.scope, RegenerationCommand::Promote).await?;
        Ok(RunEnd::Completed {
            indexed,
            generation: promoted.name().to_string(),
        })
    }

    async fn fetch(&self, cursor: Option<String>) -> Result<SourcePage<D>> {
        let source = Arc::clone(&self.source);
        let scope = self.scope.clone();
        let limit = self.batch_size;
        tokio::task::spawn_blocking(move || source.fetch_page(&scope, cursor.as_deref(), limit))
            .await
            .map_err(|e| SearchIndexError::IndexWrite(format!("source read panicked: {}", e)))?
    }

    async fn abandon(&self) {
        match request(&self.queue, &self.scope, RegenerationCommand::Abandon).await {
            Ok(()) | Err(SearchIndexError::NoRegenerationInProgress(_)) => {}
            Err(e) => tracing::warn!("[REGEN {}] abandon failed: {}", self.scope, e),
        }
    }
}

/// Quote and policy indexes over one data directory.
///
/// Dispatches the entity-agnostic operations by [`EntityType`]; typed
/// writes and rebuilds go through [`quotes`](Self::quotes) and
/// [`policies`](Self::policies).
pub struct SearchIndex {
    quotes: Arc<IndexManager<QuoteWriteModel>>,
    policies: Arc<IndexManager<PolicyWriteModel>>,
}

impl SearchIndex {
    pub fn new(config: IndexConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: IndexConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let store = GenerationStore::new(&config.data_dir, Arc::clone(&clock));
        let generations = Arc::new(FsGenerationManager::new(store, Arc::new(config)));
        Ok(SearchIndex {
            quotes: IndexManager::with_generations(Arc::clone(&generations), Arc::clone(&clock))?,
            policies: IndexManager::with_generations(generations, clock)?,
        })
    }

    pub fn quotes(&self) -> &Arc<IndexManager<QuoteWriteModel>> {
        &self.quotes
    }

    pub fn policies(&self) -> &Arc<IndexManager<PolicyWriteModel>> {
        &self.policies
    }

    pub fn search(
        &self,
        tenant_key: &str,
        environment: &str,
        entity_type: EntityType,
        filters: &SearchFilters,
    ) -> Result<Page<ResultItem>> {
        let scope = IndexScope::new(tenant_key, environment, entity_type)?;
        match entity_type {
            EntityType::Quote => self.quotes.search(&scope, filters),
            EntityType::Policy => self.policies.search(&scope, filters),
        }
    }

    pub fn scope_state(
        &self,
        tenant_key: &str,
        environment: &str,
        entity_type: EntityType,
    ) -> Result<ScopeState> {
        let scope = IndexScope::new(tenant_key, environment, entity_type)?;
        match entity_type {
            EntityType::Quote => self.quotes.scope_state(&scope),
            EntityType::Policy => self.policies.scope_state(&scope),
        }
    }

    pub fn status_of_regeneration(
        &self,
        tenant_key: &str,
        environment: &str,
        entity_type: EntityType,
    ) -> Result<RegenerationStatus> {
        let scope = IndexScope::new(tenant_key, environment, entity_type)?;
        match entity_type {
            EntityType::Quote => self.quotes.status_of_regeneration(&scope),
            EntityType::Policy => self.policies.status_of_regeneration(&scope),
        }
    }

    pub fn cancel_regeneration(
        &self,
        tenant_key: &str,
        environment: &str,
        entity_type: EntityType,
    ) -> Result<()> {
        let scope = IndexScope::new(tenant_key, environment, entity_type)?;
        match entity_type {
            EntityType::Quote => self.quotes.cancel_regeneration(&scope),
            EntityType::Policy => self.policies.cancel_regeneration(&scope),
        }
    }

    pub async fn graceful_shutdown(&self) {
        self.quotes.graceful_shutdown().await;
        self.policies.graceful_shutdown().await;
    }
}
