//! Per-scope write task with hybrid batching.
//!
//! Every write to a scope goes through one task, which owns the live writer
//! and, while a rebuild runs, the regeneration writer. Incremental writes are
//! batched by count and by timeout into one commit.
//!
//! While a regeneration is open, incremental writes land in both
//! generations. The task remembers the `last_modified_ticks` of each id it
//! wrote that way (deletes as tombstones) and drops any bulk document that
//! is not strictly newer, so a promoted rebuild never resurrects or reverts
//! a write made while it was running.

use crate::error::{Result, SearchIndexError};
use crate::index::generation::{FsGenerationManager, GenerationManager};
use crate::index::store::GenerationHandle;
use crate::index::writer::GenerationWriter;
use crate::model::IndexDocument;
use crate::types::{IndexScope, TaskInfo, TaskStatus, Tree};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout_at;
use uuid::Uuid;

/// Consecutive failed commits before the queued batch is given up on.
const MAX_COMMIT_ATTEMPTS: usize = 5;

pub enum WriteAction<D> {
    Upsert(D),
    Delete { id: Uuid, tenant_id: Option<Uuid> },
}

pub struct WriteOp<D> {
    pub task_id: String,
    pub actions: Vec<WriteAction<D>>,
}

/// Rebuild control. Each command answers on its own channel once the write
/// task has handled it; incremental writes queued earlier are committed
/// first.
pub enum RegenerationCommand<D> {
    Begin(oneshot::Sender<Result<GenerationHandle>>),
    Batch {
        models: Vec<D>,
        respond: oneshot::Sender<Result<BatchOutcome>>,
    },
    /// Finishes the regeneration writer, marks it complete and swaps it in.
    Promote(oneshot::Sender<Result<GenerationHandle>>),
    Abandon(oneshot::Sender<Result<()>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    pub indexed: usize,
    /// Dropped because a newer incremental write for the id already landed.
    pub skipped: usize,
}

pub enum WriteMessage<D> {
    Write(WriteOp<D>),
    Regeneration(RegenerationCommand<D>),
}

pub type WriteQueue<D> = mpsc::Sender<WriteMessage<D>>;

pub(crate) fn create_write_queue<D: IndexDocument>(
    scope: IndexScope,
    generations: Arc<FsGenerationManager>,
    tasks: Arc<DashMap<String, TaskInfo>>,
) -> (WriteQueue<D>, tokio::task::JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(generations.config().queue_capacity);
    let handle = tokio::spawn(async move {
        let state = ScopeWriter::new(scope, generations, tasks);
        process_writes(state, rx).await
    });
    (tx, handle)
}

/// Sends a rebuild command and waits for its answer.
pub(crate) async fn request<D, T>(
    queue: &WriteQueue<D>,
    scope: &IndexScope,
    command: impl FnOnce(oneshot::Sender<Result<T>>) -> RegenerationCommand<D>,
) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    queue
        .send(WriteMessage::Regeneration(command(tx)))
        .await
        .map_err(|_| SearchIndexError::QueueClosed(scope.to_string()))?;
    rx.await
        .map_err(|_| SearchIndexError::QueueClosed(scope.to_string()))?
}

struct Regeneration {
    writer: GenerationWriter,
    /// Incremental writes seen since the regeneration began. `None` is a
    /// delete.
    touched: HashMap<Uuid, Option<i64>>,
}

impl Regeneration {
    fn supersedes<D: IndexDocument>(&self, model: &D) -> bool {
        match self.touched.get(&model.id()) {
            None => false,
            Some(None) => true,
            Some(Some(ticks)) => *ticks >= model.last_modified_ticks(),
        }
    }
}

/// A task whose actions are applied to the live writer but not yet durable.
struct Uncommitted {
    task_id: String,
    /// One entry per action, with the write's ticks or `None` for a delete.
    touched: Vec<(Uuid, Option<i64>)>,
}

struct ScopeWriter {
    scope: IndexScope,
    generations: Arc<FsGenerationManager>,
    tasks: Arc<DashMap<String, TaskInfo>>,
    live: Option<GenerationWriter>,
    regeneration: Option<Regeneration>,
    awaiting_commit: Vec<Uncommitted>,
    failed_commits: usize,
}

async fn process_writes<D: IndexDocument>(
    mut state: ScopeWriter,
    mut rx: mpsc::Receiver<WriteMessage<D>>,
) -> Result<()> {
    let batch_size = state.generations.config().batch_size.max(1);
    let batch_timeout = Duration::from_millis(state.generations.config().batch_timeout_ms);
    let scope = state.scope.clone();

    tracing::info!("[WQ {}] write queue started", scope);
    let mut pending: Vec<WriteOp<D>> = Vec::new();
    let mut deadline = Instant::now() + batch_timeout;

    loop {
        if pending.is_empty() {
            tracing::trace!(
                "[WQ {}] idle, deadline_in={}ms",
                scope,
                deadline.saturating_duration_since(Instant::now()).as_millis()
            );
        } else {
            tracing::debug!(
                "[WQ {}] waiting, pending={}, deadline_in={}ms",
                scope,
                pending.len(),
                deadline.saturating_duration_since(Instant::now()).as_millis()
            );
        }
        match timeout_at(deadline.into(), rx.recv()).await {
            Ok(Some(WriteMessage::Write(op))) => {
                tracing::debug!(
                    "[WQ {}] received op task={} actions={}",
                    scope,
                    op.task_id,
                    op.actions.len()
                );
                pending.push(op);
                if pending.len() >= batch_size {
                    tracing::debug!(
                        "[WQ {}] batch threshold, committing {} ops",
                        scope,
                        pending.len()
                    );
                    state.commit_batch(&mut pending);
                    deadline = Instant::now() + batch_timeout;
                }
            }
            Ok(Some(WriteMessage::Regeneration(command))) => {
                if !pending.is_empty() || state.has_uncommitted() {
                    state.commit_batch(&mut pending);
                }
                state.handle_regeneration(command);
                deadline = Instant::now() + batch_timeout;
            }
            Ok(None) => {
                tracing::info!(
                    "[WQ {}] channel closed, flushing {} pending",
                    scope,
                    pending.len()
                );
                if !pending.is_empty() || state.has_uncommitted() {
                    state.commit_batch(&mut pending);
                }
                state.close();
                break;
            }
            Err(_timeout) => {
                if !pending.is_empty() || state.has_uncommitted() {
                    tracing::debug!(
                        "[WQ {}] timeout, flushing {} pending",
                        scope,
                        pending.len()
                    );
                    state.commit_batch(&mut pending);
                }
                deadline = Instant::now() + batch_timeout;
            }
        }
    }
    Ok(())
}

impl ScopeWriter {
    fn new(
        scope: IndexScope,
        generations: Arc<FsGenerationManager>,
        tasks: Arc<DashMap<String, TaskInfo>>,
    ) -> Self {
        ScopeWriter {
            scope,
            generations,
            tasks,
            live: None,
            regeneration: None,
            awaiting_commit: Vec::new(),
            failed_commits: 0,
        }
    }

    fn has_uncommitted(&self) -> bool {
        !self.awaiting_commit.is_empty()
    }

    fn set_status(&self, task_id: &str, status: TaskStatus, indexed: Option<usize>) {
        self.tasks.alter(task_id, |_, mut task| {
            task.status = status;
            if let Some(n) = indexed {
                task.indexed_documents = n;
            }
            task
        });
    }

    /// The first write to a scope without a live generation creates one.
    fn ensure_live_writer(&mut self) -> Result<()> {
        if self.live.is_some() {
            return Ok(());
        }
        let generation = match self.generations.latest(Tree::Live, &self.scope)? {
            Some(generation) => generation,
            None => self.generations.create_live(&self.scope)?,
        };
        self.live = Some(self.generations.open_writer(&generation)?);
        tracing::info!(
            "[WQ {}] live writer on generation {}",
            self.scope,
            generation.name()
        );
        Ok(())
    }

    fn commit_batch<D: IndexDocument>(&mut self, ops: &mut Vec<WriteOp<D>>) {
        tracing::debug!("[WQ {}] commit_batch: {} operations", self.scope, ops.len());

        if let Err(e) = self.ensure_live_writer() {
            tracing::error!("[WQ {}] no live writer: {}", self.scope, e);
            for op in ops.drain(..) {
                self.set_status(&op.task_id, TaskStatus::Failed(e.to_string()), None);
            }
            return;
        }

        for op in ops.drain(..) {
            self.set_status(&op.task_id, TaskStatus::Processing, None);
            match self.apply_op(&op) {
                Ok(touched) => self.awaiting_commit.push(Uncommitted {
                    task_id: op.task_id,
                    touched,
                }),
                Err(e) => {
                    tracing::warn!("[WQ {}] task {} rejected: {}", self.scope, op.task_id, e);
                    self.set_status(&op.task_id, TaskStatus::Failed(e.to_string()), None);
                }
            }
        }

        self.commit_pending();
    }

    fn apply_op<D: IndexDocument>(
        &mut self,
        op: &WriteOp<D>,
    ) -> Result<Vec<(Uuid, Option<i64>)>> {
        let live = self
            .live
            .as_mut()
            .ok_or_else(|| SearchIndexError::NotFound(self.scope.to_string()))?;
        let mut touched = Vec::with_capacity(op.actions.len());
        for action in &op.actions {
            let (id, ticks) = match action {
                WriteAction::Upsert(model) => {
                    live.upsert(model)?;
                    if let Some(regen) = self.regeneration.as_mut() {
                        regen.writer.upsert(model)?;
                    }
                    (model.id(), Some(model.last_modified_ticks()))
                }
                WriteAction::Delete { id, tenant_id } => {
                    live.delete(&[*id], *tenant_id)?;
                    if let Some(regen) = self.regeneration.as_mut() {
                        regen.writer.delete(&[*id], *tenant_id)?;
                    }
                    (*id, None)
                }
            };
            if let Some(regen) = self.regeneration.as_mut() {
                regen.touched.insert(id, ticks);
            }
            touched.push((id, ticks));
        }
        Ok(touched)
    }

    fn commit_pending(&mut self) {
        if let Some(regen) = self.regeneration.as_mut() {
            if regen.writer.pending_count() > 0 {
                // stays pending and is replayed by the next regeneration commit
                if let Err(e) = regen.writer.commit() {
                    tracing::error!("[WQ {}] regeneration commit failed: {}", self.scope, e);
                }
            }
        }

        let Some(live) = self.live.as_mut() else {
            return;
        };
        match live.commit() {
            Ok(()) => self.mark_committed(),
            Err(e) => {
                self.failed_commits += 1;
                if self.failed_commits < MAX_COMMIT_ATTEMPTS {
                    tracing::warn!(
                        "[WQ {}] commit attempt {} failed, retrying on next flush: {}",
                        self.scope,
                        self.failed_commits,
                        e
                    );
                    return;
                }
                tracing::error!(
                    "[WQ {}] giving up on {} tasks after {} failed commits: {}",
                    self.scope,
                    self.awaiting_commit.len(),
                    self.failed_commits,
                    e
                );
                if let Err(e) = live.discard_pending() {
                    tracing::error!("[WQ {}] discard failed: {}", self.scope, e);
                }
                self.fail_uncommitted(&e.to_string());
            }
        }
    }

    fn mark_committed(&mut self) {
        self.failed_commits = 0;
        for task in std::mem::take(&mut self.awaiting_commit) {
            self.set_status(&task.task_id, TaskStatus::Succeeded, Some(task.touched.len()));
        }
    }

    fn fail_uncommitted(&mut self, reason: &str) {
        self.failed_commits = 0;
        for task in std::mem::take(&mut self.awaiting_commit) {
            self.set_status(&task.task_id, TaskStatus::Failed(reason.to_string()), None);
        }
    }

    fn handle_regeneration<D: IndexDocument>(&mut self, command: RegenerationCommand<D>) {
        match command {
            RegenerationCommand::Begin(respond) => {
                let _ = respond.send(self.begin_regeneration());
            }
            RegenerationCommand::Batch { models, respond } => {
                let _ = respond.send(self.add_batch(models));
            }
            RegenerationCommand::Promote(respond) => {
                let _ = respond.send(self.promote());
            }
            RegenerationCommand::Abandon(respond) => {
                let _ = respond.send(self.abandon());
            }
        }
    }

    fn begin_regeneration(&mut self) -> Result<GenerationHandle> {
        if self.regeneration.is_some() {
            return Err(SearchIndexError::RegenerationInProgress(self.scope.to_string()));
        }
        let generation = self.generations.begin_regeneration(&self.scope)?;
        let mut writer = match self.generations.open_writer(&generation) {
            Ok(writer) => writer,
            Err(e) => return Err(self.discard_regeneration(&generation, e)),
        };

        // ops still waiting on a live commit belong in the new generation too
        if let Some(live) = self.live.as_ref() {
            match live.copy_pending_into(&mut writer) {
                Ok(0) => {}
                Ok(carried) => tracing::info!(
                    "[WQ {}] carried {} uncommitted ops into {}",
                    self.scope,
                    carried,
                    generation.name()
                ),
                Err(e) => {
                    drop(writer);
                    return Err(self.discard_regeneration(&generation, e));
                }
            }
        }
        let touched = self
            .awaiting_commit
            .iter()
            .flat_map(|task| task.touched.iter().copied())
            .collect();
        self.regeneration = Some(Regeneration { writer, touched });
        tracing::info!("[WQ {}] dual-writing into {}", self.scope, generation.name());
        Ok(generation)
    }

    fn discard_regeneration(
        &self,
        generation: &GenerationHandle,
        error: SearchIndexError,
    ) -> SearchIndexError {
        if let Err(cleanup) = self.generations.abandon_regeneration(generation) {
            tracing::error!("[WQ {}] abandon failed: {}", self.scope, cleanup);
        }
        error
    }

    fn add_batch<D: IndexDocument>(&mut self, models: Vec<D>) -> Result<BatchOutcome> {
        let regen = self
            .regeneration
            .as_mut()
            .ok_or_else(|| SearchIndexError::NoRegenerationInProgress(self.scope.to_string()))?;
        let received = models.len();
        let kept: Vec<D> = models.into_iter().filter(|m| !regen.supersedes(m)).collect();
        let outcome = BatchOutcome {
            indexed: kept.len(),
            skipped: received - kept.len(),
        };
        self.generations.add_to_regeneration(&mut regen.writer, &kept)?;
        if outcome.skipped > 0 {
            tracing::debug!(
                "[WQ {}] skipped {} bulk documents superseded by incremental writes",
                self.scope,
                outcome.skipped
            );
        }
        Ok(outcome)
    }

    fn promote(&mut self) -> Result<GenerationHandle> {
        let regen = self
            .regeneration
            .take()
            .ok_or_else(|| SearchIndexError::NoRegenerationInProgress(self.scope.to_string()))?;
        let generation = regen.writer.handle().clone();

        match self.swap_in(regen) {
            Ok(promoted) => {
                // carried at begin or dual-written since, so durable in the
                // promoted generation
                self.mark_committed();
                Ok(promoted)
            }
            Err(e) => {
                tracing::error!(
                    "[WQ {}] promotion of {} failed, abandoning: {}",
                    self.scope,
                    generation.name(),
                    e
                );
                if self.live.is_none() {
                    // the old live writer was closed without committing them
                    self.fail_uncommitted(&e.to_string());
                }
                Err(self.discard_regeneration(&generation, e))
            }
        }
    }

    fn swap_in(&mut self, regen: Regeneration) -> Result<GenerationHandle> {
        let generation = regen.writer.finish()?;
        self.generations.mark_regeneration_complete(&generation)?;

        // reopened lazily against the promoted generation
        if let Some(live) = self.live.take() {
            match live.finish() {
                Ok(_) => self.mark_committed(),
                Err(e) => tracing::warn!("[WQ {}] closing live writer: {}", self.scope, e),
            }
        }
        self.generations.promote(&generation)
    }

    fn abandon(&mut self) -> Result<()> {
        let regen = self
            .regeneration
            .take()
            .ok_or_else(|| SearchIndexError::NoRegenerationInProgress(self.scope.to_string()))?;
        let generation = regen.writer.handle().clone();
        drop(regen);
        self.generations.abandon_regeneration(&generation)
    }

    fn close(&mut self) {
        if self.regeneration.is_some() {
            tracing::warn!("[WQ {}] closing with an open regeneration", self.scope);
            if let Err(e) = self.abandon() {
                tracing::error!("[WQ {}] abandon on close failed: {}", self.scope, e);
            }
        }
        if let Some(live) = self.live.take() {
            match live.finish() {
                Ok(_) => self.mark_committed(),
                Err(e) => tracing::error!("[WQ {}] final commit failed: {}", self.scope, e),
            }
        }
        self.fail_uncommitted("write queue closed before commit");
    }
}
