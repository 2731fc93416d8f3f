use crate::error::{Result, SearchIndexError};
use crate::index::document::DocumentConverter;
use crate::index::open_generation_index;
use crate::index::schema::KeywordField;
use crate::index::store::GenerationHandle;
use crate::model::IndexDocument;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, IndexWriter, TantivyDocument, Term};
use uuid::Uuid;

/// In-process set of generation directories with an open writer.
///
/// tantivy's directory lock already excludes a second writer, including one
/// from another process; the registry turns the in-process case into a
/// `WriterAlreadyOpen` before any file is touched.
#[derive(Clone, Default)]
pub struct WriterRegistry {
    open: Arc<DashMap<PathBuf, ()>>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, handle: &GenerationHandle) -> Result<WriterLease> {
        let path = handle.path().to_path_buf();
        match self.open.entry(path.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(SearchIndexError::WriterAlreadyOpen(handle.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(WriterLease {
                    open: Arc::clone(&self.open),
                    path,
                })
            }
        }
    }

    pub fn is_open(&self, handle: &GenerationHandle) -> bool {
        self.open.contains_key(handle.path())
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

pub struct WriterLease {
    open: Arc<DashMap<PathBuf, ()>>,
    path: PathBuf,
}

impl Drop for WriterLease {
    fn drop(&mut self) {
        self.open.remove(&self.path);
    }
}

enum PendingOp {
    Upsert { id: Term, doc: TantivyDocument },
    Delete(Box<dyn Query>),
}

impl PendingOp {
    fn duplicate(&self) -> PendingOp {
        match self {
            PendingOp::Upsert { id, doc } => PendingOp::Upsert {
                id: id.clone(),
                doc: doc.clone(),
            },
            PendingOp::Delete(query) => PendingOp::Delete(query.box_clone()),
        }
    }
}

/// Exclusive writer bound to one generation.
///
/// Operations accumulate until [`commit`](Self::commit). A failed commit
/// rolls the tantivy writer back to the last durable commit but keeps the
/// pending operations, so calling `commit` again retries the same batch.
pub struct GenerationWriter {
    handle: GenerationHandle,
    writer: IndexWriter,
    converter: DocumentConverter,
    pending: Vec<PendingOp>,
    needs_replay: bool,
    #[cfg(test)]
    fail_next_commit: bool,
    // declared last: the tantivy lock is released before the lease
    _lease: WriterLease,
}

impl GenerationWriter {
    pub fn open(
        handle: &GenerationHandle,
        registry: &WriterRegistry,
        heap_bytes: usize,
        min_gram: usize,
        max_gram: usize,
    ) -> Result<Self> {
        let lease = registry.acquire(handle)?;
        let index = open_generation_index(handle, min_gram, max_gram)?;
        let writer = open_tantivy_writer(&index, handle, heap_bytes)?;
        let converter = DocumentConverter::new(&index.schema())?;

        tracing::debug!("[GEN {}] writer opened on {}", handle.scope(), handle.name());
        Ok(GenerationWriter {
            handle: handle.clone(),
            writer,
            converter,
            pending: Vec::new(),
            needs_replay: false,
            #[cfg(test)]
            fail_next_commit: false,
            _lease: lease,
        })
    }

    pub fn handle(&self) -> &GenerationHandle {
        &self.handle
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Replaces any document with the same id.
    pub fn upsert<D: IndexDocument>(&mut self, model: &D) -> Result<()> {
        let doc = self.converter.to_tantivy(model)?;
        let id = self.converter.id_term(model.id());
        self.push(PendingOp::Upsert { id, doc })
    }

    /// Removes documents by id. With a tenant id, only documents of that
    /// tenant are removed.
    pub fn delete(&mut self, ids: &[Uuid], tenant_id: Option<Uuid>) -> Result<()> {
        let tenant_field = self.converter.fields().keyword(KeywordField::TenantId);
        for id in ids {
            let by_id: Box<dyn Query> = Box::new(TermQuery::new(
                self.converter.id_term(*id),
                IndexRecordOption::Basic,
            ));
            let query: Box<dyn Query> = match tenant_id {
                Some(tenant) => Box::new(BooleanQuery::new(vec![
                    (Occur::Must, by_id),
                    (
                        Occur::Must,
                        Box::new(TermQuery::new(
                            Term::from_field_text(tenant_field, &tenant.hyphenated().to_string()),
                            IndexRecordOption::Basic,
                        )) as Box<dyn Query>,
                    ),
                ])),
                None => by_id,
            };
            self.push(PendingOp::Delete(query))?;
        }
        Ok(())
    }

    fn push(&mut self, op: PendingOp) -> Result<()> {
        if !self.needs_replay {
            apply(&self.writer, &op)?;
        }
        self.pending.push(op);
        Ok(())
    }

    /// Applies every operation not yet committed here to `other` as well.
    /// Both generations share one schema, so the prepared documents are
    /// reused as they are.
    pub fn copy_pending_into(&self, other: &mut GenerationWriter) -> Result<usize> {
        for op in &self.pending {
            other.push(op.duplicate())?;
        }
        Ok(self.pending.len())
    }

    #[cfg(test)]
    pub(crate) fn fail_next_commit(&mut self) {
        self.fail_next_commit = true;
    }

    /// Durably publishes every pending operation. Either the whole batch
    /// lands or the previous commit stays the visible state.
    pub fn commit(&mut self) -> Result<()> {
        if self.needs_replay {
            tracing::info!(
                "[GEN {}] replaying {} ops after failed commit",
                self.handle.scope(),
                self.pending.len()
            );
            for op in &self.pending {
                apply(&self.writer, op)?;
            }
            self.needs_replay = false;
        }

        #[cfg(test)]
        let result = if std::mem::take(&mut self.fail_next_commit) {
            Err(tantivy::TantivyError::InternalError(
                "injected commit failure".to_string(),
            ))
        } else {
            self.writer.commit()
        };
        #[cfg(not(test))]
        let result = self.writer.commit();

        match result {
            Ok(opstamp) => {
                tracing::debug!(
                    "[GEN {}] committed {} ops to {} (opstamp={})",
                    self.handle.scope(),
                    self.pending.len(),
                    self.handle.name(),
                    opstamp
                );
                self.pending.clear();
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "[GEN {}] commit to {} failed: {}",
                    self.handle.scope(),
                    self.handle.name(),
                    e
                );
                self.recover_after_failure();
                Err(SearchIndexError::IndexWrite(format!(
                    "commit to {} failed: {}",
                    self.handle, e
                )))
            }
        }
    }

    fn recover_after_failure(&mut self) {
        self.needs_replay = true;
        if let Err(e) = self.writer.rollback() {
            tracing::error!(
                "[GEN {}] rollback after failed commit also failed: {}",
                self.handle.scope(),
                e
            );
        }
    }

    /// Gives up on the batch that failed to commit. The generation keeps its
    /// last durable commit.
    pub fn discard_pending(&mut self) -> Result<()> {
        let dropped = self.pending.len();
        self.pending.clear();
        self.needs_replay = false;
        self.writer.rollback()?;
        tracing::warn!(
            "[GEN {}] discarded {} uncommitted ops on {}",
            self.handle.scope(),
            dropped,
            self.handle.name()
        );
        Ok(())
    }

    /// Commits what is pending and waits for background merges, so the
    /// directory is quiescent once this returns.
    pub fn finish(mut self) -> Result<GenerationHandle> {
        if !self.pending.is_empty() || self.needs_replay {
            self.commit()?;
        }
        let GenerationWriter {
            handle,
            writer,
            _lease,
            ..
        } = self;
        writer.wait_merging_threads()?;
        drop(_lease);
        Ok(handle)
    }
}

fn apply(writer: &IndexWriter, op: &PendingOp) -> Result<()> {
    match op {
        PendingOp::Upsert { id, doc } => {
            writer.delete_term(id.clone());
            writer
                .add_document(doc.clone())
                .map_err(|e| SearchIndexError::IndexWrite(e.to_string()))?;
        }
        PendingOp::Delete(query) => {
            writer
                .delete_query(query.box_clone())
                .map_err(|e| SearchIndexError::IndexWrite(e.to_string()))?;
        }
    }
    Ok(())
}

fn open_tantivy_writer(
    index: &Index,
    handle: &GenerationHandle,
    heap_bytes: usize,
) -> Result<IndexWriter> {
    match index.writer_with_num_threads(1, heap_bytes) {
        Ok(writer) => Ok(writer),
        Err(tantivy::TantivyError::LockFailure(..)) => {
            Err(SearchIndexError::WriterAlreadyOpen(handle.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
