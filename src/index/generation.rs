//! Generation lifecycle and the live/regeneration swap.
//!
//! ```text
//! NoIndex -> LiveOnly -> LiveWithRegenerationInProgress
//!                     -> LiveWithRegenerationComplete -> (promote) -> LiveOnly
//! ```
//!
//! A regeneration generation is marked complete by a sibling
//! `{name}.complete` file, which is not a generation name and so never
//! shows up in a listing.

use crate::config::{IndexConfig, PromotionStrategy};
use crate::error::{Result, SearchIndexError};
use crate::index::searcher::{GenerationSearcher, ReaderCache};
use crate::index::store::{GenerationHandle, GenerationStore};
use crate::index::utils::{copy_dir_durable, sync_dir};
use crate::index::writer::{GenerationWriter, WriterRegistry};
use crate::model::IndexDocument;
use crate::types::{IndexScope, ScopeState, Tree};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const COMPLETE_SUFFIX: &str = ".complete";

/// Ownership boundary for everything that touches the generation trees.
///
/// Writers handed out are exclusive per generation; dropping one releases
/// the generation for the next writer.
pub trait GenerationManager: Send + Sync {
    fn latest(&self, tree: Tree, scope: &IndexScope) -> Result<Option<GenerationHandle>>;

    fn list(&self, tree: Tree, scope: &IndexScope) -> Result<Vec<GenerationHandle>>;

    /// New empty generation in the live tree, sorting after the current one.
    fn create_live(&self, scope: &IndexScope) -> Result<GenerationHandle>;

    /// New empty generation in the regeneration tree. The live tree is not
    /// touched.
    fn begin_regeneration(&self, scope: &IndexScope) -> Result<GenerationHandle>;

    fn open_writer(&self, generation: &GenerationHandle) -> Result<GenerationWriter>;

    fn open_searcher(&self, generation: &GenerationHandle) -> Result<GenerationSearcher>;

    fn mark_regeneration_complete(&self, generation: &GenerationHandle) -> Result<()>;

    /// Removes a regeneration generation that will never be promoted.
    fn abandon_regeneration(&self, generation: &GenerationHandle) -> Result<()>;

    /// Makes `generation` the latest live generation in one step. The
    /// previous live generation stays latest on any failure.
    fn promote(&self, generation: &GenerationHandle) -> Result<GenerationHandle>;

    fn scope_state(&self, scope: &IndexScope) -> Result<ScopeState>;
}

/// Filesystem-backed [`GenerationManager`].
#[derive(Clone)]
pub struct FsGenerationManager {
    store: GenerationStore,
    registry: WriterRegistry,
    readers: ReaderCache,
    config: Arc<IndexConfig>,
}

impl FsGenerationManager {
    pub fn new(store: GenerationStore, config: Arc<IndexConfig>) -> Self {
        FsGenerationManager {
            store,
            registry: WriterRegistry::new(),
            readers: ReaderCache::new(),
            config,
        }
    }

    pub fn store(&self) -> &GenerationStore {
        &self.store
    }

    pub fn registry(&self) -> &WriterRegistry {
        &self.registry
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Upserts a bulk batch into a regeneration generation and commits it.
    pub fn add_to_regeneration<D: IndexDocument>(
        &self,
        writer: &mut GenerationWriter,
        models: &[D],
    ) -> Result<()> {
        if writer.handle().tree() != Tree::Regeneration {
            return Err(SearchIndexError::NoRegenerationInProgress(
                writer.handle().to_string(),
            ));
        }
        for model in models {
            writer.upsert(model)?;
        }
        writer.commit()
    }

    fn complete_marker(generation: &GenerationHandle) -> PathBuf {
        let mut name = generation.name().to_string();
        name.push_str(COMPLETE_SUFFIX);
        generation
            .path()
            .parent()
            .map(|p| p.join(&name))
            .unwrap_or_else(|| PathBuf::from(name))
    }

    fn is_complete(generation: &GenerationHandle) -> bool {
        Self::complete_marker(generation).is_file()
    }

    fn remove_regeneration_dir(&self, generation: &GenerationHandle) -> Result<()> {
        match std::fs::remove_dir_all(generation.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match std::fs::remove_file(Self::complete_marker(generation)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn promote_by_rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        std::fs::rename(from, to)
    }

    fn promote_by_copy(
        &self,
        generation: &GenerationHandle,
        target_name: &str,
        to: &Path,
    ) -> Result<()> {
        let scope = generation.scope();
        let staging = self.store.promoting_path(scope, target_name);
        let result = copy_dir_durable(generation.path(), &staging)
            .and_then(|_| std::fs::rename(&staging, to).map_err(Into::into));
        if result.is_err() {
            // hidden name, so a leftover never wins a latest comparison
            let _ = std::fs::remove_dir_all(&staging);
        }
        result
    }
}

impl GenerationManager for FsGenerationManager {
    fn latest(&self, tree: Tree, scope: &IndexScope) -> Result<Option<GenerationHandle>> {
        self.store.latest_generation(tree, scope)
    }

    fn list(&self, tree: Tree, scope: &IndexScope) -> Result<Vec<GenerationHandle>> {
        self.store.list_generations(tree, scope)
    }

    fn create_live(&self, scope: &IndexScope) -> Result<GenerationHandle> {
        let generation = self.store.create_new_generation(Tree::Live, scope)?;
        tracing::info!("[GEN {}] created live generation {}", scope, generation.name());
        Ok(generation)
    }

    fn begin_regeneration(&self, scope: &IndexScope) -> Result<GenerationHandle> {
        for leftover in self.store.list_generations(Tree::Regeneration, scope)? {
            if self.registry.is_open(&leftover) {
                return Err(SearchIndexError::RegenerationInProgress(scope.to_string()));
            }
            tracing::warn!(
                "[REGEN {}] removing leftover regeneration generation {}",
                scope,
                leftover.name()
            );
            self.remove_regeneration_dir(&leftover)?;
        }
        let generation = self.store.create_new_generation(Tree::Regeneration, scope)?;
        tracing::info!(
            "[REGEN {}] began regeneration generation {}",
            scope,
            generation.name()
        );
        Ok(generation)
    }

    fn open_writer(&self, generation: &GenerationHandle) -> Result<GenerationWriter> {
        GenerationWriter::open(
            generation,
            &self.registry,
            self.config.writer_heap_bytes(),
            self.config.min_gram,
            self.config.max_gram,
        )
    }

    fn open_searcher(&self, generation: &GenerationHandle) -> Result<GenerationSearcher> {
        let searcher = GenerationSearcher::open_cached(
            &self.readers,
            generation,
            self.config.min_gram,
            self.config.max_gram,
        )?;
        self.readers.retain_latest(generation);
        Ok(searcher)
    }

    fn mark_regeneration_complete(&self, generation: &GenerationHandle) -> Result<()> {
        if generation.tree() != Tree::Regeneration {
            return Err(SearchIndexError::NoRegenerationInProgress(generation.to_string()));
        }
        if !generation.exists() {
            return Err(SearchIndexError::GenerationNotFound(generation.to_string()));
        }
        let marker = Self::complete_marker(generation);
        std::fs::write(&marker, generation.name())?;
        std::fs::File::open(&marker)?.sync_all()?;
        if let Some(parent) = marker.parent() {
            sync_dir(parent)?;
        }
        Ok(())
    }

    fn abandon_regeneration(&self, generation: &GenerationHandle) -> Result<()> {
        if generation.tree() != Tree::Regeneration {
            return Err(SearchIndexError::NoRegenerationInProgress(generation.to_string()));
        }
        tracing::info!(
            "[REGEN {}] abandoning regeneration generation {}",
            generation.scope(),
            generation.name()
        );
        self.remove_regeneration_dir(generation)
    }

    fn promote(&self, generation: &GenerationHandle) -> Result<GenerationHandle> {
        let scope = generation.scope();
        if generation.tree() != Tree::Regeneration {
            return Err(SearchIndexError::Promotion(format!(
                "{} is not a regeneration generation",
                generation
            )));
        }
        if !generation.exists() {
            return Err(SearchIndexError::GenerationNotFound(generation.to_string()));
        }
        if self.registry.is_open(generation) {
            return Err(SearchIndexError::WriterAlreadyOpen(generation.to_string()));
        }

        self.store.clean_stale_promotions(scope)?;

        let live_base = self.store.base_path(Tree::Live, scope);
        std::fs::create_dir_all(&live_base)?;
        let target_name = self.store.next_name(Tree::Live, scope)?;
        let target = live_base.join(&target_name);
        if target.exists() {
            return Err(SearchIndexError::Conflict(target.display().to_string()));
        }

        let mut strategy = self.config.promotion;
        if strategy == PromotionStrategy::Rename {
            match self.promote_by_rename(generation.path(), &target) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                    tracing::warn!(
                        "[PROMOTE {}] trees on different filesystems, falling back to copy",
                        scope
                    );
                    strategy = PromotionStrategy::Copy;
                }
                Err(e) => {
                    return Err(SearchIndexError::Promotion(format!(
                        "rename {} -> {} failed: {}",
                        generation,
                        target.display(),
                        e
                    )))
                }
            }
        }
        if strategy == PromotionStrategy::Copy {
            self.promote_by_copy(generation, &target_name, &target)
                .map_err(|e| {
                    SearchIndexError::Promotion(format!(
                        "copy {} -> {} failed: {}",
                        generation,
                        target.display(),
                        e
                    ))
                })?;
        }

        sync_dir(&live_base)?;
        self.remove_regeneration_dir(generation)?;
        self.readers.invalidate(generation);

        tracing::info!(
            "[PROMOTE {}] {} is now live generation {} ({:?})",
            scope,
            generation.name(),
            target_name,
            strategy
        );

        self.store
            .latest_generation(Tree::Live, scope)?
            .filter(|g| g.name() == target_name)
            .ok_or_else(|| {
                SearchIndexError::Promotion(format!(
                    "{} was superseded during promotion",
                    target.display()
                ))
            })
    }

    fn scope_state(&self, scope: &IndexScope) -> Result<ScopeState> {
        if self.store.latest_generation(Tree::Live, scope)?.is_none() {
            return Ok(ScopeState::NoIndex);
        }
        Ok(match self.store.latest_generation(Tree::Regeneration, scope)? {
            None => ScopeState::LiveOnly,
            Some(regen) if Self::is_complete(&regen) => ScopeState::LiveWithRegenerationComplete,
            Some(_) => ScopeState::LiveWithRegenerationInProgress,
        })
    }
}
