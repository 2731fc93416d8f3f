pub mod document;
pub mod generation;
pub mod manager;
pub mod schema;
pub mod searcher;
pub mod store;
pub mod utils;
pub mod write_queue;
pub mod writer;

pub use generation::{FsGenerationManager, GenerationManager};
pub use manager::{IndexManager, RegenerationSource, SearchIndex, SourcePage};
pub use searcher::GenerationSearcher;
pub use store::{GenerationHandle, GenerationStore};
pub use writer::{GenerationWriter, WriterRegistry};

use crate::error::{Result, SearchIndexError};
use crate::tokenizer::register_analyzers;
use tantivy::directory::MmapDirectory;
use tantivy::Index;

fn open_directory(handle: &GenerationHandle) -> Result<MmapDirectory> {
    if !handle.exists() {
        return Err(SearchIndexError::GenerationNotFound(handle.to_string()));
    }
    MmapDirectory::open(handle.path()).map_err(|e| {
        if handle.exists() {
            SearchIndexError::Tantivy(e.to_string())
        } else {
            SearchIndexError::GenerationNotFound(handle.to_string())
        }
    })
}

/// Opens the tantivy index of a generation, creating it on first use.
/// Only writers call this; a searcher must never initialise a generation.
pub(crate) fn open_generation_index(
    handle: &GenerationHandle,
    min_gram: usize,
    max_gram: usize,
) -> Result<Index> {
    let dir = open_directory(handle)?;
    let index = Index::open_or_create(dir, schema::build_schema()).map_err(|e| {
        if handle.exists() {
            SearchIndexError::from(e)
        } else {
            SearchIndexError::GenerationNotFound(handle.to_string())
        }
    })?;
    register_analyzers(&index, min_gram, max_gram);
    Ok(index)
}

/// Opens a generation read-only. `None` means the directory exists but no
/// writer has initialised it yet, which reads as an empty index.
pub(crate) fn open_existing_index(
    handle: &GenerationHandle,
    min_gram: usize,
    max_gram: usize,
) -> Result<Option<Index>> {
    let dir = open_directory(handle)?;
    let initialised =
        Index::exists(&dir).map_err(|e| SearchIndexError::Tantivy(e.to_string()))?;
    if !initialised {
        return Ok(None);
    }
    let index = Index::open(dir).map_err(|e| {
        if handle.exists() {
            SearchIndexError::from(e)
        } else {
            SearchIndexError::GenerationNotFound(handle.to_string())
        }
    })?;
    register_analyzers(&index, min_gram, max_gram);
    Ok(Some(index))
}
