use crate::error::{Result, SearchIndexError};
use crate::index::document::DocumentConverter;
use crate::index::open_existing_index;
use crate::index::schema::ID_KEY;
use crate::index::store::GenerationHandle;
use crate::model::IndexDocument;
use crate::query::{Sort, SortOrder};
use crate::types::{Page, ResultItem};
use dashmap::DashMap;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::query::{Query, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{DocAddress, IndexReader, ReloadPolicy, Searcher, TantivyDocument};
use uuid::Uuid;

/// Open readers keyed by generation path. Readers use manual reload, so a
/// cached reader only moves forward when a new searcher is opened from it.
#[derive(Clone, Default)]
pub struct ReaderCache {
    readers: Arc<DashMap<PathBuf, (IndexReader, DocumentConverter)>>,
}

impl ReaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self, handle: &GenerationHandle) {
        self.readers.remove(handle.path());
    }

    /// Drops readers of superseded generations in the same tree as `keep`.
    pub fn retain_latest(&self, keep: &GenerationHandle) {
        let base = keep.path().parent().map(|p| p.to_path_buf());
        self.readers
            .retain(|path, _| path.as_path() == keep.path() || path.parent() != base.as_deref());
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

/// Point-in-time view of one generation.
///
/// The snapshot is taken at [`open`](Self::open): commits that complete
/// afterwards are not visible through this value, commits completed before
/// it always are.
pub struct GenerationSearcher {
    handle: GenerationHandle,
    // None while no writer has initialised the generation
    snapshot: Option<(Searcher, DocumentConverter)>,
}

impl GenerationSearcher {
    pub fn open(handle: &GenerationHandle, min_gram: usize, max_gram: usize) -> Result<Self> {
        let snapshot = match open_reader(handle, min_gram, max_gram)? {
            Some((reader, converter)) => Some((reader.searcher(), converter)),
            None => None,
        };
        Ok(GenerationSearcher {
            handle: handle.clone(),
            snapshot,
        })
    }

    /// Like [`open`](Self::open) but reuses a cached reader, reloading it
    /// to the latest commit first.
    pub fn open_cached(
        cache: &ReaderCache,
        handle: &GenerationHandle,
        min_gram: usize,
        max_gram: usize,
    ) -> Result<Self> {
        let cached = cache
            .readers
            .get(handle.path())
            .map(|entry| entry.value().clone());

        let (reader, converter) = match cached {
            Some((reader, converter)) => {
                if let Err(e) = reader.reload() {
                    cache.invalidate(handle);
                    if !handle.exists() {
                        return Err(SearchIndexError::GenerationNotFound(handle.to_string()));
                    }
                    return Err(e.into());
                }
                (reader, converter)
            }
            None => match open_reader(handle, min_gram, max_gram)? {
                Some(pair) => {
                    cache
                        .readers
                        .insert(handle.path().to_path_buf(), pair.clone());
                    pair
                }
                None => {
                    return Ok(GenerationSearcher {
                        handle: handle.clone(),
                        snapshot: None,
                    })
                }
            },
        };

        Ok(GenerationSearcher {
            handle: handle.clone(),
            snapshot: Some((reader.searcher(), converter)),
        })
    }

    pub fn handle(&self) -> &GenerationHandle {
        &self.handle
    }

    pub fn num_docs(&self) -> u64 {
        self.snapshot
            .as_ref()
            .map(|(s, _)| s.num_docs())
            .unwrap_or(0)
    }

    /// Runs `query`, orders every hit deterministically and returns one
    /// page. `page` is 1-based.
    pub fn search(
        &self,
        query: &dyn Query,
        sort: Sort,
        page: usize,
        page_size: usize,
    ) -> Result<Page<ResultItem>> {
        let Some((searcher, converter)) = &self.snapshot else {
            return Ok(Page::empty(page, page_size));
        };

        let hits = searcher.search(query, &DocSetCollector)?;
        let total_count = hits.len();

        let mut keyed = Vec::with_capacity(total_count);
        let sort_field = sort.field.field_name();
        let mut columns = Vec::with_capacity(searcher.segment_readers().len());
        for segment in searcher.segment_readers() {
            let fast = segment.fast_fields();
            columns.push((fast.i64(sort_field)?, fast.u64(ID_KEY)?));
        }
        for addr in hits {
            let (sort_col, id_col) = &columns[addr.segment_ord as usize];
            keyed.push((
                sort_col.first(addr.doc_id),
                id_col.first(addr.doc_id).unwrap_or_default(),
                addr,
            ));
        }
        keyed.sort_by(|a, b| compare_hits(a, b, sort.order));

        let start = page.saturating_sub(1).saturating_mul(page_size);
        let mut items = Vec::new();
        for (_, _, addr) in keyed.into_iter().skip(start).take(page_size) {
            let doc: TantivyDocument = searcher.doc(addr)?;
            items.push(converter.to_result_item(&doc)?);
        }

        Ok(Page {
            items,
            total_count,
            page,
            page_size,
        })
    }

    pub fn get<D: IndexDocument>(&self, id: Uuid) -> Result<Option<D>> {
        let Some((searcher, converter)) = &self.snapshot else {
            return Ok(None);
        };
        let query = TermQuery::new(converter.id_term(id), IndexRecordOption::Basic);
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        match top.first() {
            Some((_, addr)) => {
                let doc: TantivyDocument = searcher.doc(*addr)?;
                Ok(Some(converter.to_model(&doc)?))
            }
            None => Ok(None),
        }
    }
}

fn open_reader(
    handle: &GenerationHandle,
    min_gram: usize,
    max_gram: usize,
) -> Result<Option<(IndexReader, DocumentConverter)>> {
    let Some(index) = open_existing_index(handle, min_gram, max_gram)? else {
        return Ok(None);
    };
    let reader = index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()
        .map_err(|e: tantivy::TantivyError| {
            if handle.exists() {
                SearchIndexError::from(e)
            } else {
                SearchIndexError::GenerationNotFound(handle.to_string())
            }
        })?;
    let converter = DocumentConverter::new(&index.schema())?;
    Ok(Some((reader, converter)))
}

/// Documents without the sort value go last in either direction; ties fall
/// back to the id key and then the document address.
fn compare_hits(
    a: &(Option<i64>, u64, DocAddress),
    b: &(Option<i64>, u64, DocAddress),
    order: SortOrder,
) -> Ordering {
    let primary = match (a.0, b.0) {
        (Some(x), Some(y)) => match order {
            SortOrder::Asc => x.cmp(&y),
            SortOrder::Desc => y.cmp(&x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    primary
        .then(a.1.cmp(&b.1))
        .then((a.2.segment_ord, a.2.doc_id).cmp(&(b.2.segment_ord, b.2.doc_id)))
}
