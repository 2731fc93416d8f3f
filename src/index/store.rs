//! On-disk generation layout.
//!
//! ```text
//! {data_dir}/{live|regeneration}/{tenant_key}/{environment}/{entity_type}/{generation}/
//! ```
//!
//! Generation names are 20 decimal digits (`YYYYMMDDhhmmss` plus
//! microseconds), so lexicographic order is creation order. Entries whose
//! name is not a generation name (hidden staging directories, stray files)
//! are never returned by a lookup.

use crate::clock::Clock;
use crate::error::{Result, SearchIndexError};
use crate::index::utils::sync_dir;
use crate::types::{IndexScope, Tree};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const GENERATION_NAME_LEN: usize = 20;
const GENERATION_NAME_FORMAT: &str = "%Y%m%d%H%M%S%6f";
const CREATE_ATTEMPTS: usize = 5;
pub(crate) const PROMOTING_PREFIX: &str = ".promoting-";

/// A generation directory that existed when it was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationHandle {
    scope: IndexScope,
    tree: Tree,
    name: String,
    path: PathBuf,
}

impl GenerationHandle {
    pub fn scope(&self) -> &IndexScope {
        &self.scope
    }

    pub fn tree(&self) -> Tree {
        self.tree
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }
}

impl std::fmt::Display for GenerationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tree, self.scope, self.name)
    }
}

pub fn is_generation_name(name: &str) -> bool {
    name.len() == GENERATION_NAME_LEN && name.bytes().all(|b| b.is_ascii_digit())
}

/// Smallest generation name that is both `>= now` and strictly after `latest`.
pub fn next_generation_name(latest: Option<&str>, now: chrono::DateTime<chrono::Utc>) -> String {
    let candidate = now.format(GENERATION_NAME_FORMAT).to_string();
    match latest {
        Some(latest) if is_generation_name(latest) && latest >= candidate.as_str() => {
            // same digit count, so numeric successor keeps lexicographic order
            let bumped = latest.parse::<u128>().unwrap_or_default() + 1;
            format!("{:0width$}", bumped, width = GENERATION_NAME_LEN)
        }
        _ => candidate,
    }
}

/// Index Directory Store: resolves and creates generation directories.
#[derive(Clone)]
pub struct GenerationStore {
    data_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl GenerationStore {
    pub fn new<P: AsRef<Path>>(data_dir: P, clock: Arc<dyn Clock>) -> Self {
        GenerationStore {
            data_dir: data_dir.as_ref().to_path_buf(),
            clock,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn base_path(&self, tree: Tree, scope: &IndexScope) -> PathBuf {
        self.data_dir
            .join(tree.dir_name())
            .join(scope.suffix_path())
    }

    fn handle(&self, tree: Tree, scope: &IndexScope, name: String) -> GenerationHandle {
        GenerationHandle {
            path: self.base_path(tree, scope).join(&name),
            scope: scope.clone(),
            tree,
            name,
        }
    }

    /// Creates a generation with an explicit name. Fails with `Conflict` if
    /// the directory already exists.
    pub fn create_generation_named(
        &self,
        tree: Tree,
        scope: &IndexScope,
        name: &str,
    ) -> Result<GenerationHandle> {
        if !is_generation_name(name) {
            return Err(SearchIndexError::InvalidScope(format!(
                "'{}' is not a generation name",
                name
            )));
        }
        let base = self.base_path(tree, scope);
        std::fs::create_dir_all(&base)?;
        let handle = self.handle(tree, scope, name.to_string());
        match std::fs::create_dir(&handle.path) {
            Ok(()) => {
                sync_dir(&base)?;
                tracing::debug!("[GEN {}] created {} generation {}", scope, tree, name);
                Ok(handle)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(SearchIndexError::Conflict(handle.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Creates a uniquely named generation that sorts after every existing
    /// one in the tree. A name collision with a concurrent creator is
    /// retried with the next name.
    pub fn create_new_generation(&self, tree: Tree, scope: &IndexScope) -> Result<GenerationHandle> {
        let mut last_conflict = None;
        for attempt in 0..CREATE_ATTEMPTS {
            let name = self.next_name(tree, scope)?;
            match self.create_generation_named(tree, scope, &name) {
                Ok(handle) => return Ok(handle),
                Err(SearchIndexError::Conflict(msg)) => {
                    tracing::warn!(
                        "[GEN {}] name collision on {} (attempt {}), retrying",
                        scope,
                        name,
                        attempt + 1
                    );
                    last_conflict = Some(msg);
                }
                Err(e) => return Err(e),
            }
        }
        Err(SearchIndexError::Conflict(
            last_conflict.unwrap_or_else(|| scope.to_string()),
        ))
    }

    /// The name a new generation in `tree` would get right now.
    pub fn next_name(&self, tree: Tree, scope: &IndexScope) -> Result<String> {
        let latest = self.latest_generation(tree, scope)?;
        Ok(next_generation_name(
            latest.as_ref().map(|g| g.name()),
            self.clock.now(),
        ))
    }

    /// Greatest generation in the tree, or `None` if the tree is absent or
    /// holds no generation.
    pub fn latest_generation(
        &self,
        tree: Tree,
        scope: &IndexScope,
    ) -> Result<Option<GenerationHandle>> {
        Ok(self
            .generation_names(tree, scope)?
            .into_iter()
            .max()
            .map(|name| self.handle(tree, scope, name)))
    }

    /// All generations in the tree, oldest first.
    pub fn list_generations(&self, tree: Tree, scope: &IndexScope) -> Result<Vec<GenerationHandle>> {
        let mut names = self.generation_names(tree, scope)?;
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| self.handle(tree, scope, name))
            .collect())
    }

    fn generation_names(&self, tree: Tree, scope: &IndexScope) -> Result<Vec<String>> {
        let base = self.base_path(tree, scope);
        let entries = match std::fs::read_dir(&base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            // an entry removed mid-listing is simply skipped
            let Ok(entry) = entry else { continue };
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_generation_name(&name) {
                continue;
            }
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Hidden staging path used while copying a generation into the live tree.
    pub(crate) fn promoting_path(&self, scope: &IndexScope, name: &str) -> PathBuf {
        self.base_path(Tree::Live, scope)
            .join(format!("{}{}", PROMOTING_PREFIX, name))
    }

    /// Removes staging directories left behind by an interrupted copy.
    pub fn clean_stale_promotions(&self, scope: &IndexScope) -> Result<usize> {
        let base = self.base_path(Tree::Live, scope);
        let entries = match std::fs::read_dir(&base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(PROMOTING_PREFIX) {
                tracing::warn!("[GEN {}] removing stale promotion dir {}", scope, name);
                std::fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
