use crate::error::{Result, SearchIndexError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// The two entity families that get their own generation trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Quote,
    Policy,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Quote => "quote",
            EntityType::Policy => "policy",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quote" | "quotes" => Ok(EntityType::Quote),
            "policy" | "policies" => Ok(EntityType::Policy),
            other => Err(SearchIndexError::InvalidScope(format!(
                "unknown entity type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generation lineage on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tree {
    Live,
    Regeneration,
}

impl Tree {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Tree::Live => "live",
            Tree::Regeneration => "regeneration",
        }
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Resolved `(tenant_key, environment, entity_type)` triple.
///
/// Tenant and environment are opaque to this crate; they only have to be
/// usable as single path segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexScope {
    tenant_key: String,
    environment: String,
    entity_type: EntityType,
}

impl IndexScope {
    pub fn new(
        tenant_key: impl Into<String>,
        environment: impl Into<String>,
        entity_type: EntityType,
    ) -> Result<Self> {
        let tenant_key = tenant_key.into();
        let environment = environment.into();
        validate_segment("tenant_key", &tenant_key)?;
        validate_segment("environment", &environment)?;
        Ok(IndexScope {
            tenant_key,
            environment,
            entity_type,
        })
    }

    pub fn tenant_key(&self) -> &str {
        &self.tenant_key
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Same tenant and environment, other entity family.
    pub fn with_entity_type(&self, entity_type: EntityType) -> Self {
        IndexScope {
            entity_type,
            ..self.clone()
        }
    }

    /// `{tenant_key}/{environment}/{entity_type}`, appended to a tree root.
    pub fn suffix_path(&self) -> PathBuf {
        PathBuf::from(&self.tenant_key)
            .join(&self.environment)
            .join(self.entity_type.as_str())
    }
}

impl fmt::Display for IndexScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.tenant_key, self.environment, self.entity_type
        )
    }
}

fn validate_segment(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(SearchIndexError::InvalidScope(format!("{} is empty", what)));
    }
    if value.starts_with('.') {
        return Err(SearchIndexError::InvalidScope(format!(
            "{} '{}' must not start with '.'",
            what, value
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(SearchIndexError::InvalidScope(format!(
            "{} '{}' is not path-safe",
            what, value
        )));
    }
    Ok(())
}

/// Subset of a write model needed to render a list row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub id: Uuid,
    pub number: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub state: String,
    pub is_test_data: bool,
    pub created_ticks: i64,
    pub last_modified_ticks: i64,
    pub expiry_ticks: Option<i64>,
    pub inception_ticks: Option<i64>,
    pub issued_ticks: Option<i64>,
    pub cancellation_effective_ticks: Option<i64>,
}

/// One page of search results. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    pub fn empty(page: usize, page_size: usize) -> Self {
        Page {
            items: Vec::new(),
            total_count: 0,
            page,
            page_size,
        }
    }

    pub fn has_more(&self) -> bool {
        self.page.saturating_mul(self.page_size) < self.total_count
    }
}

/// Queued incremental write. Ids look like `task_{scope}_{uuid}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub status: TaskStatus,
    pub received_documents: usize,
    pub indexed_documents: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed(String),
}

impl TaskInfo {
    pub fn new(scope: &IndexScope, received_documents: usize) -> Self {
        TaskInfo {
            id: format!("task_{}_{}", scope, Uuid::new_v4()),
            status: TaskStatus::Enqueued,
            received_documents,
            indexed_documents: 0,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Where a scope sits in the live/regeneration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeState {
    NoIndex,
    LiveOnly,
    LiveWithRegenerationInProgress,
    LiveWithRegenerationComplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationStatus {
    NotStarted,
    InProgress { indexed: usize },
    Completed { indexed: usize, generation: String },
    Failed(String),
    Cancelled,
}

impl RegenerationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RegenerationStatus::Completed { .. }
                | RegenerationStatus::Failed(_)
                | RegenerationStatus::Cancelled
        )
    }
}

/// Tracked background regeneration job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerationInfo {
    pub id: String,
    pub scope: IndexScope,
    pub status: RegenerationStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RegenerationInfo {
    pub fn new(scope: IndexScope, started_at: chrono::DateTime<chrono::Utc>) -> Self {
        RegenerationInfo {
            id: format!("regen_{}_{}", scope, Uuid::new_v4()),
            scope,
            status: RegenerationStatus::NotStarted,
            started_at,
            finished_at: None,
        }
    }
}
