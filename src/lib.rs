//! Versioned, per-tenant search indexes for quotes and policies.
//!
//! Every `(tenant, environment, entity type)` scope owns two directory
//! trees of generations. The live tree serves searches and incremental
//! writes; the regeneration tree receives a full rebuild, which is then
//! promoted to become the latest live generation in one step.
//!
//! ```text
//! {data_dir}/{live|regeneration}/{tenant_key}/{environment}/{entity_type}/{generation}/
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod query;
pub mod tokenizer;
pub mod types;

#[cfg(test)]
mod integ_tests;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{IndexConfig, PromotionStrategy};
pub use error::{Result, SearchIndexError};
pub use index::{
    FsGenerationManager, GenerationHandle, GenerationManager, IndexManager, RegenerationSource,
    SearchIndex, SourcePage,
};
pub use model::{IndexDocument, PolicyTransactionWriteModel, PolicyWriteModel, QuoteWriteModel};
pub use query::{DateRange, Filter, SearchFilters, Sort, SortOrder, StatusId};
pub use types::{
    EntityType, IndexScope, Page, RegenerationInfo, RegenerationStatus, ResultItem, ScopeState,
    TaskInfo, TaskStatus, Tree,
};
