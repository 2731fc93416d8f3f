//! Write models: flattened, denormalized projections of source entities.
//!
//! A write model is the unit of indexing. Upserting one replaces the whole
//! document for its id; there are no partial updates.

mod policy;
mod quote;

pub use policy::{PolicyTransactionWriteModel, PolicyWriteModel};
pub use quote::QuoteWriteModel;

use crate::index::document::FieldWriter;
use crate::types::EntityType;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// Field-mapping capability shared by every indexable entity.
///
/// The engine is generic over this trait; each entity family only says how
/// its fields land in the typed index fields. The id, tenant id, id tie-break
/// key and stored source are written by the engine itself.
pub trait IndexDocument: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const ENTITY_TYPE: EntityType;

    fn id(&self) -> Uuid;

    fn tenant_id(&self) -> Uuid;

    /// Used to order incremental writes against bulk regeneration writes.
    fn last_modified_ticks(&self) -> i64;

    fn map_fields(&self, out: &mut FieldWriter<'_>);
}
