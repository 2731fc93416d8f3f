use crate::error::{Result, SearchIndexError};
use crate::index::schema::{DateField, FieldSet, IdentityField, KeywordField};
use crate::model::IndexDocument;
use crate::types::ResultItem;
use serde_json::Value;
use tantivy::schema::{Field, OwnedValue};
use tantivy::{TantivyDocument, Term};
use uuid::Uuid;

/// Typed sink handed to [`IndexDocument::map_fields`].
///
/// Every method is additive: calling one twice for the same field produces a
/// multi-valued field, which is how policy transactions are flattened onto
/// their parent document.
pub struct FieldWriter<'a> {
    fields: &'a FieldSet,
    doc: &'a mut TantivyDocument,
}

impl<'a> FieldWriter<'a> {
    pub fn new(fields: &'a FieldSet, doc: &'a mut TantivyDocument) -> Self {
        FieldWriter { fields, doc }
    }

    pub fn keyword(&mut self, field: KeywordField, value: Uuid) {
        self.doc
            .add_text(self.fields.keyword(field), value.hyphenated().to_string());
    }

    pub fn keyword_opt(&mut self, field: KeywordField, value: Option<Uuid>) {
        if let Some(value) = value {
            self.keyword(field, value);
        }
    }

    /// Blank values are skipped so they never match a search term.
    pub fn identity(&mut self, field: IdentityField, value: Option<&str>) {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return;
        };
        self.doc.add_text(self.fields.identity(field), value);
        self.doc
            .add_text(self.fields.identity_keyword(field), value);
    }

    pub fn content(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.doc.add_text(self.fields.content, text);
        }
    }

    /// Indexes every string and number leaf of a JSON blob as content text.
    pub fn content_json(&mut self, value: &Value) {
        match value {
            Value::String(s) => self.content(s),
            Value::Number(n) => self.content(&n.to_string()),
            Value::Array(items) => {
                for item in items {
                    self.content_json(item);
                }
            }
            Value::Object(map) => {
                for item in map.values() {
                    self.content_json(item);
                }
            }
            Value::Null | Value::Bool(_) => {}
        }
    }

    pub fn ticks(&mut self, field: DateField, ticks: i64) {
        self.doc.add_i64(self.fields.date(field), ticks);
    }

    pub fn ticks_opt(&mut self, field: DateField, ticks: Option<i64>) {
        if let Some(ticks) = ticks {
            self.ticks(field, ticks);
        }
    }

    pub fn state(&mut self, state: &str) {
        self.doc.add_text(self.fields.state, state.trim());
    }

    pub fn test_data(&mut self, flag: bool) {
        self.doc.add_bool(self.fields.is_test_data, flag);
    }
}

/// Converts between write models and tantivy documents for one schema.
#[derive(Debug, Clone)]
pub struct DocumentConverter {
    fields: FieldSet,
}

impl DocumentConverter {
    pub fn new(tantivy_schema: &tantivy::schema::Schema) -> Result<Self> {
        Ok(DocumentConverter {
            fields: FieldSet::from_schema(tantivy_schema)?,
        })
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn to_tantivy<D: IndexDocument>(&self, model: &D) -> Result<TantivyDocument> {
        let mut doc = TantivyDocument::new();
        let id = model.id();

        doc.add_text(self.fields.id, id.hyphenated().to_string());
        doc.add_u64(self.fields.id_key, id_sort_key(id));

        {
            let mut writer = FieldWriter::new(&self.fields, &mut doc);
            writer.keyword(KeywordField::TenantId, model.tenant_id());
            model.map_fields(&mut writer);
        }

        doc.add_text(self.fields.source, serde_json::to_string(model)?);
        Ok(doc)
    }

    pub fn id_term(&self, id: Uuid) -> Term {
        Term::from_field_text(self.fields.id, &id.hyphenated().to_string())
    }

    pub fn to_result_item(&self, doc: &TantivyDocument) -> Result<ResultItem> {
        let raw_id = stored_str(doc, self.fields.id)
            .ok_or_else(|| SearchIndexError::Tantivy("stored document has no _id".to_string()))?;
        let id = Uuid::parse_str(&raw_id)
            .map_err(|e| SearchIndexError::Tantivy(format!("bad stored _id '{}': {}", raw_id, e)))?;

        let date = |field: DateField| stored_i64(doc, self.fields.date(field));

        Ok(ResultItem {
            id,
            number: stored_str(doc, self.fields.identity(IdentityField::Number)),
            customer_name: stored_str(doc, self.fields.identity(IdentityField::CustomerName)),
            customer_email: stored_str(doc, self.fields.identity(IdentityField::CustomerEmail)),
            state: stored_str(doc, self.fields.state).unwrap_or_default(),
            is_test_data: stored_bool(doc, self.fields.is_test_data).unwrap_or(false),
            created_ticks: date(DateField::CreatedAt).unwrap_or_default(),
            last_modified_ticks: date(DateField::LastModifiedAt).unwrap_or_default(),
            expiry_ticks: date(DateField::ExpiryAt),
            inception_ticks: date(DateField::InceptionAt),
            issued_ticks: date(DateField::IssuedAt),
            cancellation_effective_ticks: date(DateField::CancellationEffectiveAt),
        })
    }

    /// Rebuilds the full write model from the stored `_source` JSON.
    pub fn to_model<D: IndexDocument>(&self, doc: &TantivyDocument) -> Result<D> {
        let source = stored_str(doc, self.fields.source).ok_or_else(|| {
            SearchIndexError::Tantivy("stored document has no _source".to_string())
        })?;
        Ok(serde_json::from_str(&source)?)
    }
}

/// High 64 bits of the id, used as a stable tie-break when sort keys are equal.
pub fn id_sort_key(id: Uuid) -> u64 {
    (id.as_u128() >> 64) as u64
}

fn stored_str(doc: &TantivyDocument, field: Field) -> Option<String> {
    doc.get_first(field).and_then(|v| {
        let owned: OwnedValue = v.into();
        match owned {
            OwnedValue::Str(s) => Some(s),
            _ => None,
        }
    })
}

fn stored_i64(doc: &TantivyDocument, field: Field) -> Option<i64> {
    doc.get_first(field).and_then(|v| {
        let owned: OwnedValue = v.into();
        match owned {
            OwnedValue::I64(i) => Some(i),
            OwnedValue::U64(u) => i64::try_from(u).ok(),
            _ => None,
        }
    })
}

fn stored_bool(doc: &TantivyDocument, field: Field) -> Option<bool> {
    doc.get_first(field).and_then(|v| {
        let owned: OwnedValue = v.into();
        match owned {
            OwnedValue::Bool(b) => Some(b),
            _ => None,
        }
    })
}
