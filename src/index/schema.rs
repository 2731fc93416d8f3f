use crate::error::{Result, SearchIndexError};
use crate::tokenizer::{EDGE_NGRAM_LOWER, RAW_LOWER, SUBSTRING};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, Schema as TantivySchema, TextFieldIndexing,
    TextOptions, FAST, STORED, STRING,
};

pub const ID: &str = "_id";
pub const ID_KEY: &str = "_id_key";
pub const STATE: &str = "state";
pub const IS_TEST_DATA: &str = "is_test_data";
pub const CONTENT: &str = "_content";
pub const SOURCE: &str = "_source";

/// Exact-match identifier fields (hyphenated lowercase UUIDs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordField {
    TenantId,
    OrganisationId,
    ProductId,
    CustomerId,
    OwnerUserId,
    TransactionId,
    QuoteId,
}

impl KeywordField {
    pub const ALL: [KeywordField; 7] = [
        KeywordField::TenantId,
        KeywordField::OrganisationId,
        KeywordField::ProductId,
        KeywordField::CustomerId,
        KeywordField::OwnerUserId,
        KeywordField::TransactionId,
        KeywordField::QuoteId,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            KeywordField::TenantId => "tenant_id",
            KeywordField::OrganisationId => "organisation_id",
            KeywordField::ProductId => "product_id",
            KeywordField::CustomerId => "customer_id",
            KeywordField::OwnerUserId => "owner_user_id",
            KeywordField::TransactionId => "transaction_ids",
            KeywordField::QuoteId => "quote_ids",
        }
    }
}

/// Short human-facing values matched by substring search terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    Number,
    CustomerName,
    CustomerEmail,
}

impl IdentityField {
    pub const ALL: [IdentityField; 3] = [
        IdentityField::Number,
        IdentityField::CustomerName,
        IdentityField::CustomerEmail,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            IdentityField::Number => "number",
            IdentityField::CustomerName => "customer_name",
            IdentityField::CustomerEmail => "customer_email",
        }
    }

    pub fn keyword_field_name(&self) -> &'static str {
        match self {
            IdentityField::Number => "number_kw",
            IdentityField::CustomerName => "customer_name_kw",
            IdentityField::CustomerEmail => "customer_email_kw",
        }
    }
}

/// Temporal fields, stored as ticks. Transaction dates are multi-valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    CreatedAt,
    LastModifiedAt,
    LastModifiedByUserAt,
    ExpiryAt,
    InceptionAt,
    IssuedAt,
    CancellationEffectiveAt,
    TransactionCreatedAt,
    TransactionEffectiveAt,
    TransactionExpiryAt,
}

impl DateField {
    pub const ALL: [DateField; 10] = [
        DateField::CreatedAt,
        DateField::LastModifiedAt,
        DateField::LastModifiedByUserAt,
        DateField::ExpiryAt,
        DateField::InceptionAt,
        DateField::IssuedAt,
        DateField::CancellationEffectiveAt,
        DateField::TransactionCreatedAt,
        DateField::TransactionEffectiveAt,
        DateField::TransactionExpiryAt,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            DateField::CreatedAt => "created_ticks",
            DateField::LastModifiedAt => "last_modified_ticks",
            DateField::LastModifiedByUserAt => "last_modified_by_user_ticks",
            DateField::ExpiryAt => "expiry_ticks",
            DateField::InceptionAt => "inception_ticks",
            DateField::IssuedAt => "issued_ticks",
            DateField::CancellationEffectiveAt => "cancellation_effective_ticks",
            DateField::TransactionCreatedAt => "transaction_created_ticks",
            DateField::TransactionEffectiveAt => "transaction_effective_ticks",
            DateField::TransactionExpiryAt => "transaction_expiry_ticks",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        DateField::ALL
            .into_iter()
            .find(|f| f.field_name() == s || format!("{:?}", f).eq_ignore_ascii_case(s))
    }
}

/// Builds the tantivy schema shared by every generation of both entity
/// families. Policy-only fields are simply left empty on quote documents.
pub fn build_schema() -> TantivySchema {
    let mut builder = TantivySchema::builder();

    builder.add_text_field(ID, STRING | STORED | FAST);
    builder.add_u64_field(ID_KEY, FAST);

    for keyword in KeywordField::ALL {
        builder.add_text_field(keyword.field_name(), STRING);
    }

    let raw_lower = TextFieldIndexing::default()
        .set_tokenizer(RAW_LOWER)
        .set_index_option(IndexRecordOption::Basic);

    builder.add_text_field(
        STATE,
        TextOptions::default()
            .set_indexing_options(raw_lower.clone())
            .set_stored(),
    );

    let substring = TextFieldIndexing::default()
        .set_tokenizer(SUBSTRING)
        .set_index_option(IndexRecordOption::Basic);

    for identity in IdentityField::ALL {
        builder.add_text_field(
            identity.field_name(),
            TextOptions::default()
                .set_indexing_options(substring.clone())
                .set_stored(),
        );
        builder.add_text_field(
            identity.keyword_field_name(),
            TextOptions::default().set_indexing_options(raw_lower.clone()),
        );
    }

    let content = TextFieldIndexing::default()
        .set_tokenizer(EDGE_NGRAM_LOWER)
        .set_index_option(IndexRecordOption::Basic);
    builder.add_text_field(
        CONTENT,
        TextOptions::default().set_indexing_options(content),
    );

    let ticks_opts = NumericOptions::default()
        .set_indexed()
        .set_fast()
        .set_stored();
    for date in DateField::ALL {
        builder.add_i64_field(date.field_name(), ticks_opts.clone());
    }

    builder.add_bool_field(
        IS_TEST_DATA,
        NumericOptions::default()
            .set_indexed()
            .set_fast()
            .set_stored(),
    );

    builder.add_text_field(SOURCE, STORED);

    builder.build()
}

/// Resolved handles for every field of [`build_schema`].
#[derive(Debug, Clone)]
pub struct FieldSet {
    pub id: Field,
    pub id_key: Field,
    pub state: Field,
    pub is_test_data: Field,
    pub content: Field,
    pub source: Field,
    keywords: HashMap<KeywordField, Field>,
    identities: HashMap<IdentityField, (Field, Field)>,
    dates: HashMap<DateField, Field>,
}

fn lookup(schema: &TantivySchema, name: &str) -> Result<Field> {
    schema
        .get_field(name)
        .map_err(|_| SearchIndexError::Tantivy(format!("field '{}' missing from schema", name)))
}

impl FieldSet {
    pub fn from_schema(schema: &TantivySchema) -> Result<Self> {
        let mut keywords = HashMap::new();
        for keyword in KeywordField::ALL {
            keywords.insert(keyword, lookup(schema, keyword.field_name())?);
        }
        let mut identities = HashMap::new();
        for identity in IdentityField::ALL {
            identities.insert(
                identity,
                (
                    lookup(schema, identity.field_name())?,
                    lookup(schema, identity.keyword_field_name())?,
                ),
            );
        }
        let mut dates = HashMap::new();
        for date in DateField::ALL {
            dates.insert(date, lookup(schema, date.field_name())?);
        }

        Ok(FieldSet {
            id: lookup(schema, ID)?,
            id_key: lookup(schema, ID_KEY)?,
            state: lookup(schema, STATE)?,
            is_test_data: lookup(schema, IS_TEST_DATA)?,
            content: lookup(schema, CONTENT)?,
            source: lookup(schema, SOURCE)?,
            keywords,
            identities,
            dates,
        })
    }

    pub fn keyword(&self, field: KeywordField) -> Field {
        self.keywords[&field]
    }

    /// The n-gram indexed field, which also stores the original value.
    pub fn identity(&self, field: IdentityField) -> Field {
        self.identities[&field].0
    }

    /// The whole-value lowercased twin used for long-fragment matching.
    pub fn identity_keyword(&self, field: IdentityField) -> Field {
        self.identities[&field].1
    }

    pub fn date(&self, field: DateField) -> Field {
        self.dates[&field]
    }
}
