use super::IndexDocument;
use crate::index::document::FieldWriter;
use crate::index::schema::{DateField, IdentityField, KeywordField};
use crate::types::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteWriteModel {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub organisation_id: Uuid,
    pub product_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub owner_user_id: Option<Uuid>,
    pub quote_number: Option<String>,
    pub quote_type: Option<String>,
    pub customer_full_name: Option<String>,
    pub customer_email: Option<String>,
    pub state: String,
    pub is_test_data: bool,
    pub form_data: Option<Value>,
    pub calculation_result: Option<Value>,
    pub created_ticks: i64,
    pub last_modified_ticks: i64,
    pub last_modified_by_user_ticks: Option<i64>,
    pub expiry_ticks: Option<i64>,
}

impl IndexDocument for QuoteWriteModel {
    const ENTITY_TYPE: EntityType = EntityType::Quote;

    fn id(&self) -> Uuid {
        self.id
    }

    fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    fn last_modified_ticks(&self) -> i64 {
        self.last_modified_ticks
    }

    fn map_fields(&self, out: &mut FieldWriter<'_>) {
        out.keyword(KeywordField::OrganisationId, self.organisation_id);
        out.keyword(KeywordField::ProductId, self.product_id);
        out.keyword_opt(KeywordField::CustomerId, self.customer_id);
        out.keyword_opt(KeywordField::OwnerUserId, self.owner_user_id);

        out.identity(IdentityField::Number, self.quote_number.as_deref());
        out.identity(IdentityField::CustomerName, self.customer_full_name.as_deref());
        out.identity(IdentityField::CustomerEmail, self.customer_email.as_deref());

        out.state(&self.state);
        out.test_data(self.is_test_data);

        if let Some(quote_type) = &self.quote_type {
            out.content(quote_type);
        }
        if let Some(form_data) = &self.form_data {
            out.content_json(form_data);
        }
        if let Some(result) = &self.calculation_result {
            out.content_json(result);
        }

        out.ticks(DateField::CreatedAt, self.created_ticks);
        out.ticks(DateField::LastModifiedAt, self.last_modified_ticks);
        out.ticks_opt(
            DateField::LastModifiedByUserAt,
            self.last_modified_by_user_ticks,
        );
        out.ticks_opt(DateField::ExpiryAt, self.expiry_ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_missing_optionals() {
        let id = Uuid::new_v4();
        let json = serde_json::json!({
            "id": id,
            "tenant_id": Uuid::nil(),
            "state": "incomplete",
            "created_ticks": 10,
            "last_modified_ticks": 20,
        });
        let quote: QuoteWriteModel = serde_json::from_value(json).unwrap();
        assert_eq!(quote.id(), id);
        assert_eq!(quote.last_modified_ticks(), 20);
        assert!(quote.expiry_ticks.is_none());
        assert!(!quote.is_test_data);
    }
}
