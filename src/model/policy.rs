use super::IndexDocument;
use crate::index::document::FieldWriter;
use crate::index::schema::{DateField, IdentityField, KeywordField};
use crate::types::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One adjustment, renewal or cancellation on a policy. Indexed as
/// multi-valued fields of the parent policy document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTransactionWriteModel {
    pub id: Uuid,
    pub quote_id: Option<Uuid>,
    pub organisation_id: Uuid,
    pub form_data: Option<Value>,
    pub calculation_result: Option<Value>,
    pub created_ticks: i64,
    pub effective_ticks: i64,
    pub expiry_ticks: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyWriteModel {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub organisation_id: Uuid,
    pub product_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub owner_user_id: Option<Uuid>,
    pub policy_number: Option<String>,
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
    pub inception_ticks: Option<i64>,
    pub issued_ticks: Option<i64>,
    pub cancellation_effective_ticks: Option<i64>,
    pub transactions: Vec<PolicyTransactionWriteModel>,
}

impl IndexDocument for PolicyWriteModel {
    const ENTITY_TYPE: EntityType = EntityType::Policy;

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

        out.identity(IdentityField::Number, self.policy_number.as_deref());
        out.identity(IdentityField::CustomerName, self.customer_full_name.as_deref());
        out.identity(IdentityField::CustomerEmail, self.customer_email.as_deref());

        out.state(&self.state);
        out.test_data(self.is_test_data);

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
        out.ticks_opt(DateField::InceptionAt, self.inception_ticks);
        out.ticks_opt(DateField::IssuedAt, self.issued_ticks);
        out.ticks_opt(
            DateField::CancellationEffectiveAt,
            self.cancellation_effective_ticks,
        );

        for tx in &self.transactions {
            out.keyword(KeywordField::TransactionId, tx.id);
            out.keyword_opt(KeywordField::QuoteId, tx.quote_id);
            // transactions may be re-homed to another organisation
            if tx.organisation_id != self.organisation_id && !tx.organisation_id.is_nil() {
                out.keyword(KeywordField::OrganisationId, tx.organisation_id);
            }
            if let Some(form_data) = &tx.form_data {
                out.content_json(form_data);
            }
            if let Some(result) = &tx.calculation_result {
                out.content_json(result);
            }
            out.ticks(DateField::TransactionCreatedAt, tx.created_ticks);
            out.ticks(DateField::TransactionEffectiveAt, tx.effective_ticks);
            out.ticks_opt(DateField::TransactionExpiryAt, tx.expiry_ticks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transactions_keep_their_order() {
        let policy = PolicyWriteModel {
            id: Uuid::new_v4(),
            transactions: (0..3)
                .map(|i| PolicyTransactionWriteModel {
                    id: Uuid::new_v4(),
                    created_ticks: i,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let json = serde_json::to_string(&policy).unwrap();
        let back: PolicyWriteModel = serde_json::from_str(&json).unwrap();
        let ticks: Vec<i64> = back.transactions.iter().map(|t| t.created_ticks).collect();
        assert_eq!(ticks, vec![0, 1, 2]);
        assert_eq!(back, policy);
    }
}
