use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only idempotency ledger for provider webhook deliveries.
///
/// (provider, provider_event_id) is unique; a conflicting insert is a
/// provider-confirmed duplicate. Rows are never updated except to stamp
/// `processed_at` or `failure_reason` exactly once, so every delivery leaves
/// an audit trail for manual reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_webhook_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub provider: String,
    pub provider_event_id: String,
    pub event_type: String,
    /// Maps to `orders.external_id`.
    pub reference_id: String,
    #[sea_orm(column_type = "Json")]
    pub payload: Json,
    pub signature_valid: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
