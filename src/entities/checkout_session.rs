use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PAID")]
    Paid,
    #[sea_orm(string_value = "EXPIRED")]
    Expired,
}

/// A cart-to-order negotiation. Prices are locked at creation time; the
/// address attachment re-derives shipping/tax, never the item lines.
///
/// All amounts are integer minor-currency units. Invariant:
/// `total = subtotal + tax + shipping_fee - discount`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "checkout_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub external_id: String,
    /// Exactly one of user_id / guest_id is set.
    pub user_id: Option<i64>,
    pub guest_id: Option<Uuid>,
    pub status: CheckoutStatus,
    pub subtotal: i64,
    pub tax: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub currency: String,
    pub address_id: Option<i64>,
    pub payment_method: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn owned_by(&self, user_id: Option<i64>, guest_id: Option<Uuid>) -> bool {
        match (self.user_id, self.guest_id) {
            (Some(uid), _) => user_id == Some(uid),
            (None, Some(gid)) => guest_id == Some(gid),
            (None, None) => false,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::checkout_session_item::Entity")]
    Items,
}

impl Related<super::checkout_session_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(user_id: Option<i64>, guest_id: Option<Uuid>) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            external_id: "CHK-TEST".into(),
            user_id,
            guest_id,
            status: CheckoutStatus::Pending,
            subtotal: 10_000,
            tax: 1_000,
            shipping_fee: 0,
            discount: 0,
            total: 11_000,
            currency: "IDR".into(),
            address_id: None,
            payment_method: None,
            expires_at: now + Duration::minutes(30),
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ownership_matches_user_or_guest_exclusively() {
        let gid = Uuid::new_v4();
        let by_user = session(Some(7), None);
        assert!(by_user.owned_by(Some(7), None));
        assert!(!by_user.owned_by(Some(8), None));
        assert!(!by_user.owned_by(None, Some(gid)));

        let by_guest = session(None, Some(gid));
        assert!(by_guest.owned_by(None, Some(gid)));
        assert!(!by_guest.owned_by(None, Some(Uuid::new_v4())));
        assert!(!by_guest.owned_by(Some(7), None));
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let s = session(Some(1), None);
        assert!(!s.is_expired(s.expires_at));
        assert!(s.is_expired(s.expires_at + Duration::seconds(1)));
    }
}
