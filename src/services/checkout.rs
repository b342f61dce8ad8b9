use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        checkout_session::{self, CheckoutStatus, Entity as CheckoutSessionEntity},
        checkout_session_item::{self, Entity as CheckoutSessionItemEntity},
        customer_address::Entity as CustomerAddressEntity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    identity::CallerIdentity,
    services::{
        pricing::{LineRequest, PricingService},
        rates::RateCalculator,
    },
};

/// A session together with its line items, the shape handlers render.
#[derive(Debug, Clone)]
pub struct SessionWithItems {
    pub session: checkout_session::Model,
    pub items: Vec<checkout_session_item::Model>,
}

/// Checkout session lifecycle: create, attach address, read back.
/// Sessions are priced snapshots; catalog price changes after creation
/// do not leak in.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    pricing: PricingService,
    rates: Arc<dyn RateCalculator>,
    event_sender: EventSender,
    session_ttl_minutes: i64,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        pricing: PricingService,
        rates: Arc<dyn RateCalculator>,
        event_sender: EventSender,
        session_ttl_minutes: i64,
        currency: String,
    ) -> Self {
        Self {
            db,
            pricing,
            rates,
            event_sender,
            session_ttl_minutes,
            currency,
        }
    }

    /// Creates a priced session from the requested lines. Unit prices and
    /// display fields are frozen at this moment; shipping stays zero until
    /// an address is attached.
    #[instrument(skip(self, caller, lines))]
    pub async fn create_session(
        &self,
        caller: &CallerIdentity,
        lines: &[LineRequest],
    ) -> Result<SessionWithItems, ServiceError> {
        let cart = self.pricing.price_lines(lines).await?;

        let now = Utc::now();
        let session_id = Uuid::new_v4();
        let tax = self.rates.tax(cart.subtotal);
        let total = cart.subtotal + tax;

        let txn = self.db.begin().await?;

        let session = checkout_session::ActiveModel {
            id: Set(session_id),
            external_id: Set(format!(
                "CHK-{}",
                session_id.simple().to_string()[..12].to_uppercase()
            )),
            user_id: Set(caller.user_id),
            guest_id: Set(caller.guest_id),
            status: Set(CheckoutStatus::Pending),
            subtotal: Set(cart.subtotal),
            tax: Set(tax),
            shipping_fee: Set(0),
            discount: Set(0),
            total: Set(total),
            currency: Set(self.currency.clone()),
            address_id: Set(None),
            payment_method: Set(None),
            expires_at: Set(now + Duration::minutes(self.session_ttl_minutes)),
            confirmed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let item = checkout_session_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                session_id: Set(session_id),
                variant_id: Set(line.variant_id),
                product_name: Set(line.product_name.clone()),
                variant_name: Set(line.variant_name.clone()),
                quantity: Set(line.quantity),
                quantity_unit: Set(line.quantity_unit.clone()),
                unit_price: Set(line.unit_price),
                subtotal: Set(line.subtotal),
                image_url: Set(line.image_url.clone()),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        txn.commit().await?;

        info!(%session_id, subtotal = cart.subtotal, "checkout session created");
        self.event_sender
            .send(Event::SessionCreated { session_id })
            .await;

        Ok(SessionWithItems { session, items })
    }

    /// Attaches a shipping address the caller owns and reprices shipping
    /// and tax. Cross-tenant address ids come back as not-found.
    #[instrument(skip(self, caller), fields(session_id = %session_id))]
    pub async fn attach_address(
        &self,
        caller: &CallerIdentity,
        session_id: Uuid,
        address_id: i64,
    ) -> Result<SessionWithItems, ServiceError> {
        let session = self.load_owned_session(caller, session_id).await?;

        if session.status != CheckoutStatus::Pending {
            return Err(ServiceError::SessionNotEditable);
        }
        if session.is_expired(Utc::now()) {
            return Err(ServiceError::SessionExpired);
        }

        let address = CustomerAddressEntity::find_by_id(address_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("address {address_id}")))?;
        if !address.owned_by(caller.user_id, caller.guest_id) {
            return Err(ServiceError::NotFound(format!("address {address_id}")));
        }

        let shipping_fee = self.rates.shipping_fee(Some(&address.city));
        let tax = self.rates.tax(session.subtotal);
        let total = session.subtotal + tax + shipping_fee - session.discount;

        let now = Utc::now();
        let mut update: checkout_session::ActiveModel = session.into();
        update.address_id = Set(Some(address_id));
        update.shipping_fee = Set(shipping_fee);
        update.tax = Set(tax);
        update.total = Set(total);
        update.updated_at = Set(now);
        let session = update.update(&*self.db).await?;

        let items = self.load_items(session_id).await?;
        Ok(SessionWithItems { session, items })
    }

    /// Reads a session back. A pending session past its deadline is flipped
    /// to expired on read; confirm performs the same check itself, so the
    /// flip is a convenience for clients, not a correctness requirement.
    #[instrument(skip(self, caller), fields(session_id = %session_id))]
    pub async fn get_session(
        &self,
        caller: &CallerIdentity,
        session_id: Uuid,
    ) -> Result<SessionWithItems, ServiceError> {
        let mut session = self.load_owned_session(caller, session_id).await?;

        if session.status == CheckoutStatus::Pending && session.is_expired(Utc::now()) {
            let now = Utc::now();
            let mut update: checkout_session::ActiveModel = session.into();
            update.status = Set(CheckoutStatus::Expired);
            update.updated_at = Set(now);
            session = update.update(&*self.db).await?;

            info!(%session_id, "checkout session expired on read");
            self.event_sender
                .send(Event::SessionExpired { session_id })
                .await;
        }

        let items = self.load_items(session_id).await?;
        Ok(SessionWithItems { session, items })
    }

    async fn load_owned_session(
        &self,
        caller: &CallerIdentity,
        session_id: Uuid,
    ) -> Result<checkout_session::Model, ServiceError> {
        let session = CheckoutSessionEntity::find_by_id(session_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("checkout session {session_id}")))?;

        if !session.owned_by(caller.user_id, caller.guest_id) {
            return Err(ServiceError::Forbidden);
        }
        Ok(session)
    }

    async fn load_items(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<checkout_session_item::Model>, ServiceError> {
        Ok(CheckoutSessionItemEntity::find()
            .filter(checkout_session_item::Column::SessionId.eq(session_id))
            .all(&*self.db)
            .await?)
    }
}
