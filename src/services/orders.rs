use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        checkout_session::{self, CheckoutStatus, Entity as CheckoutSessionEntity},
        checkout_session_item::{self, Entity as CheckoutSessionItemEntity},
        order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
        order_item::{self, Entity as OrderItemEntity},
        product_variant::{self, Entity as ProductVariantEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    identity::CallerIdentity,
};

#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<OrderModel>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Order creation and retrieval. `confirm` is the only producer of orders;
/// everything else is read-only.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Converts a confirmed checkout session into an order, exactly once.
    ///
    /// The whole unit is one transaction: order row, frozen order items,
    /// conditional stock decrements, session closure. The conditional
    /// `stock = stock - qty WHERE stock >= qty` update is the race-safe
    /// stock gate; the earlier read is only an optimistic fast-fail.
    /// Idempotency rests on the unique constraint on
    /// `orders.checkout_session_id`: a losing concurrent insert falls back
    /// to returning the winner's order.
    #[instrument(skip(self, caller), fields(session_id = %session_id))]
    pub async fn confirm(
        &self,
        caller: &CallerIdentity,
        session_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let session = CheckoutSessionEntity::find_by_id(session_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("checkout session {session_id}")))?;

        if !session.owned_by(caller.user_id, caller.guest_id) {
            return Err(ServiceError::Forbidden);
        }

        // Safe to call confirm twice: an order referencing this session is
        // returned unchanged before any write.
        if let Some(existing) = self.find_by_session(session_id).await? {
            return Ok(existing);
        }

        // Preconditions, checked in order, each a distinct failure.
        match session.status {
            CheckoutStatus::Pending => {}
            CheckoutStatus::Expired => return Err(ServiceError::SessionExpired),
            CheckoutStatus::Paid => return Err(ServiceError::AlreadyConfirmed),
        }
        let now = Utc::now();
        if session.is_expired(now) {
            return Err(ServiceError::SessionExpired);
        }
        let address_id = session.address_id.ok_or(ServiceError::AddressNotSet)?;

        let items = CheckoutSessionItemEntity::find()
            .filter(checkout_session_item::Column::SessionId.eq(session_id))
            .all(&*self.db)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::NoItems);
        }

        // Optimistic stock fast-fail; the decrement inside the transaction
        // is what actually guarantees nothing oversells.
        for item in &items {
            let variant = ProductVariantEntity::find_by_id(item.variant_id)
                .one(&*self.db)
                .await?
                .ok_or(ServiceError::VariantNotFound(item.variant_id))?;
            if variant.stock < item.quantity {
                return Err(ServiceError::OutOfStock(item.variant_id));
            }
        }

        let txn = self.db.begin().await?;

        // Re-read the session inside the transaction so a confirm racing a
        // just-expired or just-paid session observes a consistent snapshot.
        let session = CheckoutSessionEntity::find_by_id(session_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("checkout session {session_id}")))?;
        match session.status {
            CheckoutStatus::Pending => {}
            CheckoutStatus::Expired => {
                txn.rollback().await?;
                return Err(ServiceError::SessionExpired);
            }
            CheckoutStatus::Paid => {
                txn.rollback().await?;
                return match self.find_by_session(session_id).await? {
                    Some(existing) => Ok(existing),
                    None => Err(ServiceError::AlreadyConfirmed),
                };
            }
        }
        if session.is_expired(Utc::now()) {
            txn.rollback().await?;
            return Err(ServiceError::SessionExpired);
        }

        let order_id = Uuid::new_v4();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            external_id: Set(format!(
                "ORD-{}",
                order_id.simple().to_string()[..12].to_uppercase()
            )),
            user_id: Set(session.user_id),
            guest_id: Set(session.guest_id),
            checkout_session_id: Set(session_id),
            status: Set(OrderStatus::PendingPayment),
            subtotal: Set(session.subtotal),
            tax: Set(session.tax),
            shipping_fee: Set(session.shipping_fee),
            discount: Set(session.discount),
            total: Set(session.total),
            currency: Set(session.currency.clone()),
            address_id: Set(address_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let order = match order_model.insert(&txn).await {
            Ok(order) => order,
            Err(e) => {
                return if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    // Lost the race against a concurrent confirm; the winner's
                    // order is the result.
                    txn.rollback().await?;
                    warn!(%session_id, "concurrent confirm detected, returning existing order");
                    self.find_by_session(session_id)
                        .await?
                        .ok_or(ServiceError::AlreadyConfirmed)
                } else {
                    Err(e.into())
                };
            }
        };

        for item in &items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                variant_id: Set(item.variant_id),
                product_name: Set(item.product_name.clone()),
                variant_name: Set(item.variant_name.clone()),
                quantity: Set(item.quantity),
                quantity_unit: Set(item.quantity_unit.clone()),
                unit_price: Set(item.unit_price),
                subtotal: Set(item.subtotal),
                image_url: Set(item.image_url.clone()),
            }
            .insert(&txn)
            .await?;

            // The race-safe stock gate: the row lock on this UPDATE
            // serializes check-and-decrement across concurrent confirms.
            let decrement = ProductVariantEntity::update_many()
                .col_expr(
                    product_variant::Column::Stock,
                    Expr::col(product_variant::Column::Stock).sub(item.quantity),
                )
                .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(product_variant::Column::Id.eq(item.variant_id))
                .filter(product_variant::Column::Stock.gte(item.quantity))
                .exec(&txn)
                .await?;

            if decrement.rows_affected == 0 {
                txn.rollback().await?;
                return Err(ServiceError::InsufficientStock(item.variant_id));
            }
        }

        let mut session_update: checkout_session::ActiveModel = session.into();
        session_update.status = Set(CheckoutStatus::Paid);
        session_update.confirmed_at = Set(Some(now));
        session_update.updated_at = Set(now);
        session_update.update(&txn).await?;

        txn.commit().await?;

        info!(%order_id, %session_id, "order created from checkout session");
        self.event_sender
            .send(Event::OrderCreated {
                order_id,
                session_id,
            })
            .await;

        Ok(order)
    }

    pub async fn find_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::CheckoutSessionId.eq(session_id))
            .one(&*self.db)
            .await?)
    }

    /// Fetches an order visible to the caller. Non-owners get the not-found
    /// shape, never confirmation that the order exists.
    #[instrument(skip(self, caller), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        caller: &CallerIdentity,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        if !caller.is_admin() && !order.owned_by(caller.user_id, caller.guest_id) {
            return Err(ServiceError::OrderNotFound(order_id.to_string()));
        }
        Ok(order)
    }

    pub async fn get_order_items(
        &self,
        caller: &CallerIdentity,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        let order = self.get_order(caller, order_id).await?;
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?)
    }

    /// Lists the caller's orders, newest first. Admins see everything.
    #[instrument(skip(self, caller))]
    pub async fn list_orders(
        &self,
        caller: &CallerIdentity,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if !caller.is_admin() {
            query = match (caller.user_id, caller.guest_id) {
                (Some(uid), _) => query.filter(order::Column::UserId.eq(uid)),
                (None, Some(gid)) => query.filter(order::Column::GuestId.eq(gid)),
                (None, None) => return Err(ServiceError::Forbidden),
            };
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderPage {
            orders,
            total,
            page,
            per_page,
        })
    }
}
