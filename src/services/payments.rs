use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        order::{Model as OrderModel, OrderStatus},
        payment::{self, Entity as PaymentEntity, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{CreateInvoiceRequest, PaymentGateway},
    identity::CallerIdentity,
    services::orders::OrderService,
};

/// Payment attempts against orders. Creating an invoice is the only
/// outbound call in the crate; settlement only ever arrives via webhook.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    orders: OrderService,
    event_sender: EventSender,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        orders: OrderService,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            gateway,
            orders,
            event_sender,
        }
    }

    /// Requests a provider invoice for an unpaid order and records the
    /// attempt. If a live attempt (pending or paid) already exists it is
    /// returned instead of creating a duplicate invoice.
    #[instrument(skip(self, caller), fields(order_id = %order_id))]
    pub async fn create_invoice_for_order(
        &self,
        caller: &CallerIdentity,
        order_id: Uuid,
    ) -> Result<payment::Model, ServiceError> {
        let order = self.orders.get_order(caller, order_id).await?;

        if order.status != OrderStatus::PendingPayment {
            return Err(ServiceError::Conflict(format!(
                "order is {} and no longer payable",
                order.status
            )));
        }

        if let Some(live) = self.find_live_attempt(order_id).await? {
            return Ok(live);
        }

        let invoice = self
            .gateway
            .create_invoice(&CreateInvoiceRequest {
                reference_id: order.external_id.clone(),
                amount: order.total,
                currency: order.currency.clone(),
                description: format!("Payment for order {}", order.external_id),
            })
            .await?;

        let now = Utc::now();
        let payment_id = Uuid::new_v4();
        let saved = payment::ActiveModel {
            id: Set(payment_id),
            order_id: Set(order_id),
            external_id: Set(format!(
                "PAY-{}",
                payment_id.simple().to_string()[..12].to_uppercase()
            )),
            provider_payment_id: Set(Some(invoice.provider_payment_id)),
            amount: Set(order.total),
            currency: Set(order.currency.clone()),
            status: Set(PaymentStatus::Pending),
            channel: Set(invoice.channel),
            payment_code: Set(invoice.payment_code),
            expires_at: Set(invoice.expires_at),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(%order_id, %payment_id, "payment invoice created");
        self.event_sender
            .send(Event::PaymentRecorded {
                order_id,
                payment_id,
            })
            .await;

        Ok(saved)
    }

    /// Payment attempts for an order, newest first, owner or admin only.
    pub async fn list_payments(
        &self,
        caller: &CallerIdentity,
        order_id: Uuid,
    ) -> Result<Vec<payment::Model>, ServiceError> {
        let order = self.orders.get_order(caller, order_id).await?;
        Ok(PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .order_by_desc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Confirm an order and make sure a live payment attempt exists for it.
    /// Confirm itself is idempotent, so clients retry the whole call when
    /// invoice creation fails.
    #[instrument(skip(self, caller), fields(session_id = %session_id))]
    pub async fn confirm_and_invoice(
        &self,
        caller: &CallerIdentity,
        session_id: Uuid,
    ) -> Result<(OrderModel, Option<payment::Model>), ServiceError> {
        let order = self.orders.confirm(caller, session_id).await?;

        if order.status != OrderStatus::PendingPayment {
            let attempt = self.find_live_attempt(order.id).await?;
            return Ok((order, attempt));
        }

        let payment = self.create_invoice_for_order(caller, order.id).await?;
        Ok((order, Some(payment)))
    }

    async fn find_live_attempt(
        &self,
        order_id: Uuid,
    ) -> Result<Option<payment::Model>, ServiceError> {
        let attempts = PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_desc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(attempts.into_iter().find(|p| p.is_live()))
    }
}
