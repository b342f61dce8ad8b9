use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, TryInsertResult,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
        payment::{self, Entity as PaymentEntity, PaymentStatus},
        payment_webhook_event,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::order_status::OrderStatusService,
};

/// Parsed provider notification. `external_id` carries the merchant-side
/// order reference the invoice was created with.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(alias = "event_type")]
    pub event: String,
    pub external_id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// What ingesting a notification amounted to. A failed event is recorded
/// in the ledger with its reason; a redelivery of the same event id is a
/// duplicate and gets acknowledged without reprocessing.
#[derive(Debug)]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
    Ignored,
    Failed(ServiceError),
}

/// Reconciles provider webhook notifications with order state. The ledger
/// row is the idempotency gate: one (provider, event id) pair is processed
/// at most once, enforced by a unique index rather than any in-process
/// lock.
#[derive(Clone)]
pub struct WebhookReconciler {
    db: Arc<DatabaseConnection>,
    status: OrderStatusService,
    provider: String,
    event_sender: EventSender,
}

impl WebhookReconciler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        status: OrderStatusService,
        provider: String,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            status,
            provider,
            event_sender,
        }
    }

    /// Records and processes one notification. The ledger insert happens
    /// first; if the pair already exists the event is acknowledged without
    /// touching any order. A ledger write failure propagates as an error so
    /// the provider retries the delivery.
    #[instrument(skip(self, payload), fields(event_id = %envelope.id, event = %envelope.event))]
    pub async fn ingest(
        &self,
        envelope: &WebhookEnvelope,
        payload: serde_json::Value,
    ) -> Result<WebhookOutcome, ServiceError> {
        let ledger_id = Uuid::new_v4();
        let row = payment_webhook_event::ActiveModel {
            id: Set(ledger_id),
            provider: Set(self.provider.clone()),
            provider_event_id: Set(envelope.id.clone()),
            event_type: Set(envelope.event.clone()),
            reference_id: Set(envelope.external_id.clone()),
            payload: Set(payload),
            signature_valid: Set(true),
            processed_at: Set(None),
            failure_reason: Set(None),
            created_at: Set(Utc::now()),
        };

        let inserted = payment_webhook_event::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    payment_webhook_event::Column::Provider,
                    payment_webhook_event::Column::ProviderEventId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .do_nothing()
            .exec(&*self.db)
            .await?;

        if matches!(inserted, TryInsertResult::Conflicted) {
            info!("duplicate webhook delivery acknowledged");
            return Ok(WebhookOutcome::Duplicate);
        }

        match self.process(envelope).await {
            Ok(outcome) => {
                self.stamp_processed(ledger_id).await?;
                self.event_sender
                    .send(Event::WebhookProcessed {
                        provider: self.provider.clone(),
                        provider_event_id: envelope.id.clone(),
                    })
                    .await;
                Ok(outcome)
            }
            Err(e) => {
                warn!("webhook processing failed: {e}");
                self.stamp_failed(ledger_id, e.code()).await?;
                self.event_sender
                    .send(Event::WebhookFailed {
                        provider: self.provider.clone(),
                        provider_event_id: envelope.id.clone(),
                        reason: e.code().to_string(),
                    })
                    .await;
                Ok(WebhookOutcome::Failed(e))
            }
        }
    }

    async fn process(&self, envelope: &WebhookEnvelope) -> Result<WebhookOutcome, ServiceError> {
        let target = match target_status(&envelope.event) {
            Some(status) => status,
            None => {
                info!("unhandled webhook event type, acknowledged without action");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let order = OrderEntity::find()
            .filter(order::Column::ExternalId.eq(envelope.external_id.clone()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(envelope.external_id.clone()))?;

        if target == OrderStatus::Paid {
            self.verify_settlement(&order, envelope)?;
            if order.status == OrderStatus::Paid {
                // A retried settlement for an order already marked paid is
                // still a success.
                info!(order_id = %order.id, "order already paid, nothing to do");
                return Ok(WebhookOutcome::Processed);
            }
        } else {
            if order.status == target {
                return Ok(WebhookOutcome::Processed);
            }
            // Money never regresses: a late failure or expiry notification
            // for a settled order is an error, whatever the transition
            // table would otherwise permit.
            if order.status != OrderStatus::PendingPayment {
                return Err(ServiceError::InvalidStatusTransition {
                    from: order.status,
                    to: target,
                });
            }
        }

        self.status.transition(order.id, target).await?;
        self.settle_payment_row(&order, envelope, target).await?;

        Ok(WebhookOutcome::Processed)
    }

    /// A settlement event must name the amount and currency it settled;
    /// one that omits them is recorded as a failure, never trusted.
    fn verify_settlement(
        &self,
        order: &OrderModel,
        envelope: &WebhookEnvelope,
    ) -> Result<(), ServiceError> {
        let amount = envelope.amount.ok_or_else(|| {
            ServiceError::ValidationError("settlement event missing amount".to_string())
        })?;
        if amount != order.total {
            return Err(ServiceError::AmountMismatch {
                expected: order.total,
                got: amount,
            });
        }

        let currency = envelope.currency.as_deref().ok_or_else(|| {
            ServiceError::ValidationError("settlement event missing currency".to_string())
        })?;
        if currency != order.currency {
            return Err(ServiceError::CurrencyMismatch {
                expected: order.currency.clone(),
                got: currency.to_string(),
            });
        }
        Ok(())
    }

    /// Mirrors the order outcome onto the payment attempt the notification
    /// refers to. A missing payment row is not an error; some providers
    /// notify for invoices created out of band.
    async fn settle_payment_row(
        &self,
        order: &OrderModel,
        envelope: &WebhookEnvelope,
        target: OrderStatus,
    ) -> Result<(), ServiceError> {
        let mut query = PaymentEntity::find().filter(payment::Column::OrderId.eq(order.id));
        query = match &envelope.payment_id {
            Some(pid) => query.filter(payment::Column::ProviderPaymentId.eq(pid.clone())),
            None => query.filter(payment::Column::Status.eq(PaymentStatus::Pending)),
        };

        let Some(attempt) = query
            .order_by_desc(payment::Column::CreatedAt)
            .one(&*self.db)
            .await?
        else {
            return Ok(());
        };

        let new_status = match target {
            OrderStatus::Paid => PaymentStatus::Paid,
            OrderStatus::Failed if envelope.event.contains("expire") => PaymentStatus::Expired,
            _ => PaymentStatus::Failed,
        };

        let mut update: payment::ActiveModel = attempt.into();
        update.status = Set(new_status);
        update.updated_at = Set(Utc::now());
        update.update(&*self.db).await?;
        Ok(())
    }

    async fn stamp_processed(&self, ledger_id: Uuid) -> Result<(), ServiceError> {
        payment_webhook_event::ActiveModel {
            id: Set(ledger_id),
            processed_at: Set(Some(Utc::now())),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }

    async fn stamp_failed(&self, ledger_id: Uuid, reason: &str) -> Result<(), ServiceError> {
        payment_webhook_event::ActiveModel {
            id: Set(ledger_id),
            failure_reason: Set(Some(reason.to_string())),
            ..Default::default()
        }
        .update(&*self.db)
        .await?;
        Ok(())
    }
}

/// Maps a provider event type onto the order status it implies. Unknown
/// types are acknowledged without action so new provider events never
/// trigger retry storms.
fn target_status(event: &str) -> Option<OrderStatus> {
    match event {
        "invoice.paid" | "payment.paid" => Some(OrderStatus::Paid),
        "invoice.expired" | "payment.failed" => Some(OrderStatus::Failed),
        _ => None,
    }
}
