use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Domain events emitted by the core services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    SessionCreated {
        session_id: Uuid,
    },
    SessionExpired {
        session_id: Uuid,
    },
    OrderCreated {
        order_id: Uuid,
        session_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    PaymentRecorded {
        order_id: Uuid,
        payment_id: Uuid,
    },
    WebhookProcessed {
        provider: String,
        provider_event_id: String,
    },
    WebhookFailed {
        provider: String,
        provider_event_id: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; a full or closed channel is logged, never fatal.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to send domain event: {}", e);
        }
    }
}

/// Drains the event channel and logs each event. Downstream consumers
/// (notifications, analytics) would hang off this loop.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::WebhookFailed {
                provider,
                provider_event_id,
                reason,
            } => {
                warn!(%provider, %provider_event_id, %reason, "webhook processing failed");
            }
            other => info!(event = ?other, "domain event"),
        }
    }
}
