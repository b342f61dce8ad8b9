pub mod checkout;
pub mod orders;
pub mod payment_webhooks;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{checkout_session_item, order, order_item, payment},
    services::{
        checkout::{CheckoutService, SessionWithItems},
        order_status::OrderStatusService,
        orders::OrderService,
        payments::PaymentService,
        webhook_reconciler::WebhookReconciler,
    },
};

/// Everything the routing layer needs, cloned cheaply per request.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub status: OrderStatusService,
    pub reconciler: WebhookReconciler,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutItemResponse {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i32,
    pub quantity_unit: String,
    pub unit_price: i64,
    pub subtotal: i64,
    pub image_url: Option<String>,
}

impl From<checkout_session_item::Model> for CheckoutItemResponse {
    fn from(m: checkout_session_item::Model) -> Self {
        Self {
            id: m.id,
            variant_id: m.variant_id,
            product_name: m.product_name,
            variant_name: m.variant_name,
            quantity: m.quantity,
            quantity_unit: m.quantity_unit,
            unit_price: m.unit_price,
            subtotal: m.subtotal,
            image_url: m.image_url,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutSessionResponse {
    pub id: Uuid,
    pub external_id: String,
    pub status: String,
    pub subtotal: i64,
    pub tax: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub currency: String,
    pub address_id: Option<i64>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<CheckoutItemResponse>,
}

impl From<SessionWithItems> for CheckoutSessionResponse {
    fn from(s: SessionWithItems) -> Self {
        Self {
            id: s.session.id,
            external_id: s.session.external_id,
            status: s.session.status.to_string(),
            subtotal: s.session.subtotal,
            tax: s.session.tax,
            shipping_fee: s.session.shipping_fee,
            discount: s.session.discount,
            total: s.session.total,
            currency: s.session.currency,
            address_id: s.session.address_id,
            expires_at: s.session.expires_at,
            confirmed_at: s.session.confirmed_at,
            created_at: s.session.created_at,
            items: s.items.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i32,
    pub quantity_unit: String,
    pub unit_price: i64,
    pub subtotal: i64,
    pub image_url: Option<String>,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(m: order_item::Model) -> Self {
        Self {
            id: m.id,
            variant_id: m.variant_id,
            product_name: m.product_name,
            variant_name: m.variant_name,
            quantity: m.quantity,
            quantity_unit: m.quantity_unit,
            unit_price: m.unit_price,
            subtotal: m.subtotal,
            image_url: m.image_url,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub external_id: String,
    pub checkout_session_id: Uuid,
    pub status: String,
    pub subtotal: i64,
    pub tax: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub currency: String,
    pub address_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<OrderItemResponse>,
}

impl From<order::Model> for OrderResponse {
    fn from(m: order::Model) -> Self {
        Self {
            id: m.id,
            external_id: m.external_id,
            checkout_session_id: m.checkout_session_id,
            status: m.status.to_string(),
            subtotal: m.subtotal,
            tax: m.tax,
            shipping_fee: m.shipping_fee,
            discount: m.discount,
            total: m.total,
            currency: m.currency,
            address_id: m.address_id,
            created_at: m.created_at,
            updated_at: m.updated_at,
            items: Vec::new(),
        }
    }
}

impl OrderResponse {
    pub fn with_items(mut self, items: Vec<order_item::Model>) -> Self {
        self.items = items.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub external_id: String,
    pub provider_payment_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub channel: Option<String>,
    pub payment_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<payment::Model> for PaymentResponse {
    fn from(m: payment::Model) -> Self {
        Self {
            id: m.id,
            order_id: m.order_id,
            external_id: m.external_id,
            provider_payment_id: m.provider_payment_id,
            amount: m.amount,
            currency: m.currency,
            status: m.status.to_string(),
            channel: m.channel,
            payment_code: m.payment_code,
            expires_at: m.expires_at,
            created_at: m.created_at,
        }
    }
}
