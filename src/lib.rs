pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod identity;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::AppConfig,
    events::EventSender,
    gateway::PaymentGateway,
    handlers::AppServices,
    services::{
        checkout::CheckoutService,
        order_status::OrderStatusService,
        orders::OrderService,
        payments::PaymentService,
        pricing::PricingService,
        rates::{FlatRateCalculator, RateCalculator},
        webhook_reconciler::WebhookReconciler,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
}

/// Wires the service graph on top of a live connection. Tests call this
/// with a mock gateway; main hands in the HTTP one.
pub fn build_services(
    db: Arc<DatabaseConnection>,
    config: &AppConfig,
    payment_gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
) -> AppServices {
    let rates: Arc<dyn RateCalculator> = Arc::new(FlatRateCalculator);
    let pricing = PricingService::new(db.clone());
    let checkout = CheckoutService::new(
        db.clone(),
        pricing,
        rates,
        event_sender.clone(),
        config.session_ttl_minutes,
        config.currency.clone(),
    );
    let status = OrderStatusService::new(db.clone(), event_sender.clone());
    let orders = OrderService::new(db.clone(), event_sender.clone());
    let payments = PaymentService::new(
        db.clone(),
        payment_gateway,
        orders.clone(),
        event_sender.clone(),
    );
    let reconciler = WebhookReconciler::new(
        db.clone(),
        status.clone(),
        config.payment_provider.clone(),
        event_sender,
    );

    AppServices {
        checkout,
        orders,
        payments,
        status,
        reconciler,
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::checkout::create_session,
        handlers::checkout::get_session,
        handlers::checkout::attach_address,
        handlers::checkout::confirm_session,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::update_order_status,
        handlers::orders::list_order_payments,
        handlers::orders::create_order_payment,
        handlers::payment_webhooks::handle_webhook,
    ),
    components(schemas(
        handlers::checkout::CreateCheckoutRequest,
        handlers::checkout::CheckoutLine,
        handlers::checkout::AttachAddressRequest,
        handlers::checkout::ConfirmResponse,
        handlers::orders::UpdateOrderStatusRequest,
        handlers::orders::OrderListResponse,
        handlers::CheckoutSessionResponse,
        handlers::CheckoutItemResponse,
        handlers::OrderResponse,
        handlers::OrderItemResponse,
        handlers::PaymentResponse,
    )),
    tags(
        (name = "checkout", description = "Checkout session lifecycle"),
        (name = "orders", description = "Order retrieval and status management"),
        (name = "payments", description = "Payment provider integration")
    ),
    info(title = "Storefront API", description = "Checkout, order, and payment core")
)]
pub struct ApiDoc;

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/checkout",
            post(handlers::checkout::create_session),
        )
        .route("/checkout/{id}", get(handlers::checkout::get_session))
        .route(
            "/checkout/{id}/address",
            put(handlers::checkout::attach_address),
        )
        .route(
            "/checkout/{id}/confirm",
            post(handlers::checkout::confirm_session),
        )
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/{id}", get(handlers::orders::get_order))
        .route(
            "/orders/{id}/status",
            put(handlers::orders::update_order_status),
        )
        .route(
            "/orders/{id}/payments",
            get(handlers::orders::list_order_payments)
                .post(handlers::orders::create_order_payment),
        )
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::handle_webhook),
        );

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api/v1", api)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "detail": e.to_string() })),
        ),
    }
}
