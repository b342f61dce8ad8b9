use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{entities::order::OrderStatus, errors::ServiceError, identity::CallerIdentity, AppState};

use super::{OrderResponse, PaymentResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListOrdersQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// List the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(
        ("page" = Option<u64>, Query, description = "1-based page number"),
        ("per_page" = Option<u64>, Query, description = "Page size")
    ),
    responses((status = 200, description = "Orders, newest first", body = OrderListResponse)),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ServiceError> {
    let page = state
        .services
        .orders
        .list_orders(&caller, query.page.max(1), query.per_page.clamp(1, 100))
        .await?;
    Ok(Json(OrderListResponse {
        orders: page.orders.into_iter().map(Into::into).collect(),
        total: page.total,
        page: page.page,
        per_page: page.per_page,
    }))
}

/// Fetch one order with its items
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = OrderResponse),
        (status = 404, description = "Unknown order, or not the owner")
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let order = state.services.orders.get_order(&caller, id).await?;
    let items = state.services.orders.get_order_items(&caller, id).await?;
    Ok(Json(OrderResponse::from(order).with_items(items)))
}

/// Advance an order's status (admin)
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order after transition", body = OrderResponse),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "Transition not allowed")
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    if !caller.is_admin() {
        return Err(ServiceError::Forbidden);
    }
    // Existence check is deliberately skipped for admins; transition itself
    // reports not-found.
    let order = state.services.status.transition(id, payload.status).await?;
    Ok(Json(order.into()))
}

/// List payment attempts for an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/payments",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Payment attempts, newest first", body = [PaymentResponse]),
        (status = 404, description = "Unknown order, or not the owner")
    ),
    tag = "orders"
)]
pub async fn list_order_payments(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PaymentResponse>>, ServiceError> {
    let payments = state.services.payments.list_payments(&caller, id).await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

/// Request a fresh payment invoice for an unpaid order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payments",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 201, description = "Live payment attempt", body = PaymentResponse),
        (status = 409, description = "Order is no longer payable"),
        (status = 502, description = "Payment provider unavailable")
    ),
    tag = "orders"
)]
pub async fn create_order_payment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payment = state
        .services
        .payments
        .create_invoice_for_order(&caller, id)
        .await?;
    Ok((StatusCode::CREATED, Json(PaymentResponse::from(payment))))
}
