use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError, identity::CallerIdentity, services::pricing::LineRequest, AppState,
};

use super::{CheckoutSessionResponse, OrderResponse, PaymentResponse};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCheckoutRequest {
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CheckoutLine>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutLine {
    pub variant_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AttachAddressRequest {
    pub address_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmResponse {
    pub order: OrderResponse,
    pub payment: Option<PaymentResponse>,
}

/// Create a checkout session
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CreateCheckoutRequest,
    responses(
        (status = 201, description = "Session created", body = CheckoutSessionResponse),
        (status = 400, description = "Empty cart or non-positive quantity"),
        (status = 404, description = "Unknown variant")
    ),
    tag = "checkout"
)]
pub async fn create_session(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(payload): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;
    let lines: Vec<LineRequest> = payload
        .items
        .iter()
        .map(|l| LineRequest {
            variant_id: l.variant_id,
            quantity: l.quantity,
        })
        .collect();

    let session = state
        .services
        .checkout
        .create_session(&caller, &lines)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutSessionResponse::from(session)),
    ))
}

/// Fetch a checkout session
#[utoipa::path(
    get,
    path = "/api/v1/checkout/{id}",
    params(("id" = Uuid, Path, description = "Checkout session id")),
    responses(
        (status = 200, description = "Session", body = CheckoutSessionResponse),
        (status = 403, description = "Not the session owner"),
        (status = 404, description = "Unknown session")
    ),
    tag = "checkout"
)]
pub async fn get_session(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckoutSessionResponse>, ServiceError> {
    let session = state.services.checkout.get_session(&caller, id).await?;
    Ok(Json(session.into()))
}

/// Attach a shipping address to a session
#[utoipa::path(
    put,
    path = "/api/v1/checkout/{id}/address",
    params(("id" = Uuid, Path, description = "Checkout session id")),
    request_body = AttachAddressRequest,
    responses(
        (status = 200, description = "Session repriced with shipping", body = CheckoutSessionResponse),
        (status = 404, description = "Unknown session or address"),
        (status = 409, description = "Session no longer editable")
    ),
    tag = "checkout"
)]
pub async fn attach_address(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttachAddressRequest>,
) -> Result<Json<CheckoutSessionResponse>, ServiceError> {
    let session = state
        .services
        .checkout
        .attach_address(&caller, id, payload.address_id)
        .await?;
    Ok(Json(session.into()))
}

/// Confirm a session into an order and request a payment invoice
#[utoipa::path(
    post,
    path = "/api/v1/checkout/{id}/confirm",
    params(("id" = Uuid, Path, description = "Checkout session id")),
    responses(
        (status = 201, description = "Order created (or returned again)", body = ConfirmResponse),
        (status = 403, description = "Not the session owner"),
        (status = 409, description = "Session expired or already closed"),
        (status = 422, description = "Insufficient stock"),
        (status = 502, description = "Payment provider unavailable")
    ),
    tag = "checkout"
)]
pub async fn confirm_session(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, payment) = state
        .services
        .payments
        .confirm_and_invoice(&caller, id)
        .await?;
    let items = state.services.orders.get_order_items(&caller, order.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ConfirmResponse {
            order: OrderResponse::from(order).with_items(items),
            payment: payment.map(Into::into),
        }),
    ))
}
