pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::ServiceError;

pub use http::HttpGateway;

/// Invoice creation request sent to the payment provider.
#[derive(Debug, Clone)]
pub struct CreateInvoiceRequest {
    /// Merchant-side reference, the order's external id.
    pub reference_id: String,
    pub amount: i64,
    pub currency: String,
    pub description: String,
}

/// What the provider hands back for a freshly created invoice.
#[derive(Debug, Clone)]
pub struct GatewayInvoice {
    pub provider_payment_id: String,
    pub channel: Option<String>,
    pub payment_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outbound payment-provider port. The reconciler never goes through this;
/// inbound truth arrives via webhooks only.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<GatewayInvoice, ServiceError>;
}

/// In-memory gateway for tests and local development. Hands out
/// deterministic invoices without any network traffic.
pub struct MockGateway;

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<GatewayInvoice, ServiceError> {
        Ok(GatewayInvoice {
            provider_payment_id: format!("mock-{}", request.reference_id),
            channel: Some("VIRTUAL_ACCOUNT".to_string()),
            payment_code: Some("8808999912345678".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(24)),
        })
    }
}
