use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::errors::ServiceError;

use super::{CreateInvoiceRequest, GatewayInvoice, PaymentGateway};

/// Payment provider client speaking the provider's invoice REST API.
/// Every failure mode collapses into `ServiceError::GatewayError`; callers
/// treat the provider as a retryable dependency.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGateway {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[derive(Serialize)]
struct InvoiceRequestBody<'a> {
    external_id: &'a str,
    amount: i64,
    currency: &'a str,
    description: &'a str,
}

#[derive(Deserialize)]
struct InvoiceResponseBody {
    id: String,
    #[serde(default)]
    payment_channel: Option<String>,
    #[serde(default)]
    payment_code: Option<String>,
    #[serde(default)]
    expiry_date: Option<DateTime<Utc>>,
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    #[instrument(skip(self, request), fields(reference_id = %request.reference_id))]
    async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<GatewayInvoice, ServiceError> {
        let url = format!("{}/v2/invoices", self.base_url.trim_end_matches('/'));
        let body = InvoiceRequestBody {
            external_id: &request.reference_id,
            amount: request.amount,
            currency: &request.currency,
            description: &request.description,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("invoice request failed: {e}");
                ServiceError::GatewayError(format!("invoice request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(%status, "invoice request rejected: {detail}");
            return Err(ServiceError::GatewayError(format!(
                "provider returned {status}"
            )));
        }

        let parsed: InvoiceResponseBody = response.json().await.map_err(|e| {
            ServiceError::GatewayError(format!("malformed invoice response: {e}"))
        })?;

        Ok(GatewayInvoice {
            provider_payment_id: parsed.id,
            channel: parsed.payment_channel,
            payment_code: parsed.payment_code,
            expires_at: parsed.expiry_date,
        })
    }
}
