//! Airtime gateway client
//!
//! Speaks the provider's JSON dispatch API. Dispatch is asynchronous on the
//! provider side: an accepted request comes back as `Sent` with a request
//! id, and actual delivery is reported later on the status webhook.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ProviderConfig;

/// Outbound request budget
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Retries the provider performs internally before reporting failure
const PROVIDER_MAX_RETRIES: u32 = 3;

#[derive(Debug)]
pub enum ProviderError {
    /// Request never completed; delivery state unknown, caller may retry
    Transport(String),
    /// Provider answered with something unparseable
    BadResponse(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "Provider transport error: {}", msg),
            ProviderError::BadResponse(msg) => write!(f, "Provider response error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Provider's answer to a dispatch request. `accepted` with a request id
/// means delivery is pending; rejected carries the provider's reason.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub accepted: bool,
    pub provider_request_id: Option<String>,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait AirtimeProvider: Send + Sync {
    async fn send_airtime(
        &self,
        phone_number: &str,
        face_value: Decimal,
        currency: &str,
        order_ref: &str,
    ) -> Result<DispatchOutcome, ProviderError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchRequest<'a> {
    username: &'a str,
    recipients: Vec<Recipient>,
    max_num_retry: u32,
    request_metadata: RequestMetadata<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    phone_number: String,
    /// Provider format: "<CUR> <amount>", e.g. "KES 100.00"
    amount: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestMetadata<'a> {
    order_ref: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DispatchResponse {
    #[serde(default)]
    responses: Vec<RecipientResponse>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipientResponse {
    status: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Clone)]
pub struct AirtimeApiClient {
    client: Client,
    username: String,
    api_key: String,
    base_url: String,
}

impl AirtimeApiClient {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            username: config.username.clone(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
        }
    }
}

#[async_trait]
impl AirtimeProvider for AirtimeApiClient {
    async fn send_airtime(
        &self,
        phone_number: &str,
        face_value: Decimal,
        currency: &str,
        order_ref: &str,
    ) -> Result<DispatchOutcome, ProviderError> {
        let payload = DispatchRequest {
            username: &self.username,
            recipients: vec![Recipient {
                phone_number: phone_number.to_string(),
                amount: format!("{} {:.2}", currency, face_value),
            }],
            max_num_retry: PROVIDER_MAX_RETRIES,
            request_metadata: RequestMetadata { order_ref },
        };

        info!(
            order_ref = %order_ref,
            phone = %phone_number,
            amount = %face_value,
            currency = %currency,
            "Dispatching airtime request"
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("apiKey", &self.api_key)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let http_status = response.status();
        let body: DispatchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;

        let recipient = body.responses.into_iter().next();

        match recipient {
            Some(r) if http_status.is_success() && r.status == "Sent" => {
                info!(
                    order_ref = %order_ref,
                    request_id = ?r.request_id,
                    "Airtime request accepted by provider"
                );
                Ok(DispatchOutcome {
                    accepted: true,
                    provider_request_id: r.request_id,
                    error_message: None,
                })
            }
            Some(r) => {
                let reason = r
                    .error_message
                    .or(body.error_message)
                    .unwrap_or_else(|| format!("provider status {}", r.status));
                warn!(order_ref = %order_ref, reason = %reason, "Airtime request rejected");
                Ok(DispatchOutcome {
                    accepted: false,
                    provider_request_id: r.request_id,
                    error_message: Some(reason),
                })
            }
            None => {
                let reason = body
                    .error_message
                    .unwrap_or_else(|| format!("provider returned {} with no responses", http_status));
                warn!(order_ref = %order_ref, reason = %reason, "Airtime request rejected");
                Ok(DispatchOutcome {
                    accepted: false,
                    provider_request_id: None,
                    error_message: Some(reason),
                })
            }
        }
    }
}
