use serde::{Deserialize, Serialize};

/// Provider-side status of a dispatch request.
///
/// `Sent` means the provider accepted the request and delivery is pending;
/// the webhook later resolves it to `Success` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStatus {
    Sent,
    Success,
    Failed,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Sent => "Sent",
            ProviderStatus::Success => "Success",
            ProviderStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Sent" => Some(ProviderStatus::Sent),
            "Success" => Some(ProviderStatus::Success),
            "Failed" => Some(ProviderStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProviderStatus::Success | ProviderStatus::Failed)
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPaymentRequest {
    pub order_ref: String,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPaymentResponse {
    pub success: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Delivery status webhook body. The provider posts this form-encoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryCallback {
    pub request_id: String,
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub success: bool,
    pub status: String,
}

/// Pre-dispatch validation callback body (JSON).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationCallback {
    pub transaction_id: String,
    pub phone_number: String,
    pub source_ip_address: String,
    pub currency_code: String,
    pub amount: String,
}

/// Provider-defined validation answer: `Validated` or `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationAck {
    pub status: &'static str,
}
