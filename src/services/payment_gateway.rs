//! Adapter for the JP payment gateway: bank-list lookups, callback
//! interpretation and the browser redirect form.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

use crate::config::PaymentConfig;
use crate::entities::order_ticket_group;
use crate::errors::ServiceError;
use crate::models::{PaymentMode, PaymentType, TransactionStatus};

const BANK_LIST_PATH: &str = "/JP_gateway/getBankList";
const API_KEY_HEADER: &str = "jp-api-key";

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the display name of an enabled FPX bank.
    async fn bank_name(&self, bank_code: &str, mode: PaymentMode) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone, Deserialize)]
struct BankListEnvelope {
    #[serde(default)]
    success: serde_json::Value,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankEntry {
    pub value: String,
    #[serde(default)]
    pub enabled: serde_json::Value,
    #[serde(default)]
    pub name: String,
}

impl BankEntry {
    /// The gateway sends `1`, `"1"` or `true`.
    pub fn is_enabled(&self) -> bool {
        truthy(&self.enabled)
    }
}

fn truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_i64() == Some(1),
        serde_json::Value::String(s) => s.trim() == "1" || s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Parses the bank-list body. `data` is normally a JSON document encoded
/// as a string; a bare array is accepted too.
pub fn parse_bank_list(body: &str) -> Result<Vec<BankEntry>, ServiceError> {
    let envelope: BankListEnvelope = serde_json::from_str(body)
        .map_err(|e| ServiceError::Protocol(format!("bank list envelope: {}", e)))?;

    if !truthy(&envelope.success) {
        return Err(ServiceError::Upstream(
            "bank list request was not successful".to_string(),
        ));
    }

    match envelope.data {
        serde_json::Value::String(encoded) => serde_json::from_str(&encoded)
            .map_err(|e| ServiceError::Protocol(format!("bank list data: {}", e))),
        array @ serde_json::Value::Array(_) => serde_json::from_value(array)
            .map_err(|e| ServiceError::Protocol(format!("bank list data: {}", e))),
        other => Err(ServiceError::Protocol(format!(
            "bank list data has unexpected shape: {}",
            other
        ))),
    }
}

/// Picks the bank name for `bank_code` from a parsed list.
pub fn select_bank(banks: &[BankEntry], bank_code: &str) -> Result<String, ServiceError> {
    let bank = banks
        .iter()
        .find(|b| b.value.eq_ignore_ascii_case(bank_code.trim()))
        .ok_or_else(|| ServiceError::UnknownBank(bank_code.to_string()))?;
    if !bank.is_enabled() {
        return Err(ServiceError::DisabledBank(bank_code.to_string()));
    }
    Ok(bank.name.clone())
}

/// HTTP client for the JP gateway.
#[derive(Clone)]
pub struct JpGatewayClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl JpGatewayClient {
    pub fn new(config: &PaymentConfig) -> Result<Self, ServiceError> {
        Self::with_timeout(
            &config.gateway_url,
            &config.api_key,
            config.bank_list_timeout(),
        )
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Internal(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl PaymentGateway for JpGatewayClient {
    #[instrument(skip(self))]
    async fn bank_name(&self, bank_code: &str, mode: PaymentMode) -> Result<String, ServiceError> {
        let url = format!("{}{}", self.base_url, BANK_LIST_PATH);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .form(&[("msgToken", mode.msg_token())])
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("bank list request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Upstream(format!(
                "bank list returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Upstream(format!("bank list body: {}", e)))?;
        let banks = parse_bank_list(&body)?;
        debug!(count = banks.len(), "bank list fetched");
        select_bank(&banks, bank_code)
    }
}

/// Form body the gateway posts back after payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GatewayCallback {
    #[serde(default)]
    pub id_transaksi: String,
    #[serde(default)]
    pub order_no: String,
    #[serde(default)]
    pub status_transaksi: String,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub tarikh_transaksi: String,
    #[serde(default)]
    pub kod_bank: String,
    #[serde(default)]
    pub nama_bank: String,
    #[serde(default)]
    pub jp_msg_token: String,
}

/// Engine view of a gateway callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackInterpretation {
    pub order_no: String,
    pub outcome: TransactionStatus,
    pub transaction_id: String,
    pub transaction_date: Option<String>,
    pub bank_code: Option<String>,
    pub bank_name: Option<String>,
    pub status_message: Option<String>,
    pub msg_token: Option<String>,
    pub raw_status: String,
}

/// `00` is paid; `AP`, `09` and `99` are still in flight; anything else failed.
pub fn classify_status(code: &str) -> TransactionStatus {
    match code.trim().to_ascii_uppercase().as_str() {
        "00" => TransactionStatus::Success,
        "AP" | "09" | "99" => TransactionStatus::Pending,
        _ => TransactionStatus::Failed,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Pure mapping from the wire callback to an engine outcome.
pub fn interpret_callback(callback: &GatewayCallback) -> CallbackInterpretation {
    let raw_status = callback.status_transaksi.trim().to_string();
    CallbackInterpretation {
        order_no: callback.order_no.trim().to_string(),
        outcome: classify_status(&raw_status),
        transaction_id: callback.id_transaksi.trim().to_string(),
        transaction_date: non_empty(&callback.tarikh_transaksi),
        bank_code: non_empty(&callback.kod_bank),
        bank_name: non_empty(&callback.nama_bank),
        status_message: non_empty(&callback.status_message),
        msg_token: non_empty(&callback.jp_msg_token),
        raw_status,
    }
}

impl From<&CallbackInterpretation> for GatewayCallback {
    fn from(value: &CallbackInterpretation) -> Self {
        Self {
            id_transaksi: value.transaction_id.clone(),
            order_no: value.order_no.clone(),
            status_transaksi: value.raw_status.clone(),
            status_message: value.status_message.clone().unwrap_or_default(),
            tarikh_transaksi: value.transaction_date.clone().unwrap_or_default(),
            kod_bank: value.bank_code.clone().unwrap_or_default(),
            nama_bank: value.bank_name.clone().unwrap_or_default(),
            jp_msg_token: value.msg_token.clone().unwrap_or_default(),
        }
    }
}

/// Auto-submitting form the buyer's browser posts to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GatewayRedirect {
    pub url: String,
    pub method: String,
    pub fields: BTreeMap<String, String>,
}

/// Builds the redirect payload for a freshly created paid order.
pub fn build_redirect(
    order: &order_ticket_group::Model,
    payment_type: PaymentType,
    config: &PaymentConfig,
) -> GatewayRedirect {
    let mut fields = BTreeMap::new();
    fields.insert("agToken".to_string(), config.ag_token.clone());
    fields.insert("orderNo".to_string(), order.order_no.clone());
    fields.insert("billId".to_string(), order.bill_id.clone());
    fields.insert("productId".to_string(), order.product_id.clone());
    fields.insert("productDesc".to_string(), order.product_desc.clone());
    fields.insert(
        "totalAmount".to_string(),
        format!("{:.2}", order.total_amount),
    );
    fields.insert("buyerName".to_string(), order.buyer_name.clone());
    fields.insert("buyerEmail".to_string(), order.buyer_email.clone());
    fields.insert("paymentType".to_string(), payment_type.as_str().to_string());
    fields.insert("msgToken".to_string(), order.msg_token.clone());
    fields.insert("lang".to_string(), order.lang_chosen.clone());
    if payment_type == PaymentType::Fpx {
        match (&order.bank_code, &order.bank_name) {
            (Some(code), Some(name)) => {
                fields.insert("bankCode".to_string(), code.clone());
                fields.insert("bankName".to_string(), name.clone());
            }
            _ => warn!(order_no = %order.order_no, "fpx order without bank details"),
        }
    }

    GatewayRedirect {
        url: format!(
            "{}{}",
            config.gateway_url.trim_end_matches('/'),
            config.redirect_path
        ),
        method: "POST".to_string(),
        fields,
    }
}
