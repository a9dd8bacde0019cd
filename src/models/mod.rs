//! Domain value types shared by the order engine, the gateway adapter and
//! the delivery pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Lifecycle state of an order's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Initiate,
    Success,
    Pending,
    Failed,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Initiate,
        TransactionStatus::Success,
        TransactionStatus::Pending,
        TransactionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiate => "initiate",
            TransactionStatus::Success => "success",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Failed => "failed",
        }
    }

    /// `success` and `failed` never move again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }

    /// Allowed edges: `initiate -> {success, pending, failed}`,
    /// `pending -> {pending, success, failed}`.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match self {
            TransactionStatus::Initiate => next != TransactionStatus::Initiate,
            TransactionStatus::Pending => next != TransactionStatus::Initiate,
            TransactionStatus::Success | TransactionStatus::Failed => false,
        }
    }

    /// States from which `next` may be reached.
    pub fn sources_of(next: TransactionStatus) -> Vec<TransactionStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initiate" => Ok(TransactionStatus::Initiate),
            "success" => Ok(TransactionStatus::Success),
            "pending" => Ok(TransactionStatus::Pending),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(ServiceError::Internal(format!(
                "unknown transaction status: {}",
                other
            ))),
        }
    }
}

/// Buyer-facing language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Bm,
    #[default]
    En,
    Cn,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Bm => "bm",
            Language::En => "en",
            Language::Cn => "cn",
        }
    }
}

impl FromStr for Language {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bm" => Ok(Language::Bm),
            "en" => Ok(Language::En),
            "cn" => Ok(Language::Cn),
            other => Err(ServiceError::Validation(format!(
                "langChosen must be one of bm, en, cn (got {})",
                other
            ))),
        }
    }
}

/// Three parallel translations of one piece of content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Trilingual {
    pub bm: String,
    pub en: String,
    pub cn: String,
}

impl Trilingual {
    pub fn new(bm: impl Into<String>, en: impl Into<String>, cn: impl Into<String>) -> Self {
        Self {
            bm: bm.into(),
            en: en.into(),
            cn: cn.into(),
        }
    }

    /// Picks the requested translation, falling back to English when it is blank.
    pub fn pick(&self, lang: Language) -> &str {
        let chosen = match lang {
            Language::Bm => &self.bm,
            Language::En => &self.en,
            Language::Cn => &self.cn,
        };
        if chosen.trim().is_empty() {
            &self.en
        } else {
            chosen
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PaymentType {
    #[serde(rename = "credit/debit", alias = "card", alias = "credit", alias = "debit")]
    Card,
    #[serde(rename = "fpx")]
    Fpx,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Card => "credit/debit",
            PaymentType::Fpx => "fpx",
        }
    }
}

impl FromStr for PaymentType {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit/debit" | "card" | "credit" | "debit" => Ok(PaymentType::Card),
            "fpx" => Ok(PaymentType::Fpx),
            other => Err(ServiceError::Validation(format!(
                "paymentType must be credit/debit or fpx (got {})",
                other
            ))),
        }
    }
}

/// FPX account mode; the gateway calls the wire value `msgToken`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Individual,
    Corporate,
}

impl PaymentMode {
    pub fn msg_token(&self) -> &'static str {
        match self {
            PaymentMode::Individual => "01",
            PaymentMode::Corporate => "02",
        }
    }
}

impl FromStr for PaymentMode {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" | "01" => Ok(PaymentMode::Individual),
            "corporate" | "02" => Ok(PaymentMode::Corporate),
            other => Err(ServiceError::Validation(format!(
                "mode must be individual or corporate (got {})",
                other
            ))),
        }
    }
}
