//! Common types and utilities shared across handlers and services
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rand::Rng;
use rust_decimal::Decimal;

use crate::errors::ServiceError;

/// Prefix of the human-facing order number
pub const ORDER_NO_PREFIX: &str = "ORD";
/// Prefix of the gateway bill identifier
pub const BILL_ID_PREFIX: &str = "BILL";

/// Format used for admission dates (`yyyy-mm-dd`)
pub const ADMIT_DATE_FORMAT: &str = "%Y-%m-%d";
/// Format used for gateway transaction dates (`yyyy-mm-dd hh:mm:ss`, Malaysia local)
pub const TRANSACTION_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ID_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Wall clock pinned to the business time zone.
///
/// Timestamps are stored in UTC; this type only formats at the boundaries
/// where the gateway or buyers expect local time.
#[derive(Debug, Clone, Copy)]
pub struct BusinessClock {
    tz: Tz,
}

impl BusinessClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Parses an IANA zone name such as `Asia/Kuala_Lumpur`
    pub fn from_name(name: &str) -> Result<Self, ServiceError> {
        let tz: Tz = name
            .parse()
            .map_err(|_| ServiceError::Internal(format!("unknown time zone: {}", name)))?;
        Ok(Self::new(tz))
    }

    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    /// Current local time in the gateway's `yyyy-mm-dd hh:mm:ss` layout
    pub fn transaction_date_now(&self) -> String {
        self.now().format(TRANSACTION_DATE_FORMAT).to_string()
    }
}

impl Default for BusinessClock {
    fn default() -> Self {
        Self::new(chrono_tz::Asia::Kuala_Lumpur)
    }
}

/// Freshly minted identifiers for a new order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNumbers {
    pub order_no: String,
    pub bill_id: String,
}

/// Generates `ORD-YYYYMMDDhhmmss-NNNN` / `BILL-YYYYMMDDhhmmss-NNNN` identifiers.
pub fn generate_order_numbers(at: DateTime<Tz>) -> OrderNumbers {
    let stamp = at.format(ID_TIMESTAMP_FORMAT).to_string();
    let mut rng = rand::thread_rng();
    OrderNumbers {
        order_no: format!("{}-{}-{:04}", ORDER_NO_PREFIX, stamp, rng.gen_range(0..10_000)),
        bill_id: format!("{}-{}-{:04}", BILL_ID_PREFIX, stamp, rng.gen_range(0..10_000)),
    }
}

/// Strict `yyyy-mm-dd` parsing; chrono alone accepts unpadded fields.
pub fn parse_admit_date(raw: &str) -> Result<NaiveDate, ServiceError> {
    let trimmed = raw.trim();
    let well_formed = trimmed.len() == 10
        && trimmed
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if !well_formed {
        return Err(ServiceError::Validation(format!(
            "Invalid date format: {} (expected yyyy-mm-dd)",
            raw
        )));
    }
    NaiveDate::parse_from_str(trimmed, ADMIT_DATE_FORMAT)
        .map_err(|e| ServiceError::Validation(format!("Invalid date {}: {}", raw, e)))
}

/// Normalizes an amount to two fractional digits
pub fn money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded
}

/// Returns true when the string holds nothing but whitespace
pub fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}
