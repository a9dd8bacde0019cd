//! Ticket provisioning: fills `encrypted_id` on every line of a paid order,
//! either from the external issuance API or with a locally minted token.

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::common::{money, BusinessClock};
use crate::config::ZooConfig;
use crate::db::DbPool;
use crate::entities::{order_ticket_group, order_ticket_info, ticket_group};
use crate::errors::ServiceError;
use crate::models::TransactionStatus;

const TOKEN_PATH: &str = "/Token";
const PURCHASE_PATH: &str = "/api/JohorZoo/PostOnlinePurchase2";
const INTERNAL_TOKEN_PREFIX: &str = "INT-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IssueItem {
    pub item_id: String,
    pub qty: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IssueRequest {
    pub tran_date: String,
    pub reference_no: String,
    pub items: Vec<IssueItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssuedTicket {
    #[serde(rename = "TWBID", default)]
    pub twbid: serde_json::Value,
    #[serde(rename = "ItemId", default)]
    pub item_id: String,
    #[serde(rename = "EncryptedID", default)]
    pub encrypted_id: String,
    #[serde(rename = "AdmitDate", default)]
    pub admit_date: Option<String>,
    #[serde(rename = "UnitPrice", default)]
    pub unit_price: serde_json::Value,
    #[serde(rename = "ItemDesc", default)]
    pub item_desc: Option<String>,
    #[serde(rename = "ItemDesc2", default)]
    pub item_desc2: Option<String>,
    #[serde(rename = "ItemDesc3", default)]
    pub item_desc3: Option<String>,
}

impl IssuedTicket {
    pub fn twbid(&self) -> Option<String> {
        match &self.twbid {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Issuer price when it parses as a decimal.
    pub fn price(&self) -> Option<Decimal> {
        match &self.unit_price {
            serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
        .map(money)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueResponse {
    #[serde(rename = "StatusCode", default)]
    pub status_code: String,
    #[serde(rename = "ReceiptNumber", default)]
    pub receipt_number: Option<String>,
    #[serde(rename = "Tickets", default)]
    pub tickets: Vec<IssuedTicket>,
}

/// External ticket-issuance backend.
#[async_trait]
pub trait TicketIssuer: Send + Sync {
    async fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client for the zoo issuance API (password-grant token + purchase call).
#[derive(Clone)]
pub struct ZooApiClient {
    client: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
    token_timeout: Duration,
    issuance_timeout: Duration,
}

impl ZooApiClient {
    pub fn new(config: &ZooConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ServiceError::Internal(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            token_timeout: Duration::from_secs(config.token_timeout_secs),
            issuance_timeout: Duration::from_secs(config.issuance_timeout_secs),
        })
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, TOKEN_PATH))
            .timeout(self.token_timeout)
            .form(&[
                ("grant_type", "password"),
                ("username", self.user.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("issuer token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::Upstream(format!(
                "issuer token returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Protocol(format!("issuer token body: {}", e)))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl TicketIssuer for ZooApiClient {
    #[instrument(skip(self, request), fields(reference_no = %request.reference_no))]
    async fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, ServiceError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!("{}{}", self.base_url, PURCHASE_PATH))
            .timeout(self.issuance_timeout)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(format!("issuance request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::Upstream(format!(
                "issuance returned HTTP {}",
                response.status().as_u16()
            )));
        }

        response
            .json::<IssueResponse>()
            .await
            .map_err(|e| ServiceError::Protocol(format!("issuance body: {}", e)))
    }
}

/// Which credential source a ticket group uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceStrategy {
    External,
    Internal,
}

#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub strategy: Option<IssuanceStrategy>,
    /// Lines in insertion order, as stored after this run
    pub lines: Vec<order_ticket_info::Model>,
    pub newly_provisioned: usize,
}

impl ProvisionOutcome {
    pub fn is_complete(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|l| l.is_provisioned())
    }

    pub fn pending(&self) -> usize {
        self.lines.iter().filter(|l| !l.is_provisioned()).count()
    }
}

/// Unprovisioned quantity per item, first-occurrence order.
pub fn pending_items(lines: &[order_ticket_info::Model]) -> Vec<IssueItem> {
    let mut items: Vec<IssueItem> = Vec::new();
    for line in lines.iter().filter(|l| !l.is_provisioned()) {
        match items.iter_mut().find(|i| i.item_id == line.item_id) {
            Some(item) => item.qty += 1,
            None => items.push(IssueItem {
                item_id: line.item_id.clone(),
                qty: 1,
            }),
        }
    }
    items
}

/// A returned ticket matched to the line it will fill.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketAssignment {
    pub line_id: i32,
    pub encrypted_id: String,
    pub twbid: Option<String>,
    pub issuer_price: Option<Decimal>,
}

/// Matches tickets to unprovisioned lines of the same item in insertion
/// order. Tickets with an empty or already-assigned `EncryptedID` are dropped.
pub fn assign_tickets(
    lines: &[order_ticket_info::Model],
    tickets: &[IssuedTicket],
) -> Vec<TicketAssignment> {
    let mut used: HashSet<String> = lines
        .iter()
        .filter(|l| l.is_provisioned())
        .map(|l| l.encrypted_id.clone())
        .collect();
    let mut taken: HashSet<i32> = HashSet::new();
    let mut assignments = Vec::new();

    for ticket in tickets {
        let encrypted = ticket.encrypted_id.trim();
        if encrypted.is_empty() || used.contains(encrypted) {
            continue;
        }
        let Some(line) = lines.iter().find(|l| {
            !l.is_provisioned() && !taken.contains(&l.id) && l.item_id == ticket.item_id
        }) else {
            warn!(item_id = %ticket.item_id, "issuer returned a ticket with no open line");
            continue;
        };
        taken.insert(line.id);
        used.insert(encrypted.to_string());
        assignments.push(TicketAssignment {
            line_id: line.id,
            encrypted_id: encrypted.to_string(),
            twbid: ticket.twbid(),
            issuer_price: ticket.price(),
        });
    }

    assignments
}

pub struct TicketProvisioner {
    db: Arc<DbPool>,
    issuer: Arc<dyn TicketIssuer>,
    clock: BusinessClock,
    trust_issuer_price: bool,
}

impl TicketProvisioner {
    pub fn new(
        db: Arc<DbPool>,
        issuer: Arc<dyn TicketIssuer>,
        clock: BusinessClock,
        trust_issuer_price: bool,
    ) -> Self {
        Self {
            db,
            issuer,
            clock,
            trust_issuer_price,
        }
    }

    pub async fn load_lines(
        &self,
        order_id: i32,
    ) -> Result<Vec<order_ticket_info::Model>, ServiceError> {
        Ok(order_ticket_info::Entity::find()
            .filter(order_ticket_info::Column::OrderTicketGroupId.eq(order_id))
            .order_by_asc(order_ticket_info::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Provisions every unprovisioned line of a paid order. Idempotent: a
    /// fully provisioned order returns its stored lines without any call out.
    #[instrument(skip(self, order), fields(order_no = %order.order_no, order_id = order.id))]
    pub async fn provision(
        &self,
        order: &order_ticket_group::Model,
    ) -> Result<ProvisionOutcome, ServiceError> {
        if order.status()? != TransactionStatus::Success {
            return Err(ServiceError::Validation(format!(
                "order {} is not paid",
                order.order_no
            )));
        }

        let lines = self.load_lines(order.id).await?;
        if lines.is_empty() {
            return Err(ServiceError::Internal(format!(
                "order {} has no ticket lines",
                order.order_no
            )));
        }
        if lines.iter().all(|l| l.is_provisioned()) {
            debug!("all lines already provisioned");
            return Ok(ProvisionOutcome {
                strategy: None,
                lines,
                newly_provisioned: 0,
            });
        }

        let group = ticket_group::Entity::find_by_id(order.ticket_group_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::CatalogMiss(order.ticket_group_id.to_string()))?;

        let (strategy, newly_provisioned) = if group.is_ticket_internal {
            (
                IssuanceStrategy::Internal,
                self.provision_internal(order, &lines).await?,
            )
        } else {
            (
                IssuanceStrategy::External,
                self.provision_external(order, &lines).await?,
            )
        };

        counter!("zooticket.tickets_provisioned", newly_provisioned as u64);

        let lines = self.load_lines(order.id).await?;
        let outcome = ProvisionOutcome {
            strategy: Some(strategy),
            lines,
            newly_provisioned,
        };
        if outcome.is_complete() {
            info!(newly_provisioned, "order fully provisioned");
        } else {
            warn!(
                newly_provisioned,
                pending = outcome.pending(),
                "order partially provisioned; remaining lines stay open for retry"
            );
        }
        Ok(outcome)
    }

    /// One opaque token shared by all lines; reuses a token left by an
    /// earlier interrupted run.
    async fn provision_internal(
        &self,
        order: &order_ticket_group::Model,
        lines: &[order_ticket_info::Model],
    ) -> Result<usize, ServiceError> {
        let token = lines
            .iter()
            .find(|l| l.is_provisioned())
            .map(|l| l.encrypted_id.clone())
            .unwrap_or_else(|| format!("{}{}", INTERNAL_TOKEN_PREFIX, Uuid::new_v4().simple()));

        let result = order_ticket_info::Entity::update_many()
            .col_expr(order_ticket_info::Column::EncryptedId, Expr::value(token))
            .col_expr(order_ticket_info::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order_ticket_info::Column::OrderTicketGroupId.eq(order.id))
            .filter(order_ticket_info::Column::EncryptedId.eq(""))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected as usize)
    }

    async fn provision_external(
        &self,
        order: &order_ticket_group::Model,
        lines: &[order_ticket_info::Model],
    ) -> Result<usize, ServiceError> {
        let items = pending_items(lines);
        let tran_date = if order.transaction_date.is_empty() {
            self.clock.transaction_date_now()
        } else {
            order.transaction_date.clone()
        };
        let request = IssueRequest {
            tran_date,
            reference_no: order.order_no.clone(),
            items: items.clone(),
        };

        let response = self.issuer.issue(&request).await?;
        if !response.status_code.trim().eq_ignore_ascii_case("OK") {
            return Err(ServiceError::Upstream(format!(
                "issuer status {}",
                response.status_code
            )));
        }
        debug!(
            receipt = response.receipt_number.as_deref().unwrap_or(""),
            tickets = response.tickets.len(),
            "issuer accepted purchase"
        );

        let assignments = assign_tickets(lines, &response.tickets);
        for item in &items {
            let returned = response
                .tickets
                .iter()
                .filter(|t| t.item_id == item.item_id)
                .count();
            if returned < item.qty as usize {
                warn!(
                    item_id = %item.item_id,
                    expected = item.qty,
                    returned,
                    "issuer returned fewer tickets than requested"
                );
            }
        }

        let mut provisioned = 0;
        for assignment in assignments {
            let stored_price = lines
                .iter()
                .find(|l| l.id == assignment.line_id)
                .map(|l| money(l.unit_price));

            let mut update = order_ticket_info::Entity::update_many()
                .col_expr(
                    order_ticket_info::Column::EncryptedId,
                    Expr::value(assignment.encrypted_id.clone()),
                )
                .col_expr(order_ticket_info::Column::Twbid, Expr::value(assignment.twbid))
                .col_expr(order_ticket_info::Column::UpdatedAt, Expr::value(Utc::now()));

            if let (Some(issuer_price), Some(stored)) = (assignment.issuer_price, stored_price) {
                if issuer_price != stored {
                    if self.trust_issuer_price {
                        info!(line_id = assignment.line_id, %stored, %issuer_price, "applying issuer price");
                        update = update.col_expr(
                            order_ticket_info::Column::UnitPrice,
                            Expr::value(issuer_price),
                        );
                    } else {
                        warn!(line_id = assignment.line_id, %stored, %issuer_price, "issuer price differs from stored price; keeping stored price");
                    }
                }
            }

            // Each line is committed on its own so a crash keeps finished lines.
            let result = update
                .filter(order_ticket_info::Column::Id.eq(assignment.line_id))
                .filter(order_ticket_info::Column::EncryptedId.eq(""))
                .exec(&*self.db)
                .await?;
            provisioned += result.rows_affected as usize;
        }

        Ok(provisioned)
    }
}
