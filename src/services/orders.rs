//! Order engine: the only writer of an order's payment state.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::AuthMember;
use crate::common::{
    generate_order_numbers, is_blank, money, parse_admit_date, BusinessClock, OrderNumbers,
};
use crate::config::PaymentConfig;
use crate::db::DbPool;
use crate::entities::{order_ticket_group, order_ticket_info};
use crate::errors::ServiceError;
use crate::models::{Language, PaymentMode, PaymentType, TransactionStatus};
use crate::services::payment_gateway::{
    build_redirect, interpret_callback, GatewayCallback, GatewayRedirect, PaymentGateway,
};
use crate::services::variants::{Resolution, Variant, VariantResolver};

const DEFAULT_VARIANT: &str = "default";
const MAX_QTY_PER_TICKET: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TicketSelection {
    pub ticket_id: String,
    pub qty: u32,
}

/// Personal details; all four present or all blank.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuyerDetails {
    pub id_no: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub contact_no: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(range(min = 1, message = "ticketGroupId is required"))]
    pub ticket_group_id: i32,
    /// Admission date, `yyyy-mm-dd`
    #[schema(example = "2025-05-21")]
    pub date: String,
    /// `bm`, `en` or `cn`
    #[serde(default)]
    pub lang_chosen: Option<String>,
    /// `credit/debit` or `fpx`; ignored for free orders
    #[serde(default)]
    pub payment_type: Option<String>,
    /// `individual` or `corporate`; required for fpx
    #[serde(default)]
    pub mode: Option<String>,
    /// Required for fpx
    #[serde(default)]
    pub bank_code: Option<String>,
    #[validate(length(min = 1, message = "at least one ticket is required"))]
    pub tickets: Vec<TicketSelection>,
    #[serde(default)]
    pub buyer: Option<BuyerDetails>,
}

#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: order_ticket_group::Model,
    pub lines: Vec<order_ticket_info::Model>,
}

#[derive(Debug, Clone)]
pub struct PaidCheckout {
    pub created: CreatedOrder,
    pub redirect: GatewayRedirect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub order_no: String,
    pub previous: TransactionStatus,
    pub status: TransactionStatus,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineView {
    pub item_id: String,
    pub item_desc1: String,
    pub item_desc2: String,
    pub item_desc3: String,
    pub print_type: String,
    #[schema(example = "5.00")]
    pub unit_price: String,
    pub admit_date: String,
    /// Present once the ticket has been issued
    pub encrypted_id: Option<String>,
    pub twbid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_id: i32,
    pub order_no: String,
    pub bill_id: String,
    pub ticket_group_id: i32,
    pub product_id: String,
    pub product_desc: String,
    #[schema(example = "10.00")]
    pub total_amount: String,
    pub transaction_status: TransactionStatus,
    pub transaction_id: String,
    pub transaction_date: String,
    pub bank_name: Option<String>,
    pub status_message: Option<String>,
    pub lang_chosen: String,
    pub is_email_sent: bool,
    pub buyer_name: String,
    pub buyer_email: String,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLineView>,
}

impl OrderView {
    pub fn new(order: order_ticket_group::Model, lines: Vec<order_ticket_info::Model>) -> Self {
        let status = order.status().unwrap_or(TransactionStatus::Failed);
        Self {
            order_id: order.id,
            order_no: order.order_no,
            bill_id: order.bill_id,
            ticket_group_id: order.ticket_group_id,
            product_id: order.product_id,
            product_desc: order.product_desc,
            total_amount: format!("{:.2}", money(order.total_amount)),
            transaction_status: status,
            transaction_id: order.transaction_id,
            transaction_date: order.transaction_date,
            bank_name: order.bank_name,
            status_message: order.status_message,
            lang_chosen: order.lang_chosen,
            is_email_sent: order.is_email_sent,
            buyer_name: order.buyer_name,
            buyer_email: order.buyer_email,
            created_at: order.created_at,
            lines: lines
                .into_iter()
                .map(|line| OrderLineView {
                    encrypted_id: (status == TransactionStatus::Success && line.is_provisioned())
                        .then(|| line.encrypted_id.clone()),
                    item_id: line.item_id,
                    item_desc1: line.item_desc1,
                    item_desc2: line.item_desc2,
                    item_desc3: line.item_desc3,
                    print_type: line.print_type,
                    unit_price: format!("{:.2}", money(line.unit_price)),
                    admit_date: line.admit_date,
                    twbid: line.twbid,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Buyer {
    name: String,
    email: String,
    id_no: String,
    contact_no: String,
}

/// Validated, priced request ready to be written.
#[derive(Debug, Clone)]
struct Draft {
    resolution: Resolution,
    admit_date: NaiveDate,
    lang: Language,
    items: Vec<(Variant, u32)>,
    total: Decimal,
    buyer: Buyer,
}

/// Initial state written with the group row.
struct Placement {
    status: TransactionStatus,
    transaction_date: String,
    msg_token: String,
    bank_code: Option<String>,
    bank_name: Option<String>,
    status_message: Option<String>,
}

/// Sums quantities of repeated ticket ids, keeping first-occurrence order.
pub fn merge_selections(
    tickets: &[TicketSelection],
) -> Result<Vec<(String, u32)>, ServiceError> {
    let mut merged: Vec<(String, u32)> = Vec::new();
    for selection in tickets {
        let ticket_id = selection.ticket_id.trim();
        if ticket_id.is_empty() {
            return Err(ServiceError::Validation("ticketId is required".to_string()));
        }
        if selection.qty == 0 || selection.qty > MAX_QTY_PER_TICKET {
            return Err(ServiceError::Validation(format!(
                "qty for {} must be between 1 and {}",
                ticket_id, MAX_QTY_PER_TICKET
            )));
        }
        match merged.iter_mut().find(|(id, _)| id == ticket_id) {
            Some((_, qty)) => *qty += selection.qty,
            None => merged.push((ticket_id.to_string(), selection.qty)),
        }
    }
    Ok(merged)
}

fn resolve_buyer(
    buyer: Option<&BuyerDetails>,
    member: Option<&AuthMember>,
) -> Result<Buyer, ServiceError> {
    let details = buyer.cloned().unwrap_or_default();
    let fields = [
        details.id_no.as_deref(),
        details.name.as_deref(),
        details.email.as_deref(),
        details.contact_no.as_deref(),
    ];
    let filled = fields.iter().filter(|f| !is_blank(**f)).count();

    if filled == fields.len() {
        let email = details.email.unwrap_or_default().trim().to_string();
        if !validator::validate_email(email.as_str()) {
            return Err(ServiceError::Validation(format!(
                "buyer email {} is not valid",
                email
            )));
        }
        return Ok(Buyer {
            name: details.name.unwrap_or_default().trim().to_string(),
            email,
            id_no: details.id_no.unwrap_or_default().trim().to_string(),
            contact_no: details.contact_no.unwrap_or_default().trim().to_string(),
        });
    }
    if filled > 0 {
        return Err(ServiceError::Validation(
            "buyer idNo, name, email and contactNo must be provided together".to_string(),
        ));
    }

    let member = member.ok_or_else(|| {
        ServiceError::Validation("buyer details are required for guest orders".to_string())
    })?;
    let email = member.email.clone().ok_or_else(|| {
        ServiceError::Validation("buyer email is required; none on the member account".to_string())
    })?;
    Ok(Buyer {
        name: member.name.clone().unwrap_or_else(|| email.clone()),
        email,
        id_no: String::new(),
        contact_no: String::new(),
    })
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Mints order and bill numbers from the business-local creation time.
pub type OrderNumberSource = Arc<dyn Fn(DateTime<Tz>) -> OrderNumbers + Send + Sync>;

pub struct OrderEngine {
    db: Arc<DbPool>,
    resolver: Arc<dyn VariantResolver>,
    gateway: Arc<dyn PaymentGateway>,
    clock: BusinessClock,
    payment: PaymentConfig,
    numbers: OrderNumberSource,
}

impl OrderEngine {
    pub fn new(
        db: Arc<DbPool>,
        resolver: Arc<dyn VariantResolver>,
        gateway: Arc<dyn PaymentGateway>,
        clock: BusinessClock,
        payment: PaymentConfig,
    ) -> Self {
        Self {
            db,
            resolver,
            gateway,
            clock,
            payment,
            numbers: Arc::new(generate_order_numbers),
        }
    }

    /// Replaces the order number generator.
    pub fn with_order_numbers(mut self, numbers: OrderNumberSource) -> Self {
        self.numbers = numbers;
        self
    }

    /// Creates an order awaiting payment and returns the gateway redirect.
    #[instrument(skip(self, member, request), fields(ticket_group_id = request.ticket_group_id))]
    pub async fn create_paid(
        &self,
        member: Option<&AuthMember>,
        request: CreateOrderRequest,
    ) -> Result<PaidCheckout, ServiceError> {
        let draft = self.prepare(member, &request).await?;

        let payment_type: PaymentType = request
            .payment_type
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ServiceError::Validation("paymentType is required".to_string()))?
            .parse()?;

        let (msg_token, bank_code, bank_name) = match payment_type {
            PaymentType::Fpx => {
                let mode: PaymentMode = request
                    .mode
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
                    .ok_or_else(|| {
                        ServiceError::Validation("mode is required for fpx".to_string())
                    })?
                    .parse()?;
                let bank_code = request
                    .bank_code
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        ServiceError::Validation("bankCode is required for fpx".to_string())
                    })?
                    .to_string();
                let bank_name = self.gateway.bank_name(&bank_code, mode).await?;
                (mode.msg_token().to_string(), Some(bank_code), Some(bank_name))
            }
            PaymentType::Card => (String::new(), None, None),
        };

        if draft.total.is_zero() {
            return Err(ServiceError::Validation(
                "total amount must be greater than zero for paid orders".to_string(),
            ));
        }

        let created = self
            .persist(
                member,
                &draft,
                Placement {
                    status: TransactionStatus::Initiate,
                    transaction_date: String::new(),
                    msg_token,
                    bank_code,
                    bank_name,
                    status_message: None,
                },
            )
            .await?;

        counter!("zooticket.orders_created", 1, "path" => "paid");
        let redirect = build_redirect(&created.order, payment_type, &self.payment);
        Ok(PaidCheckout { created, redirect })
    }

    /// Creates a zero-total order directly in `success`; delivery is left to
    /// the sweeper.
    #[instrument(skip(self, member, request), fields(ticket_group_id = request.ticket_group_id))]
    pub async fn create_free(
        &self,
        member: Option<&AuthMember>,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, ServiceError> {
        let draft = self.prepare(member, &request).await?;

        if !draft.total.is_zero() {
            return Err(ServiceError::Validation(
                "total amount must be zero for free orders".to_string(),
            ));
        }

        let created = self
            .persist(
                member,
                &draft,
                Placement {
                    status: TransactionStatus::Success,
                    transaction_date: self.clock.transaction_date_now(),
                    msg_token: String::new(),
                    bank_code: None,
                    bank_name: None,
                    status_message: Some("free order".to_string()),
                },
            )
            .await?;

        counter!("zooticket.orders_created", 1, "path" => "free");
        Ok(created)
    }

    async fn prepare(
        &self,
        member: Option<&AuthMember>,
        request: &CreateOrderRequest,
    ) -> Result<Draft, ServiceError> {
        request.validate()?;

        let lang = match request.lang_chosen.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => Language::default(),
        };
        let admit_date = parse_admit_date(&request.date)?;
        let merged = merge_selections(&request.tickets)?;
        let buyer = resolve_buyer(request.buyer.as_ref(), member)?;

        let resolution = self
            .resolver
            .resolve(request.ticket_group_id, admit_date)
            .await?;

        let mut items = Vec::with_capacity(merged.len());
        let mut total = Decimal::ZERO;
        for (ticket_id, qty) in merged {
            let variant = resolution.find(&ticket_id).cloned().ok_or_else(|| {
                ServiceError::Validation(format!(
                    "ticketId {} is not sold on {}",
                    ticket_id, admit_date
                ))
            })?;
            total += variant.unit_price * Decimal::from(qty);
            items.push((variant, qty));
        }

        Ok(Draft {
            resolution,
            admit_date,
            lang,
            items,
            total: money(total),
            buyer,
        })
    }

    /// Writes the group and its expanded lines in one transaction. An order
    /// number collision is retried once with fresh numbers.
    async fn persist(
        &self,
        member: Option<&AuthMember>,
        draft: &Draft,
        placement: Placement,
    ) -> Result<CreatedOrder, ServiceError> {
        let group = &draft.resolution.group;
        let admit_date = draft.admit_date.format(crate::common::ADMIT_DATE_FORMAT).to_string();

        for attempt in 0..2 {
            let numbers = (self.numbers)(self.clock.now());
            let now = Utc::now();
            let txn = self.db.begin().await?;

            let inserted = order_ticket_group::ActiveModel {
                order_no: Set(numbers.order_no.clone()),
                bill_id: Set(numbers.bill_id.clone()),
                ticket_group_id: Set(group.ticket_group_id),
                cust_id: Set(member.map(|m| m.cust_id)),
                transaction_id: Set(String::new()),
                total_amount: Set(draft.total),
                product_id: Set(format!("TG{}", group.ticket_group_id)),
                product_desc: Set(group.name.pick(draft.lang).to_string()),
                buyer_name: Set(draft.buyer.name.clone()),
                buyer_email: Set(draft.buyer.email.clone()),
                buyer_id_no: Set(draft.buyer.id_no.clone()),
                buyer_contact_no: Set(draft.buyer.contact_no.clone()),
                transaction_status: Set(placement.status.as_str().to_string()),
                bank_current_status: Set(String::new()),
                status_message: Set(placement.status_message.clone()),
                bank_code: Set(placement.bank_code.clone()),
                bank_name: Set(placement.bank_name.clone()),
                msg_token: Set(placement.msg_token.clone()),
                is_email_sent: Set(false),
                lang_chosen: Set(draft.lang.as_str().to_string()),
                transaction_date: Set(placement.transaction_date.clone()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await;

            let order = match inserted {
                Ok(order) => order,
                Err(err) if is_unique_violation(&err) => {
                    txn.rollback().await?;
                    if attempt == 0 {
                        warn!(order_no = %numbers.order_no, "order number collision; regenerating");
                        continue;
                    }
                    return Err(ServiceError::DuplicateCreation(numbers.order_no));
                }
                Err(err) => {
                    txn.rollback().await?;
                    return Err(err.into());
                }
            };

            let lines: Vec<order_ticket_info::ActiveModel> = draft
                .items
                .iter()
                .flat_map(|(variant, qty)| (0..*qty).map(move |_| variant))
                .map(|variant| order_ticket_info::ActiveModel {
                    order_ticket_group_id: Set(order.id),
                    item_id: Set(variant.ticket_id.clone()),
                    unit_price: Set(variant.unit_price),
                    item_desc1: Set(variant.item_desc1.clone()),
                    item_desc2: Set(variant.item_desc2.clone()),
                    item_desc3: Set(variant.item_desc3.clone()),
                    print_type: Set(variant.print_type.clone()),
                    quantity_bought: Set(1),
                    encrypted_id: Set(String::new()),
                    twbid: Set(None),
                    admit_date: Set(admit_date.clone()),
                    variant: Set(DEFAULT_VARIANT.to_string()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .collect();
            let expected = lines.len();

            if let Err(err) = order_ticket_info::Entity::insert_many(lines).exec(&txn).await {
                error!(order_no = %order.order_no, error = %err, "line batch failed; rolling back order");
                txn.rollback().await?;
                return Err(ServiceError::PartialPersist(format!(
                    "order {}: {}",
                    order.order_no, err
                )));
            }

            let stored_lines = order_ticket_info::Entity::find()
                .filter(order_ticket_info::Column::OrderTicketGroupId.eq(order.id))
                .order_by_asc(order_ticket_info::Column::Id)
                .all(&txn)
                .await?;
            if stored_lines.len() != expected {
                txn.rollback().await?;
                return Err(ServiceError::PartialPersist(format!(
                    "order {}: expected {} lines, stored {}",
                    order.order_no,
                    expected,
                    stored_lines.len()
                )));
            }

            txn.commit().await?;
            info!(
                order_no = %order.order_no,
                order_id = order.id,
                status = %placement.status,
                total = %order.total_amount,
                lines = stored_lines.len(),
                "order created"
            );
            return Ok(CreatedOrder {
                order,
                lines: stored_lines,
            });
        }

        Err(ServiceError::DuplicateCreation(
            "order number could not be allocated".to_string(),
        ))
    }

    /// Applies a gateway callback. Terminal orders are never changed, so a
    /// replayed or late callback is acknowledged without effect.
    #[instrument(skip(self, callback), fields(order_no = %callback.order_no, status = %callback.status_transaksi))]
    pub async fn apply_gateway_callback(
        &self,
        callback: &GatewayCallback,
    ) -> Result<CallbackOutcome, ServiceError> {
        let interpretation = interpret_callback(callback);
        if interpretation.order_no.is_empty() {
            return Err(ServiceError::Validation("order_no is required".to_string()));
        }

        let order = self.find_by_order_no(&interpretation.order_no).await?;
        let previous = order.status()?;
        let target = interpretation.outcome;

        if !previous.can_transition_to(target) {
            if previous == target {
                info!(%previous, "duplicate callback for terminal order");
            } else {
                warn!(%previous, %target, "callback would move a terminal order; ignored");
            }
            return Ok(CallbackOutcome {
                order_no: order.order_no,
                previous,
                status: previous,
                changed: false,
            });
        }

        let transaction_date = match interpretation.transaction_date.clone() {
            Some(date) => date,
            None if target == TransactionStatus::Success => {
                warn!("success callback without tarikh_transaksi; recording current time");
                self.clock.transaction_date_now()
            }
            None => order.transaction_date.clone(),
        };

        let sources: Vec<String> = TransactionStatus::sources_of(target)
            .into_iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let mut update = order_ticket_group::Entity::update_many()
            .col_expr(
                order_ticket_group::Column::TransactionStatus,
                Expr::value(target.as_str()),
            )
            .col_expr(
                order_ticket_group::Column::TransactionId,
                Expr::value(interpretation.transaction_id.clone()),
            )
            .col_expr(
                order_ticket_group::Column::TransactionDate,
                Expr::value(transaction_date),
            )
            .col_expr(
                order_ticket_group::Column::BankCurrentStatus,
                Expr::value(interpretation.raw_status.clone()),
            )
            .col_expr(
                order_ticket_group::Column::StatusMessage,
                Expr::value(interpretation.status_message.clone()),
            )
            .col_expr(order_ticket_group::Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(code) = interpretation.bank_code.clone() {
            update = update.col_expr(order_ticket_group::Column::BankCode, Expr::value(code));
        }
        if let Some(name) = interpretation.bank_name.clone() {
            update = update.col_expr(order_ticket_group::Column::BankName, Expr::value(name));
        }

        let result = update
            .filter(order_ticket_group::Column::Id.eq(order.id))
            .filter(order_ticket_group::Column::TransactionStatus.is_in(sources))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            let current = self.find_by_order_no(&order.order_no).await?.status()?;
            warn!(%previous, %current, "lost callback race; keeping stored state");
            return Ok(CallbackOutcome {
                order_no: order.order_no,
                previous,
                status: current,
                changed: false,
            });
        }

        counter!("zooticket.callbacks_applied", 1, "outcome" => target.as_str());
        info!(%previous, status = %target, "callback applied");
        Ok(CallbackOutcome {
            order_no: order.order_no,
            previous,
            status: target,
            changed: true,
        })
    }

    pub async fn find_by_order_no(
        &self,
        order_no: &str,
    ) -> Result<order_ticket_group::Model, ServiceError> {
        order_ticket_group::Entity::find()
            .filter(order_ticket_group::Column::OrderNo.eq(order_no.trim()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_no)))
    }

    pub async fn lines_of(
        &self,
        order_id: i32,
    ) -> Result<Vec<order_ticket_info::Model>, ServiceError> {
        Ok(order_ticket_info::Entity::find()
            .filter(order_ticket_info::Column::OrderTicketGroupId.eq(order_id))
            .order_by_asc(order_ticket_info::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn view_by_order_no(&self, order_no: &str) -> Result<OrderView, ServiceError> {
        let order = self.find_by_order_no(order_no).await?;
        let lines = self.lines_of(order.id).await?;
        Ok(OrderView::new(order, lines))
    }

    /// Guest lookup; the email must match the buyer's (case-insensitive).
    #[instrument(skip(self, email))]
    pub async fn inquire_by_order_no_email(
        &self,
        order_no: &str,
        email: &str,
    ) -> Result<OrderView, ServiceError> {
        if order_no.trim().is_empty() || email.trim().is_empty() {
            return Err(ServiceError::Validation(
                "orderNo and email are required".to_string(),
            ));
        }
        let order = match self.find_by_order_no(order_no).await {
            Ok(order) if order.buyer_email.trim().eq_ignore_ascii_case(email.trim()) => order,
            Ok(_) | Err(ServiceError::NotFound(_)) => {
                return Err(ServiceError::NotFound(format!("order {}", order_no)))
            }
            Err(err) => return Err(err),
        };
        let lines = self.lines_of(order.id).await?;
        Ok(OrderView::new(order, lines))
    }

    /// Member read; orders owned by someone else look missing.
    #[instrument(skip(self))]
    pub async fn get_member_order(
        &self,
        order_id: i32,
        cust_id: i32,
    ) -> Result<OrderView, ServiceError> {
        let order = order_ticket_group::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .filter(|o| o.cust_id == Some(cust_id))
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))?;
        let lines = self.lines_of(order.id).await?;
        Ok(OrderView::new(order, lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(id: &str, qty: u32) -> TicketSelection {
        TicketSelection {
            ticket_id: id.to_string(),
            qty,
        }
    }

    fn full_buyer() -> BuyerDetails {
        BuyerDetails {
            id_no: Some("900101-01-1234".into()),
            name: Some("Aminah".into()),
            email: Some("aminah@example.com".into()),
            contact_no: Some("0123456789".into()),
        }
    }

    #[test]
    fn duplicate_ticket_ids_are_summed_in_input_order() {
        let merged =
            merge_selections(&[sel("B", 1), sel("A", 2), sel(" B ", 3)]).unwrap();
        assert_eq!(merged, vec![("B".to_string(), 4), ("A".to_string(), 2)]);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        assert!(matches!(
            merge_selections(&[sel("A", 0)]),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn partial_buyer_block_is_rejected() {
        let mut buyer = full_buyer();
        buyer.contact_no = Some("  ".into());
        assert!(matches!(
            resolve_buyer(Some(&buyer), None),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn guests_must_supply_buyer_details() {
        assert!(resolve_buyer(None, None).is_err());
        assert_eq!(
            resolve_buyer(Some(&full_buyer()), None).unwrap().email,
            "aminah@example.com"
        );
    }

    #[test]
    fn members_default_to_token_claims() {
        let member = AuthMember {
            cust_id: 7,
            name: None,
            email: Some("member@example.com".into()),
        };
        let buyer = resolve_buyer(None, Some(&member)).unwrap();
        assert_eq!(buyer.email, "member@example.com");
        assert_eq!(buyer.name, "member@example.com");

        let no_email = AuthMember {
            cust_id: 7,
            name: Some("M".into()),
            email: None,
        };
        assert!(resolve_buyer(None, Some(&no_email)).is_err());
    }

    #[test]
    fn invalid_buyer_email_is_rejected() {
        let mut buyer = full_buyer();
        buyer.email = Some("not-an-email".into());
        assert!(resolve_buyer(Some(&buyer), None).is_err());
    }
}
