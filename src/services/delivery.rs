//! Periodic sweeper that converges paid orders to "tickets delivered".

use chrono::Utc;
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::db::DbPool;
use crate::entities::order_ticket_group;
use crate::errors::ServiceError;
use crate::models::TransactionStatus;
use crate::notifications::{NotificationSink, TicketEmailComposer};
use crate::services::provisioner::TicketProvisioner;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

/// Result of delivering one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    /// Some lines are still unprovisioned; retried after the hold-off
    Incomplete,
    AlreadySent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub selected: usize,
    pub delivered: usize,
    pub incomplete: usize,
    pub failed: usize,
    pub already_sent: usize,
    /// The previous tick was still running
    pub skipped: bool,
    /// Shutdown arrived mid-batch; the rest waits for the next start
    pub interrupted: bool,
}

impl SweepReport {
    /// Orders the sweep actually worked on.
    pub fn attempted(&self) -> usize {
        self.delivered + self.incomplete + self.failed + self.already_sent
    }
}

pub struct DeliveryWorker {
    db: Arc<DbPool>,
    provisioner: Arc<TicketProvisioner>,
    sink: Arc<dyn NotificationSink>,
    composer: TicketEmailComposer,
    batch_size: u64,
    retry_backoff: Duration,
    tick_guard: Mutex<()>,
}

impl DeliveryWorker {
    pub fn new(
        db: Arc<DbPool>,
        provisioner: Arc<TicketProvisioner>,
        sink: Arc<dyn NotificationSink>,
        batch_size: u64,
    ) -> Self {
        Self {
            db,
            provisioner,
            sink,
            composer: TicketEmailComposer::new(),
            batch_size: batch_size.clamp(1, 50),
            retry_backoff: Duration::ZERO,
            tick_guard: Mutex::new(()),
        }
    }

    /// Hold-off after the first failed attempt. Zero retries on the next tick.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Orders that are paid, dated, not yet emailed and past their retry
    /// hold-off. Fewest attempts first, then oldest, so orders that keep
    /// failing cannot crowd fresh ones out of the batch.
    pub async fn eligible_orders(&self) -> Result<Vec<order_ticket_group::Model>, ServiceError> {
        Ok(order_ticket_group::Entity::find()
            .filter(
                order_ticket_group::Column::TransactionStatus
                    .eq(TransactionStatus::Success.as_str()),
            )
            .filter(order_ticket_group::Column::IsEmailSent.eq(false))
            .filter(order_ticket_group::Column::TransactionDate.ne(""))
            .filter(
                Condition::any()
                    .add(order_ticket_group::Column::NextAttemptAt.is_null())
                    .add(order_ticket_group::Column::NextAttemptAt.lte(Utc::now())),
            )
            .order_by_asc(order_ticket_group::Column::DeliveryAttempts)
            .order_by_asc(order_ticket_group::Column::Id)
            .limit(self.batch_size)
            .all(&*self.db)
            .await?)
    }

    /// One full sweep, as run by the operator CLI.
    pub async fn run_once(&self) -> Result<SweepReport, ServiceError> {
        self.sweep(None).await
    }

    /// One sweep. Orders are handled serially; a failed or incomplete order
    /// is pushed back by the retry hold-off. With `shutdown`, the flag is
    /// checked before each order and the batch stops once it is set.
    #[instrument(skip(self, shutdown))]
    pub async fn sweep(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<SweepReport, ServiceError> {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            debug!("previous sweep still running; skipping tick");
            return Ok(SweepReport {
                skipped: true,
                ..Default::default()
            });
        };

        let orders = self.eligible_orders().await?;
        let mut report = SweepReport {
            selected: orders.len(),
            ..Default::default()
        };

        for order in orders {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                report.interrupted = true;
                info!(
                    remaining = report.selected - report.attempted(),
                    "shutdown requested; stopping sweep early"
                );
                break;
            }

            match self.deliver(&order).await {
                Ok(DeliveryOutcome::Delivered) => report.delivered += 1,
                Ok(DeliveryOutcome::AlreadySent) => report.already_sent += 1,
                Ok(DeliveryOutcome::Incomplete) => {
                    report.incomplete += 1;
                    self.hold_off(&order).await;
                }
                Err(err) => {
                    report.failed += 1;
                    counter!("zooticket.sweep_failures", 1);
                    error!(
                        order_no = %order.order_no,
                        attempt = order.delivery_attempts + 1,
                        error = %err,
                        retryable = err.is_retryable(),
                        "delivery failed; will retry after hold-off"
                    );
                    self.hold_off(&order).await;
                }
            }
        }

        if report.selected > 0 {
            info!(
                selected = report.selected,
                delivered = report.delivered,
                incomplete = report.incomplete,
                failed = report.failed,
                interrupted = report.interrupted,
                "sweep finished"
            );
        }
        Ok(report)
    }

    /// Count the attempt and push the order back. Bookkeeping errors are
    /// logged only; the order then stays eligible.
    async fn hold_off(&self, order: &order_ticket_group::Model) {
        let attempts = order.delivery_attempts.saturating_add(1);
        let delay = retry_delay(self.retry_backoff, attempts);
        let next_attempt_at = if delay.is_zero() {
            None
        } else {
            chrono::Duration::from_std(delay)
                .ok()
                .map(|delay| Utc::now() + delay)
        };

        let result = order_ticket_group::Entity::update_many()
            .col_expr(
                order_ticket_group::Column::DeliveryAttempts,
                Expr::value(attempts),
            )
            .col_expr(
                order_ticket_group::Column::NextAttemptAt,
                Expr::value(next_attempt_at),
            )
            .filter(order_ticket_group::Column::Id.eq(order.id))
            .filter(order_ticket_group::Column::IsEmailSent.eq(false))
            .exec(&*self.db)
            .await;

        match result {
            Ok(_) => debug!(
                order_no = %order.order_no,
                attempts,
                retry_in_secs = delay.as_secs(),
                "delivery deferred"
            ),
            Err(err) => warn!(
                order_no = %order.order_no,
                error = %err,
                "could not record delivery attempt"
            ),
        }
    }

    /// Provision, compose, send, then flip `is_email_sent` with a
    /// compare-and-set. A sink error leaves the flag untouched.
    #[instrument(skip(self, order), fields(order_no = %order.order_no, order_id = order.id))]
    pub async fn deliver(
        &self,
        order: &order_ticket_group::Model,
    ) -> Result<DeliveryOutcome, ServiceError> {
        if order.is_email_sent {
            return Ok(DeliveryOutcome::AlreadySent);
        }

        let provisioned = self.provisioner.provision(order).await?;
        if !provisioned.is_complete() {
            warn!(
                pending = provisioned.pending(),
                "order not fully provisioned; email deferred"
            );
            return Ok(DeliveryOutcome::Incomplete);
        }

        let email = self.composer.compose(order, &provisioned.lines)?;
        self.sink.send(email).await?;

        let result = order_ticket_group::Entity::update_many()
            .col_expr(order_ticket_group::Column::IsEmailSent, Expr::value(true))
            .col_expr(order_ticket_group::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order_ticket_group::Column::Id.eq(order.id))
            .filter(order_ticket_group::Column::IsEmailSent.eq(false))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!("email flag already set by a concurrent sweep");
            return Ok(DeliveryOutcome::AlreadySent);
        }

        counter!("zooticket.emails_delivered", 1);
        info!(tickets = provisioned.lines.len(), "tickets delivered");
        Ok(DeliveryOutcome::Delivered)
    }

    /// Operator retry for one order. With `resend` the email flag is cleared
    /// first so the tickets are mailed again.
    #[instrument(skip(self))]
    pub async fn redeliver(
        &self,
        order_no: &str,
        resend: bool,
    ) -> Result<DeliveryOutcome, ServiceError> {
        let find = || async {
            order_ticket_group::Entity::find()
                .filter(order_ticket_group::Column::OrderNo.eq(order_no.trim()))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_no)))
        };

        let order = find().await?;
        if order.status()? != TransactionStatus::Success {
            return Err(ServiceError::Validation(format!(
                "order {} is {}, only paid orders can be delivered",
                order.order_no, order.transaction_status
            )));
        }

        let order = if resend && order.is_email_sent {
            order_ticket_group::Entity::update_many()
                .col_expr(order_ticket_group::Column::IsEmailSent, Expr::value(false))
                .col_expr(order_ticket_group::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(order_ticket_group::Column::Id.eq(order.id))
                .filter(order_ticket_group::Column::IsEmailSent.eq(true))
                .exec(&*self.db)
                .await?;
            info!("email flag cleared for resend");
            find().await?
        } else {
            order
        };

        if order.transaction_date.is_empty() {
            return Err(ServiceError::Validation(format!(
                "order {} has no transaction date",
                order.order_no
            )));
        }

        self.deliver(&order).await
    }

    /// Runs [`sweep`](Self::sweep) on a fixed cadence until `shutdown` flips
    /// to true. A tick in progress finishes its current order, then stops.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = interval.as_secs(), "delivery worker started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep(Some(&shutdown)).await {
                            counter!("zooticket.sweep_failures", 1);
                            error!(error = %err, "sweep query failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("delivery worker stopped");
        })
    }
}

/// Delay before the next try after `attempts` unsuccessful ones: the base
/// hold-off doubled per extra attempt, capped at an hour.
fn retry_delay(base: Duration, attempts: i32) -> Duration {
    let doublings = attempts.clamp(1, 7).unsigned_abs() - 1;
    base.checked_mul(2u32.pow(doublings))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}
