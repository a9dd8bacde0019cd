pub mod orders;
pub mod payment_callback;
pub mod ticket_variants;

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::notifications::{NotificationSink, SmtpNotificationSink, TracingNotificationSink};
use crate::services::delivery::DeliveryWorker;
use crate::services::orders::OrderEngine;
use crate::services::payment_gateway::{JpGatewayClient, PaymentGateway};
use crate::services::provisioner::{TicketIssuer, TicketProvisioner, ZooApiClient};
use crate::services::variants::{CatalogVariantResolver, VariantResolver};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer used by HTTP handlers, the sweeper and the CLI
#[derive(Clone)]
pub struct AppServices {
    pub variants: Arc<dyn VariantResolver>,
    pub orders: Arc<OrderEngine>,
    pub provisioner: Arc<TicketProvisioner>,
    pub delivery: Arc<DeliveryWorker>,
}

/// Outbound collaborators; swapped for fakes in tests.
pub struct Collaborators {
    pub gateway: Arc<dyn PaymentGateway>,
    pub issuer: Arc<dyn TicketIssuer>,
    pub sink: Arc<dyn NotificationSink>,
}

impl Collaborators {
    /// Real HTTP clients plus SMTP when a relay is configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let gateway = Arc::new(JpGatewayClient::new(&config.payment)?);
        let issuer = Arc::new(ZooApiClient::new(&config.zoo)?);
        let sink: Arc<dyn NotificationSink> = match config.mail.smtp_host {
            Some(_) => {
                info!("ticket emails go through SMTP");
                Arc::new(SmtpNotificationSink::new(&config.mail)?)
            }
            None => {
                warn!("no SMTP host configured; ticket emails are only logged");
                Arc::new(TracingNotificationSink)
            }
        };
        Ok(Self {
            gateway,
            issuer,
            sink,
        })
    }
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig, collaborators: Collaborators) -> Self {
        let clock = config.clock();
        let variants: Arc<dyn VariantResolver> =
            Arc::new(CatalogVariantResolver::new(db_pool.clone()));

        let orders = Arc::new(OrderEngine::new(
            db_pool.clone(),
            variants.clone(),
            collaborators.gateway,
            clock,
            config.payment.clone(),
        ));
        let provisioner = Arc::new(TicketProvisioner::new(
            db_pool.clone(),
            collaborators.issuer,
            clock,
            config.zoo.trust_issuer_price,
        ));
        let delivery = Arc::new(
            DeliveryWorker::new(
                db_pool,
                provisioner.clone(),
                collaborators.sink,
                config.delivery.sweep_batch,
            )
            .with_retry_backoff(config.delivery.retry_backoff()),
        );

        Self {
            variants,
            orders,
            provisioner,
            delivery,
        }
    }

    pub fn from_config(db_pool: Arc<DbPool>, config: &AppConfig) -> Result<Self, ServiceError> {
        let collaborators = Collaborators::from_config(config)?;
        Ok(Self::new(db_pool, config, collaborators))
    }
}
