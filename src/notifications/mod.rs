//! Outbound ticket mail.
//!
//! The delivery worker hands a fully composed [`TicketEmail`] to a
//! [`NotificationSink`]; `Ok(())` means the message was accepted for delivery.

mod email;
mod smtp;

pub use email::{render_qr_svg, TicketEmailComposer};
pub use smtp::SmtpNotificationSink;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketEmail {
    pub order_no: String,
    pub to: String,
    pub to_name: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<EmailAttachment>,
}

/// Notification errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Message build error: {0}")]
    Build(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Mail sink used by the delivery worker. At-least-once.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, email: TicketEmail) -> Result<(), NotificationError>;
}

/// Logs instead of sending; used when no SMTP host is configured.
#[derive(Debug, Clone, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn send(&self, email: TicketEmail) -> Result<(), NotificationError> {
        info!(
            order_no = %email.order_no,
            to = %email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "ticket email (not sent: no SMTP host configured)"
        );
        Ok(())
    }
}
