use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, instrument};

use super::{NotificationError, NotificationSink, TicketEmail};
use crate::config::MailConfig;

/// Sends ticket mail through an SMTP relay.
#[derive(Clone)]
pub struct SmtpNotificationSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotificationSink {
    pub fn new(config: &MailConfig) -> Result<Self, NotificationError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotificationError::Transport("smtp host not configured".into()))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| NotificationError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        let from = mailbox(&config.from_name, &config.from_email)
            .map_err(|e| NotificationError::InvalidAddress(format!("from: {e}")))?;

        Ok(Self { transport, from })
    }

    fn build_message(&self, email: TicketEmail) -> Result<Message, NotificationError> {
        let to = mailbox(&email.to_name, &email.to)
            .map_err(|e| NotificationError::InvalidAddress(format!("{}: {e}", email.to)))?;

        let mut body = MultiPart::mixed().singlepart(SinglePart::html(email.html_body));
        for attachment in email.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|e| NotificationError::Build(format!("content type: {e}")))?;
            body = body.singlepart(
                Attachment::new(attachment.filename).body(attachment.content, content_type),
            );
        }

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .multipart(body)
            .map_err(|e| NotificationError::Build(e.to_string()))
    }
}

/// Display names are buyer input and may contain commas or angle brackets,
/// so they are never spliced into an address string.
fn mailbox(name: &str, email: &str) -> Result<Mailbox, lettre::address::AddressError> {
    let address = email.trim().parse::<Address>()?;
    let name = name.trim();
    let name = (!name.is_empty()).then(|| name.to_string());
    Ok(Mailbox::new(name, address))
}

#[async_trait]
impl NotificationSink for SmtpNotificationSink {
    #[instrument(skip(self, email), fields(order_no = %email.order_no))]
    async fn send(&self, email: TicketEmail) -> Result<(), NotificationError> {
        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        debug!("ticket email accepted by relay");
        Ok(())
    }
}
