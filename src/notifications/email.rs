use qrcode::render::svg;
use qrcode::QrCode;

use super::{EmailAttachment, NotificationError, TicketEmail};
use crate::common::money;
use crate::entities::{order_ticket_group, order_ticket_info};
use crate::models::Language;

/// Renders an `encrypted_id` as a standalone SVG QR code.
pub fn render_qr_svg(payload: &str) -> Result<String, NotificationError> {
    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| NotificationError::Build(format!("qr code: {e}")))?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(240, 240)
        .quiet_zone(true)
        .build())
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

struct Labels {
    subject: &'static str,
    greeting: &'static str,
    intro: &'static str,
    order_no: &'static str,
    visit_date: &'static str,
    total: &'static str,
    ticket: &'static str,
    price: &'static str,
    footer: &'static str,
}

fn labels(lang: Language) -> Labels {
    match lang {
        Language::Bm => Labels {
            subject: "E-tiket anda",
            greeting: "Salam sejahtera",
            intro: "Terima kasih atas pembelian anda. Sila tunjukkan kod QR yang dilampirkan di pintu masuk.",
            order_no: "No. Pesanan",
            visit_date: "Tarikh Lawatan",
            total: "Jumlah",
            ticket: "Tiket",
            price: "Harga",
            footer: "Setiap kod QR sah untuk satu kemasukan sahaja.",
        },
        Language::En => Labels {
            subject: "Your e-tickets",
            greeting: "Dear",
            intro: "Thank you for your purchase. Please present the attached QR codes at the entrance.",
            order_no: "Order No.",
            visit_date: "Visit Date",
            total: "Total",
            ticket: "Ticket",
            price: "Price",
            footer: "Each QR code is valid for a single admission.",
        },
        Language::Cn => Labels {
            subject: "您的电子门票",
            greeting: "尊敬的",
            intro: "感谢您的购买。请在入口处出示附件中的二维码。",
            order_no: "订单号",
            visit_date: "参观日期",
            total: "总额",
            ticket: "门票",
            price: "价格",
            footer: "每个二维码仅限一人入场一次。",
        },
    }
}

/// Bm reads `item_desc1`, En `item_desc2`, Cn `item_desc3`. A blank
/// description falls back to English, then Malay.
fn line_description(line: &order_ticket_info::Model, lang: Language) -> &str {
    let preferred = match lang {
        Language::Bm => &line.item_desc1,
        Language::En => &line.item_desc2,
        Language::Cn => &line.item_desc3,
    };
    [preferred, &line.item_desc2, &line.item_desc1]
        .into_iter()
        .find(|desc| !desc.trim().is_empty())
        .map_or("", String::as_str)
}

/// Builds the buyer-facing ticket email in the order's chosen language.
#[derive(Debug, Clone, Default)]
pub struct TicketEmailComposer;

impl TicketEmailComposer {
    pub fn new() -> Self {
        Self
    }

    /// All lines must be provisioned; each one becomes a QR attachment.
    pub fn compose(
        &self,
        order: &order_ticket_group::Model,
        lines: &[order_ticket_info::Model],
    ) -> Result<TicketEmail, NotificationError> {
        if order.buyer_email.trim().is_empty() {
            return Err(NotificationError::InvalidAddress(format!(
                "order {} has no buyer email",
                order.order_no
            )));
        }
        if let Some(open) = lines.iter().find(|l| !l.is_provisioned()) {
            return Err(NotificationError::Build(format!(
                "line {} of order {} is not provisioned",
                open.id, order.order_no
            )));
        }

        let lang = order.language();
        let text = labels(lang);

        let mut attachments = Vec::with_capacity(lines.len());
        let mut rows = String::new();
        for (index, line) in lines.iter().enumerate() {
            let svg = render_qr_svg(&line.encrypted_id)?;
            attachments.push(EmailAttachment {
                filename: format!("ticket-{}-{}.svg", index + 1, line.item_id),
                content_type: "image/svg+xml".to_string(),
                content: svg.into_bytes(),
            });
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td style=\"text-align:right\">RM {:.2}</td></tr>",
                index + 1,
                escape_html(line_description(line, lang)),
                money(line.unit_price)
            ));
        }

        let visit_date = lines
            .first()
            .map(|l| l.admit_date.as_str())
            .unwrap_or_default();
        let product = escape_html(&order.product_desc);

        let html_body = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{subject}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #2f7d32;">{product}</h2>
    <p>{greeting} {buyer},</p>
    <p>{intro}</p>
    <p><strong>{order_no_label}:</strong> {order_no}<br>
       <strong>{visit_label}:</strong> {visit_date}<br>
       <strong>{total_label}:</strong> RM {total:.2}</p>
    <table style="width: 100%; border-collapse: collapse;">
      <tr><th>#</th><th style="text-align:left">{ticket_label}</th><th style="text-align:right">{price_label}</th></tr>
      {rows}
    </table>
    <p style="color: #666; font-size: 12px; margin-top: 30px;">{footer}</p>
  </div>
</body>
</html>"#,
            subject = text.subject,
            product = product,
            greeting = text.greeting,
            buyer = escape_html(&order.buyer_name),
            intro = text.intro,
            order_no_label = text.order_no,
            order_no = escape_html(&order.order_no),
            visit_label = text.visit_date,
            visit_date = escape_html(visit_date),
            total_label = text.total,
            total = money(order.total_amount),
            ticket_label = text.ticket,
            price_label = text.price,
            rows = rows,
            footer = text.footer,
        );

        Ok(TicketEmail {
            order_no: order.order_no.clone(),
            to: order.buyer_email.trim().to_string(),
            to_name: order.buyer_name.clone(),
            subject: format!("{} - {} ({})", text.subject, order.product_desc, order.order_no),
            html_body,
            attachments,
        })
    }
}
