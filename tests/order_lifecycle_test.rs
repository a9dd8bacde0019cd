//! End-to-end order lifecycle against the service layer:
//! creation -> gateway callback -> provisioning -> email delivery.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::ConnectionTrait;
use zooticket_api::{
    auth::AuthMember,
    common::OrderNumbers,
    errors::ServiceError,
    models::TransactionStatus,
    services::{
        delivery::DeliveryOutcome,
        orders::{BuyerDetails, CreateOrderRequest, OrderNumberSource, TicketSelection},
        payment_gateway::GatewayCallback,
    },
};

const DATE: &str = "2025-05-21";

fn buyer() -> BuyerDetails {
    BuyerDetails {
        id_no: Some("900101-01-1234".into()),
        name: Some("Aminah Binti Ali".into()),
        email: Some("aminah@example.com".into()),
        contact_no: Some("0123456789".into()),
    }
}

fn tickets(items: &[(&str, u32)]) -> Vec<TicketSelection> {
    items
        .iter()
        .map(|(id, qty)| TicketSelection {
            ticket_id: id.to_string(),
            qty: *qty,
        })
        .collect()
}

fn fpx_request(group_id: i32, items: &[(&str, u32)]) -> CreateOrderRequest {
    CreateOrderRequest {
        ticket_group_id: group_id,
        date: DATE.into(),
        lang_chosen: Some("en".into()),
        payment_type: Some("fpx".into()),
        mode: Some("individual".into()),
        bank_code: Some("MB2U0227".into()),
        tickets: tickets(items),
        buyer: Some(buyer()),
    }
}

fn card_request(group_id: i32, items: &[(&str, u32)]) -> CreateOrderRequest {
    CreateOrderRequest {
        payment_type: Some("credit/debit".into()),
        mode: None,
        bank_code: None,
        ..fpx_request(group_id, items)
    }
}

fn callback(order_no: &str, status: &str, txn: &str, date: &str) -> GatewayCallback {
    GatewayCallback {
        id_transaksi: txn.into(),
        order_no: order_no.into(),
        status_transaksi: status.into(),
        status_message: format!("status {}", status),
        tarikh_transaksi: date.into(),
        ..Default::default()
    }
}

/// External-issuance group with a 5.00 adult ticket.
async fn external_catalog(app: &TestApp) -> i32 {
    let group = app.seed_group("Zoo Johor", false).await;
    app.seed_variant(group.id, "TIC-O-0020", dec!(5.00), 1).await;
    app.seed_variant(group.id, "TIC-O-0021", dec!(3.50), 2).await;
    group.id
}

async fn paid_order(app: &TestApp, group_id: i32) -> String {
    let checkout = app
        .services()
        .orders
        .create_paid(None, fpx_request(group_id, &[("TIC-O-0020", 2)]))
        .await
        .expect("paid order");
    checkout.created.order.order_no
}

#[tokio::test]
async fn paid_fpx_order_is_stored_as_initiate_with_expanded_lines() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;

    let checkout = app
        .services()
        .orders
        .create_paid(None, fpx_request(group_id, &[("TIC-O-0020", 2)]))
        .await
        .unwrap();
    let order = &checkout.created.order;

    assert_eq!(order.transaction_status, "initiate");
    assert_eq!(order.total_amount, dec!(10.00));
    assert_eq!(order.msg_token, "01");
    assert_eq!(order.bank_code.as_deref(), Some("MB2U0227"));
    assert_eq!(order.bank_name.as_deref(), Some("Maybank2U"));
    assert!(order.transaction_id.is_empty());
    assert!(order.transaction_date.is_empty());
    assert!(!order.is_email_sent);

    let lines = app.lines(order.id).await;
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert_eq!(line.unit_price, dec!(5.00));
        assert_eq!(line.quantity_bought, 1);
        assert_eq!(line.admit_date, DATE);
        assert!(line.encrypted_id.is_empty());
    }

    let redirect = &checkout.redirect;
    assert_eq!(redirect.method, "POST");
    assert_eq!(redirect.fields.get("orderNo"), Some(&order.order_no));
    assert_eq!(redirect.fields.get("totalAmount").map(String::as_str), Some("10.00"));
    assert_eq!(app.gateway.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_ticket_ids_are_merged_in_first_seen_order() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;

    let checkout = app
        .services()
        .orders
        .create_paid(
            None,
            card_request(
                group_id,
                &[("TIC-O-0020", 1), ("TIC-O-0021", 1), ("TIC-O-0020", 2)],
            ),
        )
        .await
        .unwrap();

    let lines = app.lines(checkout.created.order.id).await;
    let ids: Vec<&str> = lines.iter().map(|l| l.item_id.as_str()).collect();
    assert_eq!(ids, ["TIC-O-0020", "TIC-O-0020", "TIC-O-0020", "TIC-O-0021"]);

    let sum: Decimal = lines.iter().map(|l| l.unit_price).sum();
    assert_eq!(sum, checkout.created.order.total_amount);
    assert_eq!(checkout.created.order.total_amount, dec!(18.50));
    assert_eq!(checkout.created.order.msg_token, "");
}

#[tokio::test]
async fn success_callback_then_sweep_delivers_exactly_once() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;

    let outcome = app
        .services()
        .orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN123", "2025-05-21 12:49:01"))
        .await
        .unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.status, TransactionStatus::Success);

    let order = app.order(&order_no).await;
    assert_eq!(order.transaction_status, "success");
    assert_eq!(order.transaction_id, "TXN123");
    assert_eq!(order.transaction_date, "2025-05-21 12:49:01");
    assert!(!order.is_email_sent);

    let report = app.services().delivery.run_once().await.unwrap();
    assert_eq!(report.delivered, 1);

    let order = app.order(&order_no).await;
    assert!(order.is_email_sent);
    let lines = app.lines(order.id).await;
    let encrypted: Vec<&str> = lines.iter().map(|l| l.encrypted_id.as_str()).collect();
    assert_eq!(encrypted, ["ENC-0001", "ENC-0002"]);
    assert_eq!(app.sink.count(), 1);
    {
        let sent = app.sink.sent.lock().unwrap();
        assert_eq!(sent[0].to, "aminah@example.com");
        assert_eq!(sent[0].order_no, order_no);
        assert_eq!(sent[0].attachments.len(), 2);
    }

    let issued_requests = app.issuer.requests.lock().unwrap().len();
    assert_eq!(issued_requests, 1);

    let second = app.services().delivery.run_once().await.unwrap();
    assert_eq!(second.selected, 0);
    assert_eq!(app.issuer.requests.lock().unwrap().len(), 1);
    assert_eq!(app.sink.count(), 1);
}

#[tokio::test]
async fn issuer_request_carries_order_reference_and_quantities() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;
    app.services()
        .orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN1", "2025-05-21 12:49:01"))
        .await
        .unwrap();

    app.services().delivery.run_once().await.unwrap();

    let requests = app.issuer.requests.lock().unwrap();
    assert_eq!(requests[0].reference_no, order_no);
    assert_eq!(requests[0].tran_date, "2025-05-21 12:49:01");
    assert_eq!(requests[0].items.len(), 1);
    assert_eq!(requests[0].items[0].item_id, "TIC-O-0020");
    assert_eq!(requests[0].items[0].qty, 2);
}

#[tokio::test]
async fn short_issuance_defers_email_and_retries_only_missing_tickets() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;
    app.services()
        .orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN1", "2025-05-21 12:49:01"))
        .await
        .unwrap();

    app.issuer.withhold.store(1, Ordering::SeqCst);
    let first = app.services().delivery.run_once().await.unwrap();
    assert_eq!(first.incomplete, 1);
    assert_eq!(app.sink.count(), 0);

    let order = app.order(&order_no).await;
    assert!(!order.is_email_sent);
    let provisioned = app
        .lines(order.id)
        .await
        .iter()
        .filter(|l| l.is_provisioned())
        .count();
    assert_eq!(provisioned, 1);

    let second = app.services().delivery.run_once().await.unwrap();
    assert_eq!(second.delivered, 1);
    assert_eq!(app.sink.count(), 1);

    let requests = app.issuer.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].items[0].qty, 1);
}

#[tokio::test]
async fn issuer_outage_leaves_order_for_next_sweep() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;
    app.services()
        .orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN1", "2025-05-21 12:49:01"))
        .await
        .unwrap();

    app.issuer.fail.store(true, Ordering::SeqCst);
    let report = app.services().delivery.run_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(!app.order(&order_no).await.is_email_sent);

    app.issuer.fail.store(false, Ordering::SeqCst);
    let report = app.services().delivery.run_once().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert!(app.order(&order_no).await.is_email_sent);
}

#[tokio::test]
async fn sink_failure_keeps_tickets_and_retries_email() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;
    app.services()
        .orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN1", "2025-05-21 12:49:01"))
        .await
        .unwrap();

    app.sink.fail.store(true, Ordering::SeqCst);
    let report = app.services().delivery.run_once().await.unwrap();
    assert_eq!(report.failed, 1);

    app.sink.fail.store(false, Ordering::SeqCst);
    app.services().delivery.run_once().await.unwrap();
    assert_eq!(app.sink.count(), 1);
    // Tickets issued on the first pass are reused.
    assert_eq!(app.issuer.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn issuer_price_is_ignored_unless_trusted() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;
    app.services()
        .orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN1", "2025-05-21 12:49:01"))
        .await
        .unwrap();

    *app.issuer.price.lock().unwrap() = Some("7.00".into());
    app.services().delivery.run_once().await.unwrap();

    let order = app.order(&order_no).await;
    let sum: Decimal = app.lines(order.id).await.iter().map(|l| l.unit_price).sum();
    assert_eq!(sum, order.total_amount);
}

#[tokio::test]
async fn internal_group_shares_one_token_across_lines() {
    let app = TestApp::new().await;
    let group = app.seed_group("Night Safari", true).await;
    app.seed_variant(group.id, "TIC-N-0001", dec!(12.00), 1).await;

    let order_no = app
        .services()
        .orders
        .create_paid(None, card_request(group.id, &[("TIC-N-0001", 3)]))
        .await
        .unwrap()
        .created
        .order
        .order_no;
    app.services()
        .orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN9", "2025-05-21 09:00:00"))
        .await
        .unwrap();

    app.services().delivery.run_once().await.unwrap();

    let order = app.order(&order_no).await;
    assert!(order.is_email_sent);
    let lines = app.lines(order.id).await;
    assert_eq!(lines.len(), 3);
    assert!(lines[0].encrypted_id.starts_with("INT-"));
    assert!(lines.iter().all(|l| l.encrypted_id == lines[0].encrypted_id));
    assert!(app.issuer.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn pending_then_success_then_late_failure_stays_success() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;
    let orders = &app.services().orders;

    let pending = orders
        .apply_gateway_callback(&callback(&order_no, "09", "TXN5", ""))
        .await
        .unwrap();
    assert_eq!(pending.status, TransactionStatus::Pending);
    assert_eq!(app.order(&order_no).await.transaction_status, "pending");

    let success = orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN5", "2025-05-21 13:00:00"))
        .await
        .unwrap();
    assert_eq!(success.previous, TransactionStatus::Pending);
    assert_eq!(success.status, TransactionStatus::Success);

    let late = orders
        .apply_gateway_callback(&callback(&order_no, "99", "TXN6", "2025-05-21 13:05:00"))
        .await
        .unwrap();
    assert!(!late.changed);
    assert_eq!(late.status, TransactionStatus::Success);

    let order = app.order(&order_no).await;
    assert_eq!(order.transaction_status, "success");
    assert_eq!(order.transaction_id, "TXN5");
    assert_eq!(order.transaction_date, "2025-05-21 13:00:00");
}

#[tokio::test]
async fn failed_order_ignores_later_success() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;
    let orders = &app.services().orders;

    orders
        .apply_gateway_callback(&callback(&order_no, "51", "TXN7", "2025-05-21 13:00:00"))
        .await
        .unwrap();
    let outcome = orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN8", "2025-05-21 13:01:00"))
        .await
        .unwrap();

    assert!(!outcome.changed);
    assert_eq!(app.order(&order_no).await.transaction_status, "failed");
    let report = app.services().delivery.run_once().await.unwrap();
    assert_eq!(report.selected, 0);
}

#[tokio::test]
async fn replayed_callback_leaves_the_same_row() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;
    let payload = callback(&order_no, "00", "TXN123", "2025-05-21 12:49:01");

    app.services()
        .orders
        .apply_gateway_callback(&payload)
        .await
        .unwrap();
    let once = app.order(&order_no).await;

    let replay = app
        .services()
        .orders
        .apply_gateway_callback(&payload)
        .await
        .unwrap();
    let twice = app.order(&order_no).await;

    assert!(!replay.changed);
    assert_eq!(once, twice);
}

#[tokio::test]
async fn success_callback_without_date_is_still_swept() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;

    app.services()
        .orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN2", ""))
        .await
        .unwrap();

    let order = app.order(&order_no).await;
    assert!(!order.transaction_date.is_empty());
    let report = app.services().delivery.run_once().await.unwrap();
    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn callback_for_unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let result = app
        .services()
        .orders
        .apply_gateway_callback(&callback("ORD-NOPE", "00", "T", "2025-05-21 12:00:00"))
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn free_order_requires_zero_total() {
    let app = TestApp::new().await;
    let group = app.seed_group("Open Day", true).await;
    app.seed_variant(group.id, "TIC-F-0001", dec!(0.00), 1).await;
    app.seed_variant(group.id, "TIC-F-0002", dec!(5.00), 2).await;

    let created = app
        .services()
        .orders
        .create_free(None, card_request(group.id, &[("TIC-F-0001", 2)]))
        .await
        .unwrap();
    assert_eq!(created.order.transaction_status, "success");
    assert_eq!(created.order.total_amount, Decimal::ZERO);
    assert!(!created.order.transaction_date.is_empty());
    assert!(!created.order.is_email_sent);
    assert_eq!(created.lines.len(), 2);
    assert_eq!(app.gateway.calls.load(Ordering::SeqCst), 0);

    let rejected = app
        .services()
        .orders
        .create_free(None, card_request(group.id, &[("TIC-F-0002", 1)]))
        .await;
    assert_matches!(rejected, Err(ServiceError::Validation(msg)) if msg.contains("must be zero"));
    assert_eq!(app.order_count().await, 1);

    // Delivered by the sweeper like any paid order.
    let report = app.services().delivery.run_once().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(app.sink.count(), 1);
}

#[tokio::test]
async fn paid_path_rejects_zero_total() {
    let app = TestApp::new().await;
    let group = app.seed_group("Open Day", true).await;
    app.seed_variant(group.id, "TIC-F-0001", dec!(0.00), 1).await;

    let result = app
        .services()
        .orders
        .create_paid(None, card_request(group.id, &[("TIC-F-0001", 1)]))
        .await;
    assert_matches!(result, Err(ServiceError::Validation(_)));
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn creation_boundaries_persist_nothing() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let orders = &app.services().orders;

    let unknown_ticket = orders
        .create_paid(None, card_request(group_id, &[("TIC-X-9999", 1)]))
        .await;
    assert_matches!(unknown_ticket, Err(ServiceError::Validation(_)));

    let mut no_mode = fpx_request(group_id, &[("TIC-O-0020", 1)]);
    no_mode.mode = None;
    assert_matches!(
        orders.create_paid(None, no_mode).await,
        Err(ServiceError::Validation(_))
    );

    let mut no_bank = fpx_request(group_id, &[("TIC-O-0020", 1)]);
    no_bank.bank_code = Some("  ".into());
    assert_matches!(
        orders.create_paid(None, no_bank).await,
        Err(ServiceError::Validation(_))
    );

    let mut partial_buyer = card_request(group_id, &[("TIC-O-0020", 1)]);
    partial_buyer.buyer = Some(BuyerDetails {
        contact_no: None,
        ..buyer()
    });
    assert_matches!(
        orders.create_paid(None, partial_buyer).await,
        Err(ServiceError::Validation(_))
    );

    let mut bad_date = card_request(group_id, &[("TIC-O-0020", 1)]);
    bad_date.date = "21/05/2025".into();
    assert_matches!(
        orders.create_paid(None, bad_date).await,
        Err(ServiceError::Validation(_))
    );

    let mut zero_qty = card_request(group_id, &[("TIC-O-0020", 0)]);
    zero_qty.lang_chosen = Some("bm".into());
    assert_matches!(
        orders.create_paid(None, zero_qty).await,
        Err(ServiceError::Validation(_))
    );

    let mut guest_without_buyer = card_request(group_id, &[("TIC-O-0020", 1)]);
    guest_without_buyer.buyer = None;
    assert_matches!(
        orders.create_paid(None, guest_without_buyer).await,
        Err(ServiceError::Validation(_))
    );

    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn disabled_or_unknown_bank_is_rejected() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;

    let mut disabled = fpx_request(group_id, &[("TIC-O-0020", 1)]);
    disabled.bank_code = Some("BCBB0235".into());
    assert_matches!(
        app.services().orders.create_paid(None, disabled).await,
        Err(ServiceError::DisabledBank(_))
    );

    let mut unknown = fpx_request(group_id, &[("TIC-O-0020", 1)]);
    unknown.bank_code = Some("XYZ".into());
    assert_matches!(
        app.services().orders.create_paid(None, unknown).await,
        Err(ServiceError::UnknownBank(_))
    );

    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn catalog_miss_and_inactive_group_are_rejected() {
    let app = TestApp::new().await;
    assert_matches!(
        app.services()
            .orders
            .create_paid(None, card_request(404, &[("TIC-O-0020", 1)]))
            .await,
        Err(ServiceError::CatalogMiss(_))
    );

    let group = app.seed_group("Closed Exhibit", false).await;
    app.seed_variant(group.id, "TIC-C-0001", dec!(5.00), 1).await;
    let mut inactive: zooticket_api::entities::ticket_group::ActiveModel = group.clone().into();
    inactive.is_active = sea_orm::Set(false);
    sea_orm::ActiveModelTrait::update(inactive, &*app.db)
        .await
        .unwrap();

    assert_matches!(
        app.services()
            .orders
            .create_paid(None, card_request(group.id, &[("TIC-C-0001", 1)]))
            .await,
        Err(ServiceError::Inactive(_))
    );
}

#[tokio::test]
async fn member_orders_are_linked_and_private() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let member = AuthMember {
        cust_id: 42,
        name: Some("Member Tan".into()),
        email: Some("tan@example.com".into()),
    };

    let mut request = card_request(group_id, &[("TIC-O-0020", 1)]);
    request.buyer = None;
    let created = app
        .services()
        .orders
        .create_paid(Some(&member), request)
        .await
        .unwrap()
        .created;
    assert_eq!(created.order.cust_id, Some(42));
    assert_eq!(created.order.buyer_email, "tan@example.com");
    assert_eq!(created.order.buyer_name, "Member Tan");

    let view = app
        .services()
        .orders
        .get_member_order(created.order.id, 42)
        .await
        .unwrap();
    assert_eq!(view.order_no, created.order.order_no);

    assert_matches!(
        app.services()
            .orders
            .get_member_order(created.order.id, 7)
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn guest_inquiry_matches_email_case_insensitively() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;
    let orders = &app.services().orders;

    let view = orders
        .inquire_by_order_no_email(&order_no, "AMINAH@example.com")
        .await
        .unwrap();
    assert_eq!(view.transaction_status, TransactionStatus::Initiate);
    assert_eq!(view.total_amount, "10.00");
    assert!(view.lines.iter().all(|l| l.encrypted_id.is_none()));

    assert_matches!(
        orders
            .inquire_by_order_no_email(&order_no, "someone@example.com")
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn redeliver_resends_only_when_asked() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let order_no = paid_order(&app, group_id).await;
    let delivery = &app.services().delivery;

    assert_matches!(
        delivery.redeliver(&order_no, false).await,
        Err(ServiceError::Validation(_))
    );

    app.services()
        .orders
        .apply_gateway_callback(&callback(&order_no, "00", "TXN1", "2025-05-21 12:49:01"))
        .await
        .unwrap();

    assert_eq!(
        delivery.redeliver(&order_no, false).await.unwrap(),
        DeliveryOutcome::Delivered
    );
    assert_eq!(
        delivery.redeliver(&order_no, false).await.unwrap(),
        DeliveryOutcome::AlreadySent
    );
    assert_eq!(
        delivery.redeliver(&order_no, true).await.unwrap(),
        DeliveryOutcome::Delivered
    );
    assert_eq!(app.sink.count(), 2);
    assert_eq!(app.issuer.requests.lock().unwrap().len(), 1);
}

fn numbers(seq: u32) -> OrderNumbers {
    OrderNumbers {
        order_no: format!("ORD-20250521124901-{:04}", seq),
        bill_id: format!("BILL-20250521124901-{:04}", seq),
    }
}

/// Hands out `seqs` in order, then keeps repeating the last one.
fn scripted_numbers(seqs: &[u32]) -> OrderNumberSource {
    let seqs = seqs.to_vec();
    let calls = AtomicUsize::new(0);
    Arc::new(move |_: chrono::DateTime<chrono_tz::Tz>| {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        numbers(seqs[call.min(seqs.len() - 1)])
    })
}

#[tokio::test]
async fn order_number_collision_is_regenerated_once() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let engine = app.order_engine(scripted_numbers(&[1, 1, 2]));

    let first = engine
        .create_paid(None, card_request(group_id, &[("TIC-O-0020", 1)]))
        .await
        .unwrap();
    assert_eq!(first.created.order.order_no, "ORD-20250521124901-0001");

    // Second order draws 0001 again, collides, then gets 0002.
    let second = engine
        .create_paid(None, card_request(group_id, &[("TIC-O-0020", 2)]))
        .await
        .unwrap();
    assert_eq!(second.created.order.order_no, "ORD-20250521124901-0002");
    assert_eq!(second.created.order.bill_id, "BILL-20250521124901-0002");
    assert_eq!(second.created.lines.len(), 2);
    assert_eq!(app.order_count().await, 2);
}

#[tokio::test]
async fn repeated_order_number_collision_is_a_conflict() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    let engine = app.order_engine(scripted_numbers(&[1]));

    engine
        .create_paid(None, card_request(group_id, &[("TIC-O-0020", 1)]))
        .await
        .unwrap();

    let err = engine
        .create_paid(None, card_request(group_id, &[("TIC-O-0020", 1)]))
        .await
        .unwrap_err();
    assert_matches!(&err, ServiceError::DuplicateCreation(no) if no == "ORD-20250521124901-0001");
    assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);

    assert_eq!(app.order_count().await, 1);
    let kept = app.order("ORD-20250521124901-0001").await;
    assert_eq!(app.lines(kept.id).await.len(), 1);
}

#[tokio::test]
async fn failed_line_insert_rolls_back_the_order() {
    let app = TestApp::new().await;
    let group_id = external_catalog(&app).await;
    app.db
        .execute_unprepared(
            "CREATE TRIGGER refuse_order_lines BEFORE INSERT ON order_ticket_info \
             BEGIN SELECT RAISE(ABORT, 'line storage unavailable'); END;",
        )
        .await
        .unwrap();

    let err = app
        .services()
        .orders
        .create_paid(None, card_request(group_id, &[("TIC-O-0020", 2)]))
        .await
        .unwrap_err();

    assert_matches!(&err, ServiceError::PartialPersist(_));
    assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn chinese_line_description_is_stored_with_the_order() {
    let app = TestApp::new().await;
    let group = app.seed_group("Panda Centre", true).await;
    app.seed_variant(group.id, "TIC-P-0001", dec!(8.00), 1).await;

    let created = app
        .services()
        .orders
        .create_paid(None, card_request(group.id, &[("TIC-P-0001", 1)]))
        .await
        .unwrap()
        .created;

    assert_eq!(created.lines[0].item_desc3, "TIC-P-0001 CN");
}
