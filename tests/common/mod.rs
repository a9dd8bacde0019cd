#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, Set};
use serde_json::Value;
use tower::ServiceExt;
use zooticket_api::{
    auth::MemberClaims,
    config::{self, AppConfig},
    db::{self, DbPool},
    entities::{order_ticket_group, order_ticket_info, ticket_group, ticket_variant},
    errors::ServiceError,
    handlers::{AppServices, Collaborators},
    models::PaymentMode,
    notifications::{NotificationError, NotificationSink, TicketEmail},
    services::{
        orders::{OrderEngine, OrderNumberSource},
        payment_gateway::PaymentGateway,
        provisioner::{IssueRequest, IssueResponse, IssuedTicket, TicketIssuer},
        variants::CatalogVariantResolver,
    },
    AppState,
};

/// Bank list double: code -> (name, enabled).
#[derive(Default)]
pub struct FakeGateway {
    banks: Mutex<HashMap<String, (String, bool)>>,
    pub calls: AtomicUsize,
}

impl FakeGateway {
    pub fn with_bank(self, code: &str, name: &str, enabled: bool) -> Self {
        self.banks
            .lock()
            .unwrap()
            .insert(code.to_string(), (name.to_string(), enabled));
        self
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn bank_name(&self, bank_code: &str, _mode: PaymentMode) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.banks.lock().unwrap().get(bank_code) {
            Some((name, true)) => Ok(name.clone()),
            Some((_, false)) => Err(ServiceError::DisabledBank(bank_code.to_string())),
            None => Err(ServiceError::UnknownBank(bank_code.to_string())),
        }
    }
}

/// Issuance double returning one ticket per requested unit.
#[derive(Default)]
pub struct FakeIssuer {
    pub requests: Mutex<Vec<IssueRequest>>,
    /// Tickets left out of the next response
    pub withhold: AtomicUsize,
    pub fail: AtomicBool,
    pub price: Mutex<Option<String>>,
    seq: AtomicUsize,
}

#[async_trait]
impl TicketIssuer for FakeIssuer {
    async fn issue(&self, request: &IssueRequest) -> Result<IssueResponse, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Upstream("issuer unavailable".into()));
        }

        let price = self.price.lock().unwrap().clone();
        let mut tickets = Vec::new();
        for item in &request.items {
            for _ in 0..item.qty {
                let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
                tickets.push(IssuedTicket {
                    twbid: Value::from(1000 + n as u64),
                    item_id: item.item_id.clone(),
                    encrypted_id: format!("ENC-{:04}", n),
                    unit_price: price.clone().map(Value::from).unwrap_or(Value::Null),
                    ..Default::default()
                });
            }
        }
        let withhold = self.withhold.swap(0, Ordering::SeqCst).min(tickets.len());
        tickets.truncate(tickets.len() - withhold);

        Ok(IssueResponse {
            status_code: "OK".into(),
            receipt_number: Some(request.reference_no.clone()),
            tickets,
        })
    }
}

/// Mail sink that records what would have been sent.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<TicketEmail>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, email: TicketEmail) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("relay refused".into()));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Application wired to an in-memory SQLite database and fake collaborators.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub gateway: Arc<FakeGateway>,
    pub issuer: Arc<FakeIssuer>,
    pub sink: Arc<RecordingSink>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut config = config::load_config_with(|_| None).expect("test configuration");
        // Failed deliveries are retried on the very next sweep.
        config.delivery.retry_backoff_secs = 0;

        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let pool = Database::connect(opt).await.expect("sqlite in memory");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let gateway = Arc::new(
            FakeGateway::default()
                .with_bank("MB2U0227", "Maybank2U", true)
                .with_bank("BCBB0235", "CIMB Clicks", false),
        );
        let issuer = Arc::new(FakeIssuer::default());
        let sink = Arc::new(RecordingSink::default());

        let services = AppServices::new(
            db.clone(),
            &config,
            Collaborators {
                gateway: gateway.clone(),
                issuer: issuer.clone(),
                sink: sink.clone(),
            },
        );
        let state = AppState::new(db.clone(), config.clone(), services);
        let router = zooticket_api::app_router(state.clone());

        Self {
            router,
            state,
            db,
            config,
            gateway,
            issuer,
            sink,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Order engine over the same database and gateway, minting numbers
    /// from `numbers` instead of the clock.
    pub fn order_engine(&self, numbers: OrderNumberSource) -> OrderEngine {
        OrderEngine::new(
            self.db.clone(),
            Arc::new(CatalogVariantResolver::new(self.db.clone())),
            self.gateway.clone(),
            self.config.clock(),
            self.config.payment.clone(),
        )
        .with_order_numbers(numbers)
    }

    pub async fn seed_group(&self, name: &str, internal: bool) -> ticket_group::Model {
        ticket_group::ActiveModel {
            group_name_bm: Set(format!("{} (BM)", name)),
            group_name_en: Set(name.to_string()),
            group_name_cn: Set(format!("{} (CN)", name)),
            is_active: Set(true),
            is_ticket_internal: Set(internal),
            active_start: Set(None),
            active_end: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed ticket group")
    }

    pub async fn seed_variant(
        &self,
        group_id: i32,
        ticket_id: &str,
        price: Decimal,
        sort_order: i32,
    ) -> ticket_variant::Model {
        ticket_variant::ActiveModel {
            ticket_group_id: Set(group_id),
            ticket_id: Set(ticket_id.to_string()),
            unit_price: Set(price),
            item_desc1: Set(format!("{} BM", ticket_id)),
            item_desc2: Set(format!("{} EN", ticket_id)),
            item_desc3: Set(format!("{} CN", ticket_id)),
            print_type: Set("QR".to_string()),
            is_active: Set(true),
            available_from: Set(None),
            available_to: Set(None),
            sort_order: Set(sort_order),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed ticket variant")
    }

    pub async fn order(&self, order_no: &str) -> order_ticket_group::Model {
        self.services()
            .orders
            .find_by_order_no(order_no)
            .await
            .expect("order exists")
    }

    pub async fn lines(&self, order_id: i32) -> Vec<order_ticket_info::Model> {
        self.services()
            .orders
            .lines_of(order_id)
            .await
            .expect("order lines")
    }

    pub async fn order_count(&self) -> usize {
        order_ticket_group::Entity::find()
            .all(&*self.db)
            .await
            .expect("count orders")
            .len()
    }

    pub fn member_token(&self, cust_id: i32, email: Option<&str>) -> String {
        let claims = MemberClaims {
            sub: cust_id.to_string(),
            name: Some("Member Tan".to_string()),
            email: email.map(str::to_string),
            exp: (Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .expect("encode member token")
    }

    /// Send a JSON request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router response")
    }

    /// Send a form-encoded POST, as the payment gateway does.
    pub async fn post_form(&self, uri: &str, fields: &[(&str, &str)]) -> Response {
        let encoded = fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, form_escape(v)))
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(encoded))
            .expect("build form request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }
}

fn form_escape(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}
