use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::models::{Language, TransactionStatus};

/// Order aggregate root. Lines live in `order_ticket_info`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_ticket_group")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub order_no: String,
    #[sea_orm(unique)]
    pub bill_id: String,
    pub ticket_group_id: i32,
    pub cust_id: Option<i32>,
    pub transaction_id: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_amount: Decimal,
    pub product_id: String,
    pub product_desc: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_id_no: String,
    pub buyer_contact_no: String,
    pub transaction_status: String,
    pub bank_current_status: String,
    pub status_message: Option<String>,
    pub bank_code: Option<String>,
    pub bank_name: Option<String>,
    pub msg_token: String,
    pub is_email_sent: bool,
    pub lang_chosen: String,
    /// Malaysia-local `yyyy-mm-dd hh:mm:ss`, empty until paid
    pub transaction_date: String,
    /// Failed or incomplete sweep attempts so far
    pub delivery_attempts: i32,
    /// Sweeps skip the order until this instant
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_ticket_info::Entity")]
    OrderTicketInfo,
}

impl Related<super::order_ticket_info::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderTicketInfo.def()
    }
}

impl Model {
    pub fn status(&self) -> Result<TransactionStatus, ServiceError> {
        self.transaction_status.parse()
    }

    /// Unknown stored values fall back to English.
    pub fn language(&self) -> Language {
        self.lang_chosen.parse().unwrap_or_default()
    }

    pub fn is_emailable(&self) -> bool {
        self.transaction_status == TransactionStatus::Success.as_str()
            && !self.transaction_date.is_empty()
            && !self.is_email_sent
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert && matches!(active_model.created_at, ActiveValue::NotSet) {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}
