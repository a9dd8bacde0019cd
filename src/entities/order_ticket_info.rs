use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// One admission. `quantity_bought` is always 1.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_ticket_info")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub order_ticket_group_id: i32,
    pub item_id: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub unit_price: Decimal,
    pub item_desc1: String,
    pub item_desc2: String,
    /// Chinese description; may be empty
    pub item_desc3: String,
    pub print_type: String,
    pub quantity_bought: i32,
    /// QR payload; empty until provisioned
    pub encrypted_id: String,
    pub twbid: Option<String>,
    pub admit_date: String,
    pub variant: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order_ticket_group::Entity",
        from = "Column::OrderTicketGroupId",
        to = "super::order_ticket_group::Column::Id",
        on_delete = "Cascade"
    )]
    OrderTicketGroup,
}

impl Related<super::order_ticket_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderTicketGroup.def()
    }
}

impl Model {
    pub fn is_provisioned(&self) -> bool {
        !self.encrypted_id.is_empty()
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
