use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ticket_variant")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub ticket_group_id: i32,
    /// Variant key shared with the issuance backend (`ItemId`)
    pub ticket_id: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub unit_price: Decimal,
    pub item_desc1: String,
    pub item_desc2: String,
    pub item_desc3: String,
    pub print_type: String,
    pub is_active: bool,
    pub available_from: Option<NaiveDate>,
    pub available_to: Option<NaiveDate>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ticket_group::Entity",
        from = "Column::TicketGroupId",
        to = "super::ticket_group::Column::Id"
    )]
    TicketGroup,
}

impl Related<super::ticket_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TicketGroup.def()
    }
}

impl Model {
    pub fn is_available_on(&self, date: NaiveDate) -> bool {
        self.is_active
            && self.available_from.map_or(true, |from| date >= from)
            && self.available_to.map_or(true, |to| date <= to)
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
