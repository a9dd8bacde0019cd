use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};

use crate::models::Trilingual;

/// Catalog entry for an attraction. Owned by the catalog subsystem; the
/// order core only reads it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ticket_group")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub group_name_bm: String,
    pub group_name_en: String,
    pub group_name_cn: String,
    pub is_active: bool,
    pub is_ticket_internal: bool,
    pub active_start: Option<NaiveDate>,
    pub active_end: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ticket_variant::Entity")]
    TicketVariant,
}

impl Related<super::ticket_variant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TicketVariant.def()
    }
}

impl Model {
    pub fn group_name(&self) -> Trilingual {
        Trilingual::new(
            self.group_name_bm.clone(),
            self.group_name_en.clone(),
            self.group_name_cn.clone(),
        )
    }

    /// Active flag plus the optional selling window.
    pub fn is_sellable_on(&self, date: NaiveDate) -> bool {
        self.is_active
            && self.active_start.map_or(true, |start| date >= start)
            && self.active_end.map_or(true, |end| date <= end)
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
