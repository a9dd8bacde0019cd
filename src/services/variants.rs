use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{instrument, warn};
use utoipa::ToSchema;

use crate::common::money;
use crate::db::DbPool;
use crate::entities::{ticket_group, ticket_variant};
use crate::errors::ServiceError;
use crate::models::Trilingual;

/// A sellable ticket type for one group on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub ticket_id: String,
    #[schema(value_type = String, example = "5.00")]
    pub unit_price: Decimal,
    pub item_desc1: String,
    pub item_desc2: String,
    pub item_desc3: String,
    pub print_type: String,
}

/// Group facts the order engine needs alongside the variant list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    pub ticket_group_id: i32,
    pub name: Trilingual,
    pub is_ticket_internal: bool,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub group: ResolvedGroup,
    /// Unique by `ticket_id`, catalog order
    pub variants: Vec<Variant>,
}

impl Resolution {
    pub fn find(&self, ticket_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.ticket_id == ticket_id)
    }
}

/// Sole authority for creation-time pricing.
#[async_trait]
pub trait VariantResolver: Send + Sync {
    async fn resolve(
        &self,
        ticket_group_id: i32,
        date: NaiveDate,
    ) -> Result<Resolution, ServiceError>;
}

/// Resolves variants from the `ticket_group` / `ticket_variant` catalog tables.
#[derive(Clone)]
pub struct CatalogVariantResolver {
    db: Arc<DbPool>,
}

impl CatalogVariantResolver {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VariantResolver for CatalogVariantResolver {
    #[instrument(skip(self))]
    async fn resolve(
        &self,
        ticket_group_id: i32,
        date: NaiveDate,
    ) -> Result<Resolution, ServiceError> {
        let db = &*self.db;

        let group = ticket_group::Entity::find_by_id(ticket_group_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::CatalogMiss(ticket_group_id.to_string()))?;

        if !group.is_sellable_on(date) {
            return Err(ServiceError::Inactive(format!(
                "ticket group {} is not available on {}",
                ticket_group_id, date
            )));
        }

        let rows = ticket_variant::Entity::find()
            .filter(ticket_variant::Column::TicketGroupId.eq(ticket_group_id))
            .order_by_asc(ticket_variant::Column::SortOrder)
            .order_by_asc(ticket_variant::Column::Id)
            .all(db)
            .await?;

        let mut seen = HashSet::new();
        let mut variants = Vec::with_capacity(rows.len());
        for row in rows.into_iter().filter(|r| r.is_available_on(date)) {
            if row.unit_price.is_sign_negative() {
                warn!(ticket_id = %row.ticket_id, "skipping variant with negative price");
                continue;
            }
            if !seen.insert(row.ticket_id.clone()) {
                continue;
            }
            variants.push(Variant {
                ticket_id: row.ticket_id,
                unit_price: money(row.unit_price),
                item_desc1: row.item_desc1,
                item_desc2: row.item_desc2,
                item_desc3: row.item_desc3,
                print_type: row.print_type,
            });
        }

        Ok(Resolution {
            group: ResolvedGroup {
                ticket_group_id: group.id,
                name: group.group_name(),
                is_ticket_internal: group.is_ticket_internal,
            },
            variants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};

    async fn setup() -> Arc<DbPool> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1);
        let db = Database::connect(opt).await.unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        Arc::new(db)
    }

    async fn seed_group(db: &DbPool, active: bool) -> i32 {
        ticket_group::ActiveModel {
            group_name_bm: Set("Zoo Johor".into()),
            group_name_en: Set("Johor Zoo".into()),
            group_name_cn: Set("柔佛动物园".into()),
            is_active: Set(active),
            is_ticket_internal: Set(false),
            active_start: Set(None),
            active_end: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    async fn seed_variant(
        db: &DbPool,
        group_id: i32,
        ticket_id: &str,
        price: Decimal,
        sort_order: i32,
        available_to: Option<NaiveDate>,
    ) {
        ticket_variant::ActiveModel {
            ticket_group_id: Set(group_id),
            ticket_id: Set(ticket_id.into()),
            unit_price: Set(price),
            item_desc1: Set("Dewasa".into()),
            item_desc2: Set("Adult".into()),
            item_desc3: Set("成人".into()),
            print_type: Set("QR".into()),
            is_active: Set(true),
            available_from: Set(None),
            available_to: Set(available_to),
            sort_order: Set(sort_order),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    #[tokio::test]
    async fn resolves_in_catalog_order_and_filters_by_date() {
        let db = setup().await;
        let group_id = seed_group(&db, true).await;
        seed_variant(&db, group_id, "TIC-C-0002", dec!(3), 2, None).await;
        seed_variant(&db, group_id, "TIC-O-0020", dec!(5), 1, None).await;
        seed_variant(&db, group_id, "TIC-X-0001", dec!(1), 3, Some(day(20))).await;

        let resolver = CatalogVariantResolver::new(db);
        let resolution = resolver.resolve(group_id, day(21)).await.unwrap();

        let ids: Vec<_> = resolution.variants.iter().map(|v| v.ticket_id.as_str()).collect();
        assert_eq!(ids, vec!["TIC-O-0020", "TIC-C-0002"]);
        assert_eq!(resolution.find("TIC-O-0020").unwrap().unit_price.to_string(), "5.00");
        assert!(resolution.find("TIC-X-0001").is_none());
        assert!(!resolution.group.is_ticket_internal);
    }

    #[tokio::test]
    async fn missing_group_is_a_catalog_miss() {
        let db = setup().await;
        let resolver = CatalogVariantResolver::new(db);
        assert!(matches!(
            resolver.resolve(999, day(21)).await,
            Err(ServiceError::CatalogMiss(_))
        ));
    }

    #[tokio::test]
    async fn inactive_group_is_rejected() {
        let db = setup().await;
        let group_id = seed_group(&db, false).await;
        let resolver = CatalogVariantResolver::new(db);
        assert!(matches!(
            resolver.resolve(group_id, day(21)).await,
            Err(ServiceError::Inactive(_))
        ));
    }
}
