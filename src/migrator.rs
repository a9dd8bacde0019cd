use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_catalog_tables::Migration),
            Box::new(m20250101_000002_create_order_tables::Migration),
            Box::new(m20250301_000003_add_delivery_tracking::Migration),
        ]
    }
}

mod m20250101_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TicketGroup::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TicketGroup::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(TicketGroup::GroupNameBm).string().not_null())
                        .col(ColumnDef::new(TicketGroup::GroupNameEn).string().not_null())
                        .col(ColumnDef::new(TicketGroup::GroupNameCn).string().not_null())
                        .col(
                            ColumnDef::new(TicketGroup::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(TicketGroup::IsTicketInternal)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(TicketGroup::ActiveStart).date().null())
                        .col(ColumnDef::new(TicketGroup::ActiveEnd).date().null())
                        .col(
                            ColumnDef::new(TicketGroup::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TicketGroup::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TicketVariant::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TicketVariant::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(TicketVariant::TicketGroupId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TicketVariant::TicketId).string().not_null())
                        .col(
                            ColumnDef::new(TicketVariant::UnitPrice)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(TicketVariant::ItemDesc1).string().not_null())
                        .col(ColumnDef::new(TicketVariant::ItemDesc2).string().not_null())
                        .col(ColumnDef::new(TicketVariant::ItemDesc3).string().not_null())
                        .col(ColumnDef::new(TicketVariant::PrintType).string().not_null())
                        .col(
                            ColumnDef::new(TicketVariant::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(TicketVariant::AvailableFrom).date().null())
                        .col(ColumnDef::new(TicketVariant::AvailableTo).date().null())
                        .col(
                            ColumnDef::new(TicketVariant::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(TicketVariant::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TicketVariant::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_ticket_variant_ticket_group_id")
                                .from(TicketVariant::Table, TicketVariant::TicketGroupId)
                                .to(TicketGroup::Table, TicketGroup::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ticket_variant_group_ticket")
                        .table(TicketVariant::Table)
                        .col(TicketVariant::TicketGroupId)
                        .col(TicketVariant::TicketId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TicketVariant::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(TicketGroup::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TicketGroup {
        Table,
        Id,
        GroupNameBm,
        GroupNameEn,
        GroupNameCn,
        IsActive,
        IsTicketInternal,
        ActiveStart,
        ActiveEnd,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TicketVariant {
        Table,
        Id,
        TicketGroupId,
        TicketId,
        UnitPrice,
        ItemDesc1,
        ItemDesc2,
        ItemDesc3,
        PrintType,
        IsActive,
        AvailableFrom,
        AvailableTo,
        SortOrder,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000002_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderTicketGroup::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderTicketGroup::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderTicketGroup::OrderNo).string().not_null())
                        .col(ColumnDef::new(OrderTicketGroup::BillId).string().not_null())
                        .col(
                            ColumnDef::new(OrderTicketGroup::TicketGroupId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderTicketGroup::CustId).integer().null())
                        .col(
                            ColumnDef::new(OrderTicketGroup::TransactionId)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(OrderTicketGroup::TotalAmount)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(OrderTicketGroup::ProductId).string().not_null())
                        .col(
                            ColumnDef::new(OrderTicketGroup::ProductDesc)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderTicketGroup::BuyerName).string().not_null())
                        .col(ColumnDef::new(OrderTicketGroup::BuyerEmail).string().not_null())
                        .col(ColumnDef::new(OrderTicketGroup::BuyerIdNo).string().not_null())
                        .col(
                            ColumnDef::new(OrderTicketGroup::BuyerContactNo)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderTicketGroup::TransactionStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderTicketGroup::BankCurrentStatus)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(OrderTicketGroup::StatusMessage).string().null())
                        .col(ColumnDef::new(OrderTicketGroup::BankCode).string().null())
                        .col(ColumnDef::new(OrderTicketGroup::BankName).string().null())
                        .col(
                            ColumnDef::new(OrderTicketGroup::MsgToken)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(OrderTicketGroup::IsEmailSent)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(OrderTicketGroup::LangChosen).string().not_null())
                        .col(
                            ColumnDef::new(OrderTicketGroup::TransactionDate)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(OrderTicketGroup::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderTicketGroup::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_ticket_group_order_no")
                        .table(OrderTicketGroup::Table)
                        .col(OrderTicketGroup::OrderNo)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_ticket_group_bill_id")
                        .table(OrderTicketGroup::Table)
                        .col(OrderTicketGroup::BillId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Sweep lookup
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_ticket_group_status_email")
                        .table(OrderTicketGroup::Table)
                        .col(OrderTicketGroup::TransactionStatus)
                        .col(OrderTicketGroup::IsEmailSent)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_ticket_group_cust_id")
                        .table(OrderTicketGroup::Table)
                        .col(OrderTicketGroup::CustId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderTicketInfo::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderTicketInfo::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(OrderTicketInfo::OrderTicketGroupId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderTicketInfo::ItemId).string().not_null())
                        .col(
                            ColumnDef::new(OrderTicketInfo::UnitPrice)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(OrderTicketInfo::ItemDesc1).string().not_null())
                        .col(ColumnDef::new(OrderTicketInfo::ItemDesc2).string().not_null())
                        .col(ColumnDef::new(OrderTicketInfo::PrintType).string().not_null())
                        .col(
                            ColumnDef::new(OrderTicketInfo::QuantityBought)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(OrderTicketInfo::EncryptedId)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(OrderTicketInfo::Twbid).string().null())
                        .col(ColumnDef::new(OrderTicketInfo::AdmitDate).string().not_null())
                        .col(
                            ColumnDef::new(OrderTicketInfo::Variant)
                                .string()
                                .not_null()
                                .default("default"),
                        )
                        .col(
                            ColumnDef::new(OrderTicketInfo::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderTicketInfo::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_ticket_info_group_id")
                                .from(OrderTicketInfo::Table, OrderTicketInfo::OrderTicketGroupId)
                                .to(OrderTicketGroup::Table, OrderTicketGroup::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_ticket_info_group_id")
                        .table(OrderTicketInfo::Table)
                        .col(OrderTicketInfo::OrderTicketGroupId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderTicketInfo::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderTicketGroup::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderTicketGroup {
        Table,
        Id,
        OrderNo,
        BillId,
        TicketGroupId,
        CustId,
        TransactionId,
        TotalAmount,
        ProductId,
        ProductDesc,
        BuyerName,
        BuyerEmail,
        BuyerIdNo,
        BuyerContactNo,
        TransactionStatus,
        BankCurrentStatus,
        StatusMessage,
        BankCode,
        BankName,
        MsgToken,
        IsEmailSent,
        LangChosen,
        TransactionDate,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderTicketInfo {
        Table,
        Id,
        OrderTicketGroupId,
        ItemId,
        UnitPrice,
        ItemDesc1,
        ItemDesc2,
        PrintType,
        QuantityBought,
        EncryptedId,
        Twbid,
        AdmitDate,
        Variant,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250301_000003_add_delivery_tracking {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_add_delivery_tracking"
        }
    }

    // SQLite accepts a single change per ALTER TABLE.
    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .alter_table(
                    Table::alter()
                        .table(OrderTicketGroup::Table)
                        .add_column(
                            ColumnDef::new(OrderTicketGroup::DeliveryAttempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .alter_table(
                    Table::alter()
                        .table(OrderTicketGroup::Table)
                        .add_column(
                            ColumnDef::new(OrderTicketGroup::NextAttemptAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .alter_table(
                    Table::alter()
                        .table(OrderTicketInfo::Table)
                        .add_column(
                            ColumnDef::new(OrderTicketInfo::ItemDesc3)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .alter_table(
                    Table::alter()
                        .table(OrderTicketInfo::Table)
                        .drop_column(OrderTicketInfo::ItemDesc3)
                        .to_owned(),
                )
                .await?;
            manager
                .alter_table(
                    Table::alter()
                        .table(OrderTicketGroup::Table)
                        .drop_column(OrderTicketGroup::NextAttemptAt)
                        .to_owned(),
                )
                .await?;
            manager
                .alter_table(
                    Table::alter()
                        .table(OrderTicketGroup::Table)
                        .drop_column(OrderTicketGroup::DeliveryAttempts)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderTicketGroup {
        Table,
        DeliveryAttempts,
        NextAttemptAt,
    }

    #[derive(DeriveIden)]
    enum OrderTicketInfo {
        Table,
        ItemDesc3,
    }
}
