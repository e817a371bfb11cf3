use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_medicines_table::Migration),
            Box::new(m20240601_000002_create_medicine_batches_table::Migration),
            Box::new(m20240601_000003_create_stock_movements_table::Migration),
            Box::new(m20240601_000004_create_notifications_table::Migration),
            Box::new(m20240601_000005_create_expiry_rules_table::Migration),
            Box::new(m20240601_000006_create_stock_audits_table::Migration),
        ]
    }
}

mod m20240601_000001_create_medicines_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_medicines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Medicines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Medicines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Medicines::CategoryId).big_integer().not_null())
                        .col(
                            ColumnDef::new(Medicines::MedicineCode)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Medicines::Name).string().not_null())
                        .col(ColumnDef::new(Medicines::GenericName).string().null())
                        .col(ColumnDef::new(Medicines::Manufacturer).string().null())
                        .col(ColumnDef::new(Medicines::StorageCondition).string().null())
                        .col(ColumnDef::new(Medicines::UnitOfMeasure).string().not_null())
                        .col(
                            ColumnDef::new(Medicines::LowStockThreshold)
                                .integer()
                                .not_null()
                                .default(50),
                        )
                        .col(
                            ColumnDef::new(Medicines::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Medicines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Medicines::CreatedBy).string().null())
                        .col(
                            ColumnDef::new(Medicines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Medicines::UpdatedBy).string().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_medicines_generic_name")
                        .table(Medicines::Table)
                        .col(Medicines::GenericName)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Medicines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Medicines {
        Table,
        Id,
        CategoryId,
        MedicineCode,
        Name,
        GenericName,
        Manufacturer,
        StorageCondition,
        UnitOfMeasure,
        LowStockThreshold,
        IsActive,
        CreatedAt,
        CreatedBy,
        UpdatedAt,
        UpdatedBy,
    }
}

mod m20240601_000002_create_medicine_batches_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_medicine_batches_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MedicineBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MedicineBatches::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(MedicineBatches::MedicineId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MedicineBatches::SupplierId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MedicineBatches::BatchNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MedicineBatches::ExpiryDate).date().not_null())
                        .col(
                            ColumnDef::new(MedicineBatches::ReceivedDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MedicineBatches::InitialQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MedicineBatches::CurrentQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MedicineBatches::PurchasePrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MedicineBatches::SellingPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(MedicineBatches::Status).string().not_null())
                        .col(
                            ColumnDef::new(MedicineBatches::RowVersion)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(MedicineBatches::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(MedicineBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MedicineBatches::CreatedBy).string().null())
                        .col(
                            ColumnDef::new(MedicineBatches::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(MedicineBatches::UpdatedBy).string().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_medicine_batches_medicine_id")
                                .from(MedicineBatches::Table, MedicineBatches::MedicineId)
                                .to(Medicines::Table, Medicines::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One physical lot per (medicine, batch number); receipts for a
            // known pair append instead of inserting.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_medicine_batches_medicine_batch_number")
                        .table(MedicineBatches::Table)
                        .col(MedicineBatches::MedicineId)
                        .col(MedicineBatches::BatchNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_medicine_batches_expiry_date")
                        .table(MedicineBatches::Table)
                        .col(MedicineBatches::ExpiryDate)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_medicine_batches_status")
                        .table(MedicineBatches::Table)
                        .col(MedicineBatches::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MedicineBatches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MedicineBatches {
        Table,
        Id,
        MedicineId,
        SupplierId,
        BatchNumber,
        ExpiryDate,
        ReceivedDate,
        InitialQuantity,
        CurrentQuantity,
        PurchasePrice,
        SellingPrice,
        Status,
        RowVersion,
        IsActive,
        CreatedAt,
        CreatedBy,
        UpdatedAt,
        UpdatedBy,
    }

    #[derive(DeriveIden)]
    enum Medicines {
        Table,
        Id,
    }
}

mod m20240601_000003_create_stock_movements_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MedicineBatchId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(StockMovements::SnapshotQuantity)
                                .integer()
                                .null(),
                        )
                        .col(ColumnDef::new(StockMovements::Reason).string().null())
                        .col(ColumnDef::new(StockMovements::ReferenceNo).string().null())
                        .col(
                            ColumnDef::new(StockMovements::PerformedByUserId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::PerformedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_movements_batch_id")
                                .from(StockMovements::Table, StockMovements::MedicineBatchId)
                                .to(MedicineBatches::Table, MedicineBatches::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_batch_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::MedicineBatchId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_performed_at")
                        .table(StockMovements::Table)
                        .col(StockMovements::PerformedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        MedicineBatchId,
        MovementType,
        Quantity,
        SnapshotQuantity,
        Reason,
        ReferenceNo,
        PerformedByUserId,
        PerformedAt,
    }

    #[derive(DeriveIden)]
    enum MedicineBatches {
        Table,
        Id,
    }
}

mod m20240601_000004_create_notifications_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Notifications::UserId).big_integer().null())
                        .col(
                            ColumnDef::new(Notifications::IsSystemAlert)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Notifications::IsActionTaken)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Notifications::Title).string().not_null())
                        .col(ColumnDef::new(Notifications::Message).string().not_null())
                        .col(
                            ColumnDef::new(Notifications::NotificationType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::Priority)
                                .integer()
                                .not_null()
                                .default(3),
                        )
                        .col(
                            ColumnDef::new(Notifications::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Notifications::RelatedEntityId)
                                .big_integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::RelatedEntityType)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Serves both the same-day duplicate check and resolution.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_related_entity")
                        .table(Notifications::Table)
                        .col(Notifications::RelatedEntityType)
                        .col(Notifications::RelatedEntityId)
                        .col(Notifications::NotificationType)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        UserId,
        IsSystemAlert,
        IsActionTaken,
        Title,
        Message,
        NotificationType,
        Priority,
        IsRead,
        RelatedEntityId,
        RelatedEntityType,
        CreatedAt,
    }
}

mod m20240601_000005_create_expiry_rules_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_expiry_rules_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ExpiryRules::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ExpiryRules::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ExpiryRules::CategoryId).big_integer().null())
                        .col(ColumnDef::new(ExpiryRules::WarningDays).integer().not_null())
                        .col(
                            ColumnDef::new(ExpiryRules::CriticalDays)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ExpiryRules::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ExpiryRules::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ExpiryRules::CreatedBy).string().null())
                        .col(
                            ColumnDef::new(ExpiryRules::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(ExpiryRules::UpdatedBy).string().null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ExpiryRules::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ExpiryRules {
        Table,
        Id,
        CategoryId,
        WarningDays,
        CriticalDays,
        IsActive,
        CreatedAt,
        CreatedBy,
        UpdatedAt,
        UpdatedBy,
    }
}

mod m20240601_000006_create_stock_audits_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000006_create_stock_audits_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockAudits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockAudits::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockAudits::MedicineBatchId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockAudits::BatchNumber).string().not_null())
                        .col(
                            ColumnDef::new(StockAudits::PropertyName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockAudits::OldValue).string().not_null())
                        .col(ColumnDef::new(StockAudits::NewValue).string().not_null())
                        .col(
                            ColumnDef::new(StockAudits::ChangedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAudits::ChangedByUserId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAudits::ChangedByUserName)
                                .string()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_audits_batch_id")
                                .from(StockAudits::Table, StockAudits::MedicineBatchId)
                                .to(MedicineBatches::Table, MedicineBatches::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_audits_batch_id")
                        .table(StockAudits::Table)
                        .col(StockAudits::MedicineBatchId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockAudits::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockAudits {
        Table,
        Id,
        MedicineBatchId,
        BatchNumber,
        PropertyName,
        OldValue,
        NewValue,
        ChangedAt,
        ChangedByUserId,
        ChangedByUserName,
    }

    #[derive(DeriveIden)]
    enum MedicineBatches {
        Table,
        Id,
    }
}
