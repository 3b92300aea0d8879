//! Schema migrations. One migration per table group, applied in dependency
//! order; all tables use integer auto-increment keys and decimal columns
//! for quantities (4 dp) and money (2 dp).

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_users_table::Migration),
            Box::new(m20240301_000002_create_products_table::Migration),
            Box::new(m20240301_000003_create_bom_tables::Migration),
            Box::new(m20240301_000004_create_stock_ledger_tables::Migration),
            Box::new(m20240301_000005_create_production_tables::Migration),
            Box::new(m20240301_000006_create_sales_tables::Migration),
            Box::new(m20240301_000007_create_delivery_tables::Migration),
            Box::new(m20240301_000008_create_finance_tables::Migration),
            Box::new(m20240301_000009_create_attendance_table::Migration),
        ]
    }
}

mod m20240301_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Users::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Users::Username).string().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::FullName).string().not_null())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(ColumnDef::new(Users::Phone).string().null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
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
                        .name("idx_users_username")
                        .table(Users::Table)
                        .col(Users::Username)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_email")
                        .table(Users::Table)
                        .col(Users::Email)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Users {
        Table,
        Id,
        Username,
        Email,
        PasswordHash,
        FullName,
        Role,
        Phone,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Code).string().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).string().null())
                        .col(ColumnDef::new(Products::ProductType).string().not_null())
                        .col(ColumnDef::new(Products::Unit).string().not_null())
                        .col(
                            ColumnDef::new(Products::CostPrice)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::SellingPrice)
                                .decimal_len(12, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Products::MinimumStock)
                                .decimal_len(14, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::CurrentStock)
                                .decimal_len(14, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
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
                        .name("idx_products_code")
                        .table(Products::Table)
                        .col(Products::Code)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_product_type")
                        .table(Products::Table)
                        .col(Products::ProductType)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Code,
        Name,
        Description,
        ProductType,
        Unit,
        CostPrice,
        SellingPrice,
        MinimumStock,
        CurrentStock,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_bom_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_bom_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Boms::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Boms::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Boms::ProductId).integer().not_null())
                        .col(ColumnDef::new(Boms::Version).string().not_null())
                        .col(
                            ColumnDef::new(Boms::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Boms::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // The single-active-BOM rule is enforced by the BOM service in a
            // transaction; this index keeps the active lookup cheap.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_boms_product_id_is_active")
                        .table(Boms::Table)
                        .col(Boms::ProductId)
                        .col(Boms::IsActive)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BomItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomItems::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(BomItems::BomId).integer().not_null())
                        .col(ColumnDef::new(BomItems::MaterialId).integer().not_null())
                        .col(
                            ColumnDef::new(BomItems::Quantity)
                                .decimal_len(14, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(BomItems::Unit).string().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_items_bom_id")
                        .table(BomItems::Table)
                        .col(BomItems::BomId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Boms::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Boms {
        Table,
        Id,
        ProductId,
        Version,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum BomItems {
        Table,
        Id,
        BomId,
        MaterialId,
        Quantity,
        Unit,
    }
}

mod m20240301_000004_create_stock_ledger_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_stock_ledger_tables"
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
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::Quantity)
                                .decimal_len(14, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::UnitCost)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockMovements::TotalCost)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ReferenceType)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ReferenceId)
                                .integer()
                                .null(),
                        )
                        .col(ColumnDef::new(StockMovements::Notes).string().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::CreatedBy)
                                .integer()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_product_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_reference")
                        .table(StockMovements::Table)
                        .col(StockMovements::ReferenceType)
                        .col(StockMovements::ReferenceId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockOpnames::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockOpnames::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StockOpnames::OpnameDate).date().not_null())
                        .col(ColumnDef::new(StockOpnames::Notes).string().null())
                        .col(ColumnDef::new(StockOpnames::Status).string().not_null())
                        .col(
                            ColumnDef::new(StockOpnames::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockOpnames::CreatedBy)
                                .integer()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockOpnameItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockOpnameItems::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockOpnameItems::StockOpnameId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockOpnameItems::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockOpnameItems::SystemStock)
                                .decimal_len(14, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockOpnameItems::PhysicalStock)
                                .decimal_len(14, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockOpnameItems::Difference)
                                .decimal_len(14, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockOpnameItems::Notes).string().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_opname_items_opname_id")
                        .table(StockOpnameItems::Table)
                        .col(StockOpnameItems::StockOpnameId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockOpnameItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockOpnames::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockMovements {
        Table,
        Id,
        ProductId,
        MovementType,
        Quantity,
        UnitCost,
        TotalCost,
        ReferenceType,
        ReferenceId,
        Notes,
        CreatedAt,
        CreatedBy,
    }

    #[derive(DeriveIden)]
    pub(super) enum StockOpnames {
        Table,
        Id,
        OpnameDate,
        Notes,
        Status,
        CreatedAt,
        CreatedBy,
    }

    #[derive(DeriveIden)]
    pub(super) enum StockOpnameItems {
        Table,
        Id,
        StockOpnameId,
        ProductId,
        SystemStock,
        PhysicalStock,
        Difference,
        Notes,
    }
}

mod m20240301_000005_create_production_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_production_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductionOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductionOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::OrderNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::Quantity)
                                .decimal_len(14, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::TargetDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::Status)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::AssignedTo)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::ActualQuantity)
                                .decimal_len(14, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(ProductionOrders::StartDate).date().null())
                        .col(
                            ColumnDef::new(ProductionOrders::CompletionDate)
                                .date()
                                .null(),
                        )
                        .col(ColumnDef::new(ProductionOrders::Notes).string().null())
                        .col(
                            ColumnDef::new(ProductionOrders::CreatedAt)
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
                        .name("idx_production_orders_order_number")
                        .table(ProductionOrders::Table)
                        .col(ProductionOrders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_production_orders_status")
                        .table(ProductionOrders::Table)
                        .col(ProductionOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductionMaterials::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductionMaterials::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ProductionMaterials::ProductionOrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionMaterials::MaterialId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionMaterials::RequiredQuantity)
                                .decimal_len(14, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionMaterials::UsedQuantity)
                                .decimal_len(14, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProductionMaterials::UnitCost)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_production_materials_order_id")
                        .table(ProductionMaterials::Table)
                        .col(ProductionMaterials::ProductionOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductionMaterials::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductionOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ProductionOrders {
        Table,
        Id,
        OrderNumber,
        ProductId,
        Quantity,
        TargetDate,
        Status,
        AssignedTo,
        ActualQuantity,
        StartDate,
        CompletionDate,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ProductionMaterials {
        Table,
        Id,
        ProductionOrderId,
        MaterialId,
        RequiredQuantity,
        UsedQuantity,
        UnitCost,
    }
}

mod m20240301_000006_create_sales_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::Email).string().null())
                        .col(ColumnDef::new(Customers::Phone).string().null())
                        .col(ColumnDef::new(Customers::Address).string().null())
                        .col(ColumnDef::new(Customers::City).string().null())
                        .col(ColumnDef::new(Customers::Marketplace).string().not_null())
                        .col(
                            ColumnDef::new(Customers::MarketplaceUsername)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Customers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(SalesOrders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(SalesOrders::CustomerId).integer().not_null())
                        .col(ColumnDef::new(SalesOrders::OrderDate).date().not_null())
                        .col(ColumnDef::new(SalesOrders::DeliveryDate).date().null())
                        .col(ColumnDef::new(SalesOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(SalesOrders::PaymentStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::Marketplace)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::MarketplaceOrderId)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::Subtotal)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::ShippingCost)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::TotalAmount)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrders::PaidAmount)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(SalesOrders::Notes).string().null())
                        .col(
                            ColumnDef::new(SalesOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesOrders::CreatedBy).integer().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_orders_order_number")
                        .table(SalesOrders::Table)
                        .col(SalesOrders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_orders_customer_id")
                        .table(SalesOrders::Table)
                        .col(SalesOrders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_orders_status")
                        .table(SalesOrders::Table)
                        .col(SalesOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SalesOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesOrderItems::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::SalesOrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::Quantity)
                                .decimal_len(14, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::UnitPrice)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::Discount)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SalesOrderItems::TotalPrice)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_order_items_order_id")
                        .table(SalesOrderItems::Table)
                        .col(SalesOrderItems::SalesOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Customers {
        Table,
        Id,
        Name,
        Email,
        Phone,
        Address,
        City,
        Marketplace,
        MarketplaceUsername,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum SalesOrders {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        OrderDate,
        DeliveryDate,
        Status,
        PaymentStatus,
        Marketplace,
        MarketplaceOrderId,
        Subtotal,
        ShippingCost,
        TotalAmount,
        PaidAmount,
        Notes,
        CreatedAt,
        CreatedBy,
    }

    #[derive(DeriveIden)]
    pub(super) enum SalesOrderItems {
        Table,
        Id,
        SalesOrderId,
        ProductId,
        Quantity,
        UnitPrice,
        Discount,
        TotalPrice,
    }
}

mod m20240301_000007_create_delivery_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000007_create_delivery_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DeliveryOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliveryOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(DeliveryOrders::DeliveryNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryOrders::SalesOrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryOrders::DeliveryDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryOrders::RecipientName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryOrders::RecipientPhone)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryOrders::DeliveryAddress)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryOrders::Courier).string().null())
                        .col(
                            ColumnDef::new(DeliveryOrders::TrackingNumber)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(DeliveryOrders::Status).string().not_null())
                        .col(ColumnDef::new(DeliveryOrders::Notes).string().null())
                        .col(
                            ColumnDef::new(DeliveryOrders::CreatedAt)
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
                        .name("idx_delivery_orders_delivery_number")
                        .table(DeliveryOrders::Table)
                        .col(DeliveryOrders::DeliveryNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_delivery_orders_sales_order_id")
                        .table(DeliveryOrders::Table)
                        .col(DeliveryOrders::SalesOrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DeliveryOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliveryOrderItems::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(DeliveryOrderItems::DeliveryOrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryOrderItems::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryOrderItems::Quantity)
                                .decimal_len(14, 4)
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_delivery_order_items_delivery_id")
                        .table(DeliveryOrderItems::Table)
                        .col(DeliveryOrderItems::DeliveryOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeliveryOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(DeliveryOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum DeliveryOrders {
        Table,
        Id,
        DeliveryNumber,
        SalesOrderId,
        DeliveryDate,
        RecipientName,
        RecipientPhone,
        DeliveryAddress,
        Courier,
        TrackingNumber,
        Status,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum DeliveryOrderItems {
        Table,
        Id,
        DeliveryOrderId,
        ProductId,
        Quantity,
    }
}

mod m20240301_000008_create_finance_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000008_create_finance_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CogsCalculations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CogsCalculations::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(CogsCalculations::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CogsCalculations::CalculationDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CogsCalculations::MaterialCost)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CogsCalculations::LaborCost)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CogsCalculations::OverheadCost)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CogsCalculations::TotalCogs)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CogsCalculations::Quantity)
                                .decimal_len(14, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CogsCalculations::UnitCogs)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(CogsCalculations::Notes).string().null())
                        .col(
                            ColumnDef::new(CogsCalculations::CreatedAt)
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
                        .name("idx_cogs_calculations_product_id")
                        .table(CogsCalculations::Table)
                        .col(CogsCalculations::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(FinancialReports::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(FinancialReports::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(FinancialReports::ReportDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FinancialReports::ReportType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(FinancialReports::Revenue)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(FinancialReports::Cogs)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(FinancialReports::GrossProfit)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(FinancialReports::OperatingExpenses)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(FinancialReports::NetProfit)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(FinancialReports::InventoryValue)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(FinancialReports::Data).json_binary().not_null())
                        .col(
                            ColumnDef::new(FinancialReports::CreatedAt)
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
                        .name("idx_financial_reports_report_date")
                        .table(FinancialReports::Table)
                        .col(FinancialReports::ReportDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(FinancialReports::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CogsCalculations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CogsCalculations {
        Table,
        Id,
        ProductId,
        CalculationDate,
        MaterialCost,
        LaborCost,
        OverheadCost,
        TotalCogs,
        Quantity,
        UnitCogs,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum FinancialReports {
        Table,
        Id,
        ReportDate,
        ReportType,
        Revenue,
        Cogs,
        GrossProfit,
        OperatingExpenses,
        NetProfit,
        InventoryValue,
        Data,
        CreatedAt,
    }
}

mod m20240301_000009_create_attendance_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000009_create_attendance_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Attendance::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Attendance::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Attendance::UserId).integer().not_null())
                        .col(
                            ColumnDef::new(Attendance::AttendanceDate)
                                .date()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Attendance::CheckIn)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Attendance::CheckOut)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Attendance::Status).string().not_null())
                        .col(
                            ColumnDef::new(Attendance::WorkingHours)
                                .decimal_len(5, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Attendance::OvertimeHours)
                                .decimal_len(5, 2)
                                .null(),
                        )
                        .col(ColumnDef::new(Attendance::Notes).string().null())
                        .col(
                            ColumnDef::new(Attendance::CreatedAt)
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
                        .name("idx_attendance_user_id_date")
                        .table(Attendance::Table)
                        .col(Attendance::UserId)
                        .col(Attendance::AttendanceDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Attendance::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Attendance {
        Table,
        Id,
        UserId,
        AttendanceDate,
        CheckIn,
        CheckOut,
        Status,
        WorkingHours,
        OvertimeHours,
        Notes,
        CreatedAt,
    }
}
