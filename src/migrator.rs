use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_category_table::Migration),
            Box::new(m20240101_000002_create_variation_tables::Migration),
            Box::new(m20240101_000003_create_product_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_category_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_category_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductCategory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductCategory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductCategory::ParentId).uuid().null())
                        .col(ColumnDef::new(ProductCategory::Name).string().not_null())
                        .col(ColumnDef::new(ProductCategory::Description).string().null())
                        .col(
                            ColumnDef::new(ProductCategory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_category_parent_id")
                                .from(ProductCategory::Table, ProductCategory::ParentId)
                                .to(ProductCategory::Table, ProductCategory::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // Leaf detection scans parent_id
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_category_parent_id")
                        .table(ProductCategory::Table)
                        .col(ProductCategory::ParentId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductCategory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ProductCategory {
        Table,
        Id,
        ParentId,
        Name,
        Description,
        CreatedAt,
    }
}

mod m20240101_000002_create_variation_tables {
    use super::m20240101_000001_create_category_table::ProductCategory;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_variation_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Variation::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Variation::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Variation::CategoryId).uuid().not_null())
                        .col(ColumnDef::new(Variation::Name).string().not_null())
                        .col(
                            ColumnDef::new(Variation::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Variation::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_variation_category_id")
                                .from(Variation::Table, Variation::CategoryId)
                                .to(ProductCategory::Table, ProductCategory::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_variation_category_id_name")
                        .table(Variation::Table)
                        .col(Variation::CategoryId)
                        .col(Variation::Name)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(VariationOption::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(VariationOption::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(VariationOption::VariationId).uuid().not_null())
                        .col(ColumnDef::new(VariationOption::Value).string().not_null())
                        .col(
                            ColumnDef::new(VariationOption::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VariationOption::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_variation_option_variation_id")
                                .from(VariationOption::Table, VariationOption::VariationId)
                                .to(Variation::Table, Variation::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_variation_option_variation_id_value")
                        .table(VariationOption::Table)
                        .col(VariationOption::VariationId)
                        .col(VariationOption::Value)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(VariationOption::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Variation::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Variation {
        Table,
        Id,
        CategoryId,
        Name,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum VariationOption {
        Table,
        Id,
        VariationId,
        Value,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_product_tables {
    use super::m20240101_000001_create_category_table::ProductCategory;
    use super::m20240101_000002_create_variation_tables::VariationOption;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_product_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Product::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Product::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Product::CategoryId).uuid().not_null())
                        .col(ColumnDef::new(Product::Name).string().not_null())
                        .col(ColumnDef::new(Product::Description).string().null())
                        .col(ColumnDef::new(Product::Image).string().null())
                        .col(
                            ColumnDef::new(Product::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_category_id")
                                .from(Product::Table, Product::CategoryId)
                                .to(ProductCategory::Table, ProductCategory::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductItem::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductItem::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductItem::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ProductItem::Sku).string().not_null())
                        .col(
                            ColumnDef::new(ProductItem::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ProductItem::Images).json().not_null())
                        .col(
                            ColumnDef::new(ProductItem::Price)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductItem::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_item_product_id")
                                .from(ProductItem::Table, ProductItem::ProductId)
                                .to(Product::Table, Product::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_product_item_sku")
                        .table(ProductItem::Table)
                        .col(ProductItem::Sku)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductConfiguration::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductConfiguration::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductConfiguration::ProductItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductConfiguration::VariationOptionId)
                                .uuid()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_configuration_product_item_id")
                                .from(
                                    ProductConfiguration::Table,
                                    ProductConfiguration::ProductItemId,
                                )
                                .to(ProductItem::Table, ProductItem::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_configuration_variation_option_id")
                                .from(
                                    ProductConfiguration::Table,
                                    ProductConfiguration::VariationOptionId,
                                )
                                .to(VariationOption::Table, VariationOption::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_product_configuration_item_option")
                        .table(ProductConfiguration::Table)
                        .col(ProductConfiguration::ProductItemId)
                        .col(ProductConfiguration::VariationOptionId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // The auditor looks configurations up by option
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_configuration_variation_option_id")
                        .table(ProductConfiguration::Table)
                        .col(ProductConfiguration::VariationOptionId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductConfiguration::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductItem::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Product::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Product {
        Table,
        Id,
        CategoryId,
        Name,
        Description,
        Image,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductItem {
        Table,
        Id,
        ProductId,
        Sku,
        Quantity,
        Images,
        Price,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductConfiguration {
        Table,
        Id,
        ProductItemId,
        VariationOptionId,
    }
}

// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(2)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;

    info!("Running catalog migrations");

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}

/// Rolls back every catalog migration
pub async fn rollback_migration(db_url: &str) -> Result<()> {
    let db = Database::connect(ConnectOptions::new(db_url)).await?;

    match Migrator::down(&db, None).await {
        Ok(_) => {
            info!("Rollback completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Rollback failed: {}", e);
            Err(e.into())
        }
    }
}
