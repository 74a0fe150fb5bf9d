#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use stateset_catalog::{
    config::AppConfig,
    db,
    entities::catalog::category,
    events::{Event, EventSender},
    services::catalog::{
        CreateCategoryRequest, CreateProductRequest, CreateVariationRequest, CreatedProduct,
        CreatedVariation, NewProductItem, SavePolicy,
    },
    CatalogServices, EngineSettings, ProductService, VariationEngine,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Catalog services backed by a throwaway SQLite database with the schema applied.
pub struct TestCatalog {
    pub db: Arc<DatabaseConnection>,
    pub services: CatalogServices,
    events: mpsc::Receiver<Event>,
    _dir: TempDir,
}

impl TestCatalog {
    pub async fn new() -> Self {
        Self::with_event_capacity(1024).await
    }

    /// Same, with the event channel bounded at `capacity` and never drained
    /// unless the test calls [`TestCatalog::drain_events`]
    pub async fn with_event_capacity(capacity: usize) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("catalog.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", path.display()),
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        // One connection: SQLite serialises writers anyway and this keeps
        // concurrent transactions from failing with SQLITE_BUSY
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::check_connection(&pool)
            .await
            .expect("test database should answer pings");
        let db = Arc::new(pool);

        let (sender, events) = EventSender::channel(capacity);
        let services = CatalogServices::new(
            db.clone(),
            EngineSettings::from(&cfg),
            Some(Arc::new(sender)),
        );

        Self {
            db,
            services,
            events,
            _dir: dir,
        }
    }

    pub fn engine(&self) -> &VariationEngine {
        &self.services.variations
    }

    pub fn products(&self) -> &ProductService {
        &self.services.products
    }

    pub async fn root_category(&self, name: &str) -> category::Model {
        self.services
            .categories
            .create_category(CreateCategoryRequest {
                name: name.to_string(),
                parent_id: None,
                description: None,
                save: SavePolicy::Preserve,
            })
            .await
            .expect("create root category")
            .category
    }

    pub async fn child_category(&self, parent_id: Uuid, name: &str) -> category::Model {
        self.services
            .categories
            .create_category(CreateCategoryRequest {
                name: name.to_string(),
                parent_id: Some(parent_id),
                description: None,
                save: SavePolicy::Preserve,
            })
            .await
            .expect("create child category")
            .category
    }

    pub async fn variation(
        &self,
        category_id: Uuid,
        name: &str,
        values: &[&str],
    ) -> CreatedVariation {
        self.engine()
            .create_variation(CreateVariationRequest {
                category_id,
                name: name.to_string(),
                value: None,
                values: values.iter().map(|v| v.to_string()).collect(),
            })
            .await
            .expect("create variation")
    }

    /// Creates a product with one item per option combination given
    pub async fn product(
        &self,
        category_id: Uuid,
        name: &str,
        items: &[&[(&str, &str)]],
    ) -> CreatedProduct {
        self.products()
            .create_product(CreateProductRequest {
                category_id,
                name: name.to_string(),
                description: None,
                image: None,
                items: items.iter().map(|choices| item(choices)).collect(),
            })
            .await
            .expect("create product")
    }

    pub async fn count<E: EntityTrait>(&self, entity: E) -> u64
    where
        E::Model: Sync,
    {
        let _ = entity;
        E::find().count(&*self.db).await.expect("count rows")
    }

    /// Row counts of every catalog table, in graph order
    pub async fn snapshot(&self) -> [u64; 6] {
        use stateset_catalog::entities::catalog::*;
        [
            self.count(Category).await,
            self.count(Variation).await,
            self.count(VariationOption).await,
            self.count(ProductConfiguration).await,
            self.count(ProductItem).await,
            self.count(Product).await,
        ]
    }

    /// Events published so far
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

/// An item choosing the given `(variation name, value)` pairs
pub fn item(choices: &[(&str, &str)]) -> NewProductItem {
    NewProductItem {
        sku: None,
        quantity: 5,
        price: 1999,
        images: Vec::new(),
        options: choices
            .iter()
            .map(|(variation, value)| (variation.to_string(), value.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Id of the option holding `value` in a freshly created variation
pub fn option_id(created: &CreatedVariation, value: &str) -> Uuid {
    created
        .options
        .iter()
        .find(|option| option.value == value)
        .map(|option| option.id)
        .unwrap_or_else(|| panic!("option {} not created", value))
}
