//! StateSet Catalog Library
//!
//! Consistency engine for the catalog graph
//! category → variation → variation option → product configuration →
//! product item → product, plus the category and product services built on it.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod commands;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use errors::{ErrorKind, ServiceError};
pub use services::catalog::{
    CategoryService, EngineSettings, ProductService, Report, SavePolicy, VariationEngine,
};

/// The catalog services sharing one pool, one set of engine settings and
/// one optional event sender
#[derive(Clone)]
pub struct CatalogServices {
    pub categories: CategoryService,
    pub variations: VariationEngine,
    pub products: ProductService,
}

impl CatalogServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        settings: EngineSettings,
        event_sender: Option<Arc<events::EventSender>>,
    ) -> Self {
        let mut categories = CategoryService::new(db.clone(), settings);
        let mut variations = VariationEngine::new(db.clone(), settings);
        let mut products = ProductService::new(db, settings);

        if let Some(sender) = event_sender {
            categories = categories.with_event_sender(sender.clone());
            variations = variations.with_event_sender(sender.clone());
            products = products.with_event_sender(sender);
        }

        Self {
            categories,
            variations,
            products,
        }
    }

    /// Connects with the configured pool settings (migrating when
    /// `auto_migrate` is set) and opens the event channel. The receiver is
    /// meant for [`events::process_events`].
    pub async fn from_config(
        cfg: &config::AppConfig,
    ) -> Result<(Self, mpsc::Receiver<events::Event>), ServiceError> {
        let pool = db::establish_connection_from_app_config(cfg).await?;
        let (sender, receiver) = events::EventSender::channel(cfg.event_channel_capacity);
        let services = Self::new(
            Arc::new(pool),
            EngineSettings::from(cfg),
            Some(Arc::new(sender)),
        );
        Ok((services, receiver))
    }
}
