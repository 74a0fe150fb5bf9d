use crate::services::catalog::cascade::{CategoryReport, Report};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Publishes catalog change events to whoever drains the channel
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end of a bounded channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without waiting for channel capacity, logging dropped events.
    /// Used after commit, where the mutation already stands.
    pub fn send_or_log(&self, event: Event) {
        let name = event.name();
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(event = name, "Catalog event dropped: channel full");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(event = name, "Catalog event dropped: channel closed");
            }
        }
    }
}

/// Committed changes to the catalog graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    CategoryCreated {
        category_id: Uuid,
        parent_id: Option<Uuid>,
    },
    CategoryUpdated {
        category_id: Uuid,
    },
    /// The category and everything under it that was not relocated
    CategoryDeleted {
        category_id: Uuid,
        report: CategoryReport,
    },
    /// Variations and products that moved to another category
    CategoryResourcesRelocated {
        from_category_id: Uuid,
        to_category_id: Uuid,
        variation_ids: Vec<Uuid>,
        product_ids: Vec<Uuid>,
    },
    /// Resources of a category that gained its first child under `save=false`
    CategoryResourcesPurged {
        category_id: Uuid,
        report: CategoryReport,
    },
    VariationCreated {
        variation_id: Uuid,
        category_id: Uuid,
        option_ids: Vec<Uuid>,
    },
    VariationUpdated {
        variation_id: Uuid,
        category_id: Uuid,
    },
    VariationOptionsCreated {
        variation_id: Uuid,
        option_ids: Vec<Uuid>,
    },
    VariationOptionUpdated {
        option_id: Uuid,
        variation_id: Uuid,
    },
    /// Everything a cascade removed, tier by tier
    CatalogPurged { report: Report },
    ProductCreated {
        product_id: Uuid,
        category_id: Uuid,
        item_ids: Vec<Uuid>,
    },
    ProductItemCreated {
        product_id: Uuid,
        item_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CategoryCreated { .. } => "category_created",
            Event::CategoryUpdated { .. } => "category_updated",
            Event::CategoryDeleted { .. } => "category_deleted",
            Event::CategoryResourcesRelocated { .. } => "category_resources_relocated",
            Event::CategoryResourcesPurged { .. } => "category_resources_purged",
            Event::VariationCreated { .. } => "variation_created",
            Event::VariationUpdated { .. } => "variation_updated",
            Event::VariationOptionsCreated { .. } => "variation_options_created",
            Event::VariationOptionUpdated { .. } => "variation_option_updated",
            Event::CatalogPurged { .. } => "catalog_purged",
            Event::ProductCreated { .. } => "product_created",
            Event::ProductItemCreated { .. } => "product_item_created",
        }
    }
}

/// Consumer of catalog events, e.g. the search-index mirror
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains `rx` until every sender is dropped, forwarding each event to `handler`.
///
/// Handler failures are logged and the loop keeps going.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handler: Option<Arc<dyn EventHandler>>) {
    info!("Starting catalog event processing loop");

    while let Some(event) = rx.recv().await {
        let name = event.name();
        match &handler {
            Some(handler) => {
                if let Err(e) = handler.handle_event(event).await {
                    error!(event = name, error = %e, "Failed to handle catalog event");
                }
            }
            None => debug!(event = name, "No event handler registered; event discarded"),
        }
    }

    info!("Catalog event channel closed; processing loop stopped");
}
