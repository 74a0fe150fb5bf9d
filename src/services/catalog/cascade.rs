use crate::{
    entities::catalog::{
        category, product, product_configuration, product_item, variation, variation_option,
        Product, ProductConfiguration, ProductItem, Variation, VariationOption,
    },
    errors::ServiceError,
    services::catalog::auditor::BlastRadius,
};
use metrics::counter;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How a destructive operation treats product items that would be left
/// without any configuration.
///
/// `save=true` on the wire is [`SavePolicy::Preserve`], `save=false` is
/// [`SavePolicy::Discard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePolicy {
    /// Refuse the operation rather than delete product items
    #[default]
    Preserve,
    /// Delete dependent items (and emptied products); evict colliding names
    Discard,
}

impl SavePolicy {
    pub fn from_save_flag(save: bool) -> Self {
        if save {
            SavePolicy::Preserve
        } else {
            SavePolicy::Discard
        }
    }

    pub fn is_preserve(self) -> bool {
        matches!(self, SavePolicy::Preserve)
    }
}

impl From<bool> for SavePolicy {
    fn from(save: bool) -> Self {
        Self::from_save_flag(save)
    }
}

/// Whether a variation left without options is deleted along with them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariationRetention {
    DeleteIfEmpty,
    /// The variation is about to receive an option (eviction before a move)
    Keep,
}

/// Branch of the cascade decision table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadePlan {
    /// No configuration references the targets
    NoImpact,
    /// Every affected item keeps at least one other configuration
    SharedImpact { detached_items: Vec<Uuid> },
    /// Some items are configured only by the targets and the policy protects them
    ExclusiveBlocked { exclusive_items: Vec<Uuid> },
    /// Some items are configured only by the targets and will be deleted
    ExclusiveEvicted {
        detached_items: Vec<Uuid>,
        removed_items: Vec<Uuid>,
    },
}

impl CascadePlan {
    /// Classifies the blast radius. Pure: reads nothing but its arguments.
    pub fn decide(radius: &BlastRadius, policy: SavePolicy) -> Self {
        let targets = radius.option_ids();
        let mut detached_items = Vec::new();
        let mut exclusive_items = Vec::new();

        for (item_id, options) in &radius.item_options {
            if options.iter().any(|option_id| !targets.contains(option_id)) {
                detached_items.push(*item_id);
            } else {
                exclusive_items.push(*item_id);
            }
        }

        match (detached_items.is_empty(), exclusive_items.is_empty(), policy) {
            (true, true, _) => CascadePlan::NoImpact,
            (false, true, _) => CascadePlan::SharedImpact { detached_items },
            (_, false, SavePolicy::Preserve) => CascadePlan::ExclusiveBlocked { exclusive_items },
            (_, false, SavePolicy::Discard) => CascadePlan::ExclusiveEvicted {
                detached_items,
                removed_items: exclusive_items,
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CascadePlan::NoImpact => "no_impact",
            CascadePlan::SharedImpact { .. } => "shared_impact",
            CascadePlan::ExclusiveBlocked { .. } => "exclusive_blocked",
            CascadePlan::ExclusiveEvicted { .. } => "exclusive_evicted",
        }
    }

    fn removed_items(&self) -> &[Uuid] {
        match self {
            CascadePlan::ExclusiveEvicted { removed_items, .. } => removed_items,
            _ => &[],
        }
    }
}

/// Every row a cascade deleted, tier by tier.
///
/// Returned to callers as `incompatibilities` and published to the
/// search-index mirror so derived state can be reconciled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub variation: Option<variation::Model>,
    pub variation_options: Vec<variation_option::Model>,
    pub product_configurations: Vec<product_configuration::Model>,
    pub product_items: Vec<product_item::Model>,
    pub products: Vec<product::Model>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.variation.is_none()
            && self.variation_options.is_empty()
            && self.product_configurations.is_empty()
            && self.product_items.is_empty()
            && self.products.is_empty()
    }

    /// True when configurations, items or products were removed
    pub fn touches_products(&self) -> bool {
        !self.product_configurations.is_empty()
            || !self.product_items.is_empty()
            || !self.products.is_empty()
    }

    /// Folds a later cascade of the same operation into this one
    pub fn absorb(&mut self, other: Report) {
        if self.variation.is_none() {
            self.variation = other.variation;
        }
        self.variation_options.extend(other.variation_options);
        self.product_configurations
            .extend(other.product_configurations);
        self.product_items.extend(other.product_items);
        self.products.extend(other.products);
    }
}

/// Rows removed when a category, or the resources it owns, is purged.
///
/// Unlike [`Report`] it can name several variations and categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    pub categories: Vec<category::Model>,
    pub variations: Vec<variation::Model>,
    pub variation_options: Vec<variation_option::Model>,
    pub product_configurations: Vec<product_configuration::Model>,
    pub product_items: Vec<product_item::Model>,
    pub products: Vec<product::Model>,
}

impl CategoryReport {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
            && self.variations.is_empty()
            && self.variation_options.is_empty()
            && self.product_configurations.is_empty()
            && self.product_items.is_empty()
            && self.products.is_empty()
    }

    pub fn absorb(&mut self, report: Report) {
        self.variations.extend(report.variation);
        self.variation_options.extend(report.variation_options);
        self.product_configurations
            .extend(report.product_configurations);
        self.product_items.extend(report.product_items);
        self.products.extend(report.products);
    }
}

/// Deletes whole products: their configurations, their items, then the
/// products themselves. Options are left alone.
#[instrument(skip(conn))]
pub async fn purge_products<C: ConnectionTrait>(
    conn: &C,
    product_ids: &[Uuid],
) -> Result<Report, ServiceError> {
    let mut report = Report::default();
    if product_ids.is_empty() {
        return Ok(report);
    }

    let items = ProductItem::find()
        .filter(product_item::Column::ProductId.is_in(product_ids.iter().copied()))
        .all(conn)
        .await?;
    let item_ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();

    if !item_ids.is_empty() {
        report.product_configurations = ProductConfiguration::find()
            .filter(product_configuration::Column::ProductItemId.is_in(item_ids.iter().copied()))
            .all(conn)
            .await?;
        ProductConfiguration::delete_many()
            .filter(product_configuration::Column::ProductItemId.is_in(item_ids.iter().copied()))
            .exec(conn)
            .await?;
        ProductItem::delete_many()
            .filter(product_item::Column::Id.is_in(item_ids.iter().copied()))
            .exec(conn)
            .await?;
    }
    report.product_items = items;

    report.products = Product::find()
        .filter(product::Column::Id.is_in(product_ids.iter().copied()))
        .all(conn)
        .await?;
    Product::delete_many()
        .filter(product::Column::Id.is_in(product_ids.iter().copied()))
        .exec(conn)
        .await?;

    info!(
        products = report.products.len(),
        items = report.product_items.len(),
        configurations = report.product_configurations.len(),
        "Products purged"
    );
    Ok(report)
}

/// Applies the decision table to `radius` and performs the deletes.
///
/// Must run inside the caller's transaction: a refused cascade returns
/// [`ServiceError::CascadeRefused`] before any write, and any later failure
/// leaves the rollback to the caller.
///
/// Detaching only checks that each item keeps one configuration. Two
/// sibling items that differed only in the targeted options end up with the
/// same option set and both survive; only new items are checked for
/// duplicates.
#[instrument(skip(conn, radius), fields(options = radius.options.len()))]
pub async fn execute<C: ConnectionTrait>(
    conn: &C,
    radius: &BlastRadius,
    policy: SavePolicy,
    retention: VariationRetention,
) -> Result<Report, ServiceError> {
    let plan = CascadePlan::decide(radius, policy);
    counter!("catalog.cascade", 1, "plan" => plan.label());

    if let CascadePlan::ExclusiveBlocked { exclusive_items } = &plan {
        warn!(
            items = ?exclusive_items,
            "Cascade refused: product items are configured only by the targeted options"
        );
        return Err(ServiceError::CascadeRefused {
            option_ids: radius.option_ids().into_iter().collect(),
            product_item_ids: exclusive_items.clone(),
        });
    }

    let mut report = Report::default();
    let removed_items = plan.removed_items();

    // Configurations: the targeted rows, plus every row of a removed item
    let mut configurations = radius.configurations.clone();
    if !removed_items.is_empty() {
        let seen: BTreeSet<Uuid> = configurations.iter().map(|c| c.id).collect();
        let extra = ProductConfiguration::find()
            .filter(product_configuration::Column::ProductItemId.is_in(removed_items.iter().copied()))
            .all(conn)
            .await?;
        configurations.extend(extra.into_iter().filter(|c| !seen.contains(&c.id)));
    }
    if !configurations.is_empty() {
        ProductConfiguration::delete_many()
            .filter(product_configuration::Column::Id.is_in(configurations.iter().map(|c| c.id)))
            .exec(conn)
            .await?;
    }
    report.product_configurations = configurations;

    if !removed_items.is_empty() {
        let items = ProductItem::find()
            .filter(product_item::Column::Id.is_in(removed_items.iter().copied()))
            .all(conn)
            .await?;
        ProductItem::delete_many()
            .filter(product_item::Column::Id.is_in(removed_items.iter().copied()))
            .exec(conn)
            .await?;

        let product_ids: BTreeSet<Uuid> = items.iter().map(|item| item.product_id).collect();
        report.product_items = items;
        report.products = delete_emptied_products(conn, product_ids).await?;
    }

    let option_ids = radius.option_ids();
    if !option_ids.is_empty() {
        VariationOption::delete_many()
            .filter(variation_option::Column::Id.is_in(option_ids.iter().copied()))
            .exec(conn)
            .await?;
    }
    report.variation_options = radius.options.clone();

    if retention == VariationRetention::DeleteIfEmpty {
        for variation_id in &radius.variation_ids {
            if let Some(deleted) = delete_if_empty(conn, *variation_id).await? {
                report.variation = Some(deleted);
            }
        }
    }

    info!(
        plan = plan.label(),
        variation = ?report.variation.as_ref().map(|v| v.id),
        options = report.variation_options.len(),
        configurations = report.product_configurations.len(),
        items = report.product_items.len(),
        products = report.products.len(),
        "Cascade applied"
    );

    Ok(report)
}

async fn delete_emptied_products<C: ConnectionTrait>(
    conn: &C,
    product_ids: BTreeSet<Uuid>,
) -> Result<Vec<product::Model>, ServiceError> {
    let mut deleted = Vec::new();
    for product_id in product_ids {
        let remaining = ProductItem::find()
            .filter(product_item::Column::ProductId.eq(product_id))
            .count(conn)
            .await?;
        if remaining > 0 {
            continue;
        }
        if let Some(product) = Product::find_by_id(product_id).one(conn).await? {
            Product::delete_by_id(product_id).exec(conn).await?;
            deleted.push(product);
        }
    }
    Ok(deleted)
}

async fn delete_if_empty<C: ConnectionTrait>(
    conn: &C,
    variation_id: Uuid,
) -> Result<Option<variation::Model>, ServiceError> {
    let remaining = VariationOption::find()
        .filter(variation_option::Column::VariationId.eq(variation_id))
        .count(conn)
        .await?;
    if remaining > 0 {
        return Ok(None);
    }

    let Some(variation) = Variation::find_by_id(variation_id).one(conn).await? else {
        return Ok(None);
    };
    Variation::delete_by_id(variation_id).exec(conn).await?;
    Ok(Some(variation))
}
