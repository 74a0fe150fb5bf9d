use crate::{
    entities::catalog::{
        product_configuration, variation_option, ProductConfiguration, Variation, VariationOption,
    },
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

/// Everything that depends on a set of target options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlastRadius {
    /// Variations the targets belong to (or the audited variation itself)
    pub variation_ids: BTreeSet<Uuid>,
    /// The target options
    pub options: Vec<variation_option::Model>,
    /// Configurations pointing at a target option
    pub configurations: Vec<product_configuration::Model>,
    /// Every affected product item mapped to its full option set, targets included
    pub item_options: BTreeMap<Uuid, BTreeSet<Uuid>>,
}

impl BlastRadius {
    pub fn option_ids(&self) -> BTreeSet<Uuid> {
        self.options.iter().map(|option| option.id).collect()
    }

    /// Distinct product items holding a configuration against a target
    pub fn product_item_ids(&self) -> Vec<Uuid> {
        self.item_options.keys().copied().collect()
    }

    pub fn has_any_configuration(&self) -> bool {
        !self.configurations.is_empty()
    }
}

/// Audits every option owned by `variation_id`.
///
/// The variation itself is always part of the radius, even with no options.
pub async fn audit_variation<C: ConnectionTrait>(
    conn: &C,
    variation_id: Uuid,
) -> Result<BlastRadius, ServiceError> {
    Variation::find_by_id(variation_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Variation {} not found", variation_id)))?;

    let options = VariationOption::find()
        .filter(variation_option::Column::VariationId.eq(variation_id))
        .order_by_asc(variation_option::Column::Value)
        .all(conn)
        .await?;

    let mut radius = radius_for(conn, options).await?;
    radius.variation_ids.insert(variation_id);
    Ok(radius)
}

/// Audits an explicit set of options. Every id must exist.
pub async fn audit_options<C: ConnectionTrait>(
    conn: &C,
    option_ids: &[Uuid],
) -> Result<BlastRadius, ServiceError> {
    let wanted: BTreeSet<Uuid> = option_ids.iter().copied().collect();
    if wanted.is_empty() {
        return Ok(BlastRadius::default());
    }

    let options = VariationOption::find()
        .filter(variation_option::Column::Id.is_in(wanted.iter().copied()))
        .order_by_asc(variation_option::Column::Value)
        .all(conn)
        .await?;

    if let Some(missing) = wanted
        .iter()
        .find(|id| !options.iter().any(|option| option.id == **id))
    {
        return Err(ServiceError::NotFound(format!(
            "Variation option {} not found",
            missing
        )));
    }

    radius_for(conn, options).await
}

async fn radius_for<C: ConnectionTrait>(
    conn: &C,
    options: Vec<variation_option::Model>,
) -> Result<BlastRadius, ServiceError> {
    let variation_ids = options.iter().map(|option| option.variation_id).collect();
    let target_ids: Vec<Uuid> = options.iter().map(|option| option.id).collect();

    let configurations = if target_ids.is_empty() {
        Vec::new()
    } else {
        ProductConfiguration::find()
            .filter(product_configuration::Column::VariationOptionId.is_in(target_ids))
            .all(conn)
            .await?
    };

    let item_ids: BTreeSet<Uuid> = configurations
        .iter()
        .map(|configuration| configuration.product_item_id)
        .collect();

    // Full configuration set of each affected item, not just the targeted rows
    let mut item_options: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
    if !item_ids.is_empty() {
        let item_configurations = ProductConfiguration::find()
            .filter(product_configuration::Column::ProductItemId.is_in(item_ids.iter().copied()))
            .all(conn)
            .await?;
        for configuration in item_configurations {
            item_options
                .entry(configuration.product_item_id)
                .or_default()
                .insert(configuration.variation_option_id);
        }
    }

    debug!(
        options = options.len(),
        configurations = configurations.len(),
        product_items = item_options.len(),
        "Audited blast radius"
    );

    Ok(BlastRadius {
        variation_ids,
        options,
        configurations,
        item_options,
    })
}
