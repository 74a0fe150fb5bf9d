use crate::{
    entities::catalog::{variation, variation_option, Variation, VariationOption},
    errors::ServiceError,
    services::catalog::cascade::SavePolicy,
};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// The set of rows a name or value must be unique within
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScope {
    /// Variation names within one category
    VariationsInCategory(Uuid),
    /// Option values within one variation
    OptionsInVariation(Uuid),
}

impl fmt::Display for NameScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameScope::VariationsInCategory(id) => write!(f, "variation name in category {}", id),
            NameScope::OptionsInVariation(id) => write!(f, "option value in variation {}", id),
        }
    }
}

/// What to do when the proposed name is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Fail with `Conflict`
    #[default]
    Reject,
    /// Hand back the colliding row so the caller can cascade it away
    Evict,
}

impl From<SavePolicy> for ConflictResolution {
    fn from(policy: SavePolicy) -> Self {
        match policy {
            SavePolicy::Preserve => ConflictResolution::Reject,
            SavePolicy::Discard => ConflictResolution::Evict,
        }
    }
}

/// Looks for a row in `scope` already holding `proposed`.
///
/// `exclude` is the row being renamed, which never collides with itself.
/// Returns `Ok(None)` when the name is free, `Ok(Some(id))` with the colliding
/// row under [`ConflictResolution::Evict`], and `Conflict` under
/// [`ConflictResolution::Reject`].
pub async fn check_name<C: ConnectionTrait>(
    conn: &C,
    scope: NameScope,
    proposed: &str,
    resolution: ConflictResolution,
    exclude: Option<Uuid>,
) -> Result<Option<Uuid>, ServiceError> {
    let colliding = find_colliding(conn, scope, proposed, exclude).await?;

    let Some(colliding_id) = colliding else {
        return Ok(None);
    };

    debug!(%scope, proposed, %colliding_id, ?resolution, "Name collision");
    match resolution {
        ConflictResolution::Reject => Err(ServiceError::Conflict(format!(
            "{} '{}' is already in use",
            scope, proposed
        ))),
        ConflictResolution::Evict => Ok(Some(colliding_id)),
    }
}

async fn find_colliding<C: ConnectionTrait>(
    conn: &C,
    scope: NameScope,
    proposed: &str,
    exclude: Option<Uuid>,
) -> Result<Option<Uuid>, ServiceError> {
    let found = match scope {
        NameScope::VariationsInCategory(category_id) => {
            let mut query = Variation::find()
                .select_only()
                .column(variation::Column::Id)
                .filter(variation::Column::CategoryId.eq(category_id))
                .filter(variation::Column::Name.eq(proposed));
            if let Some(id) = exclude {
                query = query.filter(variation::Column::Id.ne(id));
            }
            query.into_tuple::<Uuid>().one(conn).await?
        }
        NameScope::OptionsInVariation(variation_id) => {
            let mut query = VariationOption::find()
                .select_only()
                .column(variation_option::Column::Id)
                .filter(variation_option::Column::VariationId.eq(variation_id))
                .filter(variation_option::Column::Value.eq(proposed));
            if let Some(id) = exclude {
                query = query.filter(variation_option::Column::Id.ne(id));
            }
            query.into_tuple::<Uuid>().one(conn).await?
        }
    };
    Ok(found)
}
