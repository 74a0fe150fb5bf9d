use crate::{
    entities::catalog::{category, Category},
    errors::ServiceError,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

/// Ids of every category that no other category names as its parent
pub async fn leaf_category_ids<C: ConnectionTrait>(conn: &C) -> Result<BTreeSet<Uuid>, ServiceError> {
    let all: Vec<Uuid> = Category::find()
        .select_only()
        .column(category::Column::Id)
        .into_tuple()
        .all(conn)
        .await?;

    let parents: BTreeSet<Uuid> = Category::find()
        .select_only()
        .column(category::Column::ParentId)
        .filter(category::Column::ParentId.is_not_null())
        .into_tuple::<Option<Uuid>>()
        .all(conn)
        .await?
        .into_iter()
        .flatten()
        .collect();

    Ok(all.into_iter().filter(|id| !parents.contains(id)).collect())
}

/// `Ok(true)` when the category exists and has no children, `Ok(false)` when
/// it exists but is an inner node, `NotFound` otherwise.
pub async fn is_valid_leaf<C: ConnectionTrait>(
    conn: &C,
    category_id: Uuid,
) -> Result<bool, ServiceError> {
    find_category(conn, category_id).await?;
    leaf_check(conn, category_id).await
}

/// Loads the category and insists it is a leaf.
pub async fn require_leaf<C: ConnectionTrait>(
    conn: &C,
    category_id: Uuid,
) -> Result<category::Model, ServiceError> {
    let category = find_category(conn, category_id).await?;
    if !leaf_check(conn, category_id).await? {
        return Err(ServiceError::ValidationError(format!(
            "Category {} is not a valid attachment point: it has child categories",
            category_id
        )));
    }
    Ok(category)
}

async fn find_category<C: ConnectionTrait>(
    conn: &C,
    category_id: Uuid,
) -> Result<category::Model, ServiceError> {
    Category::find_by_id(category_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
}

async fn leaf_check<C: ConnectionTrait>(conn: &C, category_id: Uuid) -> Result<bool, ServiceError> {
    let children = Category::find()
        .filter(category::Column::ParentId.eq(category_id))
        .count(conn)
        .await?;
    debug!(%category_id, children, "Leaf check");
    Ok(children == 0)
}
