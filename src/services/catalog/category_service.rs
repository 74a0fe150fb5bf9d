use crate::{
    db::CatalogTransaction,
    entities::catalog::{category, product, variation, Category, Product, Variation},
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::{
        auditor,
        cascade::{self, CategoryReport, SavePolicy, VariationRetention},
        category_gate,
        sku::format_name,
        variation_engine::normalize_name,
        EngineSettings,
    },
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub description: Option<String>,
    /// What happens to the parent's variations and products when it stops
    /// being a leaf
    pub save: SavePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Variations and products that changed category, as they are after the move
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relocation {
    pub variations: Vec<variation::Model>,
    pub products: Vec<product::Model>,
}

impl Relocation {
    pub fn is_empty(&self) -> bool {
        self.variations.is_empty() && self.products.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCategory {
    pub category: category::Model,
    #[serde(skip_serializing_if = "Relocation::is_empty")]
    pub relocated: Relocation,
    #[serde(skip_serializing_if = "CategoryReport::is_empty")]
    pub incompatibilities: CategoryReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCategory {
    pub category: category::Model,
    /// Former children, now attached to the deleted category's parent
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reattached: Vec<category::Model>,
    #[serde(skip_serializing_if = "Relocation::is_empty")]
    pub relocated: Relocation,
    #[serde(skip_serializing_if = "CategoryReport::is_empty")]
    pub incompatibilities: CategoryReport,
}

/// Maintains the category tree that variations and products attach to
#[derive(Clone)]
pub struct CategoryService {
    db: Arc<DatabaseConnection>,
    settings: EngineSettings,
    event_sender: Option<Arc<EventSender>>,
}

impl CategoryService {
    pub fn new(db: Arc<DatabaseConnection>, settings: EngineSettings) -> Self {
        Self {
            db,
            settings,
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, event_sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    /// Creates a category, at the root or under `parent_id`.
    ///
    /// Sibling names must differ after [`format_name`]. A parent that owns
    /// variations or products stops being a leaf, so with
    /// [`SavePolicy::Preserve`] they move to the new child and with
    /// [`SavePolicy::Discard`] they are purged along with their items.
    #[instrument(skip(self))]
    pub async fn create_category(
        &self,
        request: CreateCategoryRequest,
    ) -> Result<CreatedCategory, ServiceError> {
        let name = normalize_name(&request.name, "name")?;

        let txn = CatalogTransaction::begin(
            &self.db,
            "create_category",
            self.settings.transaction_options(),
        )
        .await?;
        let outcome = create_category_in(&txn, name, &request).await;
        let created = txn.finish(outcome).await?;

        let category = &created.category;
        info!(
            category_id = %category.id,
            parent_id = ?category.parent_id,
            relocated = created.relocated.variations.len() + created.relocated.products.len(),
            purged = !created.incompatibilities.is_empty(),
            "Category created"
        );
        self.publish(Event::CategoryCreated {
            category_id: category.id,
            parent_id: category.parent_id,
        });
        if let Some(parent_id) = category.parent_id {
            self.publish_relocation(parent_id, category.id, &created.relocated);
            if !created.incompatibilities.is_empty() {
                self.publish(Event::CategoryResourcesPurged {
                    category_id: parent_id,
                    report: created.incompatibilities.clone(),
                });
            }
        }

        Ok(created)
    }

    /// Renames a category or changes its description
    #[instrument(skip(self))]
    pub async fn update_category(
        &self,
        category_id: Uuid,
        request: UpdateCategoryRequest,
    ) -> Result<category::Model, ServiceError> {
        if request.name.is_none() && request.description.is_none() {
            return Err(ServiceError::ValidationError("No data provided".to_string()));
        }
        let name = request
            .name
            .as_deref()
            .map(|name| normalize_name(name, "name"))
            .transpose()?;

        let txn = CatalogTransaction::begin(
            &self.db,
            "update_category",
            self.settings.transaction_options(),
        )
        .await?;
        let outcome = update_category_in(&txn, category_id, name, request.description).await;
        let category = txn.finish(outcome).await?;

        info!(category_id = %category.id, "Category updated");
        self.publish(Event::CategoryUpdated {
            category_id: category.id,
        });
        Ok(category)
    }

    /// Deletes a category.
    ///
    /// With [`SavePolicy::Discard`] the whole subtree goes, together with
    /// every variation and product attached to it. With
    /// [`SavePolicy::Preserve`] children are reattached to the parent and a
    /// leaf's resources move up to the parent, which is refused when there is
    /// no parent or the parent has other children.
    #[instrument(skip(self))]
    pub async fn delete_category(
        &self,
        category_id: Uuid,
        save: SavePolicy,
    ) -> Result<DeletedCategory, ServiceError> {
        let txn = CatalogTransaction::begin(
            &self.db,
            "delete_category",
            self.settings.transaction_options(),
        )
        .await?;
        let outcome = delete_category_in(&txn, category_id, save).await;
        let deleted = txn.finish(outcome).await?;

        info!(
            category_id = %category_id,
            reattached = deleted.reattached.len(),
            categories = deleted.incompatibilities.categories.len(),
            variations = deleted.incompatibilities.variations.len(),
            products = deleted.incompatibilities.products.len(),
            "Category deleted"
        );
        if let Some(parent_id) = deleted.category.parent_id {
            self.publish_relocation(category_id, parent_id, &deleted.relocated);
        }
        self.publish(Event::CategoryDeleted {
            category_id,
            report: deleted.incompatibilities.clone(),
        });
        Ok(deleted)
    }

    #[instrument(skip(self))]
    pub async fn get_category(&self, category_id: Uuid) -> Result<category::Model, ServiceError> {
        find_category(&*self.db, category_id).await
    }

    /// Direct children, ordered by name
    #[instrument(skip(self))]
    pub async fn children(&self, category_id: Uuid) -> Result<Vec<category::Model>, ServiceError> {
        self.get_category(category_id).await?;
        Ok(Category::find()
            .filter(category::Column::ParentId.eq(category_id))
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Categories that may own variations and products
    pub async fn leaf_category_ids(&self) -> Result<BTreeSet<Uuid>, ServiceError> {
        category_gate::leaf_category_ids(&*self.db).await
    }

    pub async fn is_valid_leaf(&self, category_id: Uuid) -> Result<bool, ServiceError> {
        category_gate::is_valid_leaf(&*self.db, category_id).await
    }

    fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event);
        }
    }

    fn publish_relocation(&self, from: Uuid, to: Uuid, relocated: &Relocation) {
        if relocated.is_empty() {
            return;
        }
        self.publish(Event::CategoryResourcesRelocated {
            from_category_id: from,
            to_category_id: to,
            variation_ids: relocated.variations.iter().map(|v| v.id).collect(),
            product_ids: relocated.products.iter().map(|p| p.id).collect(),
        });
    }
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

async fn create_category_in(
    txn: &DatabaseTransaction,
    name: String,
    request: &CreateCategoryRequest,
) -> Result<CreatedCategory, ServiceError> {
    if let Some(parent_id) = request.parent_id {
        Category::find_by_id(parent_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Parent category {} not found", parent_id))
            })?;
    }

    ensure_unique_among_siblings(txn, request.parent_id, &name, None).await?;

    let category = category::ActiveModel {
        id: Set(Uuid::new_v4()),
        parent_id: Set(request.parent_id),
        name: Set(name),
        description: Set(trimmed(request.description.as_deref())),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    let mut relocated = Relocation::default();
    let mut incompatibilities = CategoryReport::default();
    if let Some(parent_id) = request.parent_id {
        let resources = owned_resources(txn, &[parent_id]).await?;
        if !resources.is_empty() {
            match request.save {
                SavePolicy::Preserve => {
                    relocated = relocate(txn, resources, category.id).await?;
                }
                SavePolicy::Discard => {
                    incompatibilities = purge(txn, resources).await?;
                }
            }
        }
    }

    Ok(CreatedCategory {
        category,
        relocated,
        incompatibilities,
    })
}

async fn update_category_in(
    txn: &DatabaseTransaction,
    category_id: Uuid,
    name: Option<String>,
    description: Option<String>,
) -> Result<category::Model, ServiceError> {
    let existing = find_category(txn, category_id).await?;
    let mut active: category::ActiveModel = existing.clone().into();

    if let Some(name) = name {
        ensure_unique_among_siblings(txn, existing.parent_id, &name, Some(category_id)).await?;
        active.name = Set(name);
    }
    if description.is_some() {
        active.description = Set(trimmed(description.as_deref()));
    }

    Ok(active.update(txn).await?)
}

async fn delete_category_in(
    txn: &DatabaseTransaction,
    category_id: Uuid,
    save: SavePolicy,
) -> Result<DeletedCategory, ServiceError> {
    let category = find_category(txn, category_id).await?;

    match save {
        SavePolicy::Discard => {
            let levels = subtree_levels(txn, category_id).await?;
            let ids: Vec<Uuid> = levels.iter().flatten().copied().collect();

            let resources = owned_resources(txn, &ids).await?;
            let mut incompatibilities = purge(txn, resources).await?;

            // Children before parents: the tree's own foreign key restricts deletes
            for level in levels.iter().rev() {
                let rows = Category::find()
                    .filter(category::Column::Id.is_in(level.iter().copied()))
                    .all(txn)
                    .await?;
                Category::delete_many()
                    .filter(category::Column::Id.is_in(level.iter().copied()))
                    .exec(txn)
                    .await?;
                incompatibilities.categories.extend(rows);
            }

            Ok(DeletedCategory {
                category,
                reattached: Vec::new(),
                relocated: Relocation::default(),
                incompatibilities,
            })
        }
        SavePolicy::Preserve => {
            let children = Category::find()
                .filter(category::Column::ParentId.eq(category_id))
                .order_by_asc(category::Column::Name)
                .all(txn)
                .await?;
            let resources = owned_resources(txn, &[category_id]).await?;

            let mut relocated = Relocation::default();
            if !resources.is_empty() {
                let parent_id = refuse_unless_sole_child(txn, &category, &resources, &children)
                    .await?;
                relocated = relocate(txn, resources, parent_id).await?;
            }

            let reattached = reattach(txn, &category, children).await?;
            Category::delete_by_id(category_id).exec(txn).await?;

            let mut incompatibilities = CategoryReport::default();
            incompatibilities.categories.push(category.clone());
            Ok(DeletedCategory {
                category,
                reattached,
                relocated,
                incompatibilities,
            })
        }
    }
}

/// Resources can only move up into a parent that becomes a leaf once the
/// category is gone
async fn refuse_unless_sole_child(
    txn: &DatabaseTransaction,
    category: &category::Model,
    resources: &Resources,
    children: &[category::Model],
) -> Result<Uuid, ServiceError> {
    let owned = format!(
        "Category {} owns {} variation(s) and {} product(s)",
        category.id,
        resources.variations.len(),
        resources.products.len()
    );

    if !children.is_empty() {
        warn!(category_id = %category.id, "Category owns resources and has children");
        return Err(ServiceError::ValidationError(format!(
            "{} and {} child categories; delete with save=false",
            owned,
            children.len()
        )));
    }
    let Some(parent_id) = category.parent_id else {
        return Err(ServiceError::ValidationError(format!(
            "{} and has no parent to receive them; delete with save=false",
            owned
        )));
    };
    let siblings = Category::find()
        .filter(category::Column::ParentId.eq(parent_id))
        .filter(category::Column::Id.ne(category.id))
        .count(txn)
        .await?;
    if siblings > 0 {
        return Err(ServiceError::ValidationError(format!(
            "{} and parent {} has {} other child categories; delete with save=false",
            owned, parent_id, siblings
        )));
    }
    Ok(parent_id)
}

async fn reattach(
    txn: &DatabaseTransaction,
    category: &category::Model,
    children: Vec<category::Model>,
) -> Result<Vec<category::Model>, ServiceError> {
    if children.is_empty() {
        return Ok(children);
    }

    for child in &children {
        ensure_unique_among_siblings(txn, category.parent_id, &child.name, Some(category.id))
            .await?;
    }
    Category::update_many()
        .col_expr(category::Column::ParentId, Expr::value(category.parent_id))
        .filter(category::Column::ParentId.eq(category.id))
        .exec(txn)
        .await?;

    Ok(children
        .into_iter()
        .map(|mut child| {
            child.parent_id = category.parent_id;
            child
        })
        .collect())
}

/// Siblings are compared after [`format_name`]. `exclude` skips the row being
/// renamed or removed.
async fn ensure_unique_among_siblings(
    txn: &DatabaseTransaction,
    parent_id: Option<Uuid>,
    name: &str,
    exclude: Option<Uuid>,
) -> Result<(), ServiceError> {
    let siblings = match parent_id {
        Some(parent_id) => Category::find().filter(category::Column::ParentId.eq(parent_id)),
        None => Category::find().filter(category::Column::ParentId.is_null()),
    }
    .all(txn)
    .await?;

    let formatted = format_name(name);
    if siblings
        .iter()
        .filter(|sibling| Some(sibling.id) != exclude)
        .any(|sibling| format_name(&sibling.name) == formatted)
    {
        return Err(ServiceError::Conflict(format!(
            "Category name '{}' is already in use",
            name
        )));
    }
    Ok(())
}

fn trimmed(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Category ids of the subtree rooted at `root`, one level per entry
async fn subtree_levels(
    txn: &DatabaseTransaction,
    root: Uuid,
) -> Result<Vec<Vec<Uuid>>, ServiceError> {
    let mut levels = Vec::new();
    let mut frontier = vec![root];
    while !frontier.is_empty() {
        let next: Vec<Uuid> = Category::find()
            .filter(category::Column::ParentId.is_in(frontier.iter().copied()))
            .select_only()
            .column(category::Column::Id)
            .into_tuple()
            .all(txn)
            .await?;
        levels.push(std::mem::replace(&mut frontier, next));
    }
    Ok(levels)
}

struct Resources {
    variations: Vec<variation::Model>,
    products: Vec<product::Model>,
}

impl Resources {
    fn is_empty(&self) -> bool {
        self.variations.is_empty() && self.products.is_empty()
    }
}

async fn owned_resources(
    txn: &DatabaseTransaction,
    category_ids: &[Uuid],
) -> Result<Resources, ServiceError> {
    let variations = Variation::find()
        .filter(variation::Column::CategoryId.is_in(category_ids.iter().copied()))
        .order_by_asc(variation::Column::Name)
        .all(txn)
        .await?;
    let products = Product::find()
        .filter(product::Column::CategoryId.is_in(category_ids.iter().copied()))
        .order_by_asc(product::Column::Name)
        .all(txn)
        .await?;
    Ok(Resources {
        variations,
        products,
    })
}

async fn relocate(
    txn: &DatabaseTransaction,
    resources: Resources,
    to: Uuid,
) -> Result<Relocation, ServiceError> {
    let now = Utc::now();

    if !resources.variations.is_empty() {
        Variation::update_many()
            .col_expr(variation::Column::CategoryId, Expr::value(to))
            .col_expr(variation::Column::UpdatedAt, Expr::value(now))
            .filter(variation::Column::Id.is_in(resources.variations.iter().map(|v| v.id)))
            .exec(txn)
            .await?;
    }
    if !resources.products.is_empty() {
        Product::update_many()
            .col_expr(product::Column::CategoryId, Expr::value(to))
            .filter(product::Column::Id.is_in(resources.products.iter().map(|p| p.id)))
            .exec(txn)
            .await?;
    }

    Ok(Relocation {
        variations: resources
            .variations
            .into_iter()
            .map(|mut v| {
                v.category_id = to;
                v.updated_at = now;
                v
            })
            .collect(),
        products: resources
            .products
            .into_iter()
            .map(|mut p| {
                p.category_id = to;
                p
            })
            .collect(),
    })
}

/// Deletes the products first, then each variation through the cascade.
///
/// Items elsewhere that used these variations' options are detached or,
/// when nothing else configures them, removed.
async fn purge(
    txn: &DatabaseTransaction,
    resources: Resources,
) -> Result<CategoryReport, ServiceError> {
    let mut report = CategoryReport::default();

    let product_ids: Vec<Uuid> = resources.products.iter().map(|p| p.id).collect();
    report.absorb(cascade::purge_products(txn, &product_ids).await?);

    for variation in &resources.variations {
        let radius = auditor::audit_variation(txn, variation.id).await?;
        let cascaded = cascade::execute(
            txn,
            &radius,
            SavePolicy::Discard,
            VariationRetention::DeleteIfEmpty,
        )
        .await?;
        report.absorb(cascaded);
    }

    Ok(report)
}
