use crate::{
    db::CatalogTransaction,
    entities::catalog::{
        category, product, product_configuration, product_item, variation, variation_option,
        Product, ProductConfiguration, ProductItem, Variation, VariationOption,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::{
        category_gate, sku::derive_sku, variation_engine::normalize_name, EngineSettings,
    },
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// One sellable item of a product, described by its option choices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProductItem {
    /// Derived from category, product and option names when absent
    #[serde(default)]
    pub sku: Option<String>,
    pub quantity: i32,
    /// Minor currency units
    pub price: i64,
    #[serde(default)]
    pub images: Vec<String>,
    /// Variation name → option value
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateProductRequest {
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub items: Vec<NewProductItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedProductItem {
    pub item: product_item::Model,
    pub option_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedProduct {
    pub product: product::Model,
    pub items: Vec<CreatedProductItem>,
}

/// Creates products and items against valid option combinations of their
/// category. Never touches variations or options themselves.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    settings: EngineSettings,
    event_sender: Option<Arc<EventSender>>,
}

impl ProductService {
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

    /// Creates a product with at least one item, all in one transaction
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<CreatedProduct, ServiceError> {
        let name = normalize_name(&request.name, "name")?;
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "A product needs at least one item".to_string(),
            ));
        }
        for item in &request.items {
            validate_item(item)?;
        }

        let txn = self.begin("create_product").await?;
        let outcome = create_product_in(&txn, &request, name).await;
        let created = txn.finish(outcome).await?;

        info!(
            product_id = %created.product.id,
            items = created.items.len(),
            "Product created"
        );
        self.publish(Event::ProductCreated {
            product_id: created.product.id,
            category_id: created.product.category_id,
            item_ids: created.items.iter().map(|i| i.item.id).collect(),
        })
        .await;

        Ok(created)
    }

    /// Adds an item to an existing product. Its option set must differ from
    /// every sibling item's.
    #[instrument(skip(self))]
    pub async fn add_product_item(
        &self,
        product_id: Uuid,
        item: NewProductItem,
    ) -> Result<CreatedProductItem, ServiceError> {
        validate_item(&item)?;

        let txn = self.begin("add_product_item").await?;
        let outcome = add_item_in(&txn, product_id, &item).await;
        let created = txn.finish(outcome).await?;

        info!(%product_id, item_id = %created.item.id, "Product item created");
        self.publish(Event::ProductItemCreated {
            product_id,
            item_id: created.item.id,
        })
        .await;

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        find_product(&*self.db, product_id).await
    }

    #[instrument(skip(self))]
    pub async fn product_items(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<product_item::Model>, ServiceError> {
        find_product(&*self.db, product_id).await?;
        Ok(ProductItem::find()
            .filter(product_item::Column::ProductId.eq(product_id))
            .order_by_asc(product_item::Column::Sku)
            .all(&*self.db)
            .await?)
    }

    /// Option ids configuring an item, sorted
    #[instrument(skip(self))]
    pub async fn item_option_ids(&self, item_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        ProductItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product item {} not found", item_id)))?;

        let mut ids: Vec<Uuid> = ProductConfiguration::find()
            .filter(product_configuration::Column::ProductItemId.eq(item_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|configuration| configuration.variation_option_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn begin(&self, operation: &'static str) -> Result<CatalogTransaction, ServiceError> {
        CatalogTransaction::begin(&self.db, operation, self.settings.transaction_options()).await
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event);
        }
    }
}

/// Variation name → (option value → option id) for one category
type AllowedOptions = BTreeMap<String, BTreeMap<String, Uuid>>;

fn validate_item(item: &NewProductItem) -> Result<(), ServiceError> {
    if item.options.is_empty() {
        return Err(ServiceError::ValidationError(
            "Every product item needs at least one variation option".to_string(),
        ));
    }
    if item.quantity < 0 {
        return Err(ServiceError::ValidationError(
            "Quantity must not be negative".to_string(),
        ));
    }
    if item.price < 0 {
        return Err(ServiceError::ValidationError(
            "Price must not be negative".to_string(),
        ));
    }
    Ok(())
}

async fn create_product_in(
    txn: &DatabaseTransaction,
    request: &CreateProductRequest,
    name: String,
) -> Result<CreatedProduct, ServiceError> {
    let category = category_gate::require_leaf(txn, request.category_id).await?;
    let allowed = allowed_options(txn, category.id).await?;

    let mut seen_sets = HashSet::new();
    let mut resolved = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let option_ids = resolve_options(&allowed, &item.options)?;
        if !seen_sets.insert(option_ids.clone()) {
            return Err(identical_options());
        }
        resolved.push(option_ids);
    }

    let product = product::ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(category.id),
        name: Set(name),
        description: Set(request.description.clone()),
        image: Set(request.image.clone()),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    let mut items = Vec::with_capacity(request.items.len());
    for (item, option_ids) in request.items.iter().zip(resolved) {
        items.push(insert_item(txn, &category, &product, item, option_ids).await?);
    }

    Ok(CreatedProduct { product, items })
}

async fn add_item_in(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    item: &NewProductItem,
) -> Result<CreatedProductItem, ServiceError> {
    let product = find_product(txn, product_id).await?;
    let category = category_gate::require_leaf(txn, product.category_id).await?;
    let allowed = allowed_options(txn, category.id).await?;
    let option_ids = resolve_options(&allowed, &item.options)?;

    let sibling_ids: Vec<Uuid> = ProductItem::find()
        .filter(product_item::Column::ProductId.eq(product_id))
        .all(txn)
        .await?
        .into_iter()
        .map(|sibling| sibling.id)
        .collect();

    if !sibling_ids.is_empty() {
        let mut sibling_sets: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        for configuration in ProductConfiguration::find()
            .filter(product_configuration::Column::ProductItemId.is_in(sibling_ids))
            .all(txn)
            .await?
        {
            sibling_sets
                .entry(configuration.product_item_id)
                .or_default()
                .insert(configuration.variation_option_id);
        }
        let candidate: BTreeSet<Uuid> = option_ids.iter().copied().collect();
        if sibling_sets.values().any(|set| *set == candidate) {
            return Err(identical_options());
        }
    }

    insert_item(txn, &category, &product, item, option_ids).await
}

async fn insert_item(
    txn: &DatabaseTransaction,
    category: &category::Model,
    product: &product::Model,
    item: &NewProductItem,
    option_ids: Vec<Uuid>,
) -> Result<CreatedProductItem, ServiceError> {
    let sku = match item.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(sku) => sku.to_string(),
        None => derive_sku(
            &category.name,
            &product.name,
            item.options.values().map(String::as_str),
        ),
    };
    ensure_unique_sku(txn, &sku).await?;

    let item_model = product_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product.id),
        sku: Set(sku),
        quantity: Set(item.quantity),
        images: Set(serde_json::Value::from(item.images.clone())),
        price: Set(item.price),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    for option_id in &option_ids {
        product_configuration::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_item_id: Set(item_model.id),
            variation_option_id: Set(*option_id),
        }
        .insert(txn)
        .await?;
    }

    debug!(item_id = %item_model.id, sku = %item_model.sku, "Inserted product item");
    Ok(CreatedProductItem {
        item: item_model,
        option_ids,
    })
}

async fn allowed_options(
    txn: &DatabaseTransaction,
    category_id: Uuid,
) -> Result<AllowedOptions, ServiceError> {
    let variations = Variation::find()
        .filter(variation::Column::CategoryId.eq(category_id))
        .all(txn)
        .await?;
    if variations.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "Category {} doesn't have any variations",
            category_id
        )));
    }

    let names: BTreeMap<Uuid, String> = variations
        .into_iter()
        .map(|variation| (variation.id, variation.name))
        .collect();

    let mut allowed: AllowedOptions = names
        .values()
        .map(|name| (name.clone(), BTreeMap::new()))
        .collect();
    for option in VariationOption::find()
        .filter(variation_option::Column::VariationId.is_in(names.keys().copied()))
        .all(txn)
        .await?
    {
        if let Some(values) = names
            .get(&option.variation_id)
            .and_then(|name| allowed.get_mut(name))
        {
            values.insert(option.value, option.id);
        }
    }
    Ok(allowed)
}

/// Maps `{variation name → value}` onto sorted option ids
fn resolve_options(
    allowed: &AllowedOptions,
    choices: &BTreeMap<String, String>,
) -> Result<Vec<Uuid>, ServiceError> {
    let mut option_ids = Vec::with_capacity(choices.len());
    for (variation_name, value) in choices {
        let values = allowed.get(variation_name.trim()).ok_or_else(|| {
            ServiceError::ValidationError(format!("Variation {} does not exist", variation_name))
        })?;
        let option_id = values.get(value.trim()).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Wrong variation option provided for: {}, value: {} does not exist",
                variation_name, value
            ))
        })?;
        option_ids.push(*option_id);
    }
    option_ids.sort();
    Ok(option_ids)
}

fn identical_options() -> ServiceError {
    ServiceError::ValidationError(
        "Different product items cannot have the same variation options".to_string(),
    )
}

async fn ensure_unique_sku(txn: &DatabaseTransaction, sku: &str) -> Result<(), ServiceError> {
    let existing = ProductItem::find()
        .filter(product_item::Column::Sku.eq(sku))
        .one(txn)
        .await?;
    if existing.is_some() {
        return Err(ServiceError::Conflict(format!(
            "SKU '{}' is already in use",
            sku
        )));
    }
    Ok(())
}

async fn find_product<C: sea_orm::ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    Product::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
}
