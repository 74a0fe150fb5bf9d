use crate::{
    config::AppConfig,
    db::{CatalogTransaction, TransactionOptions},
    entities::catalog::{variation, variation_option, Variation, VariationOption},
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::{
        auditor,
        cascade::{self, Report, SavePolicy, VariationRetention},
        category_gate,
        uniqueness::{self, ConflictResolution, NameScope},
    },
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IsolationLevel, QueryFilter, QueryOrder, Set,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Collision checks per rename: the first attempt plus one retry after eviction
const RENAME_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Isolation level of every catalog mutation
    pub isolation: IsolationLevel,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::Serializable,
        }
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            isolation: cfg.isolation_level(),
        }
    }
}

impl EngineSettings {
    pub(crate) fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::with_isolation(self.isolation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVariationRequest {
    pub category_id: Uuid,
    pub name: String,
    pub value: Option<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateVariationRequest {
    pub variation_id: Uuid,
    pub name: Option<String>,
    pub category_id: Option<Uuid>,
    pub save: SavePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVariationOptionsRequest {
    pub variation_id: Uuid,
    pub value: Option<String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateVariationOptionRequest {
    pub option_id: Uuid,
    pub value: Option<String>,
    pub variation_id: Option<Uuid>,
    pub save: SavePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedVariation {
    pub variation: variation::Model,
    pub options: Vec<variation_option::Model>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedVariation {
    pub variation: variation::Model,
    /// What eviction of a colliding variation removed; empty otherwise
    pub incompatibilities: Report,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedVariationOption {
    pub option: variation_option::Model,
    pub incompatibilities: Report,
}

/// Creates, renames, moves and deletes variations and their options while
/// keeping every dependent configuration, item and product consistent.
///
/// Holds no per-call state: each operation opens its own transaction, so one
/// engine can be shared across request workers.
#[derive(Clone)]
pub struct VariationEngine {
    db: Arc<DatabaseConnection>,
    settings: EngineSettings,
    event_sender: Option<Arc<EventSender>>,
}

impl VariationEngine {
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

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Creates a variation on a leaf category together with its options.
    #[instrument(skip(self))]
    pub async fn create_variation(
        &self,
        request: CreateVariationRequest,
    ) -> Result<CreatedVariation, ServiceError> {
        let name = normalize_name(&request.name, "name")?;
        let values = normalize_values(request.value.as_deref(), &request.values)?;

        let txn = self.begin("create_variation").await?;
        let outcome = create_variation_in(&txn, request.category_id, name, values).await;
        let created = txn.finish(outcome).await?;

        info!(
            variation_id = %created.variation.id,
            category_id = %created.variation.category_id,
            options = created.options.len(),
            "Variation created"
        );
        self.publish(Event::VariationCreated {
            variation_id: created.variation.id,
            category_id: created.variation.category_id,
            option_ids: created.options.iter().map(|o| o.id).collect(),
        })
        .await;

        Ok(created)
    }

    /// Renames and/or moves a variation. A name already taken in the
    /// destination category is evicted under `SavePolicy::Discard`.
    #[instrument(skip(self))]
    pub async fn update_variation(
        &self,
        request: UpdateVariationRequest,
    ) -> Result<UpdatedVariation, ServiceError> {
        if request.name.is_none() && request.category_id.is_none() {
            return Err(ServiceError::ValidationError(
                "No data provided to update variation".to_string(),
            ));
        }
        let name = request
            .name
            .as_deref()
            .map(|name| normalize_name(name, "name"))
            .transpose()?;

        let txn = self.begin("update_variation").await?;
        let outcome = update_variation_in(&txn, &request, name).await;
        let updated = txn.finish(outcome).await?;

        info!(variation_id = %updated.variation.id, "Variation updated");
        self.publish_purge(&updated.incompatibilities).await;
        self.publish(Event::VariationUpdated {
            variation_id: updated.variation.id,
            category_id: updated.variation.category_id,
        })
        .await;

        Ok(updated)
    }

    /// Deletes a variation and all of its options, cascading into dependent
    /// product items according to `save`.
    #[instrument(skip(self))]
    pub async fn delete_variation(
        &self,
        variation_id: Uuid,
        save: SavePolicy,
    ) -> Result<Report, ServiceError> {
        let txn = self.begin("delete_variation").await?;
        let outcome = delete_variation_in(&txn, variation_id, save).await;
        let report = txn.finish(outcome).await?;

        info!(%variation_id, "Variation deleted");
        self.publish_purge(&report).await;
        Ok(report)
    }

    /// Adds options to an existing variation. Values already present are a
    /// conflict; creation never evicts.
    #[instrument(skip(self))]
    pub async fn create_variation_options(
        &self,
        request: CreateVariationOptionsRequest,
    ) -> Result<Vec<variation_option::Model>, ServiceError> {
        let values = normalize_values(request.value.as_deref(), &request.values)?;

        let txn = self.begin("create_variation_options").await?;
        let outcome = create_options_in(&txn, request.variation_id, values).await;
        let options = txn.finish(outcome).await?;

        info!(
            variation_id = %request.variation_id,
            options = options.len(),
            "Variation options created"
        );
        self.publish(Event::VariationOptionsCreated {
            variation_id: request.variation_id,
            option_ids: options.iter().map(|o| o.id).collect(),
        })
        .await;

        Ok(options)
    }

    /// Changes an option's value and/or moves it to another variation.
    ///
    /// A value already held in the destination variation is evicted under
    /// `SavePolicy::Discard` and the update is retried exactly once.
    #[instrument(skip(self))]
    pub async fn update_variation_option(
        &self,
        request: UpdateVariationOptionRequest,
    ) -> Result<UpdatedVariationOption, ServiceError> {
        if request.value.is_none() && request.variation_id.is_none() {
            return Err(ServiceError::ValidationError(
                "No data provided to update variation option".to_string(),
            ));
        }
        let value = request
            .value
            .as_deref()
            .map(|value| normalize_name(value, "value"))
            .transpose()?;

        let txn = self.begin("update_variation_option").await?;
        let outcome = update_option_in(&txn, &request, value).await;
        let updated = txn.finish(outcome).await?;

        info!(option_id = %updated.option.id, "Variation option updated");
        self.publish_purge(&updated.incompatibilities).await;
        self.publish(Event::VariationOptionUpdated {
            option_id: updated.option.id,
            variation_id: updated.option.variation_id,
        })
        .await;

        Ok(updated)
    }

    /// Deletes one option, cascading into dependent product items according
    /// to `save`. The variation goes too when this was its last option.
    #[instrument(skip(self))]
    pub async fn delete_variation_option(
        &self,
        option_id: Uuid,
        save: SavePolicy,
    ) -> Result<Report, ServiceError> {
        let txn = self.begin("delete_variation_option").await?;
        let outcome = delete_option_in(&txn, option_id, save).await;
        let report = txn.finish(outcome).await?;

        info!(%option_id, "Variation option deleted");
        self.publish_purge(&report).await;
        Ok(report)
    }

    /// Options of a variation, ordered by value
    #[instrument(skip(self))]
    pub async fn variation_options(
        &self,
        variation_id: Uuid,
    ) -> Result<Vec<variation_option::Model>, ServiceError> {
        find_variation(&*self.db, variation_id).await?;
        Ok(VariationOption::find()
            .filter(variation_option::Column::VariationId.eq(variation_id))
            .order_by_asc(variation_option::Column::Value)
            .all(&*self.db)
            .await?)
    }

    /// Variations attached to a category, ordered by name
    #[instrument(skip(self))]
    pub async fn category_variations(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<variation::Model>, ServiceError> {
        Ok(Variation::find()
            .filter(variation::Column::CategoryId.eq(category_id))
            .order_by_asc(variation::Column::Name)
            .all(&*self.db)
            .await?)
    }

    async fn begin(&self, operation: &'static str) -> Result<CatalogTransaction, ServiceError> {
        CatalogTransaction::begin(&self.db, operation, self.settings.transaction_options()).await
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event);
        }
    }

    async fn publish_purge(&self, report: &Report) {
        if !report.is_empty() {
            self.publish(Event::CatalogPurged {
                report: report.clone(),
            })
            .await;
        }
    }
}

async fn create_variation_in(
    txn: &DatabaseTransaction,
    category_id: Uuid,
    name: String,
    values: Vec<String>,
) -> Result<CreatedVariation, ServiceError> {
    category_gate::require_leaf(txn, category_id).await?;
    uniqueness::check_name(
        txn,
        NameScope::VariationsInCategory(category_id),
        &name,
        ConflictResolution::Reject,
        None,
    )
    .await?;

    let now = Utc::now();
    let variation = variation::ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(category_id),
        name: Set(name),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    let options = insert_options(txn, variation.id, values).await?;
    Ok(CreatedVariation { variation, options })
}

async fn update_variation_in(
    txn: &DatabaseTransaction,
    request: &UpdateVariationRequest,
    name: Option<String>,
) -> Result<UpdatedVariation, ServiceError> {
    let current = find_variation(txn, request.variation_id).await?;
    let destination = request.category_id.unwrap_or(current.category_id);
    let target_name = name.unwrap_or_else(|| current.name.clone());

    if destination != current.category_id {
        category_gate::require_leaf(txn, destination).await?;
    }

    let mut incompatibilities = Report::default();
    if target_name != current.name || destination != current.category_id {
        let scope = NameScope::VariationsInCategory(destination);
        incompatibilities = claim_name(txn, scope, &target_name, current.id, request.save, |colliding| {
            Box::pin(async move {
                let radius = auditor::audit_variation(txn, colliding).await?;
                cascade::execute(txn, &radius, SavePolicy::Discard, VariationRetention::DeleteIfEmpty)
                    .await
            })
        })
        .await?;
    }

    let mut active: variation::ActiveModel = current.into();
    active.name = Set(target_name);
    active.category_id = Set(destination);
    active.updated_at = Set(Utc::now());
    let variation = active.update(txn).await?;

    Ok(UpdatedVariation {
        variation,
        incompatibilities,
    })
}

async fn delete_variation_in(
    txn: &DatabaseTransaction,
    variation_id: Uuid,
    save: SavePolicy,
) -> Result<Report, ServiceError> {
    let radius = auditor::audit_variation(txn, variation_id).await?;
    cascade::execute(txn, &radius, save, VariationRetention::DeleteIfEmpty).await
}

async fn create_options_in(
    txn: &DatabaseTransaction,
    variation_id: Uuid,
    values: Vec<String>,
) -> Result<Vec<variation_option::Model>, ServiceError> {
    find_variation(txn, variation_id).await?;
    for value in &values {
        uniqueness::check_name(
            txn,
            NameScope::OptionsInVariation(variation_id),
            value,
            ConflictResolution::Reject,
            None,
        )
        .await?;
    }
    insert_options(txn, variation_id, values).await
}

async fn update_option_in(
    txn: &DatabaseTransaction,
    request: &UpdateVariationOptionRequest,
    value: Option<String>,
) -> Result<UpdatedVariationOption, ServiceError> {
    let current = find_option(txn, request.option_id).await?;
    let destination = request.variation_id.unwrap_or(current.variation_id);
    let target_value = value.unwrap_or_else(|| current.value.clone());

    if destination != current.variation_id {
        find_variation(txn, destination).await?;
    }

    let mut incompatibilities = Report::default();
    if target_value != current.value || destination != current.variation_id {
        let scope = NameScope::OptionsInVariation(destination);
        incompatibilities = claim_name(txn, scope, &target_value, current.id, request.save, |colliding| {
            Box::pin(async move {
                let radius = auditor::audit_options(txn, &[colliding]).await?;
                // The destination variation is about to receive the moved option
                cascade::execute(txn, &radius, SavePolicy::Discard, VariationRetention::Keep).await
            })
        })
        .await?;
    }

    let mut active: variation_option::ActiveModel = current.into();
    active.value = Set(target_value);
    active.variation_id = Set(destination);
    active.updated_at = Set(Utc::now());
    let option = active.update(txn).await?;

    Ok(UpdatedVariationOption {
        option,
        incompatibilities,
    })
}

async fn delete_option_in(
    txn: &DatabaseTransaction,
    option_id: Uuid,
    save: SavePolicy,
) -> Result<Report, ServiceError> {
    let radius = auditor::audit_options(txn, &[option_id]).await?;
    cascade::execute(txn, &radius, save, VariationRetention::DeleteIfEmpty).await
}

type EvictionFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Report, ServiceError>> + Send + 'a>>;

/// Frees `proposed` in `scope` for row `owner`.
///
/// Under `SavePolicy::Preserve` a collision is a `Conflict`. Under
/// `SavePolicy::Discard` the colliding row is removed through `evict` and the
/// check runs once more; a second collision means the eviction did not take
/// and is reported as an internal error.
async fn claim_name<'a, F>(
    txn: &'a DatabaseTransaction,
    scope: NameScope,
    proposed: &str,
    owner: Uuid,
    save: SavePolicy,
    evict: F,
) -> Result<Report, ServiceError>
where
    F: Fn(Uuid) -> EvictionFuture<'a>,
{
    let mut report = Report::default();
    let mut resolution = ConflictResolution::from(save);

    for attempt in 0..RENAME_ATTEMPTS {
        let colliding =
            uniqueness::check_name(txn, scope, proposed, resolution, Some(owner)).await?;
        let Some(colliding) = colliding else {
            return Ok(report);
        };

        if attempt + 1 == RENAME_ATTEMPTS {
            return Err(ServiceError::InternalError(format!(
                "{} '{}' still held by {} after eviction",
                scope, proposed, colliding
            )));
        }

        warn!(%scope, proposed, %colliding, "Evicting colliding row");
        counter!("catalog.eviction", 1);
        report.absorb(evict(colliding).await?);
        resolution = ConflictResolution::Evict;
    }

    Ok(report)
}

async fn insert_options(
    txn: &DatabaseTransaction,
    variation_id: Uuid,
    values: Vec<String>,
) -> Result<Vec<variation_option::Model>, ServiceError> {
    let now = Utc::now();
    let mut options = Vec::with_capacity(values.len());
    for value in values {
        let option = variation_option::ActiveModel {
            id: Set(Uuid::new_v4()),
            variation_id: Set(variation_id),
            value: Set(value),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;
        options.push(option);
    }
    Ok(options)
}

async fn find_variation<C: sea_orm::ConnectionTrait>(
    conn: &C,
    variation_id: Uuid,
) -> Result<variation::Model, ServiceError> {
    Variation::find_by_id(variation_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Variation {} not found", variation_id)))
}

async fn find_option(
    txn: &DatabaseTransaction,
    option_id: Uuid,
) -> Result<variation_option::Model, ServiceError> {
    VariationOption::find_by_id(option_id)
        .one(txn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Variation option {} not found", option_id))
        })
}

/// Trims a name or value and rejects blanks
pub fn normalize_name(raw: &str, field: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "{} must not be blank",
            field
        )));
    }
    Ok(trimmed.to_string())
}

/// Merges the singular and plural value inputs into a sorted, duplicate-free
/// list of trimmed values. Blank entries and an empty result are rejected.
pub fn normalize_values(value: Option<&str>, values: &[String]) -> Result<Vec<String>, ServiceError> {
    let mut distinct = BTreeSet::new();
    for raw in value.into_iter().chain(values.iter().map(String::as_str)) {
        distinct.insert(normalize_name(raw, "value")?);
    }
    if distinct.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one value is required".to_string(),
        ));
    }
    Ok(distinct.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::entities::catalog::category;
    use assert_matches::assert_matches;
    use sea_orm::TransactionTrait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn memory_db() -> DatabaseConnection {
        // Every pooled connection would get its own in-memory database
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        };
        let db = establish_connection_with_config(&config).await.unwrap();
        run_migrations(&db).await.unwrap();
        db
    }

    async fn insert_variation(
        db: &DatabaseConnection,
        category_id: Uuid,
        name: &str,
    ) -> variation::Model {
        let now = Utc::now();
        variation::ActiveModel {
            id: Set(Uuid::new_v4()),
            category_id: Set(category_id),
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn claim_name_gives_up_when_eviction_frees_nothing() {
        let db = memory_db().await;
        let shoes = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            parent_id: Set(None),
            name: Set("Shoes".to_string()),
            description: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap();
        let size = insert_variation(&db, shoes.id, "Size").await;
        let fit = insert_variation(&db, shoes.id, "Fit").await;

        let evictions = AtomicUsize::new(0);
        let txn = db.begin().await.unwrap();
        let outcome = claim_name(
            &txn,
            NameScope::VariationsInCategory(shoes.id),
            "Size",
            fit.id,
            SavePolicy::Discard,
            |colliding| {
                assert_eq!(colliding, size.id);
                evictions.fetch_add(1, Ordering::SeqCst);
                let nothing: EvictionFuture<'_> = Box::pin(async { Ok(Report::default()) });
                nothing
            },
        )
        .await;
        txn.rollback().await.unwrap();

        assert_matches!(outcome, Err(ServiceError::InternalError(msg)) if msg.contains("Size"));
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn singular_and_plural_values_collapse() {
        let values = normalize_values(
            Some("10"),
            &["9".to_string(), "10".to_string(), " 10 ".to_string()],
        )
        .unwrap();
        assert_eq!(values, vec!["10".to_string(), "9".to_string()]);
    }

    #[test]
    fn empty_or_blank_values_are_rejected() {
        assert_matches!(
            normalize_values(None, &[]),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            normalize_values(Some("   "), &["M".to_string()]),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn names_are_trimmed() {
        assert_eq!(normalize_name("  Size ", "name").unwrap(), "Size");
        assert_matches!(
            normalize_name("\t", "name"),
            Err(ServiceError::ValidationError(msg)) if msg.contains("name")
        );
    }

    #[test]
    fn settings_follow_config_isolation() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "test".into());
        cfg.cascade_isolation = "repeatable_read".into();
        assert_eq!(
            EngineSettings::from(&cfg).isolation,
            IsolationLevel::RepeatableRead
        );
        assert_eq!(
            EngineSettings::default().isolation,
            IsolationLevel::Serializable
        );
    }
}
