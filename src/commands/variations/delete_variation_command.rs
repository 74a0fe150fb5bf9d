use super::default_save;
use crate::{
    commands::{validate_payload, Command},
    entities::catalog::{variation, variation_option},
    errors::ServiceError,
    services::catalog::{Report, SavePolicy, VariationEngine},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVariationCommand {
    pub variation_id: Uuid,
    #[serde(default = "default_save")]
    pub save: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVariationResponse {
    pub variation: Option<variation::Model>,
    pub variation_options: Vec<variation_option::Model>,
    /// Present when product configurations, items or products went too
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incompatibilities: Option<Report>,
}

impl From<Report> for DeleteVariationResponse {
    fn from(report: Report) -> Self {
        let incompatibilities = report.touches_products().then(|| report.clone());
        Self {
            variation: report.variation,
            variation_options: report.variation_options,
            incompatibilities,
        }
    }
}

#[async_trait::async_trait]
impl Command for DeleteVariationCommand {
    type Result = DeleteVariationResponse;

    #[instrument(skip(self, engine))]
    async fn execute(&self, engine: &VariationEngine) -> Result<Self::Result, ServiceError> {
        validate_payload(self, "delete_variation")?;

        let report = engine
            .delete_variation(self.variation_id, SavePolicy::from_save_flag(self.save))
            .await?;

        Ok(report.into())
    }
}
