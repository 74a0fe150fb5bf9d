use super::default_save;
use crate::{
    commands::{validate_payload, Command},
    entities::catalog::variation_option,
    errors::ServiceError,
    services::catalog::{Report, SavePolicy, UpdateVariationOptionRequest, VariationEngine},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVariationOptionCommand {
    pub option_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub value: Option<String>,
    pub variation_id: Option<Uuid>,
    #[serde(default = "default_save")]
    pub save: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVariationOptionResponse {
    pub variation_option: variation_option::Model,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incompatibilities: Option<Report>,
}

#[async_trait::async_trait]
impl Command for UpdateVariationOptionCommand {
    type Result = UpdateVariationOptionResponse;

    #[instrument(skip(self, engine))]
    async fn execute(&self, engine: &VariationEngine) -> Result<Self::Result, ServiceError> {
        validate_payload(self, "update_variation_option")?;

        let updated = engine
            .update_variation_option(UpdateVariationOptionRequest {
                option_id: self.option_id,
                value: self.value.clone(),
                variation_id: self.variation_id,
                save: SavePolicy::from_save_flag(self.save),
            })
            .await?;

        Ok(UpdateVariationOptionResponse {
            variation_option: updated.option,
            incompatibilities: Some(updated.incompatibilities).filter(|r| !r.is_empty()),
        })
    }
}
