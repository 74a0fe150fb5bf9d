use super::default_save;
use crate::{
    commands::{validate_payload, Command},
    entities::catalog::variation,
    errors::ServiceError,
    services::catalog::{Report, SavePolicy, UpdateVariationRequest, VariationEngine},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVariationCommand {
    pub variation_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub category_id: Option<Uuid>,
    #[serde(default = "default_save")]
    pub save: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateVariationResponse {
    pub variation: variation::Model,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incompatibilities: Option<Report>,
}

#[async_trait::async_trait]
impl Command for UpdateVariationCommand {
    type Result = UpdateVariationResponse;

    #[instrument(skip(self, engine))]
    async fn execute(&self, engine: &VariationEngine) -> Result<Self::Result, ServiceError> {
        validate_payload(self, "update_variation")?;

        let updated = engine
            .update_variation(UpdateVariationRequest {
                variation_id: self.variation_id,
                name: self.name.clone(),
                category_id: self.category_id,
                save: SavePolicy::from_save_flag(self.save),
            })
            .await?;

        Ok(UpdateVariationResponse {
            variation: updated.variation,
            incompatibilities: Some(updated.incompatibilities).filter(|r| !r.is_empty()),
        })
    }
}
