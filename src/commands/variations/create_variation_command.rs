use super::OptionsPayload;
use crate::{
    commands::{validate_payload, Command},
    entities::catalog::variation,
    errors::ServiceError,
    services::catalog::{CreateVariationRequest, VariationEngine},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariationCommand {
    pub category_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub value: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateVariationResponse {
    pub variation: variation::Model,
    #[serde(flatten)]
    pub options: OptionsPayload,
}

#[async_trait::async_trait]
impl Command for CreateVariationCommand {
    type Result = CreateVariationResponse;

    #[instrument(skip(self, engine))]
    async fn execute(&self, engine: &VariationEngine) -> Result<Self::Result, ServiceError> {
        validate_payload(self, "create_variation")?;

        let created = engine
            .create_variation(CreateVariationRequest {
                category_id: self.category_id,
                name: self.name.clone(),
                value: self.value.clone(),
                values: self.values.clone(),
            })
            .await?;

        Ok(CreateVariationResponse {
            variation: created.variation,
            options: created.options.into(),
        })
    }
}
