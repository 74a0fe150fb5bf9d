use super::OptionsPayload;
use crate::{
    commands::{validate_payload, Command},
    errors::ServiceError,
    services::catalog::{CreateVariationOptionsRequest, VariationEngine},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariationOptionsCommand {
    pub variation_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub value: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateVariationOptionsResponse {
    #[serde(flatten)]
    pub options: OptionsPayload,
}

#[async_trait::async_trait]
impl Command for CreateVariationOptionsCommand {
    type Result = CreateVariationOptionsResponse;

    #[instrument(skip(self, engine))]
    async fn execute(&self, engine: &VariationEngine) -> Result<Self::Result, ServiceError> {
        validate_payload(self, "create_variation_options")?;

        let options = engine
            .create_variation_options(CreateVariationOptionsRequest {
                variation_id: self.variation_id,
                value: self.value.clone(),
                values: self.values.clone(),
            })
            .await?;

        Ok(CreateVariationOptionsResponse {
            options: options.into(),
        })
    }
}
