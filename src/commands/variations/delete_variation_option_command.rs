use super::default_save;
use crate::{
    commands::{validate_payload, Command},
    errors::ServiceError,
    services::catalog::{Report, SavePolicy, VariationEngine},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVariationOptionCommand {
    pub option_id: Uuid,
    #[serde(default = "default_save")]
    pub save: bool,
}

#[async_trait::async_trait]
impl Command for DeleteVariationOptionCommand {
    /// The full deletion report
    type Result = Report;

    #[instrument(skip(self, engine))]
    async fn execute(&self, engine: &VariationEngine) -> Result<Self::Result, ServiceError> {
        validate_payload(self, "delete_variation_option")?;
        engine
            .delete_variation_option(self.option_id, SavePolicy::from_save_flag(self.save))
            .await
    }
}
