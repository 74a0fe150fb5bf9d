use crate::{errors::ServiceError, services::catalog::VariationEngine};
use async_trait::async_trait;
use metrics::counter;
use tracing::warn;
use validator::Validate;

/// Command trait for implementing the Command Pattern
///
/// A command carries one request payload as it arrives from the HTTP layer,
/// validates it, runs it against the variation engine and shapes the response.
#[async_trait]
pub trait Command: Send + Sync {
    /// The return type of the command when executed successfully
    type Result;

    /// Execute the command against the given engine
    async fn execute(&self, engine: &VariationEngine) -> Result<Self::Result, ServiceError>;
}

pub mod variations;

/// Runs `validator` checks on a payload, counting failures per command
pub(crate) fn validate_payload<T: Validate>(
    payload: &T,
    command: &'static str,
) -> Result<(), ServiceError> {
    payload.validate().map_err(|e| {
        counter!("catalog.command.validation_failures", 1, "command" => command);
        let msg = format!("Invalid input: {}", e);
        warn!(command, "{}", msg);
        ServiceError::ValidationError(msg)
    })
}
