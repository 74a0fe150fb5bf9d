//! Commands for the six variation operations, one per file

pub mod create_variation_command;
pub mod create_variation_options_command;
pub mod delete_variation_command;
pub mod delete_variation_option_command;
pub mod update_variation_command;
pub mod update_variation_option_command;

pub use create_variation_command::{CreateVariationCommand, CreateVariationResponse};
pub use create_variation_options_command::{
    CreateVariationOptionsCommand, CreateVariationOptionsResponse,
};
pub use delete_variation_command::{DeleteVariationCommand, DeleteVariationResponse};
pub use delete_variation_option_command::DeleteVariationOptionCommand;
pub use update_variation_command::{UpdateVariationCommand, UpdateVariationResponse};
pub use update_variation_option_command::{
    UpdateVariationOptionCommand, UpdateVariationOptionResponse,
};

use crate::entities::catalog::variation_option;
use serde::Serialize;

/// `save` defaults to true: destructive cascades must be asked for
pub(crate) fn default_save() -> bool {
    true
}

/// Options in a response: `variationOption` for exactly one, `variationOptions`
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OptionsPayload {
    #[serde(rename = "variationOption")]
    One(variation_option::Model),
    #[serde(rename = "variationOptions")]
    Many(Vec<variation_option::Model>),
}

impl From<Vec<variation_option::Model>> for OptionsPayload {
    fn from(mut options: Vec<variation_option::Model>) -> Self {
        if options.len() == 1 {
            if let Some(option) = options.pop() {
                return OptionsPayload::One(option);
            }
        }
        OptionsPayload::Many(options)
    }
}
