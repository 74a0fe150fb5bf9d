//! Catalog services.
//!
//! The variation engine keeps the graph
//! category → variation → option → configuration → item → product consistent.
//! It is assembled from small components that all run against the caller's
//! open transaction:
//!
//! - [`category_gate`]: leaf checks for attachment points
//! - [`uniqueness`]: name/value collisions within a scope
//! - [`auditor`]: which product items depend on a set of options
//! - [`cascade`]: the decision table and the deletes it implies

pub mod auditor;
pub mod cascade;
pub mod category_gate;
pub mod category_service;
pub mod product_service;
pub mod sku;
pub mod uniqueness;
pub mod variation_engine;

pub use auditor::BlastRadius;
pub use cascade::{CascadePlan, CategoryReport, Report, SavePolicy, VariationRetention};
pub use category_service::{
    CategoryService, CreateCategoryRequest, CreatedCategory, DeletedCategory, Relocation,
    UpdateCategoryRequest,
};
pub use product_service::{
    CreateProductRequest, CreatedProduct, CreatedProductItem, NewProductItem, ProductService,
};
pub use uniqueness::{ConflictResolution, NameScope};
pub use variation_engine::{
    CreateVariationOptionsRequest, CreateVariationRequest, CreatedVariation, EngineSettings,
    UpdateVariationOptionRequest, UpdateVariationRequest, UpdatedVariation,
    UpdatedVariationOption, VariationEngine,
};
