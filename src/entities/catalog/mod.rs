//! Catalog graph entities:
//! category → variation → variation_option → product_configuration → product_item → product

pub mod category;
pub mod product;
pub mod product_configuration;
pub mod product_item;
pub mod variation;
pub mod variation_option;

pub use category::{Entity as Category, Model as CategoryModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_configuration::{
    Entity as ProductConfiguration, Model as ProductConfigurationModel,
};
pub use product_item::{Entity as ProductItem, Model as ProductItemModel};
pub use variation::{Entity as Variation, Model as VariationModel};
pub use variation_option::{Entity as VariationOption, Model as VariationOptionModel};
