use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Join row tying a product item to one variation option
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_configuration")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_item_id: Uuid,
    pub variation_option_id: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product_item::Entity",
        from = "Column::ProductItemId",
        to = "super::product_item::Column::Id"
    )]
    ProductItem,
    #[sea_orm(
        belongs_to = "super::variation_option::Entity",
        from = "Column::VariationOptionId",
        to = "super::variation_option::Column::Id"
    )]
    VariationOption,
}

impl Related<super::product_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductItem.def()
    }
}

impl Related<super::variation_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VariationOption.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
