use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One counted product within an opname. `system_stock` is snapshotted at
/// session creation; `difference = physical_stock - system_stock`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_opname_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub stock_opname_id: i32,
    pub product_id: i32,
    pub system_stock: Decimal,
    pub physical_stock: Decimal,
    pub difference: Decimal,
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_opname::Entity",
        from = "Column::StockOpnameId",
        to = "super::stock_opname::Column::Id"
    )]
    StockOpname,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::stock_opname::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockOpname.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
