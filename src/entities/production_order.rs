use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::ProductionOrderStatus;

/// Order to produce `quantity` of a product by `target_date`.
/// Status machine: pending -> in_progress -> completed, with cancellation
/// allowed from pending or in_progress only.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "production_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub order_number: String,
    pub product_id: i32,
    pub quantity: Decimal,
    pub target_date: Date,
    pub status: ProductionOrderStatus,
    pub assigned_to: Option<i32>,
    pub actual_quantity: Option<Decimal>,
    pub start_date: Option<Date>,
    pub completion_date: Option<Date>,
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::production_material::Entity")]
    Materials,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::production_material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Materials.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
