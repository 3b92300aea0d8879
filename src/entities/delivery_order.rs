use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::DeliveryStatus;

/// Fulfillment record for a sales order. Item quantities across all
/// deliveries of one order may never exceed the ordered quantities.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub delivery_number: String,
    pub sales_order_id: i32,
    pub delivery_date: Date,
    pub recipient_name: String,
    pub recipient_phone: Option<String>,
    pub delivery_address: String,
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub status: DeliveryStatus,
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sales_order::Entity",
        from = "Column::SalesOrderId",
        to = "super::sales_order::Column::Id"
    )]
    SalesOrder,
    #[sea_orm(has_many = "super::delivery_order_item::Entity")]
    Items,
}

impl Related<super::sales_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SalesOrder.def()
    }
}

impl Related<super::delivery_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
