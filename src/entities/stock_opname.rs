use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::OpnameStatus;

/// Physical stock count session. Completing a draft opname posts one
/// adjustment movement per non-zero difference; completion is one-shot.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_opnames")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub opname_date: Date,
    pub notes: Option<String>,
    pub status: OpnameStatus,
    pub created_at: DateTimeUtc,
    pub created_by: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_opname_item::Entity")]
    Items,
}

impl Related<super::stock_opname_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
