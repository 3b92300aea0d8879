use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::enums::StockMovementType;

/// Append-only stock ledger entry. Rows are never updated or deleted;
/// corrections are posted as compensating `adjustment` movements.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub product_id: i32,
    pub movement_type: StockMovementType,
    /// Magnitude for `in`/`out`/`production_*`; signed for `adjustment`.
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub reference_type: Option<String>,
    pub reference_id: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub created_by: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Tag for the polymorphic back-reference on a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ReferenceType {
    SalesOrder,
    ProductionOrder,
    StockOpname,
}

/// Typed view over the `(reference_type, reference_id)` column pair, so
/// lookups by originating document stay type-safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementReference {
    SalesOrder(i32),
    ProductionOrder(i32),
    StockOpname(i32),
}

impl MovementReference {
    pub fn reference_type(&self) -> ReferenceType {
        match self {
            Self::SalesOrder(_) => ReferenceType::SalesOrder,
            Self::ProductionOrder(_) => ReferenceType::ProductionOrder,
            Self::StockOpname(_) => ReferenceType::StockOpname,
        }
    }

    pub fn reference_id(&self) -> i32 {
        match self {
            Self::SalesOrder(id) | Self::ProductionOrder(id) | Self::StockOpname(id) => *id,
        }
    }

    /// Splits into the persisted column pair.
    pub fn into_columns(self) -> (String, i32) {
        (self.reference_type().to_string(), self.reference_id())
    }

    /// Reassembles from the persisted column pair. An unknown tag is an
    /// error, not an absent reference: it means the row is corrupt.
    pub fn from_columns(
        reference_type: &str,
        reference_id: i32,
    ) -> Result<Self, strum::ParseError> {
        Ok(match reference_type.parse::<ReferenceType>()? {
            ReferenceType::SalesOrder => Self::SalesOrder(reference_id),
            ReferenceType::ProductionOrder => Self::ProductionOrder(reference_id),
            ReferenceType::StockOpname => Self::StockOpname(reference_id),
        })
    }
}

impl Model {
    /// Typed reference of this movement: `Ok(None)` when the movement has
    /// no originating document, `Err` when the stored tag does not parse.
    pub fn reference(&self) -> Result<Option<MovementReference>, strum::ParseError> {
        match (self.reference_type.as_deref(), self.reference_id) {
            (Some(ty), Some(id)) => MovementReference::from_columns(ty, id).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_round_trips_through_columns() {
        let reference = MovementReference::ProductionOrder(42);
        let (ty, id) = reference.into_columns();
        assert_eq!(ty, "production_order");
        assert_eq!(MovementReference::from_columns(&ty, id), Ok(reference));
    }

    #[test]
    fn unknown_reference_tag_is_an_error() {
        assert!(MovementReference::from_columns("purchase_order", 1).is_err());
    }
}
