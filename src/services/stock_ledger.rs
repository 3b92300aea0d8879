use crate::{
    db::DbPool,
    entities::{
        product, product::Entity as Product, stock_movement,
        stock_movement::Entity as StockMovement, MovementReference, StockMovementType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::instrument;

/// Input for posting one stock movement.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: i32,
    pub movement_type: StockMovementType,
    /// Positive magnitude for `in`/`out`/`production_*`; signed and non-zero
    /// for `adjustment`.
    pub quantity: Decimal,
    /// Falls back to the product's cost price when omitted.
    pub unit_cost: Option<Decimal>,
    pub reference: Option<MovementReference>,
    pub notes: Option<String>,
    pub created_by: i32,
}

/// Signed effect of a movement on `current_stock`.
pub(crate) fn signed_delta(movement_type: StockMovementType, quantity: Decimal) -> Decimal {
    match movement_type {
        StockMovementType::In | StockMovementType::ProductionIn => quantity,
        StockMovementType::Out | StockMovementType::ProductionOut => -quantity,
        StockMovementType::Adjustment => quantity,
    }
}

/// Inserts a movement row and folds its delta into the product's cached
/// stock, inside the caller's transaction. This is the only code path that
/// writes `products.current_stock`.
pub(crate) async fn apply_movement<C: ConnectionTrait>(
    conn: &C,
    allow_negative_stock: bool,
    input: NewMovement,
) -> Result<(stock_movement::Model, product::Model), ServiceError> {
    match input.movement_type {
        StockMovementType::Adjustment => {
            if input.quantity.is_zero() {
                return Err(ServiceError::ValidationError(
                    "Adjustment quantity must be non-zero".to_string(),
                ));
            }
        }
        _ => {
            if input.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Movement quantity must be positive".to_string(),
                ));
            }
        }
    }
    if matches!(input.unit_cost, Some(cost) if cost < Decimal::ZERO) {
        return Err(ServiceError::ValidationError(
            "Unit cost must not be negative".to_string(),
        ));
    }

    let target = Product::find_by_id(input.product_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {}", input.product_id)))?;

    let delta = signed_delta(input.movement_type, input.quantity);
    let new_stock = target.current_stock + delta;
    if new_stock < Decimal::ZERO && !allow_negative_stock {
        return Err(ServiceError::InsufficientStock {
            product_id: target.id,
            requested: delta.abs(),
            available: target.current_stock,
        });
    }

    let unit_cost = input.unit_cost.unwrap_or(target.cost_price);
    let total_cost = (unit_cost * input.quantity.abs()).round_dp(2);
    let (reference_type, reference_id) = match input.reference {
        Some(reference) => {
            let (ty, id) = reference.into_columns();
            (Some(ty), Some(id))
        }
        None => (None, None),
    };

    let now = Utc::now();
    let movement = stock_movement::ActiveModel {
        product_id: Set(input.product_id),
        movement_type: Set(input.movement_type),
        quantity: Set(input.quantity),
        unit_cost: Set(unit_cost),
        total_cost: Set(total_cost),
        reference_type: Set(reference_type),
        reference_id: Set(reference_id),
        notes: Set(input.notes),
        created_at: Set(now),
        created_by: Set(input.created_by),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    let mut product_update: product::ActiveModel = target.into();
    product_update.current_stock = Set(new_stock);
    product_update.updated_at = Set(now);
    let updated = product_update.update(conn).await?;

    Ok((movement, updated))
}

/// The stock ledger: every change to a product's on-hand quantity goes
/// through [`StockLedgerService::post_movement`], which appends a movement
/// row and updates the cached stock atomically.
pub struct StockLedgerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    allow_negative_stock: bool,
}

impl StockLedgerService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        allow_negative_stock: bool,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            allow_negative_stock,
        }
    }

    /// Posts one movement. Insert and stock update commit together; the
    /// movement events go out only after the commit.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub async fn post_movement(
        &self,
        input: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let (movement, updated) =
            apply_movement(&txn, self.allow_negative_stock, input).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::StockMovementPosted {
                movement_id: movement.id,
                product_id: movement.product_id,
                movement_type: movement.movement_type.as_str().to_string(),
                quantity: movement.quantity,
            })
            .await;
        if updated.current_stock < updated.minimum_stock {
            self.event_sender
                .send_or_log(Event::LowStock {
                    product_id: updated.id,
                    current_stock: updated.current_stock,
                    minimum_stock: updated.minimum_stock,
                })
                .await;
        }

        Ok(movement)
    }

    /// Full movement history of a product, oldest first.
    #[instrument(skip(self))]
    pub async fn movements_for_product(
        &self,
        product_id: i32,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let movements = StockMovement::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .order_by_asc(stock_movement::Column::Id)
            .all(self.db_pool.as_ref())
            .await?;
        Ok(movements)
    }

    /// All movements posted against one originating document.
    #[instrument(skip(self))]
    pub async fn movements_for_reference(
        &self,
        reference: MovementReference,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let (reference_type, reference_id) = reference.into_columns();
        let movements = StockMovement::find()
            .filter(stock_movement::Column::ReferenceType.eq(reference_type))
            .filter(stock_movement::Column::ReferenceId.eq(reference_id))
            .order_by_asc(stock_movement::Column::Id)
            .all(self.db_pool.as_ref())
            .await?;
        Ok(movements)
    }

    /// Recomputes the signed sum of a product's movements and checks it
    /// against the cached stock. Returns the ledger sum on success. Both
    /// reads happen inside one transaction: a movement committed between
    /// them must not show up in the sum without its stock update, or the
    /// check would flag a healthy ledger.
    #[instrument(skip(self))]
    pub async fn verify_product_ledger(&self, product_id: i32) -> Result<Decimal, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let target = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {}", product_id)))?;

        let movements = StockMovement::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .all(&txn)
            .await?;
        txn.commit().await?;
        let computed: Decimal = movements
            .iter()
            .map(|m| signed_delta(m.movement_type, m.quantity))
            .sum();

        if computed != target.current_stock {
            return Err(ServiceError::LedgerCorruption {
                product_id,
                cached: target.current_stock,
                computed,
            });
        }
        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn inbound_movements_add() {
        assert_eq!(signed_delta(StockMovementType::In, dec!(4)), dec!(4));
        assert_eq!(
            signed_delta(StockMovementType::ProductionIn, dec!(2.5)),
            dec!(2.5)
        );
    }

    #[test]
    fn outbound_movements_subtract() {
        assert_eq!(signed_delta(StockMovementType::Out, dec!(4)), dec!(-4));
        assert_eq!(
            signed_delta(StockMovementType::ProductionOut, dec!(1.25)),
            dec!(-1.25)
        );
    }

    #[test]
    fn adjustments_keep_their_sign() {
        assert_eq!(
            signed_delta(StockMovementType::Adjustment, dec!(-3)),
            dec!(-3)
        );
        assert_eq!(signed_delta(StockMovementType::Adjustment, dec!(3)), dec!(3));
    }
}
