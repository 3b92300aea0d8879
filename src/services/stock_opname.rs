use crate::{
    db::DbPool,
    entities::{
        product::Entity as Product, stock_opname, stock_opname::Entity as StockOpname,
        stock_opname_item, stock_opname_item::Entity as StockOpnameItem, MovementReference,
        OpnameStatus, StockMovementType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_ledger::{apply_movement, NewMovement},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::instrument;

/// One counted product in a stock opname.
#[derive(Debug, Clone)]
pub struct OpnameItemInput {
    pub product_id: i32,
    pub physical_stock: Decimal,
    pub notes: Option<String>,
}

/// Input for opening a stock opname (physical count) session.
#[derive(Debug, Clone)]
pub struct CreateOpnameInput {
    pub opname_date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<OpnameItemInput>,
    pub created_by: i32,
}

/// Stock opname: periodic reconciliation of counted stock against the
/// ledger. A draft records the count; completion posts one adjustment per
/// discrepancy and is idempotent-guarded by the draft status.
pub struct StockOpnameService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl StockOpnameService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Opens a draft opname, snapshotting each product's cached stock as
    /// the system quantity at count time.
    #[instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn create_opname(
        &self,
        input: CreateOpnameInput,
    ) -> Result<stock_opname::Model, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "An opname needs at least one counted product".to_string(),
            ));
        }
        for item in &input.items {
            if item.physical_stock < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Physical stock for product {} must not be negative",
                    item.product_id
                )));
            }
        }

        let txn = self.db_pool.begin().await?;
        let opname = stock_opname::ActiveModel {
            opname_date: Set(input.opname_date),
            notes: Set(input.notes),
            status: Set(OpnameStatus::Draft),
            created_at: Set(Utc::now()),
            created_by: Set(input.created_by),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for item in input.items {
            let counted = Product::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Product {}", item.product_id)))?;
            stock_opname_item::ActiveModel {
                stock_opname_id: Set(opname.id),
                product_id: Set(item.product_id),
                system_stock: Set(counted.current_stock),
                physical_stock: Set(item.physical_stock),
                difference: Set(item.physical_stock - counted.current_stock),
                notes: Set(item.notes),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(opname)
    }

    /// Completes a draft opname. The system quantity of each item is
    /// re-read at completion so counts taken while stock kept moving still
    /// reconcile to the physical number, and one signed adjustment is
    /// posted per non-zero difference. A completed opname cannot be
    /// completed again.
    #[instrument(skip(self))]
    pub async fn complete_opname(
        &self,
        opname_id: i32,
        completed_by: i32,
    ) -> Result<stock_opname::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let opname = StockOpname::find_by_id(opname_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock opname {}", opname_id)))?;
        if opname.status == OpnameStatus::Completed {
            return Err(ServiceError::AlreadyCompleted(format!(
                "Stock opname {}",
                opname_id
            )));
        }

        let items = StockOpnameItem::find()
            .filter(stock_opname_item::Column::StockOpnameId.eq(opname_id))
            .order_by_asc(stock_opname_item::Column::Id)
            .all(&txn)
            .await?;

        let mut adjustments = 0usize;
        for item in items {
            let current = Product::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Product {}", item.product_id)))?;
            let difference = item.physical_stock - current.current_stock;

            if !difference.is_zero() {
                // Result is exactly the physical count, which is
                // non-negative, so the negative-stock guard never trips.
                apply_movement(
                    &txn,
                    true,
                    NewMovement {
                        product_id: item.product_id,
                        movement_type: StockMovementType::Adjustment,
                        quantity: difference,
                        unit_cost: Some(current.cost_price),
                        reference: Some(MovementReference::StockOpname(opname_id)),
                        notes: Some(format!("Stock opname {} reconciliation", opname_id)),
                        created_by: completed_by,
                    },
                )
                .await?;
                adjustments += 1;
            }

            let physical = item.physical_stock;
            let mut reconciled: stock_opname_item::ActiveModel = item.into();
            reconciled.system_stock = Set(current.current_stock);
            reconciled.difference = Set(physical - current.current_stock);
            reconciled.update(&txn).await?;
        }

        let mut completed: stock_opname::ActiveModel = opname.into();
        completed.status = Set(OpnameStatus::Completed);
        let opname = completed.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::StockOpnameCompleted {
                opname_id: opname.id,
                adjustments,
            })
            .await;

        Ok(opname)
    }

    /// An opname with its items.
    #[instrument(skip(self))]
    pub async fn get_opname(
        &self,
        opname_id: i32,
    ) -> Result<(stock_opname::Model, Vec<stock_opname_item::Model>), ServiceError> {
        let db = self.db_pool.as_ref();
        let opname = StockOpname::find_by_id(opname_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Stock opname {}", opname_id)))?;
        let items = StockOpnameItem::find()
            .filter(stock_opname_item::Column::StockOpnameId.eq(opname_id))
            .order_by_asc(stock_opname_item::Column::Id)
            .all(db)
            .await?;
        Ok((opname, items))
    }
}
