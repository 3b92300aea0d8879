use crate::{
    db::DbPool,
    entities::{
        product::Entity as Product, production_material,
        production_material::Entity as ProductionMaterial, production_order,
        production_order::Entity as ProductionOrder, MovementReference, ProductType,
        ProductionOrderStatus, StockMovementType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::bom::explode_product,
    services::stock_ledger::{apply_movement, NewMovement},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Input for creating a production order.
#[derive(Debug, Clone)]
pub struct CreateProductionOrderInput {
    pub product_id: i32,
    pub quantity: Decimal,
    pub target_date: NaiveDate,
    pub assigned_to: Option<i32>,
    pub notes: Option<String>,
}

/// Reported total consumption of one material at settlement. Lines without
/// a report settle at their snapshot requirement.
#[derive(Debug, Clone)]
pub struct MaterialConsumption {
    pub material_id: i32,
    pub quantity: Decimal,
}

/// Production order lifecycle and material consumption.
///
/// Creating an order snapshots the exploded BOM into `production_materials`
/// so later BOM edits never change what an in-flight order consumes. Stock
/// only moves through the ledger: material issues post `production_out`,
/// settlement posts `production_in`, cancellation returns what was issued.
pub struct ProductionService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    allow_negative_stock: bool,
}

impl ProductionService {
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

    /// Creates a pending order with a material snapshot from the product's
    /// active BOM, priced at each material's current cost.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub async fn create_order(
        &self,
        input: CreateProductionOrderInput,
    ) -> Result<production_order::Model, ServiceError> {
        if input.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Production quantity must be positive".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let target = Product::find_by_id(input.product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {}", input.product_id)))?;
        if target.product_type == ProductType::RawMaterial {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {} is a raw material and cannot be produced",
                target.code
            )));
        }

        let requirements = explode_product(db, input.product_id, input.quantity).await?;

        let txn = self.db_pool.begin().await?;
        let order = production_order::ActiveModel {
            order_number: Set(next_order_number()),
            product_id: Set(input.product_id),
            quantity: Set(input.quantity),
            target_date: Set(input.target_date),
            status: Set(ProductionOrderStatus::Pending),
            assigned_to: Set(input.assigned_to),
            notes: Set(input.notes),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for requirement in requirements {
            let material = Product::find_by_id(requirement.material_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Material {}", requirement.material_id))
                })?;
            production_material::ActiveModel {
                production_order_id: Set(order.id),
                material_id: Set(requirement.material_id),
                required_quantity: Set(requirement.quantity),
                used_quantity: Set(None),
                unit_cost: Set(material.cost_price),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductionOrderCreated {
                order_id: order.id,
                product_id: order.product_id,
            })
            .await;

        Ok(order)
    }

    /// Moves a pending order into progress.
    #[instrument(skip(self))]
    pub async fn start_order(&self, order_id: i32) -> Result<production_order::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let order = find_order(db, order_id).await?;
        require_status(&order, ProductionOrderStatus::Pending, "in_progress")?;

        let mut started: production_order::ActiveModel = order.into();
        started.status = Set(ProductionOrderStatus::InProgress);
        started.start_date = Set(Some(Utc::now().date_naive()));
        let order = started.update(db).await?;

        self.event_sender
            .send_or_log(Event::ProductionOrderStarted { order_id: order.id })
            .await;

        Ok(order)
    }

    /// Issues material to an in-progress order: posts a `production_out`
    /// movement and adds to the snapshot line's used quantity. Issuing more
    /// than the snapshot requires is allowed (scrap, rework); issuing more
    /// than is on hand is not.
    #[instrument(skip(self))]
    pub async fn issue_material(
        &self,
        order_id: i32,
        material_id: i32,
        quantity: Decimal,
        created_by: i32,
    ) -> Result<production_material::Model, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Issued quantity must be positive".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await?;
        let order = find_order(&txn, order_id).await?;
        require_status(&order, ProductionOrderStatus::InProgress, "material issue")?;

        let line = ProductionMaterial::find()
            .filter(production_material::Column::ProductionOrderId.eq(order_id))
            .filter(production_material::Column::MaterialId.eq(material_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Material {} is not on production order {}",
                    material_id, order.order_number
                ))
            })?;

        issue_line(&txn, self.allow_negative_stock, &order, &line, quantity, created_by).await?;

        let used = line.used_quantity.unwrap_or(Decimal::ZERO) + quantity;
        let mut updated: production_material::ActiveModel = line.into();
        updated.used_quantity = Set(Some(used));
        let line = updated.update(&txn).await?;

        txn.commit().await?;
        Ok(line)
    }

    /// Settles an in-progress order: issues each snapshot line up to its
    /// reported total consumption (the snapshot requirement when no report
    /// is given), then receives `actual_quantity` of the finished product at
    /// a unit cost of total consumed material cost over actual quantity.
    #[instrument(skip(self, consumed_materials))]
    pub async fn complete_order(
        &self,
        order_id: i32,
        actual_quantity: Decimal,
        consumed_materials: Vec<MaterialConsumption>,
        created_by: i32,
    ) -> Result<production_order::Model, ServiceError> {
        if actual_quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Actual quantity must be positive".to_string(),
            ));
        }
        for report in &consumed_materials {
            if report.quantity < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Consumed quantity must not be negative".to_string(),
                ));
            }
        }

        let txn = self.db_pool.begin().await?;
        let order = find_order(&txn, order_id).await?;
        if order.status == ProductionOrderStatus::Completed {
            return Err(ServiceError::AlreadyCompleted(format!(
                "Production order {}",
                order.order_number
            )));
        }
        require_status(&order, ProductionOrderStatus::InProgress, "completed")?;

        let lines = ProductionMaterial::find()
            .filter(production_material::Column::ProductionOrderId.eq(order_id))
            .order_by_asc(production_material::Column::Id)
            .all(&txn)
            .await?;
        let mut reported: BTreeMap<i32, Decimal> = BTreeMap::new();
        for report in consumed_materials {
            reported.insert(report.material_id, report.quantity);
        }
        for line in &lines {
            reported.entry(line.material_id).or_insert(line.required_quantity);
        }
        if reported.len() > lines.len() {
            return Err(ServiceError::ValidationError(format!(
                "Consumption reported for a material not on production order {}",
                order.order_number
            )));
        }

        let mut total_material_cost = Decimal::ZERO;
        for line in lines {
            let used = line.used_quantity.unwrap_or(Decimal::ZERO);
            let consumed = reported
                .get(&line.material_id)
                .copied()
                .unwrap_or(line.required_quantity);
            if consumed < used {
                return Err(ServiceError::ValidationError(format!(
                    "Material {} already issued {} but only {} reported consumed",
                    line.material_id, used, consumed
                )));
            }
            let remaining = consumed - used;
            if remaining > Decimal::ZERO {
                issue_line(
                    &txn,
                    self.allow_negative_stock,
                    &order,
                    &line,
                    remaining,
                    created_by,
                )
                .await?;
            }
            total_material_cost += (consumed * line.unit_cost).round_dp(2);

            let mut settled: production_material::ActiveModel = line.into();
            settled.used_quantity = Set(Some(consumed));
            settled.update(&txn).await?;
        }

        let unit_cost = (total_material_cost / actual_quantity).round_dp(2);
        apply_movement(
            &txn,
            self.allow_negative_stock,
            NewMovement {
                product_id: order.product_id,
                movement_type: StockMovementType::ProductionIn,
                quantity: actual_quantity,
                unit_cost: Some(unit_cost),
                reference: Some(MovementReference::ProductionOrder(order.id)),
                notes: Some(format!("Production receipt {}", order.order_number)),
                created_by,
            },
        )
        .await?;

        let mut completed: production_order::ActiveModel = order.into();
        completed.status = Set(ProductionOrderStatus::Completed);
        completed.actual_quantity = Set(Some(actual_quantity));
        completed.completion_date = Set(Some(Utc::now().date_naive()));
        let order = completed.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductionOrderCompleted {
                order_id: order.id,
                actual_quantity,
            })
            .await;

        Ok(order)
    }

    /// Cancels a pending or in-progress order. Material already issued is
    /// returned to stock through compensating adjustments, so the ledger
    /// keeps both the issue and the return.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: i32,
        created_by: i32,
    ) -> Result<production_order::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let order = find_order(&txn, order_id).await?;
        match order.status {
            ProductionOrderStatus::Pending | ProductionOrderStatus::InProgress => {}
            other => {
                return Err(ServiceError::InvalidStatusTransition {
                    from: other.as_str().to_string(),
                    to: "cancelled".to_string(),
                })
            }
        }

        let lines = ProductionMaterial::find()
            .filter(production_material::Column::ProductionOrderId.eq(order_id))
            .all(&txn)
            .await?;
        for line in lines {
            let used = line.used_quantity.unwrap_or(Decimal::ZERO);
            if used > Decimal::ZERO {
                apply_movement(
                    &txn,
                    self.allow_negative_stock,
                    NewMovement {
                        product_id: line.material_id,
                        movement_type: StockMovementType::Adjustment,
                        quantity: used,
                        unit_cost: Some(line.unit_cost),
                        reference: Some(MovementReference::ProductionOrder(order.id)),
                        notes: Some(format!(
                            "Material returned on cancellation of {}",
                            order.order_number
                        )),
                        created_by,
                    },
                )
                .await?;
            }
        }

        let mut cancelled: production_order::ActiveModel = order.into();
        cancelled.status = Set(ProductionOrderStatus::Cancelled);
        let order = cancelled.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductionOrderCancelled { order_id: order.id })
            .await;

        Ok(order)
    }

    /// Material snapshot of an order, in line order.
    #[instrument(skip(self))]
    pub async fn order_materials(
        &self,
        order_id: i32,
    ) -> Result<Vec<production_material::Model>, ServiceError> {
        let lines = ProductionMaterial::find()
            .filter(production_material::Column::ProductionOrderId.eq(order_id))
            .order_by_asc(production_material::Column::Id)
            .all(self.db_pool.as_ref())
            .await?;
        Ok(lines)
    }
}

fn next_order_number() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("PRD-{}", &token[..8].to_uppercase())
}

async fn find_order<C: ConnectionTrait>(
    conn: &C,
    order_id: i32,
) -> Result<production_order::Model, ServiceError> {
    ProductionOrder::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Production order {}", order_id)))
}

fn require_status(
    order: &production_order::Model,
    expected: ProductionOrderStatus,
    target: &str,
) -> Result<(), ServiceError> {
    if order.status != expected {
        return Err(ServiceError::InvalidStatusTransition {
            from: order.status.as_str().to_string(),
            to: target.to_string(),
        });
    }
    Ok(())
}

/// Posts one `production_out` movement for a snapshot line, surfacing a
/// shortage as [`ServiceError::MaterialShortage`].
async fn issue_line<C: ConnectionTrait>(
    conn: &C,
    allow_negative_stock: bool,
    order: &production_order::Model,
    line: &production_material::Model,
    quantity: Decimal,
    created_by: i32,
) -> Result<(), ServiceError> {
    apply_movement(
        conn,
        allow_negative_stock,
        NewMovement {
            product_id: line.material_id,
            movement_type: StockMovementType::ProductionOut,
            quantity,
            unit_cost: Some(line.unit_cost),
            reference: Some(MovementReference::ProductionOrder(order.id)),
            notes: Some(format!("Issued to {}", order.order_number)),
            created_by,
        },
    )
    .await
    .map_err(|err| match err {
        ServiceError::InsufficientStock {
            product_id,
            requested,
            available,
        } => ServiceError::MaterialShortage {
            material_id: product_id,
            requested,
            available,
        },
        other => other,
    })?;
    Ok(())
}
