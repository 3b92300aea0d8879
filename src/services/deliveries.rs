use crate::{
    db::DbPool,
    entities::{
        delivery_order, delivery_order::Entity as DeliveryOrder, delivery_order_item,
        delivery_order_item::Entity as DeliveryOrderItem, sales_order,
        sales_order::Entity as SalesOrder, sales_order_item,
        sales_order_item::Entity as SalesOrderItem, DeliveryStatus, MovementReference,
        SalesOrderStatus, StockMovementType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
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

#[derive(Debug, Clone)]
pub struct DeliveryItemInput {
    pub product_id: i32,
    pub quantity: Decimal,
}

#[derive(Debug, Clone)]
pub struct CreateDeliveryInput {
    pub sales_order_id: i32,
    pub delivery_date: NaiveDate,
    pub recipient_name: String,
    pub recipient_phone: Option<String>,
    pub delivery_address: String,
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<DeliveryItemInput>,
}

/// Delivery orders fulfil sales orders, possibly across several partial
/// shipments. Stock leaves the warehouse when a delivery is marked shipped,
/// as `out` movements referencing the sales order.
pub struct DeliveryService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    allow_negative_stock: bool,
}

impl DeliveryService {
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

    /// Creates a pending delivery for part or all of a sales order. Each
    /// line must be on the order, and across all of the order's deliveries
    /// no product may exceed its ordered quantity.
    #[instrument(skip(self, input), fields(sales_order_id = input.sales_order_id))]
    pub async fn create_delivery(
        &self,
        input: CreateDeliveryInput,
    ) -> Result<delivery_order::Model, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "A delivery needs at least one item".to_string(),
            ));
        }
        for item in &input.items {
            if item.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Delivery quantity for product {} must be positive",
                    item.product_id
                )));
            }
        }

        let txn = self.db_pool.begin().await?;
        let order = SalesOrder::find_by_id(input.sales_order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Sales order {}", input.sales_order_id))
            })?;
        if order.status == SalesOrderStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(format!(
                "Sales order {} is cancelled",
                order.order_number
            )));
        }

        let remaining = remaining_quantities(&txn, &order).await?;
        for item in &input.items {
            let available = remaining.get(&item.product_id).copied().ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Product {} is not on sales order {}",
                    item.product_id, order.order_number
                ))
            })?;
            if item.quantity > available {
                return Err(ServiceError::ValidationError(format!(
                    "Delivery of {} for product {} exceeds remaining quantity {}",
                    item.quantity, item.product_id, available
                )));
            }
        }

        let delivery = delivery_order::ActiveModel {
            delivery_number: Set(next_delivery_number()),
            sales_order_id: Set(order.id),
            delivery_date: Set(input.delivery_date),
            recipient_name: Set(input.recipient_name),
            recipient_phone: Set(input.recipient_phone),
            delivery_address: Set(input.delivery_address),
            courier: Set(input.courier),
            tracking_number: Set(input.tracking_number),
            status: Set(DeliveryStatus::Pending),
            notes: Set(input.notes),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for item in input.items {
            delivery_order_item::ActiveModel {
                delivery_order_id: Set(delivery.id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::DeliveryOrderCreated {
                delivery_id: delivery.id,
                sales_order_id: delivery.sales_order_id,
            })
            .await;

        Ok(delivery)
    }

    /// Moves a delivery along pending -> shipped -> delivered. Shipping
    /// posts one `out` movement per item, in the same transaction as the
    /// status change.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        delivery_id: i32,
        new_status: DeliveryStatus,
        actor: i32,
    ) -> Result<delivery_order::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let delivery = DeliveryOrder::find_by_id(delivery_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Delivery order {}", delivery_id)))?;

        let allowed = matches!(
            (delivery.status, new_status),
            (DeliveryStatus::Pending, DeliveryStatus::Shipped)
                | (DeliveryStatus::Shipped, DeliveryStatus::Delivered)
        );
        if !allowed {
            return Err(ServiceError::InvalidStatusTransition {
                from: delivery.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        if new_status == DeliveryStatus::Shipped {
            let items = DeliveryOrderItem::find()
                .filter(delivery_order_item::Column::DeliveryOrderId.eq(delivery.id))
                .order_by_asc(delivery_order_item::Column::Id)
                .all(&txn)
                .await?;
            for item in items {
                apply_movement(
                    &txn,
                    self.allow_negative_stock,
                    NewMovement {
                        product_id: item.product_id,
                        movement_type: StockMovementType::Out,
                        quantity: item.quantity,
                        unit_cost: None,
                        reference: Some(MovementReference::SalesOrder(delivery.sales_order_id)),
                        notes: Some(format!("Shipped on {}", delivery.delivery_number)),
                        created_by: actor,
                    },
                )
                .await?;
            }
        }

        let old_status = delivery.status;
        let mut moved: delivery_order::ActiveModel = delivery.into();
        moved.status = Set(new_status);
        let delivery = moved.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::DeliveryOrderStatusChanged {
                delivery_id: delivery.id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await;

        Ok(delivery)
    }

    /// A delivery with its items.
    #[instrument(skip(self))]
    pub async fn get_delivery(
        &self,
        delivery_id: i32,
    ) -> Result<(delivery_order::Model, Vec<delivery_order_item::Model>), ServiceError> {
        let db = self.db_pool.as_ref();
        let delivery = DeliveryOrder::find_by_id(delivery_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Delivery order {}", delivery_id)))?;
        let items = DeliveryOrderItem::find()
            .filter(delivery_order_item::Column::DeliveryOrderId.eq(delivery_id))
            .order_by_asc(delivery_order_item::Column::Id)
            .all(db)
            .await?;
        Ok((delivery, items))
    }
}

fn next_delivery_number() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("DO-{}", &token[..8].to_uppercase())
}

/// Ordered quantity per product minus what existing deliveries of the order
/// already cover, whatever their status.
async fn remaining_quantities<C: ConnectionTrait>(
    conn: &C,
    order: &sales_order::Model,
) -> Result<BTreeMap<i32, Decimal>, ServiceError> {
    let ordered = SalesOrderItem::find()
        .filter(sales_order_item::Column::SalesOrderId.eq(order.id))
        .all(conn)
        .await?;
    let mut remaining = BTreeMap::new();
    for item in ordered {
        *remaining.entry(item.product_id).or_insert(Decimal::ZERO) += item.quantity;
    }

    let deliveries = DeliveryOrder::find()
        .filter(delivery_order::Column::SalesOrderId.eq(order.id))
        .all(conn)
        .await?;
    for delivery in deliveries {
        let items = DeliveryOrderItem::find()
            .filter(delivery_order_item::Column::DeliveryOrderId.eq(delivery.id))
            .all(conn)
            .await?;
        for item in items {
            if let Some(entry) = remaining.get_mut(&item.product_id) {
                *entry -= item.quantity;
            }
        }
    }

    Ok(remaining)
}
