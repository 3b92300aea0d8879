use crate::{
    db::DbPool,
    dto::CreateSalesOrderRequest,
    entities::{
        customer::Entity as Customer, product::Entity as Product, sales_order,
        sales_order::Entity as SalesOrder, sales_order_item,
        sales_order_item::Entity as SalesOrderItem, PaymentStatus, SalesOrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

/// Sales order lifecycle and payment tracking.
///
/// Order statuses form a single forward chain; cancellation is allowed from
/// any non-terminal status. Shipping stock leaves the warehouse through
/// delivery orders, not here, so a status change on its own never moves
/// stock.
pub struct SalesOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl SalesOrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates an order with its items. Line totals and header totals are
    /// computed here, never taken from the caller.
    #[instrument(skip(self, request), fields(customer_id = request.customer_id))]
    pub async fn create_order(
        &self,
        request: CreateSalesOrderRequest,
        created_by: i32,
    ) -> Result<sales_order::Model, ServiceError> {
        request.validate()?;
        for item in &request.items {
            if item.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be positive",
                    item.product_id
                )));
            }
            if item.unit_price < Decimal::ZERO
                || matches!(item.discount, Some(d) if d < Decimal::ZERO)
            {
                return Err(ServiceError::ValidationError(
                    "Prices and discounts must not be negative".to_string(),
                ));
            }
        }
        let shipping_cost = request.shipping_cost.unwrap_or(Decimal::ZERO);
        if shipping_cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Shipping cost must not be negative".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await?;
        Customer::find_by_id(request.customer_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {}", request.customer_id)))?;

        let mut subtotal = Decimal::ZERO;
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            Product::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Product {}", item.product_id)))?;
            let discount = item.discount.unwrap_or(Decimal::ZERO);
            let total_price = (item.quantity * item.unit_price - discount).round_dp(2);
            if total_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Discount exceeds line total for product {}",
                    item.product_id
                )));
            }
            subtotal += total_price;
            lines.push((item.clone(), discount, total_price));
        }
        let total_amount = subtotal + shipping_cost;

        let order = sales_order::ActiveModel {
            order_number: Set(next_order_number()),
            customer_id: Set(request.customer_id),
            order_date: Set(request.order_date),
            delivery_date: Set(request.delivery_date),
            status: Set(SalesOrderStatus::Pending),
            payment_status: Set(PaymentStatus::Unpaid),
            marketplace: Set(request.marketplace),
            marketplace_order_id: Set(request.marketplace_order_id),
            subtotal: Set(subtotal),
            shipping_cost: Set(shipping_cost),
            total_amount: Set(total_amount),
            paid_amount: Set(Decimal::ZERO),
            notes: Set(request.notes),
            created_at: Set(Utc::now()),
            created_by: Set(created_by),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for (item, discount, total_price) in lines {
            sales_order_item::ActiveModel {
                sales_order_id: Set(order.id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                discount: Set(discount),
                total_price: Set(total_price),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::SalesOrderCreated {
                order_id: order.id,
                customer_id: order.customer_id,
            })
            .await;

        Ok(order)
    }

    /// Advances the order one step along the status chain, or cancels it
    /// from any non-terminal status.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: i32,
        new_status: SalesOrderStatus,
    ) -> Result<sales_order::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let order = SalesOrder::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sales order {}", order_id)))?;

        if !transition_allowed(order.status, new_status) {
            return Err(ServiceError::InvalidStatusTransition {
                from: order.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        let old_status = order.status;
        let mut moved: sales_order::ActiveModel = order.into();
        moved.status = Set(new_status);
        let order = moved.update(db).await?;

        self.event_sender
            .send_or_log(Event::SalesOrderStatusChanged {
                order_id: order.id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await;

        Ok(order)
    }

    /// Records a payment against the order. The payment status is derived
    /// from the accumulated paid amount, and overpayment is rejected.
    #[instrument(skip(self))]
    pub async fn record_payment(
        &self,
        order_id: i32,
        amount: Decimal,
    ) -> Result<sales_order::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment amount must be positive".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await?;
        let order = SalesOrder::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sales order {}", order_id)))?;
        if order.status == SalesOrderStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(format!(
                "Sales order {} is cancelled",
                order.order_number
            )));
        }

        let paid_amount = order.paid_amount + amount;
        if paid_amount > order.total_amount {
            return Err(ServiceError::ValidationError(format!(
                "Payment of {} would exceed order total {}",
                amount, order.total_amount
            )));
        }

        let payment_status = if paid_amount >= order.total_amount {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        };

        let mut paid: sales_order::ActiveModel = order.into();
        paid.paid_amount = Set(paid_amount);
        paid.payment_status = Set(payment_status);
        let order = paid.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentRecorded {
                order_id: order.id,
                amount,
            })
            .await;

        Ok(order)
    }

    /// An order with its items.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: i32,
    ) -> Result<(sales_order::Model, Vec<sales_order_item::Model>), ServiceError> {
        let db = self.db_pool.as_ref();
        let order = SalesOrder::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Sales order {}", order_id)))?;
        let items = SalesOrderItem::find()
            .filter(sales_order_item::Column::SalesOrderId.eq(order_id))
            .order_by_asc(sales_order_item::Column::Id)
            .all(db)
            .await?;
        Ok((order, items))
    }
}

fn next_order_number() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("SO-{}", &token[..8].to_uppercase())
}

/// Forward chain plus cancellation from any non-terminal status.
fn transition_allowed(from: SalesOrderStatus, to: SalesOrderStatus) -> bool {
    use SalesOrderStatus::*;
    if to == Cancelled {
        return !from.is_terminal();
    }
    matches!(
        (from, to),
        (Pending, Confirmed)
            | (Confirmed, Production)
            | (Production, Ready)
            | (Ready, Shipped)
            | (Shipped, Delivered)
    )
}
