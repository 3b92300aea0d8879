use crate::{
    db::DbPool,
    entities::{
        cogs_calculation, product, product::Entity as Product, production_material,
        production_material::Entity as ProductionMaterial,
        production_order::Entity as ProductionOrder, financial_report, sales_order,
        sales_order::Entity as SalesOrder, sales_order_item,
        sales_order_item::Entity as SalesOrderItem, ProductionOrderStatus, ReportPeriod,
        SalesOrderStatus,
    },
    errors::ServiceError,
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

/// Input for deriving a COGS record from a settled production order.
#[derive(Debug, Clone)]
pub struct RecordCogsInput {
    pub production_order_id: i32,
    pub labor_cost: Decimal,
    pub overhead_cost: Decimal,
    pub notes: Option<String>,
}

/// Costing and financial reporting. COGS records are derived from settled
/// production orders; financial reports aggregate sales, costing, and
/// inventory value over a day or a calendar month.
pub struct ReportService {
    db_pool: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Records cost of goods sold for a completed production order:
    /// material cost from the consumed snapshot, labor and overhead from
    /// the caller.
    #[instrument(skip(self, input), fields(production_order_id = input.production_order_id))]
    pub async fn record_cogs(
        &self,
        input: RecordCogsInput,
    ) -> Result<cogs_calculation::Model, ServiceError> {
        if input.labor_cost < Decimal::ZERO || input.overhead_cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Labor and overhead costs must not be negative".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let order = ProductionOrder::find_by_id(input.production_order_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Production order {}",
                    input.production_order_id
                ))
            })?;
        if order.status != ProductionOrderStatus::Completed {
            return Err(ServiceError::InvalidOperation(format!(
                "Production order {} is not completed",
                order.order_number
            )));
        }
        let quantity = order.actual_quantity.ok_or_else(|| {
            ServiceError::InvalidOperation(format!(
                "Production order {} has no actual quantity",
                order.order_number
            ))
        })?;

        let lines = ProductionMaterial::find()
            .filter(production_material::Column::ProductionOrderId.eq(order.id))
            .all(db)
            .await?;
        let material_cost: Decimal = lines
            .iter()
            .map(|line| {
                (line.used_quantity.unwrap_or(Decimal::ZERO) * line.unit_cost).round_dp(2)
            })
            .sum();

        let total_cogs = material_cost + input.labor_cost + input.overhead_cost;
        let unit_cogs = (total_cogs / quantity).round_dp(2);

        let record = cogs_calculation::ActiveModel {
            product_id: Set(order.product_id),
            calculation_date: Set(Utc::now().date_naive()),
            material_cost: Set(material_cost),
            labor_cost: Set(input.labor_cost),
            overhead_cost: Set(input.overhead_cost),
            total_cogs: Set(total_cogs),
            quantity: Set(quantity),
            unit_cogs: Set(unit_cogs),
            notes: Set(input.notes),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        Ok(record)
    }

    /// Builds and stores a financial report for the day or calendar month
    /// containing `report_date`. Cancelled orders are excluded; COGS is
    /// valued at each product's current cost price.
    #[instrument(skip(self))]
    pub async fn generate_financial_report(
        &self,
        report_type: ReportPeriod,
        report_date: NaiveDate,
        operating_expenses: Decimal,
    ) -> Result<financial_report::Model, ServiceError> {
        if operating_expenses < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Operating expenses must not be negative".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let (period_start, period_end) = period_bounds(report_type, report_date);

        let orders = SalesOrder::find()
            .filter(sales_order::Column::OrderDate.between(period_start, period_end))
            .filter(sales_order::Column::Status.ne(SalesOrderStatus::Cancelled))
            .all(db)
            .await?;

        let mut revenue = Decimal::ZERO;
        let mut cogs = Decimal::ZERO;
        for order in &orders {
            revenue += order.total_amount;
            let items = SalesOrderItem::find()
                .filter(sales_order_item::Column::SalesOrderId.eq(order.id))
                .all(db)
                .await?;
            for item in items {
                let sold = Product::find_by_id(item.product_id)
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Product {}", item.product_id))
                    })?;
                cogs += (item.quantity * sold.cost_price).round_dp(2);
            }
        }

        let gross_profit = revenue - cogs;
        let net_profit = gross_profit - operating_expenses;
        let inventory_value = self.inventory_valuation().await?;

        let report = financial_report::ActiveModel {
            report_date: Set(report_date),
            report_type: Set(report_type),
            revenue: Set(revenue),
            cogs: Set(cogs),
            gross_profit: Set(gross_profit),
            operating_expenses: Set(operating_expenses),
            net_profit: Set(net_profit),
            inventory_value: Set(inventory_value),
            data: Set(json!({
                "order_count": orders.len(),
                "period_start": period_start,
                "period_end": period_end,
            })),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        Ok(report)
    }

    /// Current inventory value: sum of cached stock times cost price over
    /// active products.
    #[instrument(skip(self))]
    pub async fn inventory_valuation(&self) -> Result<Decimal, ServiceError> {
        let products = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .all(self.db_pool.as_ref())
            .await?;
        let value = products
            .iter()
            .map(|p| (p.current_stock * p.cost_price).round_dp(2))
            .sum();
        Ok(value)
    }
}

/// Inclusive date bounds of the reporting period.
fn period_bounds(report_type: ReportPeriod, report_date: NaiveDate) -> (NaiveDate, NaiveDate) {
    match report_type {
        ReportPeriod::Daily => (report_date, report_date),
        ReportPeriod::Monthly => {
            let start = report_date.with_day(1).unwrap_or(report_date);
            let next_month = if start.month() == 12 {
                NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
            };
            let end = next_month
                .and_then(|d| d.pred_opt())
                .unwrap_or(report_date);
            (start, end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_period_is_a_single_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(period_bounds(ReportPeriod::Daily, date), (date, date));
    }

    #[test]
    fn monthly_period_covers_the_calendar_month() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let (start, end) = period_bounds(ReportPeriod::Monthly, date);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn december_rolls_into_next_year() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 25).unwrap();
        let (start, end) = period_bounds(ReportPeriod::Monthly, date);
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }
}
