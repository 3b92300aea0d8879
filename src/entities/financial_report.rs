use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::ReportPeriod;

/// Daily or monthly financial snapshot. `data` holds report-specific
/// detail (order counts, top products, ...) as free-form JSON.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "financial_reports")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub report_date: Date,
    pub report_type: ReportPeriod,
    pub revenue: Decimal,
    pub cogs: Decimal,
    pub gross_profit: Decimal,
    pub operating_expenses: Decimal,
    pub net_profit: Decimal,
    pub inventory_value: Decimal,
    pub data: Json,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
