//! Request payloads for the CRUD surface. Engine operations (stock ledger,
//! production, opname) take their own input structs defined next to the
//! service that owns them.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::entities::{Marketplace, ProductType, UserRole};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    pub role: UserRole,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub product_type: ProductType,
    #[validate(length(min = 1, max = 20))]
    pub unit: String,
    pub cost_price: Decimal,
    pub selling_price: Option<Decimal>,
    pub minimum_stock: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub unit: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub minimum_stock: Option<Decimal>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub marketplace: Marketplace,
    pub marketplace_username: Option<String>,
}

/// Line requested on a new sales order; totals are computed by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrderItemRequest {
    pub product_id: i32,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSalesOrderRequest {
    pub customer_id: i32,
    pub order_date: NaiveDate,
    pub delivery_date: Option<NaiveDate>,
    pub marketplace: Marketplace,
    pub marketplace_order_id: Option<String>,
    pub shipping_cost: Option<Decimal>,
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<SalesOrderItemRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn create_product_request_rejects_empty_code() {
        let req = CreateProductRequest {
            code: String::new(),
            name: "Teak Dining Table".into(),
            description: None,
            product_type: ProductType::FinishedGood,
            unit: "pcs".into(),
            cost_price: dec!(250),
            selling_price: Some(dec!(400)),
            minimum_stock: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn create_sales_order_request_requires_items() {
        let req = CreateSalesOrderRequest {
            customer_id: 1,
            order_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            delivery_date: None,
            marketplace: Marketplace::Offline,
            marketplace_order_id: None,
            shipping_cost: None,
            notes: None,
            items: vec![],
        };
        assert!(req.validate().is_err());
    }
}
