use crate::{
    db::DbPool,
    dto::{CreateProductRequest, UpdateProductRequest},
    entities::{product, product::Entity as Product},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use sea_orm::sea_query::Expr;
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

/// Product catalog management. Stock levels are read-only here; only the
/// stock ledger writes `current_stock`.
pub struct ProductService {
    db_pool: Arc<DbPool>,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        if request.cost_price < Decimal::ZERO
            || matches!(request.selling_price, Some(p) if p < Decimal::ZERO)
            || matches!(request.minimum_stock, Some(s) if s < Decimal::ZERO)
        {
            return Err(ServiceError::ValidationError(
                "Prices and minimum stock must not be negative".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();
        let taken = Product::find()
            .filter(product::Column::Code.eq(request.code.clone()))
            .one(db)
            .await?;
        if taken.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Product code {} already exists",
                request.code
            )));
        }

        let now = Utc::now();
        let created = product::ActiveModel {
            code: Set(request.code),
            name: Set(request.name),
            description: Set(request.description),
            product_type: Set(request.product_type),
            unit: Set(request.unit),
            cost_price: Set(request.cost_price),
            selling_price: Set(request.selling_price),
            minimum_stock: Set(request.minimum_stock.unwrap_or(Decimal::ZERO)),
            current_stock: Set(Decimal::ZERO),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        Ok(created)
    }

    /// Updates catalog fields. Product type and stock are deliberately not
    /// updatable: the type anchors BOM semantics and stock belongs to the
    /// ledger.
    #[instrument(skip(self, request))]
    pub async fn update_product(
        &self,
        product_id: i32,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;

        let db = self.db_pool.as_ref();
        let existing = Product::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {}", product_id)))?;

        let mut updated: product::ActiveModel = existing.into();
        if let Some(name) = request.name {
            updated.name = Set(name);
        }
        if let Some(description) = request.description {
            updated.description = Set(Some(description));
        }
        if let Some(unit) = request.unit {
            updated.unit = Set(unit);
        }
        if let Some(cost_price) = request.cost_price {
            if cost_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Cost price must not be negative".to_string(),
                ));
            }
            updated.cost_price = Set(cost_price);
        }
        if let Some(selling_price) = request.selling_price {
            updated.selling_price = Set(Some(selling_price));
        }
        if let Some(minimum_stock) = request.minimum_stock {
            updated.minimum_stock = Set(minimum_stock);
        }
        if let Some(is_active) = request.is_active {
            updated.is_active = Set(is_active);
        }
        updated.updated_at = Set(Utc::now());
        let updated = updated.update(db).await?;

        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: i32) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {}", product_id)))
    }

    #[instrument(skip(self))]
    pub async fn get_product_by_code(&self, code: &str) -> Result<product::Model, ServiceError> {
        Product::find()
            .filter(product::Column::Code.eq(code))
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product with code {}", code)))
    }

    /// Active products whose cached stock is below their minimum.
    #[instrument(skip(self))]
    pub async fn low_stock_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        let products = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .filter(
                Expr::col(product::Column::CurrentStock)
                    .lt(Expr::col(product::Column::MinimumStock)),
            )
            .order_by_asc(product::Column::Code)
            .all(self.db_pool.as_ref())
            .await?;
        Ok(products)
    }
}
