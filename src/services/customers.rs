use crate::{
    db::DbPool,
    dto::CreateCustomerRequest,
    entities::{customer, customer::Entity as Customer, Marketplace},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

/// Customer directory, keyed loosely by the marketplace the customer
/// arrived through.
pub struct CustomerService {
    db_pool: Arc<DbPool>,
}

impl CustomerService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request.validate()?;

        let created = customer::ActiveModel {
            name: Set(request.name),
            email: Set(request.email),
            phone: Set(request.phone),
            address: Set(request.address),
            city: Set(request.city),
            marketplace: Set(request.marketplace),
            marketplace_username: Set(request.marketplace_username),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db_pool.as_ref())
        .await?;

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_customer(&self, customer_id: i32) -> Result<customer::Model, ServiceError> {
        Customer::find_by_id(customer_id)
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {}", customer_id)))
    }

    #[instrument(skip(self))]
    pub async fn customers_for_marketplace(
        &self,
        marketplace: Marketplace,
    ) -> Result<Vec<customer::Model>, ServiceError> {
        let customers = Customer::find()
            .filter(customer::Column::Marketplace.eq(marketplace))
            .filter(customer::Column::IsActive.eq(true))
            .order_by_asc(customer::Column::Name)
            .all(self.db_pool.as_ref())
            .await?;
        Ok(customers)
    }
}
