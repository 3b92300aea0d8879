use crate::{
    db::DbPool,
    dto::{CreateUserRequest, UpdateUserRequest},
    entities::{user, user::Entity as User},
    errors::ServiceError,
};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

/// User accounts. Passwords are stored as Argon2 hashes and never leave
/// this module in any other form.
pub struct UserService {
    db_pool: Arc<DbPool>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create_user(
        &self,
        request: CreateUserRequest,
    ) -> Result<user::Model, ServiceError> {
        request.validate()?;

        let db = self.db_pool.as_ref();
        let taken = User::find()
            .filter(
                user::Column::Username
                    .eq(request.username.clone())
                    .or(user::Column::Email.eq(request.email.clone())),
            )
            .one(db)
            .await?;
        if taken.is_some() {
            return Err(ServiceError::ValidationError(
                "Username or email already in use".to_string(),
            ));
        }

        let now = Utc::now();
        let created = user::ActiveModel {
            username: Set(request.username),
            email: Set(request.email),
            password_hash: Set(hash_password(&request.password)?),
            full_name: Set(request.full_name),
            role: Set(request.role),
            phone: Set(request.phone),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_user(
        &self,
        user_id: i32,
        request: UpdateUserRequest,
    ) -> Result<user::Model, ServiceError> {
        request.validate()?;

        let db = self.db_pool.as_ref();
        let existing = User::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {}", user_id)))?;

        let mut updated: user::ActiveModel = existing.into();
        if let Some(email) = request.email {
            updated.email = Set(email);
        }
        if let Some(full_name) = request.full_name {
            updated.full_name = Set(full_name);
        }
        if let Some(role) = request.role {
            updated.role = Set(role);
        }
        if let Some(phone) = request.phone {
            updated.phone = Set(Some(phone));
        }
        if let Some(is_active) = request.is_active {
            updated.is_active = Set(is_active);
        }
        updated.updated_at = Set(Utc::now());
        let user = updated.update(db).await?;

        Ok(user)
    }

    /// Checks a candidate password against the stored hash. Inactive users
    /// never verify.
    #[instrument(skip(self, password))]
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<user::Model>, ServiceError> {
        let found = User::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db_pool.as_ref())
            .await?;
        let Some(account) = found else {
            return Ok(None);
        };
        if !account.is_active {
            return Ok(None);
        }

        let parsed = PasswordHash::new(&account.password_hash)
            .map_err(|e| ServiceError::InvalidOperation(format!("Corrupt password hash: {}", e)))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
        {
            Ok(Some(account))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: i32) -> Result<user::Model, ServiceError> {
        User::find_by_id(user_id)
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {}", user_id)))
    }
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ServiceError::InvalidOperation(format!("Password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}
