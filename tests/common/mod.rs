use std::sync::Arc;

use chrono::Utc;
use mrp_core::{
    db::{self, DbConfig, DbPool},
    entities::{product, user, ProductType, UserRole},
    events::{Event, EventSender},
    services::{NewMovement, StockLedgerService},
};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::ActiveModelTrait;
use tokio::sync::mpsc;

/// In-memory SQLite pool with migrations applied. A single connection is
/// mandatory: every pooled connection of `sqlite::memory:` would otherwise
/// see its own empty database.
#[allow(dead_code)]
pub async fn setup_test_db() -> Arc<DbPool> {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let pool = db::establish_connection_with_config(&config)
        .await
        .expect("failed to open test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations");
    Arc::new(pool)
}

#[allow(dead_code)]
pub fn test_event_sender() -> (Arc<EventSender>, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(64);
    (Arc::new(EventSender::new(tx)), rx)
}

#[allow(dead_code)]
pub async fn seed_user(db: &DbPool, username: &str) -> user::Model {
    let now = Utc::now();
    user::ActiveModel {
        username: Set(username.to_string()),
        email: Set(format!("{}@example.com", username)),
        password_hash: Set("test-hash".to_string()),
        full_name: Set(username.to_string()),
        role: Set(UserRole::Employee),
        phone: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to seed user")
}

#[allow(dead_code)]
pub async fn seed_product(
    db: &DbPool,
    code: &str,
    product_type: ProductType,
    cost_price: Decimal,
) -> product::Model {
    let now = Utc::now();
    product::ActiveModel {
        code: Set(code.to_string()),
        name: Set(format!("Product {}", code)),
        description: Set(None),
        product_type: Set(product_type),
        unit: Set("pcs".to_string()),
        cost_price: Set(cost_price),
        selling_price: Set(None),
        minimum_stock: Set(Decimal::ZERO),
        current_stock: Set(Decimal::ZERO),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to seed product")
}

/// Receives stock through the ledger so the movement history stays
/// consistent with the cached quantity.
#[allow(dead_code)]
pub async fn receive_stock(
    ledger: &StockLedgerService,
    product_id: i32,
    quantity: Decimal,
    unit_cost: Decimal,
) {
    ledger
        .post_movement(NewMovement {
            product_id,
            movement_type: mrp_core::entities::StockMovementType::In,
            quantity,
            unit_cost: Some(unit_cost),
            reference: None,
            notes: None,
            created_by: 1,
        })
        .await
        .expect("failed to receive stock");
}
