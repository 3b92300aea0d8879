mod common;

use common::{receive_stock, setup_test_db, test_event_sender};
use mrp_core::{
    dto::{CreateProductRequest, CreateUserRequest, UpdateProductRequest},
    entities::{ProductType, UserRole},
    services::{ProductService, StockLedgerService, UserService},
    ServiceError,
};
use rust_decimal_macros::dec;

fn product_request(code: &str) -> CreateProductRequest {
    CreateProductRequest {
        code: code.to_string(),
        name: "Teak Side Table".into(),
        description: None,
        product_type: ProductType::FinishedGood,
        unit: "pcs".into(),
        cost_price: dec!(150),
        selling_price: Some(dec!(250)),
        minimum_stock: Some(dec!(2)),
    }
}

#[tokio::test]
async fn product_codes_are_unique() {
    let db = setup_test_db().await;
    let products = ProductService::new(db.clone());

    let created = products.create_product(product_request("FG-ST01")).await.unwrap();
    assert_eq!(created.current_stock, dec!(0));
    assert!(created.is_active);

    let err = products
        .create_product(product_request("FG-ST01"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let by_code = products.get_product_by_code("FG-ST01").await.unwrap();
    assert_eq!(by_code.id, created.id);
}

#[tokio::test]
async fn low_stock_listing_follows_the_minimum() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let products = ProductService::new(db.clone());
    let ledger = StockLedgerService::new(db.clone(), events, false);

    let short = products.create_product(product_request("FG-LOW")).await.unwrap();
    let stocked = products.create_product(product_request("FG-OK")).await.unwrap();
    receive_stock(&ledger, short.id, dec!(1), dec!(150)).await;
    receive_stock(&ledger, stocked.id, dec!(5), dec!(150)).await;

    let low = products.low_stock_products().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].id, short.id);
}

#[tokio::test]
async fn product_updates_touch_only_catalog_fields() {
    let db = setup_test_db().await;
    let products = ProductService::new(db.clone());

    let created = products.create_product(product_request("FG-UPD")).await.unwrap();
    let updated = products
        .update_product(
            created.id,
            UpdateProductRequest {
                name: Some("Teak Side Table v2".into()),
                cost_price: Some(dec!(175)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Teak Side Table v2");
    assert_eq!(updated.cost_price, dec!(175));
    assert_eq!(updated.code, "FG-UPD");
    assert_eq!(updated.current_stock, dec!(0));

    let err = products
        .update_product(
            created.id,
            UpdateProductRequest {
                cost_price: Some(dec!(-1)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn user_passwords_hash_and_verify() {
    let db = setup_test_db().await;
    let users = UserService::new(db.clone());

    let created = users
        .create_user(CreateUserRequest {
            username: "warehouse1".into(),
            email: "warehouse1@example.com".into(),
            password: "correct horse battery".into(),
            full_name: "Warehouse One".into(),
            role: UserRole::Inventory,
            phone: None,
        })
        .await
        .unwrap();
    assert_ne!(created.password_hash, "correct horse battery");

    let verified = users
        .verify_credentials("warehouse1", "correct horse battery")
        .await
        .unwrap();
    assert_eq!(verified.map(|u| u.id), Some(created.id));

    let rejected = users
        .verify_credentials("warehouse1", "wrong password")
        .await
        .unwrap();
    assert!(rejected.is_none());

    let err = users
        .create_user(CreateUserRequest {
            username: "warehouse1".into(),
            email: "other@example.com".into(),
            password: "another password".into(),
            full_name: "Other".into(),
            role: UserRole::Employee,
            phone: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
