mod common;

use common::{receive_stock, seed_product, setup_test_db, test_event_sender};
use mrp_core::{
    entities::{product, MovementReference, ProductType, StockMovementType},
    events::Event,
    services::{NewMovement, StockLedgerService},
    ServiceError,
};
use rust_decimal_macros::dec;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel};

#[tokio::test]
async fn posting_movements_updates_cached_stock() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let ledger = StockLedgerService::new(db.clone(), events, false);

    let plywood = seed_product(&db, "RM-PLY", ProductType::RawMaterial, dec!(10)).await;
    receive_stock(&ledger, plywood.id, dec!(20), dec!(10)).await;

    let movement = ledger
        .post_movement(NewMovement {
            product_id: plywood.id,
            movement_type: StockMovementType::Out,
            quantity: dec!(6),
            unit_cost: None,
            reference: None,
            notes: Some("sold over the counter".into()),
            created_by: 1,
        })
        .await
        .unwrap();

    // Unit cost falls back to the product's cost price.
    assert_eq!(movement.unit_cost, dec!(10));
    assert_eq!(movement.total_cost, dec!(60));

    let ledger_sum = ledger.verify_product_ledger(plywood.id).await.unwrap();
    assert_eq!(ledger_sum, dec!(14));
}

#[tokio::test]
async fn oversell_is_rejected_when_negative_stock_disallowed() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let ledger = StockLedgerService::new(db.clone(), events, false);

    let screws = seed_product(&db, "RM-SCREW", ProductType::RawMaterial, dec!(1)).await;
    receive_stock(&ledger, screws.id, dec!(5), dec!(1)).await;

    let err = ledger
        .post_movement(NewMovement {
            product_id: screws.id,
            movement_type: StockMovementType::Out,
            quantity: dec!(8),
            unit_cost: None,
            reference: None,
            notes: None,
            created_by: 1,
        })
        .await
        .unwrap_err();

    match err {
        ServiceError::InsufficientStock {
            product_id,
            requested,
            available,
        } => {
            assert_eq!(product_id, screws.id);
            assert_eq!(requested, dec!(8));
            assert_eq!(available, dec!(5));
        }
        other => panic!("expected InsufficientStock, got {:?}", other),
    }

    // The failed post must leave no trace.
    let ledger_sum = ledger.verify_product_ledger(screws.id).await.unwrap();
    assert_eq!(ledger_sum, dec!(5));
}

#[tokio::test]
async fn negative_stock_allowed_when_configured() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let ledger = StockLedgerService::new(db.clone(), events, true);

    let fabric = seed_product(&db, "RM-FAB", ProductType::RawMaterial, dec!(4)).await;
    receive_stock(&ledger, fabric.id, dec!(2), dec!(4)).await;

    ledger
        .post_movement(NewMovement {
            product_id: fabric.id,
            movement_type: StockMovementType::Out,
            quantity: dec!(5),
            unit_cost: None,
            reference: None,
            notes: None,
            created_by: 1,
        })
        .await
        .unwrap();

    let ledger_sum = ledger.verify_product_ledger(fabric.id).await.unwrap();
    assert_eq!(ledger_sum, dec!(-3));
}

#[tokio::test]
async fn zero_adjustment_is_rejected() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let ledger = StockLedgerService::new(db.clone(), events, false);

    let paint = seed_product(&db, "RM-PAINT", ProductType::RawMaterial, dec!(7)).await;
    let err = ledger
        .post_movement(NewMovement {
            product_id: paint.id,
            movement_type: StockMovementType::Adjustment,
            quantity: dec!(0),
            unit_cost: None,
            reference: None,
            notes: None,
            created_by: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn movement_and_low_stock_events_are_published() {
    let db = setup_test_db().await;
    let (events, mut rx) = test_event_sender();
    let ledger = StockLedgerService::new(db.clone(), events, false);

    let glue = seed_product(&db, "RM-GLUE", ProductType::RawMaterial, dec!(2)).await;
    let mut with_minimum = glue.clone().into_active_model();
    with_minimum.minimum_stock = Set(dec!(10));
    with_minimum.update(db.as_ref()).await.unwrap();

    receive_stock(&ledger, glue.id, dec!(4), dec!(2)).await;

    assert!(matches!(
        rx.recv().await,
        Some(Event::StockMovementPosted { .. })
    ));
    match rx.recv().await {
        Some(Event::LowStock {
            product_id,
            current_stock,
            minimum_stock,
        }) => {
            assert_eq!(product_id, glue.id);
            assert_eq!(current_stock, dec!(4));
            assert_eq!(minimum_stock, dec!(10));
        }
        other => panic!("expected LowStock, got {:?}", other),
    }
}

#[tokio::test]
async fn movements_are_queryable_by_reference() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let ledger = StockLedgerService::new(db.clone(), events, false);

    let legs = seed_product(&db, "CP-LEG", ProductType::Component, dec!(5)).await;
    receive_stock(&ledger, legs.id, dec!(50), dec!(5)).await;

    ledger
        .post_movement(NewMovement {
            product_id: legs.id,
            movement_type: StockMovementType::ProductionOut,
            quantity: dec!(8),
            unit_cost: None,
            reference: Some(MovementReference::ProductionOrder(99)),
            notes: None,
            created_by: 1,
        })
        .await
        .unwrap();

    let by_reference = ledger
        .movements_for_reference(MovementReference::ProductionOrder(99))
        .await
        .unwrap();
    assert_eq!(by_reference.len(), 1);
    assert_eq!(
        by_reference[0].reference().unwrap(),
        Some(MovementReference::ProductionOrder(99))
    );

    let history = ledger.movements_for_product(legs.id).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn verification_agrees_with_the_cache_between_postings() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let ledger = StockLedgerService::new(db.clone(), events, false);

    let felt = seed_product(&db, "RM-FELT", ProductType::RawMaterial, dec!(2)).await;
    receive_stock(&ledger, felt.id, dec!(30), dec!(2)).await;

    // The cache and the movement sum come from one snapshot, so the check
    // holds at every point of a busy posting sequence.
    for expected in [dec!(23), dec!(16), dec!(9)] {
        ledger
            .post_movement(NewMovement {
                product_id: felt.id,
                movement_type: StockMovementType::Out,
                quantity: dec!(7),
                unit_cost: None,
                reference: None,
                notes: None,
                created_by: 1,
            })
            .await
            .unwrap();
        assert_eq!(ledger.verify_product_ledger(felt.id).await.unwrap(), expected);
    }
}

#[tokio::test]
async fn corrupt_reference_tag_surfaces_as_an_error() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let ledger = StockLedgerService::new(db.clone(), events, false);

    let pine = seed_product(&db, "RM-PINE", ProductType::RawMaterial, dec!(3)).await;
    receive_stock(&ledger, pine.id, dec!(2), dec!(3)).await;

    // Damage the stored tag directly, bypassing the typed reference.
    let movement = ledger
        .movements_for_product(pine.id)
        .await
        .unwrap()
        .remove(0);
    let mut damaged = movement.into_active_model();
    damaged.reference_type = Set(Some("purchase_order".into()));
    damaged.reference_id = Set(Some(7));
    let damaged = damaged.update(db.as_ref()).await.unwrap();

    assert!(damaged.reference().is_err());
}

#[tokio::test]
async fn tampered_cache_is_reported_as_corruption() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let ledger = StockLedgerService::new(db.clone(), events, false);

    let oak = seed_product(&db, "RM-OAK", ProductType::RawMaterial, dec!(12)).await;
    receive_stock(&ledger, oak.id, dec!(9), dec!(12)).await;

    // Bypass the ledger and damage the cache.
    let damaged = product::Entity::find_by_id(oak.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let mut damaged = damaged.into_active_model();
    damaged.current_stock = Set(dec!(100));
    damaged.update(db.as_ref()).await.unwrap();

    let err = ledger.verify_product_ledger(oak.id).await.unwrap_err();
    match err {
        ServiceError::LedgerCorruption {
            product_id,
            cached,
            computed,
        } => {
            assert_eq!(product_id, oak.id);
            assert_eq!(cached, dec!(100));
            assert_eq!(computed, dec!(9));
        }
        other => panic!("expected LedgerCorruption, got {:?}", other),
    }
}
