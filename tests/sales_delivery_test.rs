mod common;

use common::{receive_stock, seed_product, setup_test_db, test_event_sender};
use mrp_core::{
    dto::{CreateCustomerRequest, CreateSalesOrderRequest, SalesOrderItemRequest},
    entities::{
        customer, DeliveryStatus, Marketplace, MovementReference, PaymentStatus, ProductType,
        SalesOrderStatus, StockMovementType,
    },
    services::{
        CreateDeliveryInput, CustomerService, DeliveryService, SalesOrderService,
        StockLedgerService,
    },
    services::deliveries::DeliveryItemInput,
    ServiceError,
};
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn order_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
}

async fn seed_customer(db: &Arc<mrp_core::db::DbPool>) -> customer::Model {
    CustomerService::new(db.clone())
        .create_customer(CreateCustomerRequest {
            name: "Budi Santoso".into(),
            email: Some("budi@example.com".into()),
            phone: None,
            address: Some("Jl. Merdeka 1".into()),
            city: Some("Bandung".into()),
            marketplace: Marketplace::Tokopedia,
            marketplace_username: Some("budi_s".into()),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn order_totals_are_computed_from_lines() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let orders = SalesOrderService::new(db.clone(), events);
    let buyer = seed_customer(&db).await;
    let table = seed_product(&db, "FG-TABLE", ProductType::FinishedGood, dec!(100)).await;
    let chair = seed_product(&db, "FG-CHAIR", ProductType::FinishedGood, dec!(40)).await;

    let order = orders
        .create_order(
            CreateSalesOrderRequest {
                customer_id: buyer.id,
                order_date: order_date(),
                delivery_date: None,
                marketplace: Marketplace::Tokopedia,
                marketplace_order_id: Some("TKP-123".into()),
                shipping_cost: Some(dec!(20)),
                notes: None,
                items: vec![
                    SalesOrderItemRequest {
                        product_id: table.id,
                        quantity: dec!(2),
                        unit_price: dec!(100),
                        discount: Some(dec!(10)),
                    },
                    SalesOrderItemRequest {
                        product_id: chair.id,
                        quantity: dec!(1),
                        unit_price: dec!(50),
                        discount: None,
                    },
                ],
            },
            1,
        )
        .await
        .unwrap();

    assert!(order.order_number.starts_with("SO-"));
    assert_eq!(order.subtotal, dec!(240));
    assert_eq!(order.total_amount, dec!(260));
    assert_eq!(order.status, SalesOrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Unpaid);

    let (_, items) = orders.get_order(order.id).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].total_price, dec!(190));
}

#[tokio::test]
async fn status_chain_is_enforced() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let orders = SalesOrderService::new(db.clone(), events);
    let buyer = seed_customer(&db).await;
    let shelf = seed_product(&db, "FG-SHELF", ProductType::FinishedGood, dec!(60)).await;

    let order = orders
        .create_order(
            CreateSalesOrderRequest {
                customer_id: buyer.id,
                order_date: order_date(),
                delivery_date: None,
                marketplace: Marketplace::Shopee,
                marketplace_order_id: None,
                shipping_cost: None,
                notes: None,
                items: vec![SalesOrderItemRequest {
                    product_id: shelf.id,
                    quantity: dec!(1),
                    unit_price: dec!(80),
                    discount: None,
                }],
            },
            1,
        )
        .await
        .unwrap();

    let err = orders
        .update_status(order.id, SalesOrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatusTransition { .. }));

    let order = orders
        .update_status(order.id, SalesOrderStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(order.status, SalesOrderStatus::Confirmed);

    let order = orders
        .update_status(order.id, SalesOrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(order.status, SalesOrderStatus::Cancelled);

    let err = orders.record_payment(order.id, dec!(10)).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn payments_accumulate_and_derive_payment_status() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let orders = SalesOrderService::new(db.clone(), events);
    let buyer = seed_customer(&db).await;
    let bench = seed_product(&db, "FG-BENCH", ProductType::FinishedGood, dec!(70)).await;

    let order = orders
        .create_order(
            CreateSalesOrderRequest {
                customer_id: buyer.id,
                order_date: order_date(),
                delivery_date: None,
                marketplace: Marketplace::Offline,
                marketplace_order_id: None,
                shipping_cost: Some(dec!(10)),
                notes: None,
                items: vec![SalesOrderItemRequest {
                    product_id: bench.id,
                    quantity: dec!(2),
                    unit_price: dec!(125),
                    discount: None,
                }],
            },
            1,
        )
        .await
        .unwrap();
    assert_eq!(order.total_amount, dec!(260));

    let order = orders.record_payment(order.id, dec!(100)).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Partial);
    assert_eq!(order.paid_amount, dec!(100));

    let order = orders.record_payment(order.id, dec!(160)).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.paid_amount, dec!(260));

    let err = orders.record_payment(order.id, dec!(1)).await.unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn deliveries_cannot_exceed_ordered_quantities() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let orders = SalesOrderService::new(db.clone(), events.clone());
    let deliveries = DeliveryService::new(db.clone(), events.clone(), false);
    let ledger = StockLedgerService::new(db.clone(), events, false);
    let buyer = seed_customer(&db).await;
    let desk = seed_product(&db, "FG-DESK", ProductType::FinishedGood, dec!(90)).await;
    receive_stock(&ledger, desk.id, dec!(10), dec!(90)).await;

    let order = orders
        .create_order(
            CreateSalesOrderRequest {
                customer_id: buyer.id,
                order_date: order_date(),
                delivery_date: None,
                marketplace: Marketplace::Lazada,
                marketplace_order_id: None,
                shipping_cost: None,
                notes: None,
                items: vec![SalesOrderItemRequest {
                    product_id: desk.id,
                    quantity: dec!(5),
                    unit_price: dec!(150),
                    discount: None,
                }],
            },
            1,
        )
        .await
        .unwrap();

    let first = deliveries
        .create_delivery(CreateDeliveryInput {
            sales_order_id: order.id,
            delivery_date: order_date(),
            recipient_name: "Budi Santoso".into(),
            recipient_phone: None,
            delivery_address: "Jl. Merdeka 1, Bandung".into(),
            courier: Some("JNE".into()),
            tracking_number: None,
            notes: None,
            items: vec![DeliveryItemInput {
                product_id: desk.id,
                quantity: dec!(3),
            }],
        })
        .await
        .unwrap();
    assert!(first.delivery_number.starts_with("DO-"));

    // Only two remain on the order.
    let err = deliveries
        .create_delivery(CreateDeliveryInput {
            sales_order_id: order.id,
            delivery_date: order_date(),
            recipient_name: "Budi Santoso".into(),
            recipient_phone: None,
            delivery_address: "Jl. Merdeka 1, Bandung".into(),
            courier: None,
            tracking_number: None,
            notes: None,
            items: vec![DeliveryItemInput {
                product_id: desk.id,
                quantity: dec!(3),
            }],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    deliveries
        .create_delivery(CreateDeliveryInput {
            sales_order_id: order.id,
            delivery_date: order_date(),
            recipient_name: "Budi Santoso".into(),
            recipient_phone: None,
            delivery_address: "Jl. Merdeka 1, Bandung".into(),
            courier: None,
            tracking_number: None,
            notes: None,
            items: vec![DeliveryItemInput {
                product_id: desk.id,
                quantity: dec!(2),
            }],
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn shipping_a_delivery_moves_stock_out() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let orders = SalesOrderService::new(db.clone(), events.clone());
    let deliveries = DeliveryService::new(db.clone(), events.clone(), false);
    let ledger = StockLedgerService::new(db.clone(), events, false);
    let buyer = seed_customer(&db).await;
    let rack = seed_product(&db, "FG-RACK", ProductType::FinishedGood, dec!(45)).await;
    receive_stock(&ledger, rack.id, dec!(8), dec!(45)).await;

    let order = orders
        .create_order(
            CreateSalesOrderRequest {
                customer_id: buyer.id,
                order_date: order_date(),
                delivery_date: None,
                marketplace: Marketplace::Bukalapak,
                marketplace_order_id: None,
                shipping_cost: None,
                notes: None,
                items: vec![SalesOrderItemRequest {
                    product_id: rack.id,
                    quantity: dec!(4),
                    unit_price: dec!(75),
                    discount: None,
                }],
            },
            1,
        )
        .await
        .unwrap();

    let delivery = deliveries
        .create_delivery(CreateDeliveryInput {
            sales_order_id: order.id,
            delivery_date: order_date(),
            recipient_name: "Budi Santoso".into(),
            recipient_phone: Some("0812000111".into()),
            delivery_address: "Jl. Merdeka 1, Bandung".into(),
            courier: Some("SiCepat".into()),
            tracking_number: Some("SC-778899".into()),
            notes: None,
            items: vec![DeliveryItemInput {
                product_id: rack.id,
                quantity: dec!(4),
            }],
        })
        .await
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Pending);

    // Creation alone does not move stock.
    assert_eq!(ledger.verify_product_ledger(rack.id).await.unwrap(), dec!(8));

    // Skipping straight to delivered is rejected.
    let err = deliveries
        .update_status(delivery.id, DeliveryStatus::Delivered, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatusTransition { .. }));

    let delivery = deliveries
        .update_status(delivery.id, DeliveryStatus::Shipped, 1)
        .await
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Shipped);
    assert_eq!(ledger.verify_product_ledger(rack.id).await.unwrap(), dec!(4));

    let shipped = ledger
        .movements_for_reference(MovementReference::SalesOrder(order.id))
        .await
        .unwrap();
    assert_eq!(shipped.len(), 1);
    assert_eq!(shipped[0].movement_type, StockMovementType::Out);
    assert_eq!(shipped[0].quantity, dec!(4));

    let delivery = deliveries
        .update_status(delivery.id, DeliveryStatus::Delivered, 1)
        .await
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Delivered);

    // Shipping twice would double-move stock; the status machine blocks it.
    let err = deliveries
        .update_status(delivery.id, DeliveryStatus::Shipped, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn deliveries_reject_products_not_on_the_order() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let orders = SalesOrderService::new(db.clone(), events.clone());
    let deliveries = DeliveryService::new(db.clone(), events, false);
    let buyer = seed_customer(&db).await;
    let stool = seed_product(&db, "FG-STOOL", ProductType::FinishedGood, dec!(25)).await;
    let other = seed_product(&db, "FG-OTHER", ProductType::FinishedGood, dec!(30)).await;

    let order = orders
        .create_order(
            CreateSalesOrderRequest {
                customer_id: buyer.id,
                order_date: order_date(),
                delivery_date: None,
                marketplace: Marketplace::Offline,
                marketplace_order_id: None,
                shipping_cost: None,
                notes: None,
                items: vec![SalesOrderItemRequest {
                    product_id: stool.id,
                    quantity: dec!(2),
                    unit_price: dec!(40),
                    discount: None,
                }],
            },
            1,
        )
        .await
        .unwrap();

    let err = deliveries
        .create_delivery(CreateDeliveryInput {
            sales_order_id: order.id,
            delivery_date: order_date(),
            recipient_name: "Budi Santoso".into(),
            recipient_phone: None,
            delivery_address: "Jl. Merdeka 1, Bandung".into(),
            courier: None,
            tracking_number: None,
            notes: None,
            items: vec![DeliveryItemInput {
                product_id: other.id,
                quantity: dec!(1),
            }],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
