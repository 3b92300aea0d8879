mod common;

use common::{receive_stock, seed_product, setup_test_db, test_event_sender};
use mrp_core::{
    dto::{CreateCustomerRequest, CreateSalesOrderRequest, SalesOrderItemRequest},
    entities::{Marketplace, ProductType, ReportPeriod, SalesOrderStatus},
    services::{
        bom::{BomItemInput, CreateBomInput},
        BomService, CreateProductionOrderInput, CustomerService, ProductionService,
        RecordCogsInput, ReportService, SalesOrderService, StockLedgerService,
    },
    ServiceError,
};
use chrono::NaiveDate;
use rust_decimal_macros::dec;

#[tokio::test]
async fn cogs_is_derived_from_the_settled_material_snapshot() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let boms = BomService::new(db.clone(), events.clone());
    let ledger = StockLedgerService::new(db.clone(), events.clone(), false);
    let production = ProductionService::new(db.clone(), events, false);
    let reports = ReportService::new(db.clone());

    let table = seed_product(&db, "FG-TABLE", ProductType::FinishedGood, dec!(0)).await;
    let wood = seed_product(&db, "RM-WOOD", ProductType::RawMaterial, dec!(10)).await;
    boms.create_bom(CreateBomInput {
        product_id: table.id,
        version: None,
        items: vec![BomItemInput {
            material_id: wood.id,
            quantity: dec!(2),
            unit: "pcs".into(),
        }],
        activate: true,
    })
    .await
    .unwrap();
    receive_stock(&ledger, wood.id, dec!(100), dec!(10)).await;

    let order = production
        .create_order(CreateProductionOrderInput {
            product_id: table.id,
            quantity: dec!(4),
            target_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            assigned_to: None,
            notes: None,
        })
        .await
        .unwrap();

    // COGS cannot be recorded before settlement.
    let err = reports
        .record_cogs(RecordCogsInput {
            production_order_id: order.id,
            labor_cost: dec!(20),
            overhead_cost: dec!(12),
            notes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    production.start_order(order.id).await.unwrap();
    production
        .complete_order(order.id, dec!(4), Vec::new(), 1)
        .await
        .unwrap();

    let record = reports
        .record_cogs(RecordCogsInput {
            production_order_id: order.id,
            labor_cost: dec!(20),
            overhead_cost: dec!(12),
            notes: Some("June batch".into()),
        })
        .await
        .unwrap();

    // 8 wood at 10 = 80 material, plus 20 labor and 12 overhead.
    assert_eq!(record.material_cost, dec!(80));
    assert_eq!(record.total_cogs, dec!(112));
    assert_eq!(record.quantity, dec!(4));
    assert_eq!(record.unit_cogs, dec!(28));
    assert_eq!(record.product_id, table.id);
}

#[tokio::test]
async fn daily_report_aggregates_sales_and_inventory() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let ledger = StockLedgerService::new(db.clone(), events.clone(), false);
    let orders = SalesOrderService::new(db.clone(), events);
    let reports = ReportService::new(db.clone());

    let buyer = CustomerService::new(db.clone())
        .create_customer(CreateCustomerRequest {
            name: "Siti Rahma".into(),
            email: None,
            phone: None,
            address: None,
            city: None,
            marketplace: Marketplace::Shopee,
            marketplace_username: None,
        })
        .await
        .unwrap();

    let table = seed_product(&db, "FG-TABLE", ProductType::FinishedGood, dec!(100)).await;
    let chair = seed_product(&db, "FG-CHAIR", ProductType::FinishedGood, dec!(40)).await;
    receive_stock(&ledger, table.id, dec!(3), dec!(100)).await;
    receive_stock(&ledger, chair.id, dec!(5), dec!(40)).await;

    let report_date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
    let in_period = orders
        .create_order(
            CreateSalesOrderRequest {
                customer_id: buyer.id,
                order_date: report_date,
                delivery_date: None,
                marketplace: Marketplace::Shopee,
                marketplace_order_id: None,
                shipping_cost: Some(dec!(20)),
                notes: None,
                items: vec![
                    SalesOrderItemRequest {
                        product_id: table.id,
                        quantity: dec!(2),
                        unit_price: dec!(120),
                        discount: None,
                    },
                    SalesOrderItemRequest {
                        product_id: chair.id,
                        quantity: dec!(1),
                        unit_price: dec!(50),
                        discount: Some(dec!(50)),
                    },
                ],
            },
            1,
        )
        .await
        .unwrap();
    assert_eq!(in_period.total_amount, dec!(260));

    // An order on another day stays out of the daily report.
    orders
        .create_order(
            CreateSalesOrderRequest {
                customer_id: buyer.id,
                order_date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
                delivery_date: None,
                marketplace: Marketplace::Shopee,
                marketplace_order_id: None,
                shipping_cost: None,
                notes: None,
                items: vec![SalesOrderItemRequest {
                    product_id: chair.id,
                    quantity: dec!(1),
                    unit_price: dec!(60),
                    discount: None,
                }],
            },
            1,
        )
        .await
        .unwrap();

    // A cancelled order on the report day is excluded too.
    let cancelled = orders
        .create_order(
            CreateSalesOrderRequest {
                customer_id: buyer.id,
                order_date: report_date,
                delivery_date: None,
                marketplace: Marketplace::Shopee,
                marketplace_order_id: None,
                shipping_cost: None,
                notes: None,
                items: vec![SalesOrderItemRequest {
                    product_id: table.id,
                    quantity: dec!(1),
                    unit_price: dec!(120),
                    discount: None,
                }],
            },
            1,
        )
        .await
        .unwrap();
    orders
        .update_status(cancelled.id, SalesOrderStatus::Cancelled)
        .await
        .unwrap();

    let report = reports
        .generate_financial_report(ReportPeriod::Daily, report_date, dec!(5))
        .await
        .unwrap();

    assert_eq!(report.revenue, dec!(260));
    // COGS at cost price: 2 tables at 100 plus 1 chair at 40.
    assert_eq!(report.cogs, dec!(240));
    assert_eq!(report.gross_profit, dec!(20));
    assert_eq!(report.operating_expenses, dec!(5));
    assert_eq!(report.net_profit, dec!(15));
    // Inventory: 3 tables at 100 plus 5 chairs at 40.
    assert_eq!(report.inventory_value, dec!(500));
    assert_eq!(report.data["order_count"], 1);
}

#[tokio::test]
async fn monthly_report_covers_the_whole_month() {
    let db = setup_test_db().await;
    let (events, _rx) = test_event_sender();
    let orders = SalesOrderService::new(db.clone(), events);
    let reports = ReportService::new(db.clone());

    let buyer = CustomerService::new(db.clone())
        .create_customer(CreateCustomerRequest {
            name: "Siti Rahma".into(),
            email: None,
            phone: None,
            address: None,
            city: None,
            marketplace: Marketplace::Offline,
            marketplace_username: None,
        })
        .await
        .unwrap();
    let stool = seed_product(&db, "FG-STOOL", ProductType::FinishedGood, dec!(25)).await;

    for day in [1u32, 15, 28] {
        orders
            .create_order(
                CreateSalesOrderRequest {
                    customer_id: buyer.id,
                    order_date: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
                    delivery_date: None,
                    marketplace: Marketplace::Offline,
                    marketplace_order_id: None,
                    shipping_cost: None,
                    notes: None,
                    items: vec![SalesOrderItemRequest {
                        product_id: stool.id,
                        quantity: dec!(1),
                        unit_price: dec!(50),
                        discount: None,
                    }],
                },
                1,
            )
            .await
            .unwrap();
    }

    let report = reports
        .generate_financial_report(
            ReportPeriod::Monthly,
            NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            dec!(0),
        )
        .await
        .unwrap();
    assert_eq!(report.revenue, dec!(150));
    assert_eq!(report.cogs, dec!(75));
    assert_eq!(report.data["order_count"], 3);
}
