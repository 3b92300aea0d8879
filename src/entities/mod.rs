//! sea-orm entity definitions mirroring the ERP schema.
//!
//! Integer auto-increment primary keys throughout; every quantity and money
//! column is a `rust_decimal::Decimal`, never a float.

pub mod enums;

pub mod attendance;
pub mod bom;
pub mod bom_item;
pub mod cogs_calculation;
pub mod customer;
pub mod delivery_order;
pub mod delivery_order_item;
pub mod financial_report;
pub mod product;
pub mod production_material;
pub mod production_order;
pub mod sales_order;
pub mod sales_order_item;
pub mod stock_movement;
pub mod stock_opname;
pub mod stock_opname_item;
pub mod user;

pub use enums::{
    AttendanceStatus, DeliveryStatus, Marketplace, OpnameStatus, PaymentStatus, ProductType,
    ProductionOrderStatus, ReportPeriod, SalesOrderStatus, StockMovementType, UserRole,
};
pub use stock_movement::{MovementReference, ReferenceType};
