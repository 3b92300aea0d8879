//! Domain services. Each service owns one aggregate and goes through the
//! stock ledger for any change to on-hand quantities.

pub mod attendance;
pub mod bom;
pub mod customers;
pub mod deliveries;
pub mod production;
pub mod products;
pub mod reports;
pub mod sales_orders;
pub mod stock_ledger;
pub mod stock_opname;
pub mod users;

pub use attendance::{AttendanceService, StandardWorkPolicy, WorkPolicy};
pub use bom::{BomService, CreateBomInput, MaterialRequirement};
pub use customers::CustomerService;
pub use deliveries::{CreateDeliveryInput, DeliveryService};
pub use production::{CreateProductionOrderInput, MaterialConsumption, ProductionService};
pub use products::ProductService;
pub use reports::{RecordCogsInput, ReportService};
pub use sales_orders::SalesOrderService;
pub use stock_ledger::{NewMovement, StockLedgerService};
pub use stock_opname::{CreateOpnameInput, StockOpnameService};
pub use users::UserService;
