//! Persistent data model and stock engine for a small manufacturing and
//! retail ERP: product catalog, bills of materials, an append-only stock
//! ledger with cached on-hand quantities, production orders with material
//! consumption, sales orders and deliveries, costing and financial
//! reports, and employee attendance.
//!
//! The crate is the storage and domain layer only; transports (HTTP, gRPC)
//! sit on top of the services exported from [`services`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use mrp_core::{config::AppConfig, db, events::EventSender};
//! use mrp_core::services::StockLedgerService;
//!
//! # async fn run() -> Result<(), mrp_core::errors::ServiceError> {
//! let config = AppConfig::for_database("sqlite::memory:");
//! let pool = Arc::new(db::establish_connection_from_app_config(&config).await?);
//! let (tx, _rx) = tokio::sync::mpsc::channel(64);
//! let ledger = StockLedgerService::new(pool, Arc::new(EventSender::new(tx)), false);
//! # let _ = ledger;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod dto;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

pub use errors::ServiceError;
