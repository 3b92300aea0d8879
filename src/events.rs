use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Domain events published by the services after their transaction commits.
///
/// Delivery is best-effort: event consumers are projections and
/// notifications, never part of the ledger's consistency story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Stock ledger
    StockMovementPosted {
        movement_id: i32,
        product_id: i32,
        movement_type: String,
        quantity: Decimal,
    },
    LowStock {
        product_id: i32,
        current_stock: Decimal,
        minimum_stock: Decimal,
    },

    // Bill of materials
    BomCreated {
        bom_id: i32,
        product_id: i32,
    },
    BomActivated {
        bom_id: i32,
        product_id: i32,
    },

    // Production
    ProductionOrderCreated {
        order_id: i32,
        product_id: i32,
    },
    ProductionOrderStarted {
        order_id: i32,
    },
    ProductionOrderCompleted {
        order_id: i32,
        actual_quantity: Decimal,
    },
    ProductionOrderCancelled {
        order_id: i32,
    },

    // Stock opname
    StockOpnameCompleted {
        opname_id: i32,
        adjustments: usize,
    },

    // Sales and delivery
    SalesOrderCreated {
        order_id: i32,
        customer_id: i32,
    },
    SalesOrderStatusChanged {
        order_id: i32,
        old_status: String,
        new_status: String,
    },
    PaymentRecorded {
        order_id: i32,
        amount: Decimal,
    },
    DeliveryOrderCreated {
        delivery_id: i32,
        sales_order_id: i32,
    },
    DeliveryOrderStatusChanged {
        delivery_id: i32,
        old_status: String,
        new_status: String,
    },
}

/// Thin wrapper around an mpsc sender so services do not depend on the
/// channel type directly.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing the failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of failing; used after a committed
    /// transaction where the write must not be reported as failed just
    /// because a consumer is gone.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
        }
    }
}

/// Default event processing loop: logs every event. Applications embed
/// their own consumers by draining the receiver themselves instead.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");
    while let Some(event) = rx.recv().await {
        info!(?event, "domain event");
    }
    info!("Event channel closed, stopping event processing loop");
}
