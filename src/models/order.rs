use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geo::Location;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PickedUp => "picked-up",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Sort key for listings: the less resolved an order is, the earlier it shows.
    pub fn criticality(&self) -> u8 {
        match self {
            OrderStatus::Pending => 1,
            OrderStatus::Assigned => 2,
            OrderStatus::PickedUp => 3,
            OrderStatus::Delivered => 4,
            OrderStatus::Cancelled => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Transitions a courier may request for an order it holds.
    pub fn courier_may_move_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Assigned, OrderStatus::PickedUp)
                | (OrderStatus::Assigned, OrderStatus::Cancelled)
                | (OrderStatus::PickedUp, OrderStatus::Delivered)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| AppError::BadRequest(format!("unknown order status: {raw}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub assigned_to: Option<String>,
    pub status: OrderStatus,
    pub customer_location: Location,
    pub store_location: Location,
    pub customer_phone: String,
    pub customer_name: String,
    pub customer_addr_bp: String,
    pub customer_addr_details: String,
    pub created_at: DateTime<Utc>,
    pub picked_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_held_by(&self, courier_id: &str) -> bool {
        self.assigned_to.as_deref() == Some(courier_id)
    }

    pub fn is_unassigned_pending(&self) -> bool {
        self.status == OrderStatus::Pending && self.assigned_to.is_none()
    }
}

/// Request to create an order. The id is generated when absent.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Option<String>,
    pub customer_location: Location,
    pub store_location: Location,
    pub customer_phone: String,
    pub customer_name: String,
    pub customer_addr_bp: String,
    pub customer_addr_details: String,
}

/// An order joined with its assignee's display name.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: Order,
    pub courier_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<OrderSummary>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Tracking {
    pub order_id: String,
    pub status: OrderStatus,
    pub customer_location: Location,
    pub courier_location: Option<Location>,
    pub eta_minutes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub id: String,
    pub status: OrderStatus,
    pub customer_name: String,
    pub customer_phone: String,
    pub store_location: Location,
    pub customer_location: Location,
    pub created_at: DateTime<Utc>,
    pub courier_name: Option<String>,
}

impl ExportRow {
    pub const HEADERS: [&'static str; 8] = [
        "Order ID",
        "Status",
        "Customer Name",
        "Customer Phone",
        "Store Location",
        "Customer Location",
        "Created At",
        "Courier Name",
    ];

    pub fn fields(&self) -> [String; 8] {
        [
            self.id.clone(),
            self.status.to_string(),
            self.customer_name.clone(),
            self.customer_phone.clone(),
            self.store_location.to_string(),
            self.customer_location.to_string(),
            self.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.courier_name.clone().unwrap_or_default(),
        ]
    }
}
