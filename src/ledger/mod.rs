use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::eta_minutes;
use crate::models::order::{
    ExportRow, NewOrder, Order, OrderPage, OrderStatus, OrderSummary, Tracking,
};
use crate::store::Store;

/// Order records and their lifecycle.
#[derive(Clone)]
pub struct OrderLedger {
    store: Arc<Store>,
}

impl OrderLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Stores a new order, `assigned` to `courier_id` when one is given and
    /// `pending` otherwise. Eligibility of the courier is the caller's concern.
    pub fn create(&self, new: NewOrder, courier_id: Option<&str>) -> Result<Order, AppError> {
        let id = new
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let order = Order {
            id: id.clone(),
            assigned_to: courier_id.map(str::to_string),
            status: if courier_id.is_some() {
                OrderStatus::Assigned
            } else {
                OrderStatus::Pending
            },
            customer_location: new.customer_location,
            store_location: new.store_location,
            customer_phone: new.customer_phone,
            customer_name: new.customer_name,
            customer_addr_bp: new.customer_addr_bp,
            customer_addr_details: new.customer_addr_details,
            created_at: Utc::now(),
            picked_at: None,
            delivered_at: None,
        };

        match self.store.orders.entry(id.clone()) {
            Entry::Occupied(_) => Err(AppError::AlreadyExists(format!("order {id}"))),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                info!(order_id = %order.id, status = %order.status, "order created");
                Ok(order)
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<Order, AppError> {
        self.store.order(id).ok_or_else(|| not_found(id))
    }

    /// A page of orders in criticality order plus the total row count, or the
    /// single order matching `id_filter`.
    pub fn list(&self, id_filter: Option<&str>, offset: usize, limit: usize) -> OrderPage {
        if let Some(id) = id_filter {
            let orders = self
                .store
                .order(id)
                .into_iter()
                .map(|order| self.summarize(order))
                .collect();
            return OrderPage {
                orders,
                total_count: 1,
            };
        }

        let mut orders = self.store.order_snapshot();
        let total_count = orders.len();
        orders.sort_by(by_criticality);

        let orders = orders
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|order| self.summarize(order))
            .collect();

        OrderPage {
            orders,
            total_count,
        }
    }

    pub fn list_by_courier(&self, courier_id: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .store
            .orders
            .iter()
            .filter(|entry| entry.value().is_held_by(courier_id))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(by_criticality);
        orders
    }

    /// Pending orders nobody holds yet, oldest first.
    pub fn list_unassigned_pending(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .store
            .orders
            .iter()
            .filter(|entry| entry.value().is_unassigned_pending())
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    /// Moves an order held by `courier_id` to `status`, stamping pickup and
    /// delivery times.
    pub fn update_status(
        &self,
        order_id: &str,
        courier_id: &str,
        status: OrderStatus,
    ) -> Result<Order, AppError> {
        let mut order = self
            .store
            .orders
            .get_mut(order_id)
            .filter(|order| order.is_held_by(courier_id))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "order {order_id} not found or not assigned to courier {courier_id}"
                ))
            })?;

        if !order.status.courier_may_move_to(status) {
            return Err(AppError::InvalidStatusTransition {
                from: order.status,
                to: status,
            });
        }

        match status {
            OrderStatus::PickedUp => order.picked_at = Some(Utc::now()),
            OrderStatus::Delivered => order.delivered_at = Some(Utc::now()),
            _ => {}
        }
        order.status = status;

        debug!(order_id = %order_id, courier_id = %courier_id, status = %status, "order status updated");
        Ok(order.clone())
    }

    pub fn cancel(&self, order_id: &str) -> Result<(), AppError> {
        let mut order = self
            .store
            .orders
            .get_mut(order_id)
            .ok_or_else(|| not_found(order_id))?;

        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Assigned) {
            return Err(AppError::OrderNotCancelable);
        }

        order.status = OrderStatus::Cancelled;
        order.assigned_to = None;
        info!(order_id = %order_id, "order cancelled");
        Ok(())
    }

    /// Hands the order to `courier_id`, replacing any previous assignee. The
    /// courier's row lock is held across the eligibility check and the write.
    pub fn reassign(&self, order_id: &str, courier_id: &str) -> Result<(), AppError> {
        let status = self.get(order_id)?.status;
        if !reassignable(status) {
            return Err(AppError::OrderNotReassignable);
        }

        let courier = self
            .store
            .lock_courier(courier_id)
            .ok_or(AppError::CourierNotEligible)?;
        if !courier.is_available() || self.store.holds_active_order(courier_id) {
            return Err(AppError::CourierNotEligible);
        }

        let mut order = self
            .store
            .orders
            .get_mut(order_id)
            .ok_or_else(|| not_found(order_id))?;
        if !reassignable(order.status) {
            return Err(AppError::OrderNotReassignable);
        }

        let previous = order.assigned_to.replace(courier_id.to_string());
        order.status = OrderStatus::Assigned;
        drop(order);
        drop(courier);

        info!(
            order_id = %order_id,
            courier_id = %courier_id,
            previous = previous.as_deref().unwrap_or("none"),
            "order reassigned"
        );
        Ok(())
    }

    /// Binds a pending order to a courier only if the order is still
    /// unassigned and the courier is still free. Returns whether it won.
    pub fn assign_if_unassigned(&self, order_id: &str, courier_id: &str) -> bool {
        let Some(courier) = self.store.lock_courier(courier_id) else {
            return false;
        };
        if !courier.is_available() || self.store.holds_active_order(courier_id) {
            return false;
        }

        let Some(mut order) = self.store.orders.get_mut(order_id) else {
            return false;
        };
        if !order.is_unassigned_pending() {
            return false;
        }

        order.assigned_to = Some(courier_id.to_string());
        order.status = OrderStatus::Assigned;
        drop(order);
        drop(courier);
        true
    }

    pub fn get_tracking(&self, order_id: &str) -> Result<Tracking, AppError> {
        let order = self.get(order_id)?;

        let courier_location = order
            .assigned_to
            .as_deref()
            .and_then(|id| self.store.courier(id))
            .and_then(|courier| courier.location);

        Ok(Tracking {
            eta_minutes: eta_minutes(courier_location.as_ref(), Some(&order.customer_location)),
            order_id: order.id,
            status: order.status,
            customer_location: order.customer_location,
            courier_location,
        })
    }

    /// Every order as a flat row, newest first. Each call takes a fresh
    /// snapshot; courier names are resolved as rows are pulled.
    pub fn export_all(&self) -> ExportRows {
        let mut orders = self.store.order_snapshot();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        ExportRows {
            store: self.store.clone(),
            orders: orders.into_iter(),
        }
    }

    fn summarize(&self, order: Order) -> OrderSummary {
        let courier_name = order
            .assigned_to
            .as_deref()
            .and_then(|id| self.store.courier_name(id));
        OrderSummary {
            order,
            courier_name,
        }
    }
}

pub struct ExportRows {
    store: Arc<Store>,
    orders: std::vec::IntoIter<Order>,
}

impl Iterator for ExportRows {
    type Item = ExportRow;

    fn next(&mut self) -> Option<Self::Item> {
        let order = self.orders.next()?;
        let courier_name = order
            .assigned_to
            .as_deref()
            .and_then(|id| self.store.courier_name(id));

        Some(ExportRow {
            id: order.id,
            status: order.status,
            customer_name: order.customer_name,
            customer_phone: order.customer_phone,
            store_location: order.store_location,
            customer_location: order.customer_location,
            created_at: order.created_at,
            courier_name,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.orders.size_hint()
    }
}

fn by_criticality(a: &Order, b: &Order) -> Ordering {
    a.status
        .criticality()
        .cmp(&b.status.criticality())
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn reassignable(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Pending | OrderStatus::Assigned)
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("order {id} not found"))
}
