//! Couriers and orders tables shared by every component.
//!
//! Exclusive writes are row scoped: a `get_mut` guard on a row is the
//! conditional-update boundary. Lock order is couriers before orders. Code
//! may hold a courier row guard while reading or writing orders, but must
//! never hold an orders guard (including one produced by iteration) while
//! touching the couriers table.

use std::collections::HashSet;

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

use crate::models::courier::Courier;
use crate::models::order::{Order, OrderStatus};

#[derive(Default)]
pub struct Store {
    pub(crate) couriers: DashMap<String, Courier>,
    pub(crate) orders: DashMap<String, Order>,
    /// Unique index over courier names, name -> id.
    pub(crate) courier_names: DashMap<String, String>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn courier_count(&self) -> usize {
        self.couriers.len()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub(crate) fn courier(&self, id: &str) -> Option<Courier> {
        self.couriers.get(id).map(|entry| entry.value().clone())
    }

    pub(crate) fn order(&self, id: &str) -> Option<Order> {
        self.orders.get(id).map(|entry| entry.value().clone())
    }

    /// Takes the courier's row lock. Assignments to a courier are serialized
    /// through this guard.
    pub(crate) fn lock_courier(&self, id: &str) -> Option<RefMut<'_, String, Courier>> {
        self.couriers.get_mut(id)
    }

    pub(crate) fn courier_snapshot(&self) -> Vec<Courier> {
        self.couriers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub(crate) fn order_snapshot(&self) -> Vec<Order> {
        self.orders.iter().map(|entry| entry.value().clone()).collect()
    }

    pub(crate) fn holds_active_order(&self, courier_id: &str) -> bool {
        self.orders.iter().any(|entry| {
            let order = entry.value();
            order.is_held_by(courier_id) && order.status.is_active()
        })
    }

    pub(crate) fn holds_order_in(&self, courier_id: &str, status: OrderStatus) -> bool {
        self.orders.iter().any(|entry| {
            let order = entry.value();
            order.is_held_by(courier_id) && order.status == status
        })
    }

    /// Ids of every courier currently holding an active order.
    pub(crate) fn busy_courier_ids(&self) -> HashSet<String> {
        self.orders
            .iter()
            .filter(|entry| entry.value().status.is_active())
            .filter_map(|entry| entry.value().assigned_to.clone())
            .collect()
    }

    pub(crate) fn courier_name(&self, id: &str) -> Option<String> {
        self.couriers.get(id).map(|entry| entry.value().name.clone())
    }
}
