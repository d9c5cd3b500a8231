use tracing::{debug, info, warn};

use crate::directory::CourierDirectory;
use crate::error::AppError;
use crate::geo::{haversine_km, Location};
use crate::ledger::OrderLedger;
use crate::models::order::{NewOrder, Order};
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentSource {
    NewOrder,
    Login,
    Sweep,
}

impl AssignmentSource {
    fn as_str(&self) -> &'static str {
        match self {
            AssignmentSource::NewOrder => "new_order",
            AssignmentSource::Login => "login",
            AssignmentSource::Sweep => "sweep",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub couriers: usize,
    pub assigned: usize,
    pub failed: usize,
}

/// Greedy nearest-neighbour matching between couriers and pending orders.
#[derive(Clone)]
pub struct Matcher {
    directory: CourierDirectory,
    ledger: OrderLedger,
    metrics: Metrics,
}

impl Matcher {
    pub fn new(directory: CourierDirectory, ledger: OrderLedger, metrics: Metrics) -> Self {
        Self {
            directory,
            ledger,
            metrics,
        }
    }

    /// Closest eligible courier to `target`. Of two couriers at the same
    /// distance the one scanned first (lowest id) wins.
    pub fn find_nearest_eligible_courier(&self, target: &Location) -> Option<String> {
        let mut best: Option<(String, f64)> = None;

        for courier in self.directory.list_eligible() {
            let Some(location) = courier.location else {
                continue;
            };
            let distance = haversine_km(&location, target);
            if best.as_ref().is_none_or(|(_, min)| distance < *min) {
                best = Some((courier.id, distance));
            }
        }

        best.map(|(id, _)| id)
    }

    pub fn assign_best_order(&self, courier_id: &str) -> Result<Option<String>, AppError> {
        self.assign_best_order_for(courier_id, AssignmentSource::Login)
    }

    /// Binds the nearest pending order to the courier. `Ok(None)` means no
    /// match this pass: nothing pending, the courier is busy, or another
    /// writer took the order first.
    pub fn assign_best_order_for(
        &self,
        courier_id: &str,
        source: AssignmentSource,
    ) -> Result<Option<String>, AppError> {
        let courier = self.directory.get(courier_id)?;
        if !courier.online || courier.blocked {
            return Err(AppError::CourierNotEligible);
        }
        let courier_location = courier.location.ok_or(AppError::CourierNotEligible)?;

        if !self.directory.is_eligible(courier_id) {
            debug!(courier_id = %courier_id, "courier already holds an active order");
            return Ok(None);
        }

        let mut best: Option<(String, f64)> = None;
        for order in self.ledger.list_unassigned_pending() {
            let distance = haversine_km(&courier_location, &order.customer_location);
            if best.as_ref().is_none_or(|(_, min)| distance < *min) {
                best = Some((order.id, distance));
            }
        }

        let Some((order_id, distance_km)) = best else {
            return Ok(None);
        };

        if !self.ledger.assign_if_unassigned(&order_id, courier_id) {
            debug!(order_id = %order_id, courier_id = %courier_id, "order taken by a concurrent writer");
            return Ok(None);
        }

        self.record(source);
        info!(
            order_id = %order_id,
            courier_id = %courier_id,
            distance_km,
            source = source.as_str(),
            "order assigned"
        );
        Ok(Some(order_id))
    }

    /// Offers the nearest pending order to every eligible courier. A failure
    /// for one courier is logged and the sweep moves on.
    pub fn sweep_assignments(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for courier in self.directory.list_eligible() {
            report.couriers += 1;
            match self.assign_best_order_for(&courier.id, AssignmentSource::Sweep) {
                Ok(Some(_)) => report.assigned += 1,
                Ok(None) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(courier_id = %courier.id, error = %err, "sweep failed for courier");
                }
            }
        }

        report
    }

    /// Stores a new order and binds it to the nearest eligible courier if
    /// one can still be claimed; otherwise it waits as `pending` for a sweep.
    pub fn dispatch_new_order(&self, new: NewOrder) -> Result<Order, AppError> {
        let nearest = self.find_nearest_eligible_courier(&new.customer_location);
        let order = self.ledger.create(new, None)?;

        let Some(courier_id) = nearest else {
            debug!(order_id = %order.id, "no eligible courier; order left pending");
            return Ok(order);
        };

        if self.ledger.assign_if_unassigned(&order.id, &courier_id) {
            self.record(AssignmentSource::NewOrder);
            info!(order_id = %order.id, courier_id = %courier_id, "order assigned");
            return self.ledger.get(&order.id);
        }

        debug!(order_id = %order.id, courier_id = %courier_id, "nearest courier was claimed first");
        Ok(order)
    }

    fn record(&self, source: AssignmentSource) {
        self.metrics
            .assignments_total
            .with_label_values(&[source.as_str()])
            .inc();
    }
}
