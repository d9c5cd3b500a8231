use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::models::order::OrderStatus;
use crate::models::stats::StatsSnapshot;
use crate::observability::metrics::Metrics;
use crate::store::Store;

/// Cached ledger-wide counters. Readers get the last computed snapshot and
/// never trigger a refresh.
#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<Store>,
    current: Arc<RwLock<Arc<StatsSnapshot>>>,
    metrics: Metrics,
}

impl StatsAggregator {
    pub fn new(store: Arc<Store>, metrics: Metrics) -> Self {
        Self {
            store,
            current: Arc::new(RwLock::new(Arc::new(StatsSnapshot::default()))),
            metrics,
        }
    }

    pub fn refresh(&self) -> StatsSnapshot {
        self.refresh_as_of(Utc::now())
    }

    pub fn refresh_as_of(&self, now: DateTime<Utc>) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot {
            refreshed_at: Some(now),
            ..StatsSnapshot::default()
        };
        let mut oldest_pending: Option<DateTime<Utc>> = None;
        let mut oldest_assigned: Option<DateTime<Utc>> = None;
        let mut oldest_picked: Option<DateTime<Utc>> = None;

        for entry in self.store.orders.iter() {
            let order = entry.value();
            match order.status {
                OrderStatus::Pending => {
                    snapshot.pending += 1;
                    keep_oldest(&mut oldest_pending, Some(order.created_at));
                }
                OrderStatus::Assigned => {
                    snapshot.assigned += 1;
                    keep_oldest(&mut oldest_assigned, Some(order.created_at));
                }
                OrderStatus::PickedUp => {
                    snapshot.picked_up += 1;
                    keep_oldest(&mut oldest_picked, order.picked_at);
                }
                OrderStatus::Delivered => snapshot.delivered += 1,
                OrderStatus::Cancelled => snapshot.cancelled += 1,
            }
        }

        snapshot.oldest_unassigned_minutes = age_minutes(oldest_pending, now);
        snapshot.oldest_assigned_not_picked_minutes = age_minutes(oldest_assigned, now);
        snapshot.oldest_picked_not_delivered_minutes = age_minutes(oldest_picked, now);

        self.publish_gauges(&snapshot);

        let fresh = Arc::new(snapshot.clone());
        match self.current.write() {
            Ok(mut current) => *current = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }

        snapshot
    }

    pub fn get(&self) -> StatsSnapshot {
        let current = match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        (*current).clone()
    }

    fn publish_gauges(&self, snapshot: &StatsSnapshot) {
        let counts = [
            (OrderStatus::Pending, snapshot.pending),
            (OrderStatus::Assigned, snapshot.assigned),
            (OrderStatus::PickedUp, snapshot.picked_up),
            (OrderStatus::Delivered, snapshot.delivered),
            (OrderStatus::Cancelled, snapshot.cancelled),
        ];
        for (status, count) in counts {
            self.metrics
                .orders_by_status
                .with_label_values(&[status.as_str()])
                .set(count as i64);
        }
    }
}

fn keep_oldest(oldest: &mut Option<DateTime<Utc>>, candidate: Option<DateTime<Utc>>) {
    if let Some(candidate) = candidate {
        if oldest.is_none_or(|current| candidate < current) {
            *oldest = Some(candidate);
        }
    }
}

fn age_minutes(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    since
        .map(|since| (now - since).num_minutes().max(0))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::StatsAggregator;
    use crate::directory::tests::order;
    use crate::models::order::OrderStatus;
    use crate::observability::metrics::Metrics;
    use crate::store::Store;

    #[test]
    fn counts_orders_per_status() {
        let store = Arc::new(Store::new());
        let rows = [
            ("p1", OrderStatus::Pending),
            ("p2", OrderStatus::Pending),
            ("p3", OrderStatus::Pending),
            ("a1", OrderStatus::Assigned),
            ("d1", OrderStatus::Delivered),
        ];
        for (id, status) in rows {
            store.orders.insert(id.into(), order(id, status, None));
        }

        let stats = StatsAggregator::new(store, Metrics::new());
        let snapshot = stats.refresh();

        assert_eq!(snapshot.pending, 3);
        assert_eq!(snapshot.assigned, 1);
        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.picked_up, 0);
        assert_eq!(snapshot.cancelled, 0);
        assert_eq!(snapshot.oldest_picked_not_delivered_minutes, 0);
    }

    #[test]
    fn ages_use_creation_or_pickup_time() {
        let store = Arc::new(Store::new());
        let now = Utc::now();

        for (id, status, created, picked) in [
            ("p-old", OrderStatus::Pending, 45, None),
            ("p-new", OrderStatus::Pending, 3, None),
            ("a1", OrderStatus::Assigned, 20, None),
            ("k1", OrderStatus::PickedUp, 90, Some(12)),
        ] {
            let mut row = order(id, status, None);
            row.created_at = now - Duration::minutes(created);
            row.picked_at = picked.map(|minutes| now - Duration::minutes(minutes));
            store.orders.insert(id.into(), row);
        }

        let snapshot = StatsAggregator::new(store, Metrics::new()).refresh_as_of(now);
        assert_eq!(snapshot.oldest_unassigned_minutes, 45);
        assert_eq!(snapshot.oldest_assigned_not_picked_minutes, 20);
        assert_eq!(snapshot.oldest_picked_not_delivered_minutes, 12);
    }

    #[test]
    fn get_serves_cached_snapshot_until_refresh() {
        let store = Arc::new(Store::new());
        let stats = StatsAggregator::new(store.clone(), Metrics::new());
        assert_eq!(stats.get().pending, 0);
        assert!(stats.get().refreshed_at.is_none());

        store
            .orders
            .insert("p1".into(), order("p1", OrderStatus::Pending, None));
        assert_eq!(stats.get().pending, 0);

        stats.refresh();
        assert_eq!(stats.get().pending, 1);
        assert!(stats.get().refreshed_at.is_some());
    }
}
