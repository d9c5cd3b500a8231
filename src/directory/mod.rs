use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use tracing::{debug, info};

use crate::auth::Credentials;
use crate::error::AppError;
use crate::geo::Location;
use crate::models::courier::{Courier, CourierView, NewCourier};
use crate::models::order::OrderStatus;
use crate::store::Store;

/// Courier records and the rules deciding who can take work.
#[derive(Clone)]
pub struct CourierDirectory {
    store: Arc<Store>,
    credentials: Credentials,
    staleness_threshold: chrono::Duration,
}

impl CourierDirectory {
    pub fn new(store: Arc<Store>, credentials: Credentials, staleness_threshold: Duration) -> Self {
        Self {
            store,
            credentials,
            staleness_threshold: chrono::Duration::from_std(staleness_threshold)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn register(&self, new: NewCourier) -> Result<CourierView, AppError> {
        if new.id.trim().is_empty() || new.name.trim().is_empty() {
            return Err(AppError::BadRequest("id and name cannot be empty".to_string()));
        }

        let password_hash = self.credentials.hash(&new.password)?;

        match self.store.courier_names.entry(new.name.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::AlreadyExists(format!("courier {}", new.name)));
            }
            Entry::Vacant(slot) => {
                slot.insert(new.id.clone());
            }
        }

        let courier = Courier {
            id: new.id.clone(),
            name: new.name.clone(),
            phone: new.phone,
            location: new.location,
            online: false,
            blocked: false,
            password_hash,
            location_updated_at: None,
            battery_level: None,
            network_info: None,
            created_at: Utc::now(),
        };

        let view = match self.store.couriers.entry(new.id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => Some(slot.insert(courier).view()),
        };

        match view {
            Some(view) => {
                info!(courier_id = %view.id, name = %view.name, "courier registered");
                Ok(view)
            }
            None => {
                self.store.courier_names.remove(&new.name);
                Err(AppError::AlreadyExists(format!("courier {}", new.id)))
            }
        }
    }

    pub fn authenticate(&self, name: &str, password: &str) -> Result<CourierView, AppError> {
        let courier = self
            .store
            .courier_names
            .get(name)
            .map(|entry| entry.value().clone())
            .and_then(|id| self.store.courier(&id))
            .filter(|courier| !courier.blocked)
            .ok_or(AppError::InvalidCredentials)?;

        if !self.credentials.verify(password, &courier.password_hash) {
            return Err(AppError::InvalidCredentials);
        }

        Ok(courier.view())
    }

    pub fn set_online(&self, id: &str, online: bool) -> Result<(), AppError> {
        let mut courier = self.lock(id)?;
        courier.online = online;
        debug!(courier_id = %id, online, "courier availability changed");
        Ok(())
    }

    pub fn update_location(
        &self,
        id: &str,
        location: Location,
        battery_level: Option<String>,
        network_info: Option<String>,
    ) -> Result<(), AppError> {
        let mut courier = self.lock(id)?;
        courier.location = Some(location);
        courier.battery_level = battery_level;
        courier.network_info = network_info;
        courier.location_updated_at = Some(Utc::now());
        Ok(())
    }

    /// Releases the courier's not-yet-picked orders back to `pending`, then
    /// blocks the courier. Both steps run under the courier's row lock, so no
    /// assignment can land between them.
    pub fn block(&self, id: &str) -> Result<(), AppError> {
        let mut courier = self.lock(id)?;

        if self.store.holds_order_in(id, OrderStatus::PickedUp) {
            return Err(AppError::CourierDelivering);
        }

        let mut released = Vec::new();
        let mut delivering = false;
        for mut entry in self.store.orders.iter_mut() {
            let order = entry.value_mut();
            if !order.is_held_by(id) {
                continue;
            }
            match order.status {
                OrderStatus::Assigned => {
                    order.status = OrderStatus::Pending;
                    order.assigned_to = None;
                    released.push(order.id.clone());
                }
                // A pickup raced in after the first check.
                OrderStatus::PickedUp => delivering = true,
                _ => {}
            }
        }

        if delivering {
            return Err(AppError::CourierDelivering);
        }

        courier.blocked = true;
        info!(courier_id = %id, released = released.len(), "courier blocked");
        Ok(())
    }

    pub fn unblock(&self, id: &str) -> Result<(), AppError> {
        let mut courier = self.lock(id)?;
        courier.blocked = false;
        info!(courier_id = %id, "courier unblocked");
        Ok(())
    }

    pub fn reset_password(&self, id: &str, password: &str) -> Result<(), AppError> {
        let password_hash = self.credentials.hash(password)?;
        let mut courier = self.lock(id)?;
        courier.password_hash = password_hash;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<CourierView, AppError> {
        self.store
            .courier(id)
            .map(|courier| courier.view())
            .ok_or_else(|| not_found(id))
    }

    /// Online couriers first, then by id.
    pub fn list(&self) -> Vec<CourierView> {
        let mut couriers = self.store.courier_snapshot();
        couriers.sort_by(|a, b| b.online.cmp(&a.online).then_with(|| a.id.cmp(&b.id)));
        couriers.iter().map(Courier::view).collect()
    }

    /// Couriers that are online, unblocked and hold no active order, by id.
    pub fn list_eligible(&self) -> Vec<CourierView> {
        let mut couriers = self.store.courier_snapshot();
        let busy = self.store.busy_courier_ids();
        couriers.retain(|courier| courier.is_available() && !busy.contains(&courier.id));
        couriers.sort_by(|a, b| a.id.cmp(&b.id));
        couriers.iter().map(Courier::view).collect()
    }

    pub fn is_eligible(&self, id: &str) -> bool {
        self.store
            .courier(id)
            .is_some_and(|courier| courier.is_available())
            && !self.store.holds_active_order(id)
    }

    pub fn mark_stale_offline(&self) -> usize {
        self.mark_stale_offline_as_of(Utc::now())
    }

    /// Forces offline every online courier whose last location report is
    /// older than the staleness threshold at `now`, or who never reported.
    pub fn mark_stale_offline_as_of(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now
            .checked_sub_signed(self.staleness_threshold)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut changed = 0;

        for mut entry in self.store.couriers.iter_mut() {
            let courier = entry.value_mut();
            let stale = courier
                .location_updated_at
                .is_none_or(|updated_at| updated_at < cutoff);
            if courier.online && stale {
                courier.online = false;
                changed += 1;
            }
        }

        if changed > 0 {
            info!(couriers = changed, "stale couriers set offline");
        }
        changed
    }

    fn lock(&self, id: &str) -> Result<RefMut<'_, String, Courier>, AppError> {
        self.store.lock_courier(id).ok_or_else(|| not_found(id))
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("courier {id} not found"))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use super::CourierDirectory;
    use crate::auth::Credentials;
    use crate::error::AppError;
    use crate::geo::Location;
    use crate::models::courier::NewCourier;
    use crate::models::order::{Order, OrderStatus};
    use crate::store::Store;

    pub(crate) fn directory(store: Arc<Store>) -> CourierDirectory {
        CourierDirectory::new(
            store,
            Credentials::new(8, 1, 4).unwrap(),
            Duration::from_secs(10 * 60),
        )
    }

    pub(crate) fn new_courier(id: &str, location: Option<Location>) -> NewCourier {
        NewCourier {
            id: id.to_string(),
            name: format!("courier-{id}"),
            phone: "+10000000".to_string(),
            password: "secret".to_string(),
            location,
        }
    }

    pub(crate) fn order(id: &str, status: OrderStatus, assigned_to: Option<&str>) -> Order {
        Order {
            id: id.to_string(),
            assigned_to: assigned_to.map(str::to_string),
            status,
            customer_location: Location::new(0.0, 1.0),
            store_location: Location::new(0.0, 0.5),
            customer_phone: "+20000000".to_string(),
            customer_name: "Customer".to_string(),
            customer_addr_bp: String::new(),
            customer_addr_details: String::new(),
            created_at: Utc::now(),
            picked_at: None,
            delivered_at: None,
        }
    }

    fn setup() -> (Arc<Store>, CourierDirectory) {
        let store = Arc::new(Store::new());
        (store.clone(), directory(store))
    }

    #[test]
    fn registered_courier_starts_offline_and_unblocked() {
        let (_store, directory) = setup();
        let view = directory
            .register(new_courier("c1", Some(Location::new(1.0, 2.0))))
            .unwrap();

        assert!(!view.online);
        assert!(!view.blocked);
        assert_eq!(view.location, Some(Location::new(1.0, 2.0)));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let (_store, directory) = setup();
        directory.register(new_courier("c1", None)).unwrap();

        let mut second = new_courier("c2", None);
        second.name = "courier-c1".to_string();
        assert!(matches!(
            directory.register(second),
            Err(AppError::AlreadyExists(_))
        ));
        assert!(directory.get("c2").is_err());
    }

    #[test]
    fn duplicate_id_releases_the_claimed_name() {
        let (_store, directory) = setup();
        directory.register(new_courier("c1", None)).unwrap();

        let mut clash = new_courier("c1", None);
        clash.name = "someone-else".to_string();
        assert!(matches!(
            directory.register(clash),
            Err(AppError::AlreadyExists(_))
        ));

        let mut retry = new_courier("c2", None);
        retry.name = "someone-else".to_string();
        assert!(directory.register(retry).is_ok());
    }

    #[test]
    fn short_password_is_rejected() {
        let (_store, directory) = setup();
        let mut courier = new_courier("c1", None);
        courier.password = "abc".to_string();
        assert!(matches!(
            directory.register(courier),
            Err(AppError::PasswordTooShort { .. })
        ));
    }

    #[test]
    fn authentication_does_not_reveal_which_part_failed() {
        let (_store, directory) = setup();
        directory.register(new_courier("c1", None)).unwrap();

        assert_eq!(
            directory.authenticate("courier-c1", "secret").unwrap().id,
            "c1"
        );

        let wrong_password = directory.authenticate("courier-c1", "nope!").unwrap_err();
        let unknown_name = directory.authenticate("ghost", "secret").unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_name.to_string());
        assert!(matches!(wrong_password, AppError::InvalidCredentials));
    }

    #[test]
    fn blocked_courier_cannot_authenticate() {
        let (_store, directory) = setup();
        directory.register(new_courier("c1", None)).unwrap();
        directory.block("c1").unwrap();

        assert!(matches!(
            directory.authenticate("courier-c1", "secret"),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn reset_password_checks_length_then_existence() {
        let (_store, directory) = setup();
        directory.register(new_courier("c1", None)).unwrap();

        assert!(matches!(
            directory.reset_password("ghost", "x"),
            Err(AppError::PasswordTooShort { .. })
        ));
        assert!(matches!(
            directory.reset_password("ghost", "longenough"),
            Err(AppError::NotFound(_))
        ));

        directory.reset_password("c1", "brand-new").unwrap();
        assert!(directory.authenticate("courier-c1", "secret").is_err());
        assert!(directory.authenticate("courier-c1", "brand-new").is_ok());
    }

    #[test]
    fn block_refuses_while_delivering() {
        let (store, directory) = setup();
        directory.register(new_courier("c1", None)).unwrap();
        store
            .orders
            .insert("o1".into(), order("o1", OrderStatus::PickedUp, Some("c1")));

        assert!(matches!(
            directory.block("c1"),
            Err(AppError::CourierDelivering)
        ));
        assert!(!directory.get("c1").unwrap().blocked);
    }

    #[test]
    fn block_releases_assigned_orders() {
        let (store, directory) = setup();
        directory.register(new_courier("c1", None)).unwrap();
        store
            .orders
            .insert("o1".into(), order("o1", OrderStatus::Assigned, Some("c1")));
        store
            .orders
            .insert("o2".into(), order("o2", OrderStatus::Delivered, Some("c1")));

        directory.block("c1").unwrap();

        let released = store.order("o1").unwrap();
        assert_eq!(released.status, OrderStatus::Pending);
        assert_eq!(released.assigned_to, None);
        assert_eq!(store.order("o2").unwrap().assigned_to.as_deref(), Some("c1"));
        assert!(directory.get("c1").unwrap().blocked);

        directory.unblock("c1").unwrap();
        assert!(!directory.get("c1").unwrap().blocked);
    }

    #[test]
    fn eligibility_needs_online_unblocked_and_idle() {
        let (store, directory) = setup();
        for id in ["a", "b", "c", "d"] {
            directory.register(new_courier(id, None)).unwrap();
        }
        directory.set_online("a", true).unwrap();
        directory.set_online("b", true).unwrap();
        directory.set_online("c", true).unwrap();
        directory.block("c").unwrap();
        store
            .orders
            .insert("o1".into(), order("o1", OrderStatus::Assigned, Some("b")));

        let eligible: Vec<String> = directory
            .list_eligible()
            .into_iter()
            .map(|courier| courier.id)
            .collect();
        assert_eq!(eligible, vec!["a".to_string()]);
        assert!(directory.is_eligible("a"));
        assert!(!directory.is_eligible("b"));
        assert!(!directory.is_eligible("d"));
    }

    #[test]
    fn list_puts_online_couriers_first() {
        let (_store, directory) = setup();
        for id in ["a", "b", "c"] {
            directory.register(new_courier(id, None)).unwrap();
        }
        directory.set_online("c", true).unwrap();

        let ids: Vec<String> = directory.list().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn staleness_sweep_uses_last_location_report() {
        let (_store, directory) = setup();
        for id in ["fresh", "stale", "silent"] {
            directory.register(new_courier(id, None)).unwrap();
            directory.set_online(id, true).unwrap();
        }
        let base = Utc::now();
        directory
            .update_location("fresh", Location::new(0.0, 0.0), None, None)
            .unwrap();
        directory
            .update_location("stale", Location::new(0.0, 0.0), Some("80%".into()), None)
            .unwrap();

        // "stale" last reported 11 minutes before the sweep, "fresh" 9.
        directory
            .store
            .lock_courier("stale")
            .unwrap()
            .location_updated_at = Some(base - chrono::Duration::minutes(11));
        directory
            .store
            .lock_courier("fresh")
            .unwrap()
            .location_updated_at = Some(base - chrono::Duration::minutes(9));

        let changed = directory.mark_stale_offline_as_of(base);

        assert_eq!(changed, 2);
        assert!(directory.get("fresh").unwrap().online);
        assert!(!directory.get("stale").unwrap().online);
        assert!(!directory.get("silent").unwrap().online);
        assert_eq!(
            directory.get("stale").unwrap().battery_level.as_deref(),
            Some("80%")
        );
    }

    #[test]
    fn operations_on_unknown_courier_fail_with_not_found() {
        let (_store, directory) = setup();
        assert!(matches!(
            directory.set_online("ghost", true),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(directory.block("ghost"), Err(AppError::NotFound(_))));
        assert!(matches!(
            directory.update_location("ghost", Location::new(0.0, 0.0), None, None),
            Err(AppError::NotFound(_))
        ));
    }
}
