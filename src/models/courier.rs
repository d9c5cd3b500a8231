use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Location;

/// Courier row as kept by the store. Never serialized directly since it
/// carries the credential hash; see [`CourierView`].
#[derive(Debug, Clone)]
pub struct Courier {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub location: Option<Location>,
    pub online: bool,
    pub blocked: bool,
    pub password_hash: String,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub battery_level: Option<String>,
    pub network_info: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Courier {
    /// Online and unblocked. Still has to be free of active orders to take work.
    pub fn is_available(&self) -> bool {
        self.online && !self.blocked
    }

    pub fn view(&self) -> CourierView {
        CourierView {
            id: self.id.clone(),
            name: self.name.clone(),
            phone: self.phone.clone(),
            location: self.location,
            online: self.online,
            blocked: self.blocked,
            location_updated_at: self.location_updated_at,
            battery_level: self.battery_level.clone(),
            network_info: self.network_info.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourierView {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub location: Option<Location>,
    pub online: bool,
    pub blocked: bool,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub battery_level: Option<String>,
    pub network_info: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCourier {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub password: String,
    pub location: Option<Location>,
}
