use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub pending: usize,
    pub assigned: usize,
    pub picked_up: usize,
    pub delivered: usize,
    pub cancelled: usize,
    pub oldest_unassigned_minutes: i64,
    pub oldest_assigned_not_picked_minutes: i64,
    pub oldest_picked_not_delivered_minutes: i64,
    pub refreshed_at: Option<DateTime<Utc>>,
}
