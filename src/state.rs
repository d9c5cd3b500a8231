use std::sync::Arc;

use crate::auth::Credentials;
use crate::config::Config;
use crate::directory::CourierDirectory;
use crate::engine::matching::Matcher;
use crate::engine::stats::StatsAggregator;
use crate::error::AppError;
use crate::ledger::OrderLedger;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

pub struct AppState {
    pub store: Arc<Store>,
    pub couriers: CourierDirectory,
    pub orders: OrderLedger,
    pub matcher: Matcher,
    pub stats: StatsAggregator,
    pub metrics: Metrics,
    pub admin: AdminCredentials,
    pub default_page_limit: usize,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let store = Arc::new(Store::new());
        let metrics = Metrics::new();

        let couriers = CourierDirectory::new(
            store.clone(),
            Credentials::from_config(config)?,
            config.staleness_threshold,
        );
        let orders = OrderLedger::new(store.clone());
        let matcher = Matcher::new(couriers.clone(), orders.clone(), metrics.clone());
        let stats = StatsAggregator::new(store.clone(), metrics.clone());

        Ok(Self {
            store,
            couriers,
            orders,
            matcher,
            stats,
            metrics,
            admin: AdminCredentials {
                username: config.admin_username.clone(),
                password: config.admin_password.clone(),
            },
            default_page_limit: config.default_page_limit.max(1),
        })
    }
}
