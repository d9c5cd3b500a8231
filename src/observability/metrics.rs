use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub job_runs_total: IntCounterVec,
    pub job_duration_seconds: HistogramVec,
    pub couriers_marked_stale_total: IntCounter,
    pub orders_by_status: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Orders bound to a courier by trigger"),
            &["source"],
        )
        .expect("valid assignments_total metric");

        let job_runs_total = IntCounterVec::new(
            Opts::new("job_runs_total", "Background job iterations by outcome"),
            &["job", "outcome"],
        )
        .expect("valid job_runs_total metric");

        let job_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "job_duration_seconds",
                "Duration of background job iterations in seconds",
            ),
            &["job"],
        )
        .expect("valid job_duration_seconds metric");

        let couriers_marked_stale_total = IntCounter::new(
            "couriers_marked_stale_total",
            "Couriers forced offline for stale locations",
        )
        .expect("valid couriers_marked_stale_total metric");

        let orders_by_status = IntGaugeVec::new(
            Opts::new("orders_by_status", "Orders per status as of the last stats refresh"),
            &["status"],
        )
        .expect("valid orders_by_status metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(job_runs_total.clone()))
            .expect("register job_runs_total");
        registry
            .register(Box::new(job_duration_seconds.clone()))
            .expect("register job_duration_seconds");
        registry
            .register(Box::new(couriers_marked_stale_total.clone()))
            .expect("register couriers_marked_stale_total");
        registry
            .register(Box::new(orders_by_status.clone()))
            .expect("register orders_by_status");

        Self {
            registry,
            assignments_total,
            job_runs_total,
            job_duration_seconds,
            couriers_marked_stale_total,
            orders_by_status,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
