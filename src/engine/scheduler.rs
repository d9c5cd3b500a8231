//! Periodic background work: stats refresh, assignment sweep and the
//! staleness sweep, each on its own tokio task.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::state::AppState;

struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Owns the periodic workers and their shared shutdown token.
pub struct Scheduler {
    tasks: Vec<PeriodicTask>,
    shutdown: CancellationToken,
    metrics: Metrics,
}

impl Scheduler {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
            metrics,
        }
    }

    /// Refreshes stats once synchronously, then starts the three dispatch loops.
    pub fn start(state: Arc<AppState>, config: &Config) -> Self {
        state.stats.refresh();

        let mut scheduler = Self::new(state.metrics.clone());

        let stats_state = state.clone();
        scheduler.spawn_periodic("stats_refresh", config.stats_refresh_interval, move || {
            let state = stats_state.clone();
            async move {
                state.stats.refresh();
                Ok(())
            }
        });

        let sweep_state = state.clone();
        scheduler.spawn_periodic(
            "assignment_sweep",
            config.assignment_sweep_interval,
            move || {
                let state = sweep_state.clone();
                async move {
                    let report = state.matcher.sweep_assignments();
                    debug!(
                        couriers = report.couriers,
                        assigned = report.assigned,
                        failed = report.failed,
                        "assignment sweep finished"
                    );
                    Ok(())
                }
            },
        );

        let staleness_state = state;
        scheduler.spawn_periodic(
            "staleness_sweep",
            config.staleness_sweep_interval,
            move || {
                let state = staleness_state.clone();
                async move {
                    let changed = state.couriers.mark_stale_offline();
                    state
                        .metrics
                        .couriers_marked_stale_total
                        .inc_by(changed as u64);
                    Ok(())
                }
            },
        );

        info!(tasks = scheduler.len(), "dispatch scheduler started");
        scheduler
    }

    /// Runs `job` every `period`, first after one full period. Each iteration
    /// sits behind its own panic barrier; errors and panics are logged and the
    /// loop carries on. Ticks never overlap and cancellation is only observed
    /// between iterations.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let metrics = self.metrics.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let started = Instant::now();
                let outcome = match AssertUnwindSafe(job()).catch_unwind().await {
                    Ok(Ok(())) => "success",
                    Ok(Err(err)) => {
                        warn!(task = %name, error = %err, "periodic task iteration failed");
                        "error"
                    }
                    Err(panic_info) => {
                        let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                            (*s).to_string()
                        } else if let Some(s) = panic_info.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        error!(task = %name, panic = %panic_msg, "periodic task iteration panicked");
                        "panic"
                    }
                };

                metrics
                    .job_duration_seconds
                    .with_label_values(&[name])
                    .observe(started.elapsed().as_secs_f64());
                metrics
                    .job_runs_total
                    .with_label_values(&[name, outcome])
                    .inc();
            }

            debug!(task = %name, "periodic task stopped");
        });

        debug!(task = %name, period_secs = period.as_secs_f64(), "registered periodic task");
        self.tasks.push(PeriodicTask { name, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signals every loop to stop and waits for in-flight iterations to finish.
    pub async fn shutdown(self) {
        info!(tasks = self.tasks.len(), "stopping dispatch scheduler");
        self.shutdown.cancel();

        for task in self.tasks {
            if let Err(err) = task.handle.await {
                error!(task = %task.name, error = ?err, "periodic task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::Scheduler;
    use crate::error::AppError;
    use crate::observability::metrics::Metrics;

    fn explode() -> Result<(), AppError> {
        panic!("broken task")
    }

    #[tokio::test]
    async fn panics_and_errors_do_not_stop_the_loop() {
        let mut scheduler = Scheduler::new(Metrics::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        scheduler.spawn_periodic("flaky", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => panic!("first iteration blows up"),
                    1 => Err(AppError::Internal("second iteration fails".to_string())),
                    _ => Ok(()),
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.shutdown().await;

        assert!(runs.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn one_failing_task_leaves_the_others_running() {
        let mut scheduler = Scheduler::new(Metrics::new());
        let healthy_runs = Arc::new(AtomicUsize::new(0));

        scheduler.spawn_periodic("always_panics", Duration::from_millis(10), || async {
            explode()
        });

        let counter = healthy_runs.clone();
        scheduler.spawn_periodic("healthy", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(scheduler.len(), 2);
        scheduler.shutdown().await;

        assert!(healthy_runs.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn shutdown_stops_future_iterations() {
        let mut scheduler = Scheduler::new(Metrics::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        scheduler.spawn_periodic("counter", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.shutdown().await;
        let after_shutdown = runs.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_shutdown);
    }
}
