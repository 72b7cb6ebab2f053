// src/scheduler.rs
//! Background scheduler: independent periodic jobs with bounded overlap.
//!
//! Explicitly constructed and injectable — no process-wide singleton. Each job
//! ticks on its own interval; if the previous run is still going, overlapping
//! instances are tolerated up to `max_instances`, after which ticks are dropped
//! rather than queued (backpressure against a slow external dependency).

use metrics::counter;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Overlap tolerance used by both pipeline jobs unless overridden.
pub const DEFAULT_MAX_INSTANCES: usize = 3;

type JobFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct JobSpec {
    name: &'static str,
    interval: Duration,
    max_instances: usize,
    run: JobFn,
}

pub struct Scheduler {
    jobs: Vec<JobSpec>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    pub fn add_job<F, Fut>(
        &mut self,
        name: &'static str,
        interval: Duration,
        max_instances: usize,
        job: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.jobs.push(JobSpec {
            name,
            interval,
            max_instances: max_instances.max(1),
            run: Arc::new(move || Box::pin(job())),
        });
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Spawn one ticker task per registered job. The first tick fires
    /// immediately, so each job runs once at startup.
    pub fn start(&mut self) {
        let jobs: Vec<JobSpec> = self.jobs.drain(..).collect();
        for spec in jobs {
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            self.handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(spec.interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                let in_flight = Arc::new(AtomicUsize::new(0));

                info!(target: "scheduler", job = spec.name, interval_secs = spec.interval.as_secs(), "job registered");

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if in_flight.load(Ordering::SeqCst) >= spec.max_instances {
                                counter!("scheduler_ticks_dropped_total", "job" => spec.name).increment(1);
                                warn!(
                                    target: "scheduler",
                                    job = spec.name,
                                    max_instances = spec.max_instances,
                                    "tick dropped, too many instances in flight"
                                );
                                continue;
                            }
                            in_flight.fetch_add(1, Ordering::SeqCst);
                            counter!("scheduler_ticks_total", "job" => spec.name).increment(1);

                            let fut = (spec.run)();
                            let gauge = in_flight.clone();
                            // In-flight runs are never cancelled mid-call; shutdown
                            // only stops new ticks.
                            tokio::spawn(async move {
                                fut.await;
                                gauge.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
                info!(target: "scheduler", job = spec.name, "job ticker stopped");
            }));
        }
    }

    /// Stop issuing new ticks and wait for the ticker tasks to exit. Runs
    /// already in flight complete on their own.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
