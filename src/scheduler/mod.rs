//! Scheduler - Periodic, single-flight reconciliation
//!
//! ```text
//! interval tick ──► try_lock_owned ──┬── acquired ──► spawn pass (holds permit)
//!                                    │
//!                                    └── busy ──────► skip, log
//!
//! shutdown ──► stop ticking ──► lock().await (in-flight pass finishes)
//! ```
//!
//! Ticks never queue: a tick that lands while a pass is running is dropped.
//! Missed ticks are delayed, not bursted.

mod reconcile;

pub use reconcile::{PassReport, Reconciler};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// One unit of periodic work.
#[async_trait]
pub trait TickAction: Send + Sync + 'static {
    type Output: fmt::Debug + Send + 'static;

    async fn run(&self) -> anyhow::Result<Self::Output>;
}

#[derive(Debug)]
pub enum TickOutcome<T> {
    Completed(T),
    Failed(String),
    /// Another pass held the guard
    Skipped,
}

impl<T> TickOutcome<T> {
    pub fn is_skipped(&self) -> bool { matches!(self, TickOutcome::Skipped) }
}

pub struct Scheduler<A: TickAction> {
    action: Arc<A>,
    guard: Arc<Mutex<()>>,
    interval: Duration,
}

impl<A: TickAction> Clone for Scheduler<A> {
    fn clone(&self) -> Self {
        Self { action: self.action.clone(), guard: self.guard.clone(), interval: self.interval }
    }
}

impl<A: TickAction> Scheduler<A> {
    pub fn new(action: Arc<A>, interval: Duration) -> Self {
        Self { action, guard: Arc::new(Mutex::new(())), interval }
    }

    pub fn interval(&self) -> Duration { self.interval }

    pub fn is_running(&self) -> bool { self.guard.try_lock().is_err() }

    /// Run one pass in place, unless one is already in flight.
    pub async fn run_once(&self) -> TickOutcome<A::Output> {
        match self.guard.clone().try_lock_owned() {
            Ok(permit) => Self::execute(self.action.clone(), permit).await,
            Err(_) => {
                info!("previous pass still running, skipping tick");
                TickOutcome::Skipped
            }
        }
    }

    /// Start one pass on its own task. `None` when a pass is already in
    /// flight; the guard is taken before this returns.
    pub fn trigger(&self) -> Option<JoinHandle<TickOutcome<A::Output>>> {
        match self.guard.clone().try_lock_owned() {
            Ok(permit) => Some(tokio::spawn(Self::execute(self.action.clone(), permit))),
            Err(_) => {
                info!("previous pass still running, skipping tick");
                None
            }
        }
    }

    async fn execute(action: Arc<A>, permit: OwnedMutexGuard<()>) -> TickOutcome<A::Output> {
        let started = Instant::now();
        let outcome = match action.run().await {
            Ok(output) => {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, report = ?output, "pass finished");
                TickOutcome::Completed(output)
            }
            Err(e) => {
                error!(elapsed_ms = started.elapsed().as_millis() as u64, error = %e, "pass failed");
                TickOutcome::Failed(e.to_string())
            }
        };
        drop(permit);
        outcome
    }

    /// Tick until shutdown, then wait for the in-flight pass.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs_f64(), "scheduler started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        let _ = self.trigger();
                    }
                }
            }

            let _drained = self.guard.lock().await;
            info!("scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct Gate {
        runs: AtomicUsize,
        release: Notify,
        entered: Notify,
    }

    #[async_trait]
    impl TickAction for Gate {
        type Output = usize;

        async fn run(&self) -> anyhow::Result<usize> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            self.entered.notify_one();
            self.release.notified().await;
            Ok(n)
        }
    }

    struct Failing;

    #[async_trait]
    impl TickAction for Failing {
        type Output = ();
        async fn run(&self) -> anyhow::Result<()> { anyhow::bail!("ledger unreachable") }
    }

    fn gate() -> Arc<Gate> {
        Arc::new(Gate { runs: AtomicUsize::new(0), release: Notify::new(), entered: Notify::new() })
    }

    #[test]
    fn overlapping_tick_is_skipped() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let action = gate();
            let scheduler = Scheduler::new(action.clone(), Duration::from_secs(30));

            let first = scheduler.trigger().expect("first tick starts");
            action.entered.notified().await;
            assert!(scheduler.is_running());

            assert!(scheduler.trigger().is_none());
            assert!(scheduler.run_once().await.is_skipped());
            assert_eq!(action.runs.load(Ordering::SeqCst), 1);

            action.release.notify_one();
            assert!(matches!(first.await.unwrap(), TickOutcome::Completed(1)));
            assert!(!scheduler.is_running());

            // guard released: next tick runs
            let second = scheduler.trigger().expect("guard released");
            action.release.notify_one();
            assert!(matches!(second.await.unwrap(), TickOutcome::Completed(2)));
        });
    }

    #[test]
    fn failure_releases_guard() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let scheduler = Scheduler::new(Arc::new(Failing), Duration::from_secs(1));
            assert!(matches!(scheduler.run_once().await, TickOutcome::Failed(msg) if msg.contains("unreachable")));
            assert!(!scheduler.is_running());
        });
    }

    #[test]
    fn shutdown_waits_for_in_flight_pass() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let action = gate();
            let scheduler = Scheduler::new(action.clone(), Duration::from_millis(10));
            let (tx, rx) = broadcast::channel(1);
            let handle = scheduler.clone().spawn(rx);

            // first interval tick fires immediately
            action.entered.notified().await;
            tx.send(()).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(!handle.is_finished());

            action.release.notify_one();
            handle.await.unwrap();
            assert_eq!(action.runs.load(Ordering::SeqCst), 1);
        });
    }
}
