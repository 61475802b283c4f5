//! Background sweep for stale Pending orders.
//!
//! Unpaid orders hold reserved pool units hostage; the reaper cancels any
//! Pending order older than the timeout window through the same
//! conditional cancel a user would take, so a payment landing mid-sweep
//! wins the race cleanly and the reaper just logs the loss.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::{ConfigCache, ORDER_TIMEOUT_MINUTES};
use crate::store::{AdoptionStore, StoreResult};

/// Background loop settings.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often the sweep runs.
    pub poll_interval: Duration,
    /// Expiry window for Pending orders, used when the config cache has no
    /// override under `order.timeout_minutes`.
    pub timeout_minutes: i64,
    /// Thread name, for logs.
    pub name: String,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            timeout_minutes: 30,
            name: "order-timeout-reaper".to_string(),
        }
    }
}

/// Outcome of a single sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale Pending orders found.
    pub scanned: usize,
    /// Successfully cancelled.
    pub cancelled: usize,
    /// Cancel attempts that failed (usually lost races); logged and skipped.
    pub failed: usize,
}

/// Cumulative counters across the life of a spawned reaper.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaperStats {
    pub sweeps: usize,
    pub cancelled: usize,
    pub failed: usize,
}

pub struct TimeoutReaper<S: ?Sized> {
    store: Arc<S>,
    config_cache: Arc<ConfigCache>,
}

impl<S: ?Sized> Clone for TimeoutReaper<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config_cache: Arc::clone(&self.config_cache),
        }
    }
}

impl<S: AdoptionStore + ?Sized + 'static> TimeoutReaper<S> {
    pub fn new(store: Arc<S>, config_cache: Arc<ConfigCache>) -> Self {
        Self {
            store,
            config_cache,
        }
    }

    /// Cancel every Pending order older than `timeout_minutes`.
    ///
    /// Per-order failures are logged and skipped: a lost race against a
    /// concurrent payment is expected traffic, not a sweep abort.
    pub fn sweep(&self, timeout_minutes: i64) -> StoreResult<SweepReport> {
        let cutoff = Utc::now() - chrono::Duration::minutes(timeout_minutes);
        let stale = self.store.expired_pending_orders(cutoff)?;

        let mut report = SweepReport {
            scanned: stale.len(),
            ..SweepReport::default()
        };
        for order in stale {
            match self.store.cancel_order(order.id) {
                Ok(cancelled) => {
                    info!(order_no = %cancelled.order_no, "stale order cancelled");
                    report.cancelled += 1;
                }
                Err(err) => {
                    warn!(order_no = %order.order_no, %err, "stale order skipped");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Effective timeout: the config-cache override when present, else the
    /// configured default.
    fn effective_timeout(&self, config: &ReaperConfig) -> i64 {
        self.config_cache
            .get_i64(ORDER_TIMEOUT_MINUTES)
            .filter(|m| *m > 0)
            .unwrap_or(config.timeout_minutes)
    }

    /// Run the sweep on a dedicated thread until shutdown.
    pub fn spawn(self, config: ReaperConfig) -> ReaperHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ReaperStats::default()));
        let thread_stats = Arc::clone(&stats);
        let name = config.name.clone();
        // Stores that bridge into async need a runtime context on this
        // thread; capture the caller's handle when one exists.
        let runtime = tokio::runtime::Handle::try_current().ok();

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _runtime_guard = runtime.as_ref().map(|h| h.enter());
                info!(reaper = %name, "reaper started");
                loop {
                    match shutdown_rx.recv_timeout(config.poll_interval) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    let timeout = self.effective_timeout(&config);
                    match self.sweep(timeout) {
                        Ok(report) => {
                            if let Ok(mut s) = thread_stats.lock() {
                                s.sweeps += 1;
                                s.cancelled += report.cancelled;
                                s.failed += report.failed;
                            }
                            if report.scanned > 0 {
                                info!(
                                    scanned = report.scanned,
                                    cancelled = report.cancelled,
                                    failed = report.failed,
                                    "sweep finished"
                                );
                            }
                        }
                        Err(err) => error!(%err, "sweep failed"),
                    }
                }
                info!(reaper = %name, "reaper stopped");
            })
            .expect("failed to spawn reaper thread");

        ReaperHandle {
            shutdown: shutdown_tx,
            thread: Some(handle),
            stats,
        }
    }
}

/// Handle to a running reaper thread.
pub struct ReaperHandle {
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
    stats: Arc<Mutex<ReaperStats>>,
}

impl ReaperHandle {
    pub fn stats(&self) -> ReaperStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    /// Signal shutdown and wait for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAdoptionStore;
    use crate::{InventoryPool, ReservationLedger, UnitRegistry};
    use cropshare_core::{OrderId, UserId};
    use cropshare_orders::OrderStatus;

    struct Harness {
        store: Arc<InMemoryAdoptionStore>,
        ledger: ReservationLedger<InMemoryAdoptionStore>,
        project_id: cropshare_core::ProjectId,
        user: UserId,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryAdoptionStore::new());
        let pool = InventoryPool::new(store.clone());
        let registry = UnitRegistry::new(store.clone());
        let project = pool.create_project("chili beds", 50, 600).unwrap();
        registry.batch_create(project.id, 50).unwrap();
        pool.open_adoption(project.id).unwrap();
        Harness {
            ledger: ReservationLedger::new(store.clone()),
            store,
            project_id: project.id,
            user: UserId::new(),
        }
    }

    fn backdate(store: &InMemoryAdoptionStore, order_id: OrderId, minutes: i64) {
        let mut order = store.order(order_id).unwrap().unwrap();
        order.created_at -= chrono::Duration::minutes(minutes);
        store.put_order_for_test(order);
    }

    #[test]
    fn sweep_cancels_only_expired_pending_orders() {
        let h = harness();
        let old = h.ledger.create_order(h.user, h.project_id, 2, None).unwrap();
        let fresh = h.ledger.create_order(h.user, h.project_id, 3, None).unwrap();
        let paid = h.ledger.create_order(h.user, h.project_id, 1, None).unwrap();
        h.ledger.pay_order(paid.id, "wechat", "WX-1").unwrap();
        backdate(&h.store, old.id, 40);
        backdate(&h.store, paid.id, 40);

        let reaper = TimeoutReaper::new(h.store.clone(), Arc::new(ConfigCache::new()));
        let report = reaper.sweep(30).unwrap();
        assert_eq!(report, SweepReport { scanned: 1, cancelled: 1, failed: 0 });

        assert_eq!(
            h.store.order(old.id).unwrap().unwrap().status,
            OrderStatus::Cancelled
        );
        assert_eq!(
            h.store.order(fresh.id).unwrap().unwrap().status,
            OrderStatus::Pending
        );
        assert_eq!(
            h.store.order(paid.id).unwrap().unwrap().status,
            OrderStatus::Paid
        );
        // 3 (fresh) + 1 (paid) stay reserved out of 50.
        assert_eq!(
            h.store.project(h.project_id).unwrap().unwrap().available_units,
            46
        );
    }

    #[test]
    fn sweep_skips_failed_cancels_and_keeps_going() {
        use chrono::Utc;
        use cropshare_inventory::{Project, ProjectStatus};
        use cropshare_orders::Order;

        let h = harness();
        let good = h.ledger.create_order(h.user, h.project_id, 2, None).unwrap();
        backdate(&h.store, good.id, 40);

        // A stale order whose project row is gone: its cancel cannot
        // release the pool counter and must fail without stopping the sweep.
        let mut ghost_project = Project::new(
            cropshare_core::ProjectId::new(),
            "razed field",
            5,
            600,
            Utc::now(),
        )
        .unwrap();
        ghost_project.status = ProjectStatus::Adopting;
        let mut orphan = Order::create(h.user, &ghost_project, 1, 0, None, Utc::now()).unwrap();
        orphan.created_at -= chrono::Duration::minutes(40);
        h.store.put_order_for_test(orphan.clone());

        let reaper = TimeoutReaper::new(h.store.clone(), Arc::new(ConfigCache::new()));
        let report = reaper.sweep(30).unwrap();
        assert_eq!(report, SweepReport { scanned: 2, cancelled: 1, failed: 1 });

        assert_eq!(
            h.store.order(good.id).unwrap().unwrap().status,
            OrderStatus::Cancelled
        );
        // The failed cancel changed nothing.
        assert_eq!(
            h.store.order(orphan.id).unwrap().unwrap().status,
            OrderStatus::Pending
        );
    }

    #[test]
    fn config_cache_overrides_the_default_window() {
        let h = harness();
        let cache = Arc::new(ConfigCache::new());
        cache.set(ORDER_TIMEOUT_MINUTES, serde_json::json!(5));
        let reaper = TimeoutReaper::new(h.store.clone(), cache);
        let config = ReaperConfig {
            timeout_minutes: 30,
            ..ReaperConfig::default()
        };
        assert_eq!(reaper.effective_timeout(&config), 5);

        reaper.config_cache.invalidate(ORDER_TIMEOUT_MINUTES);
        assert_eq!(reaper.effective_timeout(&config), 30);
    }

    #[test]
    fn spawned_reaper_shuts_down_cleanly() {
        let h = harness();
        let order = h.ledger.create_order(h.user, h.project_id, 2, None).unwrap();
        backdate(&h.store, order.id, 60);

        let reaper = TimeoutReaper::new(h.store.clone(), Arc::new(ConfigCache::new()));
        let handle = reaper.spawn(ReaperConfig {
            poll_interval: Duration::from_millis(10),
            timeout_minutes: 30,
            name: "test-reaper".to_string(),
        });
        std::thread::sleep(Duration::from_millis(100));
        handle.shutdown();

        assert_eq!(
            h.store.order(order.id).unwrap().unwrap().status,
            OrderStatus::Cancelled
        );
    }
}
