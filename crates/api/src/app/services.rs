//! Store selection and service construction.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use cropshare_infra::{
    AdoptionStore, ConfigCache, FulfillmentTracker, InMemoryAdoptionStore, InventoryPool,
    PostgresAdoptionStore, ReaperConfig, ReaperHandle, ReservationLedger, TimeoutReaper,
    UnitRegistry,
};

/// Everything the handlers need, behind one `Arc` in request extensions.
///
/// The store is type-erased so the in-memory and Postgres worlds share one
/// wiring path. Handlers run the sync services on the blocking pool
/// (`tokio::task::spawn_blocking`), which also gives the Postgres store the
/// runtime context its sync bridge needs.
pub struct AppServices {
    pub pool: InventoryPool<dyn AdoptionStore>,
    pub registry: UnitRegistry<dyn AdoptionStore>,
    pub ledger: ReservationLedger<dyn AdoptionStore>,
    pub tracker: FulfillmentTracker<dyn AdoptionStore>,
    pub config: Arc<ConfigCache>,
    reaper: Option<ReaperHandle>,
}

impl AppServices {
    /// Wire all services over the given store, spawning the timeout reaper
    /// unless `with_reaper` is false (tests).
    pub fn over_store(store: Arc<dyn AdoptionStore>, with_reaper: bool) -> Self {
        let config = Arc::new(ConfigCache::new());
        let reaper = with_reaper.then(|| {
            TimeoutReaper::new(Arc::clone(&store), Arc::clone(&config))
                .spawn(ReaperConfig::default())
        });
        Self {
            pool: InventoryPool::new(Arc::clone(&store)),
            registry: UnitRegistry::new(Arc::clone(&store)),
            ledger: ReservationLedger::new(Arc::clone(&store)),
            tracker: FulfillmentTracker::new(store),
            config,
            reaper,
        }
    }

    /// Stop the background reaper, waiting for the thread to exit.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.reaper.take() {
            handle.shutdown();
        }
    }
}

/// Build services against the store selected by the environment.
///
/// `USE_PERSISTENT_STORE=true` plus `DATABASE_URL` selects Postgres;
/// anything else runs in-memory.
pub async fn build_services() -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORE")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);

    let store: Arc<dyn AdoptionStore> = if use_persistent {
        let url = std::env::var("DATABASE_URL")
            .expect("USE_PERSISTENT_STORE=true requires DATABASE_URL");
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await
            .expect("failed to connect to postgres");
        let store = PostgresAdoptionStore::new(pool);
        store.ensure_schema().await.expect("failed to apply schema");
        tracing::info!("using postgres adoption store");
        Arc::new(store)
    } else {
        tracing::info!("using in-memory adoption store");
        Arc::new(InMemoryAdoptionStore::new())
    };

    AppServices::over_store(store, true)
}
