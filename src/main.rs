use std::sync::Arc;

use dayplanner::{
    config::EngineConfig,
    db::Db,
    finalizer::finalize_day,
    logger::{init_tracing, root_span},
    metrics::Counters,
    model::DayPlan,
    notifier::NotificationScheduler,
    store::{Store, sqlx_store::SqlxStore},
    timer::TimerEngine,
};

/// Initializes the database, runs migrations, and constructs the
/// `sqlx`-backed store (mirrors `backend::main::init_store`).
async fn init_store(cfg: &EngineConfig) -> anyhow::Result<Arc<dyn Store>> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    Ok(Arc::new(SqlxStore::new(db.pool.clone())))
}

/// Loads (creating lazily) today's Day Plan and settings, and builds a
/// running `TimerEngine` around them.
async fn start_engine(store: Arc<dyn Store>, cfg: &EngineConfig) -> anyhow::Result<Arc<TimerEngine>> {
    let today = dayplanner::time_utils::now().date_naive();
    let plan: DayPlan = store.get_or_create_plan(today).await?;
    let settings = store.get_settings().await?;

    let engine = TimerEngine::new(
        store,
        plan,
        settings,
        Counters::default(),
        cfg.save_interval_ticks,
    );
    engine.start();

    Ok(engine)
}

/// Starts the 30s notification scan. The callback only logs — a desktop
/// UI would route this through its own toast/tray mechanism (spec §1
/// Non-goals: the UI itself is out of core scope).
fn start_notifier(engine: Arc<TimerEngine>, cfg: &EngineConfig) -> Arc<NotificationScheduler> {
    let callback = Arc::new(|title: String, message: String| {
        tracing::info!(title = %title, message = %message, "notification fired");
    });

    let scheduler = NotificationScheduler::new(
        engine,
        callback,
        Counters::default(),
        cfg.notify_scan_interval_secs,
    );
    scheduler.start();
    scheduler
}

/// Once-per-minute check for a date rollover; finalizes yesterday's plan
/// exactly once when the local calendar date advances (spec §9, Open
/// Question #4 — a coarse poll is explicitly acceptable here).
fn start_midnight_finalizer(store: Arc<dyn Store>, counters: Counters) {
    tokio::spawn(async move {
        let mut last_seen = dayplanner::time_utils::now().date_naive();
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));

        loop {
            ticker.tick().await;
            let today = dayplanner::time_utils::now().date_naive();
            if today != last_seen {
                match finalize_day(store.as_ref(), last_seen, &counters).await {
                    Ok(Some(outcome)) => {
                        tracing::info!(plan_date = %last_seen, ?outcome, "midnight finalize complete");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, plan_date = %last_seen, "midnight finalize failed");
                    }
                }
                last_seen = today;
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    let _root = root_span("dayplanner").entered();
    tracing::info!("Starting dayplanner engine...");

    let cfg = EngineConfig::from_env();
    let store = init_store(&cfg).await?;

    let engine = start_engine(store.clone(), &cfg).await?;
    let _notifier = start_notifier(engine.clone(), &cfg);
    start_midnight_finalizer(store, engine.counters().clone());

    tracing::info!("Engine started; waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received; flushing and stopping");

    engine.stop().await;

    Ok(())
}
