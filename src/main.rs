use std::{process, sync::Arc};

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::{CronStream, Schedule};
use tracing::{Dispatch, Level, debug, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use verdant::{
    application::{
        ActionLogService, AppError, DeviceControlService, PlantService, TelemetryService,
        jobs::{RetentionContext, run_retention_sweep},
    },
    bridge::{ActuatorBridge, CommandLedger, CommandSink},
    cache::{QueryCache, ReadThrough},
    config,
    infra::{db::PgDocumentStore, error::InfraError, http, telemetry},
    store::DocumentStore,
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

/// Connect to Postgres and bring the schema up to date.
async fn init_store(settings: &config::Settings) -> Result<PgDocumentStore, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PgDocumentStore::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    PgDocumentStore::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(PgDocumentStore::new(pool))
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_store(&settings).await?;
    info!("migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store: Arc<dyn DocumentStore> = Arc::new(init_store(&settings).await?);

    let cache = Arc::new(QueryCache::new(&settings.cache));
    let reads = Arc::new(ReadThrough::new(cache.clone(), settings.cache.enabled));
    let ledger = Arc::new(CommandLedger::new(store.clone(), reads.clone()));

    let (bridge, bridge_worker) = ActuatorBridge::connect(&settings.broker, ledger.clone());
    let bridge_handle = tokio::spawn(bridge_worker.run());

    let purge_handle = spawn_cache_purge(cache.clone(), settings.cache.purge_interval());

    let retention_ctx = RetentionContext::new(store.clone(), settings.retention.clone());
    let monitor_handle = spawn_job_monitor(&settings, retention_ctx.clone())?;

    let sink: Arc<dyn CommandSink> = bridge.clone();
    let state = http::AppState {
        plants: Arc::new(PlantService::new(store.clone(), reads.clone())),
        telemetry: Arc::new(TelemetryService::new(
            store.clone(),
            reads.clone(),
            ledger.clone(),
        )),
        control: Arc::new(DeviceControlService::new(store.clone(), reads.clone(), sink)),
        actions: Arc::new(ActionLogService::new(store, reads)),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    // Drain background work within the configured shutdown budget.
    retention_ctx.request_shutdown();
    bridge.shutdown().await;
    let _ = tokio::time::timeout(settings.server.graceful_shutdown, async {
        monitor_handle.abort();
        let _ = monitor_handle.await;
        bridge_handle.abort();
        let _ = bridge_handle.await;
    })
    .await;
    purge_handle.abort();
    let _ = purge_handle.await;

    Ok(())
}

fn spawn_cache_purge(
    cache: Arc<QueryCache>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, "purged expired cache entries");
            }
        }
    })
}

fn spawn_job_monitor(
    settings: &config::Settings,
    retention_ctx: RetentionContext,
) -> Result<tokio::task::JoinHandle<()>, AppError> {
    let schedule: Schedule = settings
        .retention
        .schedule
        .parse()
        .map_err(|err| AppError::unexpected(format!("invalid retention schedule: {err}")))?;

    let retention_worker = WorkerBuilder::new("retention-sweep-worker")
        .data(retention_ctx)
        .backend(CronStream::new(schedule))
        .build_fn(run_retention_sweep);

    let monitor = Monitor::new().register(retention_worker);

    Ok(tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => error!(error = %err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
