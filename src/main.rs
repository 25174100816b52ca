use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use purgebot::{
    AppState,
    config::PurgebotConfig,
    observability::init_tracing,
    purge::PurgeExecutor,
    routes,
    scheduler::{Scheduler, TaskRegistry},
    store::build_store,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Upper bound on how long shutdown waits for in-flight purges.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// CLI arguments for purgebot
#[derive(Parser, Debug)]
#[command(version, about = "Scheduled channel purge service", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (built-in defaults with the in-memory store if omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the scheduler and the HTTP command interface (default)
    Serve,
    /// Validate the configuration and print the resolved settings
    Check,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(args.config.as_deref());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Check => run_check(&config),
    }
}

fn load_config(path: Option<&std::path::Path>) -> PurgebotConfig {
    let Some(path) = path else {
        return PurgebotConfig::default();
    };

    match PurgebotConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn run_check(config: &PurgebotConfig) {
    println!("Configuration OK");
    println!("  listen:                {}", config.server.socket_addr());
    println!("  store:                 {}", config.store.kind());
    println!("  tick:                  {}s", config.scheduler.tick_secs);
    println!("  prevent overlap:       {}", config.scheduler.prevent_overlap);
    println!("  page size:             {}", config.purge.page_size);
    println!("  bulk batch size:       {}", config.purge.batch_size);
    println!(
        "  bulk delete max age:   {} days",
        config.purge.bulk_delete_max_age_days
    );
    println!("  dry run:               {}", config.purge.dry_run);
    for warning in config.warnings() {
        println!("warning: {warning}");
    }
}

async fn run_server(config: PurgebotConfig) {
    if let Err(e) = init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {e}");
        std::process::exit(1);
    }
    for warning in config.warnings() {
        tracing::warn!("{warning}");
    }

    let store = match build_store(&config.store, config.purge.bulk_delete_max_age()) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build message store");
            std::process::exit(1);
        }
    };
    tracing::info!(store = config.store.kind(), "Message store ready");

    let executor = Arc::new(PurgeExecutor::new(store, config.purge.clone()));
    let task_tracker = TaskTracker::new();
    let scheduler = Arc::new(Scheduler::new(
        TaskRegistry::new(),
        executor,
        config.scheduler.clone(),
        task_tracker.clone(),
    ));

    let shutdown = CancellationToken::new();
    let scheduler_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        async move { scheduler.run(shutdown).await }
    });

    let app = routes::router(AppState::new(scheduler));

    let bind_addr = config.server.socket_addr();
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_addr, error = %e, "Failed to bind to address");
            std::process::exit(1);
        }
    };
    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    shutdown.cancel();
    if let Err(e) = scheduler_handle.await {
        tracing::error!(error = %e, "Scheduler task panicked");
    }

    task_tracker.close();
    match tokio::time::timeout(SHUTDOWN_GRACE, task_tracker.wait()).await {
        Ok(()) => tracing::info!("All in-flight purges completed"),
        Err(_) => tracing::warn!(
            remaining = task_tracker.len(),
            "Timeout waiting for in-flight purges, some may not have completed"
        ),
    }

    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, waiting for in-flight purges to complete...");
}
