use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use console::style;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::ServeFlags;
use crate::config::{self, Config};
use crate::core::executor::{CliExecutor, Executor};
use crate::core::lifecycle::LifecycleManager;
use crate::core::scheduler::{SchedulerSettings, TaskScheduler};
use crate::core::session_manager::SessionManager;
use crate::core::store::{SessionStore, StatsStore, TaskStore};
use crate::core::terminal::{self, GuideSection};
use crate::core::webhook::{WebhookDispatcher, WebhookSettings};
use crate::interfaces::web::ratelimit::RateLimiter;
use crate::interfaces::web::{ApiServer, AppState};
use crate::logging;

/// Hourly cadence for retention sweeps (task + session cleanup).
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

pub async fn run_serve(flags: ServeFlags) -> Result<()> {
    let data_dir = flags.data_dir.unwrap_or_else(config::data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

    let mut config = Config::load(&data_dir)?;
    if let Some(host) = flags.host {
        config.host = host;
    }
    if let Some(port) = flags.port {
        config.port = port;
    }

    let _log_guard = logging::init_logging(
        &config.log_level,
        config.log_file.as_deref().map(Path::new),
    );
    terminal::print_banner();
    info!("Starting dispatchd (data dir {})", data_dir.display());

    let tasks = TaskStore::open(data_dir.join("tasks.json"))?;
    let session_store = SessionStore::open(data_dir.join("sessions.json"))?;
    let stats = StatsStore::open(data_dir.join("statistics.json"), config.statistics.enabled)?;

    let executor: Arc<dyn Executor> = Arc::new(CliExecutor::new(
        config.executor.command.clone(),
        config.default_model.clone(),
        Duration::from_secs(config.executor.timeout_secs),
    ));
    let webhooks = Arc::new(WebhookDispatcher::new(WebhookSettings {
        enabled: config.webhook.enabled,
        default_url: config.webhook.default_url.clone(),
        timeout: Duration::from_secs(config.webhook.timeout_secs),
        max_retries: config.webhook.retries,
    }));
    let sessions = SessionManager::new(
        session_store.clone(),
        stats.clone(),
        executor.clone(),
        webhooks.clone(),
        config.default_model.clone(),
        config.default_project_path.clone(),
    );
    let scheduler = TaskScheduler::new(
        SchedulerSettings {
            concurrency: config.task_queue.concurrency,
            poll_interval: Duration::from_millis(config.task_queue.poll_interval_ms),
            default_timeout: Duration::from_secs(config.task_queue.default_timeout_secs),
            drain_timeout: Duration::from_secs(10),
        },
        tasks.clone(),
        session_store.clone(),
        stats.clone(),
        executor.clone(),
        webhooks.clone(),
    );

    let config = Arc::new(config);
    let state = AppState {
        scheduler: scheduler.clone(),
        tasks: tasks.clone(),
        sessions: sessions.clone(),
        stats: stats.clone(),
        webhooks,
        executor,
        config: config.clone(),
        started_at: Instant::now(),
        rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
    };

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(scheduler.clone())));
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(
        state,
        config.host.clone(),
        config.port,
    ))));
    lifecycle.start().await?;

    let pid_path = pid_file_path(&config, &data_dir);
    write_pid_file(&pid_path)?;

    spawn_maintenance(tasks, sessions, config.clone());
    if config.statistics.enabled {
        spawn_stats_snapshot(stats, Duration::from_secs(config.statistics.collection_interval_secs));
    }

    GuideSection::new("Broker Started")
        .status(
            "API Endpoint",
            &format!("http://{}:{}", config.host, config.port),
        )
        .status("Concurrency", &config.task_queue.concurrency.to_string())
        .status("Executor", &config.executor.command)
        .blank()
        .info(&format!(
            "Press {} to stop the broker.",
            style("Ctrl+C").bold().yellow()
        ))
        .print();
    println!();

    wait_for_shutdown().await;
    info!("Shutdown signal received");
    lifecycle.shutdown().await?;
    remove_pid_file(&pid_path);
    terminal::print_success("dispatchd stopped.");
    Ok(())
}

fn pid_file_path(config: &Config, data_dir: &Path) -> PathBuf {
    config
        .pid_file
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("run").join("dispatchd.pid"))
}

fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, std::process::id().to_string())
        .with_context(|| format!("Failed to write pid file {}", path.display()))?;
    Ok(())
}

fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove pid file {}: {}", path.display(), e);
    }
}

fn spawn_maintenance(tasks: TaskStore, sessions: SessionManager, config: Arc<Config>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            match tasks.cleanup(config.task_retention_days).await {
                Ok(0) => {}
                Ok(n) => info!("Retention sweep removed {} task(s)", n),
                Err(e) => warn!("Task retention sweep failed: {}", e),
            }
            if let Err(e) = sessions.cleanup_expired(config.session_retention_days).await {
                warn!("Session retention sweep failed: {}", e);
            }
        }
    });
}

fn spawn_stats_snapshot(stats: StatsStore, interval: Duration) {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let doc = stats.aggregate().await;
            info!(
                "Snapshot: uptime {}s, {} requests ({} ok, {} failed), ${:.4} total",
                started.elapsed().as_secs(),
                doc.requests.total,
                doc.requests.successful,
                doc.requests.failed,
                doc.costs.total_usd,
            );
        }
    });
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
