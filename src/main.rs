use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use breath_monitor::config::Config;
use breath_monitor::logging::{init_tracing, LogConfig};
use breath_monitor::notify::{build_sink, NotificationDispatcher};
use breath_monitor::routes::build_router;
use breath_monitor::sampler::SamplingLoop;
use breath_monitor::source::ReplaySource;
use breath_monitor::state::AppState;
use tokio::sync::broadcast;

/// 退出时等待通知队列排空的上限
const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&LogConfig::from(&config));
    tracing::info!("Starting breath-monitor");

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return ExitCode::FAILURE;
    }
    tracing::debug!(?config, "Configuration loaded");

    let source = match ReplaySource::open(&config.source_path).await {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(error = %e, path = %config.source_path, "Failed to open landmark source");
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let sink = build_sink(&config.notify);
    tracing::info!(sink = sink.name(), "Notification sink ready");
    let (dispatcher, dispatch_handle) = NotificationDispatcher::spawn(sink, &config.notify);

    let (sampler, snapshot_rx) = SamplingLoop::new(
        source,
        config.detector.classifier_config(),
        config.sampler.clone(),
        dispatcher,
    );

    let sampler_shutdown = shutdown_tx.subscribe();
    let sampler_handle = tokio::spawn(sampler.run(sampler_shutdown));

    let server_handle = if config.http_enabled {
        let state = AppState::new(snapshot_rx, &config, shutdown_tx.clone());
        let app = build_router(state);

        let addr = SocketAddr::new(config.host, config.port);
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, %addr, "Failed to bind TCP listener");
                let _ = shutdown_tx.send(());
                return ExitCode::FAILURE;
            }
        };
        tracing::info!(%addr, "Status server listening");

        let mut server_shutdown = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            });
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Status server crashed");
            }
        }))
    } else {
        drop(snapshot_rx);
        None
    };

    tokio::spawn(shutdown_signal(shutdown_tx.clone()));

    let exit = match sampler_handle.await {
        Ok(stats) => {
            tracing::info!(
                ticks = stats.ticks,
                episodes = stats.episodes,
                alerts = stats.alerts_emitted,
                suppressed = stats.alerts_suppressed,
                dropped = stats.alerts_dropped,
                open_secs = %format!("{:.1}", stats.open_secs_total),
                "Session summary"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Sampling loop panicked");
            ExitCode::FAILURE
        }
    };

    // 数据源结束时同样需要停止 HTTP 服务
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, dispatch_handle).await {
        Ok(Ok(stats)) => tracing::info!(
            delivered = stats.delivered,
            failed = stats.failed,
            "Notification queue drained"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "Notification worker panicked"),
        Err(_) => tracing::warn!("Notification queue did not drain in time, abandoning pending alerts"),
    }

    if let Some(handle) = server_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Status server task panicked");
        }
    }

    tracing::info!("Shutdown complete");
    exit
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, using Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
