use tracing::info;

use traffic_accounting_server::infrastructure::config::Config;
use traffic_accounting_server::infrastructure::startup::build_services;
use traffic_accounting_server::infrastructure::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let cfg = Config::load(&config_path)?;
    init_tracing(&cfg.logging)?;

    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        config_path = %config_path,
        "starting traffic accounting server"
    );

    let services = build_services(&cfg).await?;
    info!("traffic accounting services ready");

    shutdown_signal().await?;

    // 受付済みのサブスクリプションイベントを処理し終えてから終了する
    services.shutdown().await;
    info!("traffic accounting server stopped");
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c().await?;

    info!("shutdown signal received");
    Ok(())
}
