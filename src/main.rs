use std::sync::Arc;

use anyhow::Context;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{info, warn};

use storefront_api::{
    app,
    config::{init_tracing, load_config},
    db::{establish_connection, run_migrations},
    events::{process_events, EventSender},
    gateway::{HttpGateway, MockGateway, PaymentGateway},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(&config.log_level);

    info!(
        environment = %config.environment,
        port = config.port,
        "starting storefront-api"
    );

    let db = Arc::new(
        establish_connection(&config)
            .await
            .context("failed to connect to database")?,
    );
    if config.auto_migrate {
        run_migrations(&db).await.context("migrations failed")?;
        info!("database migrations applied");
    }

    let (tx, rx) = mpsc::channel(config.event_channel_capacity);
    tokio::spawn(process_events(rx));
    let event_sender = EventSender::new(tx);

    let gateway: Arc<dyn PaymentGateway> =
        match (&config.gateway_base_url, &config.gateway_api_key) {
            (Some(base_url), Some(api_key)) => {
                Arc::new(HttpGateway::new(base_url.clone(), api_key.clone()))
            }
            _ => {
                warn!("payment gateway credentials not set, using mock gateway");
                Arc::new(MockGateway)
            }
        };

    let config = Arc::new(config);
    let services = storefront_api::build_services(db.clone(), &config, gateway, event_sender);
    let state = AppState {
        db,
        config: config.clone(),
        services,
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
