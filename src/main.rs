use dotenv::dotenv;
use salvo::prelude::*;
use tokio::signal;

use mesa_gateway::{api, AppState, Config};

/// Wait for shutdown signal (SIGTERM, SIGINT, or Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mesa_gateway=info".parse()?)
                .add_directive("salvo=info".parse()?)
                .add_directive("sqlx=warn".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    let state = AppState::new(&config)?;

    let router = api::router(state);
    let acceptor = TcpListener::new(&config.server_address).bind().await;
    tracing::info!("mesa gateway listening on {}", config.server_address);

    let server = Server::new(acceptor);
    tokio::select! {
        _ = server.serve(Service::new(router)) => {
            tracing::info!("server stopped");
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down gracefully");
        }
    }

    Ok(())
}
