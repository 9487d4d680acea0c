use std::future::IntoFuture;

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ecoquest::{cors_layer, create_router, AppState, Config, JsonFileStore};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Optional: LISTEN_ADDR (default: 0.0.0.0:3001)");
            eprintln!("Optional: DATA_FILE (default: markers.json)");
            eprintln!("Optional: APP_ENV (development enables error detail)");
            eprintln!("Optional: CORS_ORIGIN (default: any origin)");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting EcoQuest server");
    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Data file: {}", config.data_file.display());

    // Make sure the data file exists before serving
    if let Err(e) = JsonFileStore::new(&config.data_file).init() {
        eprintln!("Data file error: {}", e);
        std::process::exit(1);
    }

    let state = AppState::from_config(&config);

    // Build router
    let app = create_router(state).layer(cors_layer(config.cors_origin.clone()));

    // Start server
    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server running at http://{}", config.listen_addr);

    // In-flight requests are not drained on shutdown.
    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {}
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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
}
