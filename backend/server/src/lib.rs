//! Documentation of a cafeteria order queue.
//!
//! Clients submit food/drink orders, the kitchen display polls what is still being made,
//! and staff mark orders ready or complete.
//!
//!
//!
//! # General Infrastructure
//! - Single axum server in front of one SQLite `orders` table
//! - Every request reads the table fresh, nothing is cached in the process
//! - Ordering screen and kitchen display are plain browser pages talking JSON
//! - Kitchen display is served by this server at `/kitchen`
//!
//!
//!
//! # Order Lifecycle
//!
//! - `POST /api/order` stores the order as `Preparing` under the lowest free number >= 100
//! - `POST /api/mark_ready` flips it to `Ready`
//! - `POST /api/complete_order` deletes the row, freeing the number for the next order
//! - There is never a `Completed` row, completion is deletion
//!
//!
//!
//! # Notes
//!
//! ## Availability over correctness
//! `/api/kitchen_orders` and `/api/orders` answer `[]` with 200 when the database fails. A screen
//! hanging on the kitchen wall is worse than an empty one for a few seconds. The allocator
//! follows the same policy and falls back to 100.
//!
//! ## Duplicate numbers
//! Two tills submitting at once must not get the same ticket. The free gap is searched inside
//! the `INSERT` statement, which holds the database write lock, so submissions queue up rather
//! than race. `UNIQUE` on `number_order` stays as a backstop and a rejected write is retried
//! up to [`numbering::PLACE_ATTEMPTS`] times.
//!
//!
//!
//! # Setup
//!
//! Environment.
//! ```sh
//! RUST_PORT=5000
//! DATABASE_URL=sqlite://canteen.db?mode=rwc
//! DATABASE_MAX_CONNECTIONS=5
//! RUST_LOG=info
//! ```
//!
//! Run.
//! ```sh
//! cargo run -p canteen
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod numbering;
pub mod routes;
pub mod state;
pub mod store;

use routes::{
    complete_order_handler, create_order_handler, health_handler, kitchen_handler,
    kitchen_orders_handler, last_order_handler, mark_ready_handler, orders_handler,
};
use state::AppState;

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/last_order", get(last_order_handler))
        .route("/api/order", post(create_order_handler))
        .route("/api/orders", get(orders_handler))
        .route("/api/kitchen_orders", get(kitchen_orders_handler))
        .route("/api/mark_ready", post(mark_ready_handler))
        .route("/api/complete_order", post(complete_order_handler))
        .route("/api/health", get(health_handler))
        .route("/kitchen", get(kitchen_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            return std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
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
