//! Axum-based telemetry gateway: in-memory belief, desire, intention and status
//! endpoints for the BDI agent. Config-driven via CoreConfig.

mod handlers;

use axum::http::{header, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::Router;
use bdi_core::{CoreConfig, DomainStores, ExternalStatusBridge, GithubActionsClient};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use handlers::{beliefs, desires, intentions, method_not_allowed, preflight, status, ApiError};

/// Pre-flight check: config loads and the configured address can be bound.
fn run_verify() -> Result<(), String> {
    let config = CoreConfig::load().map_err(|e| format!("Config load failed: {}", e))?;
    println!("Config OK ({})", config.app_name);

    match config.repository() {
        Some(repo) => println!("GitHub Actions bridge: {}", repo),
        None => println!("GitHub Actions bridge: not configured (status?action=github will report an error)"),
    }

    let addr = format!("{}:{}", config.host, config.port);
    print!("Checking {}... ", addr);
    match std::net::TcpListener::bind(&addr) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => return Err(format!("{} BLOCKED: {}", addr, e)),
    }

    println!("\nAll checks passed. Ready to start gateway.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[bdi-gateway] .env not loaded: {} (using system environment)", e);
    }

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(CoreConfig::load()?);
    let client = GithubActionsClient::from_config(&config)?;
    if config.repository().is_none() {
        tracing::warn!(target: "bdi::bridge", "No GitHub repository configured; github_actions will report errors");
    }

    let app = build_app(AppState {
        config: Arc::clone(&config),
        stores: Arc::new(DomainStores::new()),
        bridge: Arc::new(ExternalStatusBridge::new(Arc::new(client))),
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(target: "bdi::gateway", "{} listening on {}", config.app_name, addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) stores: Arc<DomainStores>,
    pub(crate) bridge: Arc<ExternalStatusBridge>,
}

/// GET/POST resource with OPTIONS and a 405 for every other verb. HEAD is routed
/// explicitly since axum would otherwise answer it from the GET handler.
fn resource(routes: MethodRouter<AppState>) -> MethodRouter<AppState> {
    routes
        .head(method_not_allowed)
        .options(preflight)
        .fallback(method_not_allowed)
}

/// Panics inside handlers become the generic 500 envelope.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::Internal(detail).into_response()
}

fn build_app(state: AppState) -> Router {
    // Any origin may read and post telemetry.
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/api/beliefs", resource(get(beliefs::read).post(beliefs::write)))
        .route("/api/desires", resource(get(desires::read).post(desires::write)))
        .route("/api/intentions", resource(get(intentions::read).post(intentions::write)))
        .route("/api/status", resource(get(status::read).post(status::write)))
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
}
