//! Standalone x402 facilitator server for the Miden blockchain.
//!
//! # Endpoints
//!
//! - `GET  /`                  - Service info
//! - `GET  /health`            - Health check (genesis binding, supported kinds)
//! - `GET  /supported`         - List supported payment kinds
//! - `POST /verify`            - Verify a payment payload
//! - `POST /settle`            - Settle a payment on-chain
//! - `GET  /balance/{account}` - Faucet balance of a public account (`?faucet=0x...`)
//!
//! # Configuration
//!
//! - `BIND_ADDR`, or `HOST` (default 0.0.0.0) and `PORT` (default 4020)
//! - `MIDEN_RPC_URL`   - Miden node RPC URL (default: https://rpc.testnet.miden.io)
//! - `MIDEN_NETWORK`   - "testnet" or "mainnet" (default: testnet)
//! - `FAUCET_ID`       - Default faucet for `/balance` (default: testnet USDC faucet)
//! - `LOG_LEVEL`       - Used when `RUST_LOG` is unset (default: info)
//! - `FACILITATOR_*`   - Engine settings, see `FacilitatorConfig::from_env`

use std::env;
use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower::buffer::BufferLayer;
use tower::limit::RateLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use x402_miden_engine::V2MidenExactFacilitator;
use x402_miden_engine::chain::{
    FacilitatorConfig, MidenAccountAddress, MidenChainConfig, MidenChainProvider,
    MidenChainReference, MidenTokenDeployment,
};
use x402_miden_engine::exact::{SettleRequest, SettleResponse, VerifyRequest};
use x402_miden_engine::proof::NativeVerifier;
use x402_types::scheme::X402SchemeFacilitator;

type Facilitator = V2MidenExactFacilitator<NativeVerifier, MidenChainProvider>;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

struct AppState {
    facilitator: Facilitator,
    faucet_id: MidenAccountAddress,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // LOG_LEVEL is used if RUST_LOG is not set
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    let rpc_url =
        env::var("MIDEN_RPC_URL").unwrap_or_else(|_| "https://rpc.testnet.miden.io".to_string());
    let network = env::var("MIDEN_NETWORK").unwrap_or_else(|_| "testnet".to_string());
    let faucet_id = match env::var("FAUCET_ID") {
        Ok(value) => value.parse()?,
        Err(_) => MidenTokenDeployment::testnet_usdc().faucet_id,
    };

    let chain_config = MidenChainConfig {
        chain_reference: MidenChainReference::try_from(network.as_str())?,
        rpc_url,
    };
    let provider = MidenChainProvider::from_config(&chain_config)?;
    let config = FacilitatorConfig::from_env()?;

    tracing::info!(
        network = %chain_config.chain_reference,
        rpc_url = %chain_config.rpc_url,
        faucet_id = %faucet_id,
        overpayment = %config.overpayment,
        security_level = config.security_level,
        cache_capacity = config.cache_capacity,
        "Miden facilitator starting"
    );

    let facilitator = V2MidenExactFacilitator::new(
        NativeVerifier::new(config.security_level),
        provider,
        config,
    );

    // Without a genesis binding no settlement can be trusted.
    if let Err(e) = facilitator.initialize().await {
        tracing::error!(error = %e, "Failed to bind genesis commitment, refusing to start");
        return Err(e.into());
    }

    let state = Arc::new(AppState {
        facilitator,
        faucet_id,
    });

    let purge_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            purge_state.facilitator.purge_expired();
        }
    });

    // 100 requests per 60 seconds on /verify and /settle.
    // BufferLayer wraps the non-Clone RateLimit service so axum can clone handlers.
    let rate_limited_routes = Router::new()
        .route("/verify", post(verify_handler))
        .route("/settle", post(settle_handler))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|err: tower::BoxError| async move {
                    tracing::warn!(error = %err, "Rate limit or buffer error");
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        Json(serde_json::json!({
                            "error": "rate_limited",
                            "message": "Too many requests. Please try again later.",
                        })),
                    )
                }))
                .layer(BufferLayer::new(256))
                .layer(RateLimitLayer::new(100, Duration::from_secs(60))),
        );

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/supported", get(supported_handler))
        .route("/balance/{account}", get(balance_handler))
        .merge(rate_limited_routes)
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // BIND_ADDR takes precedence over HOST:PORT
    let bind_address = env::var("BIND_ADDR").unwrap_or_else(|_| {
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4020);
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        format!("{host}:{port}")
    });
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Listening on {bind_address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

fn bad_request(e: serde_json::Error) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": "invalid_request",
            "message": e.to_string(),
        })),
    )
}

fn to_json<T: serde::Serialize>(value: &T) -> (StatusCode, Json<serde_json::Value>) {
    match serde_json::to_value(value) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": format!("serialization error: {e}") })),
        ),
    }
}

async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "x402-miden-facilitator",
        "version": env!("CARGO_PKG_VERSION"),
        "chain": "miden",
        "scheme": "exact",
        "network": state.facilitator.network(),
        "faucetId": state.faucet_id,
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.facilitator.genesis() {
        Some(genesis) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "network": state.facilitator.network(),
                "genesis": genesis,
            })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "genesis_unavailable" })),
        ),
    }
}

async fn supported_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.facilitator.supported().await {
        Ok(response) => to_json(&response),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let request = match serde_json::from_value::<VerifyRequest>(body) {
        Ok(req) => req,
        Err(e) => return bad_request(e),
    };

    // STARK verification is CPU-bound; keep it off the async workers.
    let verify_state = Arc::clone(&state);
    match tokio::task::spawn_blocking(move || verify_state.facilitator.verify(&request)).await {
        Ok(response) => to_json(&response),
        Err(e) => {
            tracing::error!(error = %e, "Verify task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal_error" })),
            )
        }
    }
}

async fn settle_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let request = match serde_json::from_value::<SettleRequest>(body) {
        Ok(req) => req,
        Err(e) => return bad_request(e),
    };

    // Same off-worker treatment as verify; only the submission is async.
    let prepare_state = Arc::clone(&state);
    let prepared =
        tokio::task::spawn_blocking(move || prepare_state.facilitator.prepare_settlement(&request))
            .await;
    match prepared {
        Ok(Ok(prepared)) => to_json(&state.facilitator.submit(prepared).await),
        Ok(Err(reason)) => to_json(&SettleResponse::Failure { reason }),
        Err(e) => {
            tracing::error!(error = %e, "Settle task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal_error" })),
            )
        }
    }
}

#[derive(Deserialize)]
struct BalanceQuery {
    faucet: Option<MidenAccountAddress>,
}

async fn balance_handler(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> impl IntoResponse {
    let account: MidenAccountAddress = match account.parse() {
        Ok(account) => account,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "invalid_account", "message": e.to_string() })),
            );
        }
    };
    let faucet = query.faucet.unwrap_or(state.faucet_id);

    match state.facilitator.account_balance(&account, &faucet).await {
        Ok(balance) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "account": account,
                "faucetId": faucet,
                "balance": balance.to_string(),
            })),
        ),
        Err(e) => {
            tracing::warn!(account = %account, error = %e, "Balance query failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "balance_unavailable" })),
            )
        }
    }
}
