use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};

use crate::api::handlers::{attestations, funding, sponsorship, status, uploads};
use crate::api::ApiError;
use crate::attestation::Attestor;
use crate::config::Settings;
use crate::gateway::StorageGateway;
use crate::sponsorship::SponsorshipService;
use crate::storage::ApprovalRepository;
use crate::wallet::ServerWallet;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub wallet: Arc<ServerWallet>,
    pub gateway: Arc<dyn StorageGateway>,
    pub attestor: Arc<dyn Attestor>,
    pub sponsorship: Arc<SponsorshipService>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        wallet: Arc<ServerWallet>,
        gateway: Arc<dyn StorageGateway>,
        attestor: Arc<dyn Attestor>,
        approvals: Arc<dyn ApprovalRepository>,
    ) -> Self {
        let sponsorship = Arc::new(SponsorshipService::new(
            gateway.clone(),
            approvals,
            wallet.clone(),
            settings.sponsorship.clone(),
        ));
        Self {
            settings: Arc::new(settings),
            wallet,
            gateway,
            attestor,
            sponsorship,
        }
    }
}

fn panic_message(err: &(dyn Any + Send)) -> String {
    if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}

/// 500 for a panicking handler; the panic text is only exposed in development
fn panic_response(err: Box<dyn Any + Send + 'static>, development: bool) -> Response {
    let detail = panic_message(err.as_ref());
    error!("Unhandled error in request handler: {}", detail);

    let message = if development {
        detail
    } else {
        "An unexpected error occurred".to_string()
    };
    ApiError::with_details(
        500,
        "Internal Server Error".to_string(),
        serde_json::json!({ "reason": message }),
    )
    .into_response()
}

/// Body limit, panic handler and CORS, applied to every route
fn with_middleware<S>(router: Router<S>, body_limit: usize, development: bool) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(move |err: Box<dyn Any + Send + 'static>| {
            panic_response(err, development)
        }))
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(AnyOrigin),
        )
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.settings.uploads.max_upload_bytes;
    let development = state.settings.is_development();

    let routes = Router::new()
        .route("/", get(status::banner))
        .route("/health", get(status::health))
        .route("/api/health", get(status::api_health))
        .route("/api/publicKey", get(status::public_key))
        // Uploads
        .route("/api/signData", post(uploads::sign_data))
        .route("/api/uploadPhoto", post(uploads::upload_photo))
        // Server balance
        .route("/api/fundIrysNode", post(funding::fund_irys_node))
        .route("/api/irysBalance", get(funding::irys_balance))
        // Sponsorship
        .route(
            "/api/initiateSponsoredUpload",
            post(sponsorship::initiate_sponsored_upload),
        )
        .route("/api/sponsorApprovals", get(sponsorship::sponsor_approvals))
        .route("/api/uploaderApprovals", get(sponsorship::uploader_approvals))
        .route("/api/irys/auto-approve", post(sponsorship::auto_approve))
        // Attestations
        .route("/api/createAttestation", post(attestations::create_attestation));

    with_middleware(routes, body_limit, development).with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, stopping server");
}

/// Bind the configured address and serve until Ctrl-C
pub async fn start_api_server(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.settings.host, state.settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("C-Data backend listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}
