use crate::{
    api::handlers::{accounts, health, login, token_details},
    cli::{globals::GlobalArgs, telemetry},
    credentials::{
        require_api_key, ApiKeyGate, EgressPolicy, HttpTokenAcquirer, RefreshConfig,
        RefreshScheduler, RefreshStatus, TokenStore, UpstreamClient,
    },
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use reqwest::Client;
use serde_json::json;
use std::{any::Any, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal, sync::watch};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Everything the routes need, shared by the server and the tests.
#[derive(Clone, Debug)]
pub struct ApiState {
    pub gate: Arc<ApiKeyGate>,
    pub upstream: UpstreamClient,
    pub acquirer: HttpTokenAcquirer,
    pub store: TokenStore,
    pub refresh_status: RefreshStatus,
}

/// Assemble the router: routes, docs, the API-key gate and the request-id/trace layers.
pub fn app(state: ApiState) -> Router {
    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/accounts/:account_id", get(accounts::account))
        .route(
            "/accounts/:account_id/transactions",
            get(accounts::transactions),
        )
        .route("/accounts/:account_id/trades", get(accounts::trades))
        .route("/auth/login", post(login::login))
        .route("/token/token_details", post(token_details::token_details))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()));

    with_layers(routes, state)
}

fn with_layers(routes: Router, state: ApiState) -> Router {
    let request_id = HeaderName::from_static("x-request-id");

    routes
        .layer(middleware::from_fn_with_state(state.gate, require_api_key))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    request_id.clone(),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(Extension(state.upstream))
                .layer(Extension(state.acquirer))
                .layer(Extension(state.store))
                .layer(Extension(state.refresh_status)),
        )
}

/// Start the refresh task and serve until SIGINT/SIGTERM.
///
/// # Errors
/// Returns an error if the upstream URL is unusable or the listener cannot be bound.
pub async fn new(
    port: u16,
    globals: &GlobalArgs,
    client: Client,
    gate: ApiKeyGate,
    egress_policy: EgressPolicy,
    refresh: RefreshConfig,
) -> Result<()> {
    let store = TokenStore::new();

    let acquirer = HttpTokenAcquirer::new(client.clone(), &globals.upstream_url)
        .context("Invalid upstream URL")?;

    let scheduler = Arc::new(RefreshScheduler::new(
        acquirer.clone(),
        store.clone(),
        globals.secret.clone(),
        refresh,
    ));
    let refresh_status = scheduler.status();

    let upstream = UpstreamClient::new(
        client,
        globals.upstream_url.clone(),
        store.clone(),
        egress_policy,
    );

    let app = app(ApiState {
        gate: Arc::new(gate),
        upstream,
        acquirer,
        store,
        refresh_status,
    });

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresh_task = scheduler.spawn(shutdown_rx);

    info!("Listening on [::]:{}", port);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    // In-flight requests are done; stop the refresh task, cancelling any pending backoff
    let _ = shutdown_tx.send(true);
    if let Err(e) = refresh_task.await {
        error!("Token refresh task failed: {}", e);
    }

    telemetry::shutdown_tracer();

    served.context("Server error")
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Request handler panicked: {}", details);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal Server Error" })),
    )
        .into_response()
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}
