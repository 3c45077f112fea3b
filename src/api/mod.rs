use crate::{
    auth::{
        policy::{TEAMS_READ, TEAMS_WRITE, TOKENS_WRITE, USERS_READ, USERS_WRITE},
        PolicyStore,
    },
    store::{memory::MemoryStore, postgres::PgStore, SharedStore},
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request, StatusCode, Uri},
    middleware::from_fn,
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, warn, Span};
use ulid::Ulid;

pub mod bootstrap;
pub mod errors;
pub mod handlers;
pub mod middleware;
mod openapi;
pub mod state;

pub use bootstrap::AdminAccount;
pub use openapi::openapi;
pub use state::{AppState, AuthConfig};

use self::{
    handlers::{health, teams, tokens, users},
    middleware::{authenticate, permit},
};

/// DSN selecting the in-process store instead of Postgres.
pub const MEMORY_DSN: &str = "memory://";

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct Database {
    pub dsn: String,
    pub max_connections: u32,
}

/// Build the application router around `state`.
///
/// `/health` and `/v1/ping` are public; every other route resolves the
/// caller's identity first and then checks the permission of that route.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/v1/ping", get(health::ping));

    let private = Router::new()
        .route(
            "/v1/tokens/authentication",
            post(tokens::login).delete(tokens::logout),
        )
        .route(
            "/v1/tokens/read-only",
            permit(TOKENS_WRITE, post(tokens::read_only)),
        )
        .route(
            "/v1/users",
            permit(USERS_READ, get(users::current)).merge(permit(USERS_WRITE, post(users::create))),
        )
        .route(
            "/v1/users/:id",
            permit(USERS_READ, get(users::show))
                .merge(permit(USERS_WRITE, patch(users::update).delete(users::delete))),
        )
        .route("/v1/teams", permit(TEAMS_WRITE, post(teams::create)))
        .route(
            "/v1/teams/:id",
            permit(TEAMS_READ, get(teams::show))
                .merge(permit(TEAMS_WRITE, patch(teams::update).delete(teams::delete))),
        )
        .route_layer(from_fn(authenticate));

    public.merge(private).fallback(not_found).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(state)),
    )
}

/// Open the store named by `database.dsn`.
///
/// # Errors
/// Return error if the database is unreachable
pub async fn connect(database: &Database, config: &AuthConfig) -> Result<SharedStore> {
    if database.dsn == MEMORY_DSN {
        warn!("Using the in-memory store, all records are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(database.max_connections)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(config.storage_timeout())
        .test_before_acquire(true)
        .connect(&database.dsn)
        .await
        .context("Failed to connect to database")?;

    Ok(Arc::new(PgStore::new(pool, config.storage_timeout())))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    database: Database,
    policy: Arc<dyn PolicyStore>,
    config: AuthConfig,
    admin: Option<AdminAccount>,
) -> Result<()> {
    let store = connect(&database, &config).await?;

    if let Some(admin) = admin {
        bootstrap::ensure_admin(&*store, &admin)
            .await
            .context("Failed to bootstrap the administrator account")?;
    }

    let app = router(Arc::new(AppState::new(store, policy, config)));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "code": "PAGE_NOT_FOUND",
            "message": "Page not found",
            "uri": uri.to_string(),
        })),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
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
