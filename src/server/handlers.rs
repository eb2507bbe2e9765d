use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{info, warn};

use super::client::render_client_html;
use super::models::{
    ErrorResponse, ImportResponse, NetworkStatus, ReconcileRequest, ReconcileResponse,
    TranslateRequest, TranslateResponse,
};
use super::state::ServerState;
use crate::gateway::{Direction, TranslationGateway};
use crate::library::{LibraryData, TagLibrary};
use crate::providers::build_google_backends;
use crate::settings::Settings;

type ApiError = (StatusCode, Json<ErrorResponse>);

struct AppState {
    inner: ServerState,
    client_html: String,
}

pub async fn run_server(settings: Settings, addr: String) -> Result<()> {
    let backends = build_google_backends(&settings).into_shared();
    let gateway = TranslationGateway::from_settings(&settings, backends);
    let library = TagLibrary::load(&settings.library_path).into_shared();
    let app = router(ServerState::new(gateway, library), &settings)?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("serving prompt translator on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Builds the HTTP routes. The client page calls back into the same origin.
pub fn router(state: ServerState, settings: &Settings) -> Result<Router> {
    let state = Arc::new(AppState {
        inner: state,
        client_html: render_client_html(settings, "")?,
    });
    Ok(Router::new()
        .route("/", get(client_page))
        .route("/health", get(health))
        .route("/translate", post(translate))
        .route("/check-network", get(check_network))
        .route("/reconcile", post(reconcile))
        .route("/library", get(library))
        .route("/library/import", post(import_library))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware)))
}

async fn client_page(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.client_html.clone())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn required_text(text: Option<String>) -> Result<String, ApiError> {
    let text = text.unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "text is required"));
    }
    Ok(text.to_string())
}

async fn translate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let text = required_text(payload.text)?;
    let direction = Direction::from_to_english(payload.to_english);
    match state.inner.gateway.translate_one(&text, direction).await {
        Ok(translation) => Ok(Json(TranslateResponse {
            translation: translation.trim().to_string(),
        })),
        Err(err) => {
            warn!("translate request failed: {}", err);
            Err(api_error(err.status_code(), err.to_string()))
        }
    }
}

async fn check_network(State(state): State<Arc<AppState>>) -> Json<NetworkStatus> {
    Json(NetworkStatus {
        available: state.inner.gateway.is_available().await,
    })
}

async fn reconcile(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReconcileRequest>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let text = required_text(payload.text)?;
    let outcome = state.inner.reconciler.reconcile_text(&text).await;
    Ok(Json(ReconcileResponse {
        prompt: outcome.prompt(),
        error: outcome.error.as_ref().map(ToString::to_string),
        entries: outcome.entries,
    }))
}

async fn library(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.inner.library.read().await.export())
}

async fn import_library(
    State(state): State<Arc<AppState>>,
    Json(incoming): Json<LibraryData>,
) -> Result<Json<ImportResponse>, ApiError> {
    let mut library = state.inner.library.write().await;
    library
        .merge(incoming)
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(ImportResponse {
        categories: library.len(),
    }))
}
