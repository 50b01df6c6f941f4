use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, State, WebSocketUpgrade},
    http::{header, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use vitrine_shared::constants::{
    APP_NAME, PHOTOS_PATH, PROTOCOL_VERSION, UPLOAD_FIELD, UPLOAD_PATH, WS_PATH,
};
use vitrine_shared::{PhotoListing, PhotoRef, UploadResponse};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::photo_store::PhotoStore;
use crate::relay::{self, RelayHub};

#[derive(Clone)]
pub struct AppState {
    pub hub: RelayHub,
    pub photo_store: Arc<PhotoStore>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    // Headroom over the photo limit so the store's size check is the one
    // that answers, not the body limit. Saturate so an absurd configured
    // limit cannot wrap.
    let body_limit = DefaultBodyLimit::max(
        state
            .config
            .max_photo_bytes
            .saturating_mul(2)
            .saturating_add(1024 * 1024),
    );

    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route(WS_PATH, get(ws_upgrade))
        .route(UPLOAD_PATH, post(upload_photo))
        .route(PHOTOS_PATH, get(list_photos))
        .route("/photos/:filename", get(download_photo))
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct ServiceInfoResponse {
    service: &'static str,
    version: &'static str,
    protocol: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn service_info() -> Json<ServiceInfoResponse> {
    Json(ServiceInfoResponse {
        service: APP_NAME,
        version: env!("CARGO_PKG_VERSION"),
        protocol: PROTOCOL_VERSION,
    })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    debug!(remote = %remote, "WebSocket upgrade");
    ws.on_upgrade(move |socket| relay::handle_socket(socket, state.hub.clone()))
}

async fn upload_photo(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == UPLOAD_FIELD {
            let original_name = field.file_name().unwrap_or("").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;

            let filename = state.photo_store.store_photo(&original_name, &data).await?;
            let url = format!("{PHOTOS_PATH}/{filename}");

            info!(filename = %filename, size = data.len(), "Photo uploaded");

            return Ok(Json(UploadResponse { url }));
        }
    }

    Err(ServerError::BadRequest(
        "Missing 'file' field in multipart form".to_string(),
    ))
}

async fn list_photos(State(state): State<AppState>) -> Result<Json<PhotoListing>, ServerError> {
    let photos = state
        .photo_store
        .list_photos()
        .await?
        .into_iter()
        .map(|filename| {
            let url = format!("{PHOTOS_PATH}/{filename}");
            PhotoRef { filename, url }
        })
        .collect();

    Ok(Json(PhotoListing { photos }))
}

async fn download_photo(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let data = state.photo_store.get_photo(&filename).await?;
    let content_type = content_type_for(&filename);
    Ok(([(header::CONTENT_TYPE, content_type)], data))
}

/// Content type from the stored filename's extension. The store lowercases
/// extensions on write.
fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
