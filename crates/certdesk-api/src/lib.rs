//! ---
//! cd_section: "05-networking-external-interfaces"
//! cd_subsection: "module"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "HTTP API surface for the certificate registry."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, get_service, post};
use axum::{Json, Router};
use certdesk_common::ServerConfig;
use certdesk_store::{Certificate, CertificateStore, Credentials, NewCertificate, StoreError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

mod error;
mod metrics;

pub use error::{ApiError, MessageResponse};
pub use metrics::{new_registry, ApiMetrics, SharedRegistry};

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Shared API state exposed to handlers.
pub struct ApiState {
    store: CertificateStore,
    metrics: ApiMetrics,
    start: Instant,
}

impl ApiState {
    pub fn new(store: CertificateStore, metrics: ApiMetrics) -> Self {
        Self {
            store,
            metrics,
            start: Instant::now(),
        }
    }

    pub fn metrics(&self) -> &ApiMetrics {
        &self.metrics
    }

    fn status(&self) -> StatusResponse {
        StatusResponse {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            backend: self.store.backend().to_owned(),
            uptime_seconds: self.start.elapsed().as_secs(),
            base_dir: self.store.layout().base_dir().to_owned(),
        }
    }

    /// Count the outcome and convert a store failure into a response.
    fn settle<T>(
        &self,
        operation: &'static str,
        result: std::result::Result<T, StoreError>,
    ) -> std::result::Result<T, ApiError> {
        match result {
            Ok(value) => {
                self.metrics.record(operation, "success");
                Ok(value)
            }
            Err(err) => {
                self.metrics.record(operation, err.kind());
                Err(ApiError::from_store(operation, err))
            }
        }
    }

    /// Count a request rejected before it reached the store.
    fn reject(&self, operation: &'static str, err: ApiError) -> ApiError {
        self.metrics.record(operation, "rejected");
        debug!(operation, status = %err.status(), message = err.message(), "request rejected");
        err
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Bound address; differs from the configured one when port 0 was requested.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Routes, body limit, optional CORS and static hosting for `settings`.
pub fn router(state: Arc<ApiState>, settings: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .route("/api/test-connection", post(post_test_connection))
        .route("/api/certificates", post(post_certificates))
        .route("/api/upload", post(post_upload))
        .route("/api/delete", post(post_delete))
        .route("/api/image/:name", get(get_image))
        .route("/api/status", get(get_status))
        .route("/metrics", get(get_metrics))
        .with_state(state);

    let router = if let Some(dir) = &settings.static_dir {
        let service = get_service(ServeDir::new(dir).append_index_html_on_directories(true));
        Router::new().merge(api_routes).fallback_service(service)
    } else {
        api_routes.route("/", get(get_index))
    };

    let router = router
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(TraceLayer::new_for_http());
    if settings.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Bind `settings.listen` and serve the API until shutdown is requested.
pub fn spawn_api_server(state: Arc<ApiState>, settings: &ServerConfig) -> Result<ApiServer> {
    let router = router(state, settings);
    let requested = settings.listen;

    let listener = StdTcpListener::bind(requested)
        .with_context(|| format!("failed to bind API listener {requested}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        info!(address = %addr, "api server stopped");
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    version: String,
    backend: String,
    uptime_seconds: u64,
    base_dir: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest {
    cert_number: String,
    #[serde(flatten)]
    credentials: Credentials,
}

async fn get_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(state.status())
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    metrics::render(&state.metrics.registry())
}

async fn post_test_connection(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> std::result::Result<Json<MessageResponse>, ApiError> {
    let Json(credentials) =
        payload.map_err(|rejection| state.reject("test_connection", json_error(rejection)))?;
    let host = credentials.host.clone();
    let result = state.store.test_connection(credentials).await;
    state.settle("test_connection", result)?;
    info!(host = %host, "connection test succeeded");
    Ok(Json(MessageResponse::new("Connection successful")))
}

async fn post_certificates(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> std::result::Result<Json<Vec<Certificate>>, ApiError> {
    let Json(credentials) =
        payload.map_err(|rejection| state.reject("list", json_error(rejection)))?;
    let result = state.store.list(credentials).await;
    state.settle("list", result).map(Json)
}

async fn post_upload(
    State(state): State<Arc<ApiState>>,
    multipart: std::result::Result<Multipart, axum::extract::multipart::MultipartRejection>,
) -> std::result::Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let multipart = multipart.map_err(|rejection| {
        state.reject(
            "upload",
            ApiError::new(rejection.status(), rejection.body_text()),
        )
    })?;
    let (credentials, certificate) = read_upload_form(multipart)
        .await
        .map_err(|err| state.reject("upload", err))?;

    let result = state.store.upload(credentials, certificate).await;
    let record = state.settle("upload", result)?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(format!(
            "Certificate {} uploaded successfully",
            record.cert_number
        ))),
    ))
}

async fn post_delete(
    State(state): State<Arc<ApiState>>,
    payload: std::result::Result<Json<DeleteRequest>, JsonRejection>,
) -> std::result::Result<Json<MessageResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| state.reject("delete", json_error(rejection)))?;
    let result = state
        .store
        .delete(request.credentials, request.cert_number)
        .await;
    let record = state.settle("delete", result)?;
    Ok(Json(MessageResponse::new(format!(
        "Certificate {} deleted successfully",
        record.cert_number
    ))))
}

async fn get_image(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiError {
    state.metrics.record("image", "not_implemented");
    debug!(image = %name, "image retrieval requested");
    ApiError::new(
        StatusCode::NOT_IMPLEMENTED,
        "Image retrieval is not supported: FTP credentials are not stored on the server",
    )
}

fn json_error(rejection: JsonRejection) -> ApiError {
    let status = match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    ApiError::new(status, rejection.body_text())
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}

/// Collect the upload form. Unknown fields are skipped.
async fn read_upload_form(
    mut multipart: Multipart,
) -> std::result::Result<(Credentials, NewCertificate), ApiError> {
    let mut image: Option<(String, Vec<u8>)> = None;
    let mut cert_number = None;
    let mut issue_date = None;
    let mut issued_to_name = None;
    let mut credentials = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                image = Some((file_name, bytes.to_vec()));
            }
            "certNumber" => cert_number = Some(field.text().await.map_err(multipart_error)?),
            "issueDate" => issue_date = Some(field.text().await.map_err(multipart_error)?),
            "issuedToName" => issued_to_name = Some(field.text().await.map_err(multipart_error)?),
            "credentials" => {
                let text = field.text().await.map_err(multipart_error)?;
                let parsed: Credentials = serde_json::from_str(&text).map_err(|err| {
                    ApiError::bad_request(format!("invalid credentials field: {err}"))
                })?;
                credentials = Some(parsed);
            }
            other => debug!(field = other, "ignoring unknown upload field"),
        }
    }

    let (file_name, image) = image
        .filter(|(file_name, _)| !file_name.is_empty())
        .ok_or_else(|| ApiError::bad_request("No image file uploaded"))?;
    let certificate = NewCertificate {
        cert_number: required(cert_number, "certNumber")?,
        issue_date: required(issue_date, "issueDate")?,
        issued_to_name: required(issued_to_name, "issuedToName")?,
        file_name,
        image,
    };
    let credentials = credentials.ok_or_else(|| ApiError::bad_request("missing field credentials"))?;
    Ok((credentials, certificate))
}

fn required(value: Option<String>, field: &str) -> std::result::Result<String, ApiError> {
    value.ok_or_else(|| ApiError::bad_request(format!("missing field {field}")))
}
