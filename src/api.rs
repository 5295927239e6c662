//! HTTP surface for the document question-answering backend.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /` – Status report: embedding model, answer mode, language model, active documents.
//! - `GET /health` – Liveness probe.
//! - `POST /process-docs` – Multipart upload of one `.pdf`, `.txt`, or `.docx` file. The file is
//!   chunked, embedded, and registered under its file name.
//! - `POST /ask-doc` – Answer a question from a previously processed document.
//! - `GET /docs` – List registered documents with their metadata.
//! - `DELETE /docs/:name` – Evict a registered document.
//! - `GET /metrics` – Upload and question counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Errors are returned as `{"detail": "..."}` with a status code chosen per error kind.

use crate::config::Config;
use crate::metrics::MetricsSnapshot;
use crate::processing::{DocumentSummary, ProcessingApi, ProcessingError, QueryError};
use crate::registry::RegistryError;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError,
        rejection::JsonRejection,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// Origins always allowed so a local frontend dev server can reach the API.
pub const DEV_ORIGINS: [&str; 3] = [
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
];

const UPLOAD_FIELD: &str = "file";

/// Build the HTTP router exposing the upload and question API surface.
pub fn create_router<S>(service: Arc<S>, config: &Config) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route("/", get(get_status::<S>))
        .route("/health", get(health))
        .route(
            "/process-docs",
            post(process_docs::<S>).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route("/ask-doc", post(ask_doc::<S>))
        .route("/docs", get(list_docs::<S>))
        .route("/docs/:name", delete(delete_doc::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
}

/// CORS policy allowing the configured origins plus the local development origins.
///
/// Credentials are allowed, so methods and headers are mirrored from the request instead of
/// using wildcards.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = DEV_ORIGINS
        .iter()
        .map(|origin| origin.to_string())
        .chain(config.cors_allowed_origins.iter().cloned())
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Response body for `GET /`.
#[derive(Serialize)]
struct StatusResponse {
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Embedding_Model")]
    embedding_model: String,
    #[serde(rename = "LLM_Model", skip_serializing_if = "Option::is_none")]
    llm_model: Option<String>,
    #[serde(rename = "Answer_Mode")]
    answer_mode: &'static str,
    #[serde(rename = "Active_Docs")]
    active_docs: Vec<String>,
}

/// Report configuration and active documents without calling any model.
async fn get_status<S>(State(service): State<Arc<S>>) -> Json<StatusResponse>
where
    S: ProcessingApi,
{
    let status = service.status();
    Json(StatusResponse {
        status: "RAG Backend Running",
        embedding_model: status.embedding_model,
        llm_model: status.llm_model,
        answer_mode: status.answer_mode,
        active_docs: status.active_docs,
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Success response for `POST /process-docs`.
#[derive(Serialize)]
struct ProcessResponse {
    message: String,
    document_name: String,
    chunks: usize,
}

/// Accept one uploaded file and index it under its file name.
///
/// The first part carrying a file name is used unless a part named `file` appears, which always
/// wins.
async fn process_docs<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<ProcessResponse>, AppError>
where
    S: ProcessingApi,
{
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let preferred = field.name() == Some(UPLOAD_FIELD);
        if upload.is_some() && !preferred {
            continue;
        }
        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes.to_vec()));
        if preferred {
            break;
        }
    }

    let (file_name, bytes) = upload.ok_or(ProcessingError::MissingFile)?;
    let outcome = service.process_upload(&file_name, bytes).await?;
    tracing::info!(
        document = %outcome.document_name,
        chunks = outcome.chunk_count,
        replaced = outcome.replaced,
        "Upload request completed"
    );

    Ok(Json(ProcessResponse {
        message: format!(
            "Processed '{}' into {} chunks.",
            outcome.document_name, outcome.chunk_count
        ),
        document_name: outcome.document_name,
        chunks: outcome.chunk_count,
    }))
}

/// Request body for `POST /ask-doc`.
#[derive(Deserialize)]
struct AskRequest {
    document_name: String,
    question: String,
}

/// Success response for `POST /ask-doc`.
#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<String>,
    document_name: String,
}

async fn ask_doc<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError>
where
    S: ProcessingApi,
{
    let Json(request) = payload?;
    let answer = service
        .ask(&request.document_name, &request.question)
        .await?;
    Ok(Json(AskResponse {
        answer: answer.text,
        sources: answer.sources,
        document_name: answer.document_name,
    }))
}

/// Response body for `GET /docs`.
#[derive(Serialize)]
struct DocsResponse {
    documents: Vec<DocumentSummary>,
}

async fn list_docs<S>(State(service): State<Arc<S>>) -> Json<DocsResponse>
where
    S: ProcessingApi,
{
    Json(DocsResponse {
        documents: service.list_documents(),
    })
}

/// Response body for `DELETE /docs/:name`.
#[derive(Serialize)]
struct DeleteResponse {
    message: String,
    document_name: String,
}

async fn delete_doc<S>(
    State(service): State<Arc<S>>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, AppError>
where
    S: ProcessingApi,
{
    let removed = service.remove_document(&name)?;
    Ok(Json(DeleteResponse {
        message: format!("Document '{}' removed.", removed.name),
        document_name: removed.name,
    }))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: ProcessingApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "status",
                method: "GET",
                path: "/",
                description: "Report the embedding model, answer mode, language model, and active documents.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness probe returning { \"status\": \"ok\" }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "process_docs",
                method: "POST",
                path: "/process-docs",
                description: "Upload one .pdf, .txt, or .docx file as multipart field 'file'. The file is chunked, embedded, and registered under its file name. Response returns { \"message\", \"document_name\", \"chunks\" }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask_doc",
                method: "POST",
                path: "/ask-doc",
                description: "Answer a question from a processed document. Response returns { \"answer\", \"sources\", \"document_name\" }.",
                request_example: Some(json!({
                    "document_name": "report.pdf",
                    "question": "What were the key findings?"
                })),
            },
            CommandDescriptor {
                name: "list_docs",
                method: "GET",
                path: "/docs",
                description: "List registered documents with chunk count, dimension, file type, content digest, and indexing time.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_doc",
                method: "DELETE",
                path: "/docs/{name}",
                description: "Evict a registered document so it can no longer be queried.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return upload and question counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

/// Error translated into an HTTP response at the boundary.
enum AppError {
    Processing(ProcessingError),
    Query(QueryError),
    Registry(RegistryError),
    Multipart(MultipartError),
    JsonBody(JsonRejection),
}

impl AppError {
    fn status_and_detail(&self) -> (StatusCode, String) {
        match self {
            Self::Processing(error) if error.is_client_error() => {
                (StatusCode::BAD_REQUEST, error.to_string())
            }
            Self::Processing(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Document processing failed: {error}"),
            ),
            Self::Query(error @ QueryError::DocumentNotFound(_)) => {
                (StatusCode::NOT_FOUND, error.to_string())
            }
            Self::Query(error @ QueryError::EmptyQuestion) => {
                (StatusCode::BAD_REQUEST, error.to_string())
            }
            Self::Query(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Retrieval failed: {error}"),
            ),
            Self::Registry(error @ RegistryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, error.to_string())
            }
            Self::Multipart(error) => (
                error.status(),
                format!("Invalid upload: {}", error.body_text()),
            ),
            Self::JsonBody(rejection) => (
                rejection.status(),
                format!("Invalid request body: {}", rejection.body_text()),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        if status.is_server_error() {
            tracing::error!(%status, detail = %detail, "Request failed");
        } else {
            tracing::warn!(%status, detail = %detail, "Request rejected");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::Processing(inner)
    }
}

impl From<QueryError> for AppError {
    fn from(inner: QueryError) -> Self {
        Self::Query(inner)
    }
}

impl From<RegistryError> for AppError {
    fn from(inner: RegistryError) -> Self {
        Self::Registry(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}

impl From<JsonRejection> for AppError {
    fn from(inner: JsonRejection) -> Self {
        Self::JsonBody(inner)
    }
}
