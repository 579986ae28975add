//! HTTP surface: dataset upload, query, schema inspection, and static file
//! serving for the client bundle.

use crate::{infer_schema, run_query, Dataset, DatasetStore, LoadedDataset, Schema};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use plotchat_llm::LanguageModel;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{path::Path, sync::Arc};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const UPLOAD_SUCCESS_MESSAGE: &str = "Data uploaded and schema generated successfully.";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DatasetStore>,
    pub model: Arc<dyn LanguageModel>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub prompt: String,
}

/// Build the application router. API routes come first; anything else falls
/// through to the static client bundle, with `index.html` as the SPA
/// fallback.
pub fn app(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let static_dir = static_dir.as_ref();
    let index = static_dir.join("index.html");

    Router::new()
        .route("/upload_data", post(upload_data))
        .route("/query", post(query))
        .route("/schema", get(schema))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .fallback_service(ServeDir::new(static_dir).fallback(ServeFile::new(index)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

/// Accept a CSV upload and replace the dataset slot.
///
/// The slot is cleared before validation, so a failed upload leaves the
/// server with no dataset rather than a stale one.
#[tracing::instrument(skip_all)]
async fn upload_data(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    state.store.clear().await;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return bad_request("No file provided.".to_string()),
            Err(error) => return bad_request(format!("Invalid upload: {error}")),
        };

        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        if !file_name.to_ascii_lowercase().ends_with(".csv") {
            return bad_request("Only CSV files are supported.".to_string());
        }

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(error) => return bad_request(format!("Failed to read upload: {error}")),
        };

        let dataset = match Dataset::from_csv(&bytes) {
            Ok(dataset) => dataset,
            Err(error) => return bad_request(error.to_string()),
        };

        let schema = infer_schema(&dataset);
        tracing::info!(
            file = %file_name,
            rows = dataset.rows.len(),
            columns = dataset.columns.len(),
            "dataset uploaded"
        );
        state.store.replace(LoadedDataset { dataset, schema }).await;

        return Json(json!({"message": UPLOAD_SUCCESS_MESSAGE})).into_response();
    }
}

#[tracing::instrument(skip_all)]
async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Response {
    match run_query(&state.store, state.model.clone(), &request.prompt).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => {
            tracing::error!(%error, "query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": error.to_string()})),
            )
                .into_response()
        }
    }
}

/// The schema of the currently loaded dataset, or null when none is loaded.
async fn schema(State(state): State<AppState>) -> Json<Option<Schema>> {
    let snapshot = state.store.snapshot().await;
    Json(snapshot.map(|loaded| loaded.schema.clone()))
}
