//! POST /clients/upload-zip

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use churn_core::pipeline;
use churn_core::IngestError;
use serde::Serialize;

use crate::error::ApiResult;
use crate::AppState;

/// Name of the multipart field carrying the archive.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct CitiesResponse {
    pub cities: Vec<String>,
}

/// Accepts a ZIP bundle, unpacks it and lists the distinct actual cities
/// found in its marketing spreadsheets. The new upload id is returned in
/// the `x-upload-id` header.
pub async fn upload_zip(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    // A request that is not multipart at all carries no file either.
    let mut multipart = multipart.map_err(|_| IngestError::MissingFile)?;

    let mut archive = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            archive = Some(field.bytes().await?.to_vec());
            break;
        }
    }
    let bytes = archive.ok_or(IngestError::MissingFile)?;
    tracing::info!(bytes = bytes.len(), "archive received");

    let report = pipeline::scan_upload(&state.ingest, bytes).await?;
    Ok((
        [("x-upload-id", report.upload.id)],
        Json(CitiesResponse {
            cities: report.cities.into_iter().collect(),
        }),
    ))
}
