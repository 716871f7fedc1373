//! Client resource: scored listing plus plain CRUD.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use churn_core::pipeline;
use churn_core::{Client, FilterCriteria};
use serde::Deserialize;
use storage::clients;
use storage::models::ClientPatch;

use crate::api::upload::upload_zip;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MAX_CATEGORY_LEN: usize = 255;

/// GET /clients/ query string: model filters plus an optional upload id.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(flatten)]
    pub filters: FilterCriteria,
    pub upload: Option<String>,
}

/// Body of a full update; the id comes from the path.
#[derive(Debug, Deserialize)]
pub struct ClientFields {
    #[serde(rename = "OKVED2Name")]
    pub category_name: String,
    #[serde(rename = "leavingChance")]
    pub churn_score: f64,
}

pub fn client_routes() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/", get(list_clients).post(create_client))
        .route("/clients/upload-zip", post(upload_zip))
        .route("/clients/upload-zip/", post(upload_zip))
        .route(
            "/clients/:id",
            get(get_client)
                .put(update_client)
                .patch(patch_client)
                .delete(delete_client),
        )
        .route(
            "/clients/:id/",
            get(get_client)
                .put(update_client)
                .patch(patch_client)
                .delete(delete_client),
        )
}

/// GET /clients/
///
/// Scores clients through the prediction gateway, stores the ones found in
/// the marketing spreadsheets and returns them. The number of predicted ids
/// without a spreadsheet row is reported in `x-unmatched-count`.
pub async fn list_clients(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let bundle = pipeline::resolve_bundle(&state.ingest, query.upload.as_deref()).await?;
    let report = pipeline::run_listing(&state.ingest, query.filters, bundle.as_ref()).await?;
    Ok((
        [("x-unmatched-count", report.unmatched.len().to_string())],
        Json(report.clients),
    ))
}

/// POST /clients/
pub async fn create_client(
    State(state): State<AppState>,
    payload: Result<Json<Client>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(client) = payload?;
    validate_category(&client.category_name)?;
    if !clients::insert(state.db(), &client).await? {
        return Err(ApiError::BadRequest(format!(
            "client with id {} already exists",
            client.id
        )));
    }
    Ok((StatusCode::CREATED, Json(client)))
}

/// GET /clients/:id/
pub async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Client>> {
    clients::get(state.db(), id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// PUT /clients/:id/
pub async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<ClientFields>, JsonRejection>,
) -> ApiResult<Json<Client>> {
    let Json(fields) = payload?;
    validate_category(&fields.category_name)?;
    let client = Client::new(id, fields.category_name, fields.churn_score);
    clients::update(state.db(), &client)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// PATCH /clients/:id/
pub async fn patch_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<ClientPatch>, JsonRejection>,
) -> ApiResult<Json<Client>> {
    let Json(patch) = payload?;
    if let Some(name) = &patch.category_name {
        validate_category(name)?;
    }
    clients::patch(state.db(), id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// DELETE /clients/:id/
pub async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if clients::delete(state.db(), id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

fn validate_category(name: &str) -> ApiResult<()> {
    if name.chars().count() > MAX_CATEGORY_LEN {
        return Err(ApiError::BadRequest(format!(
            "OKVED2Name must be at most {MAX_CATEGORY_LEN} characters"
        )));
    }
    Ok(())
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("client {id} not found"))
}
