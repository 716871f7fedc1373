//! Upload and listing flows, from raw archive bytes to stored clients.

use crate::archive::{self, ExtractedBundle};
use crate::config::AppConfig;
use crate::error::{IngestError, Result};
use crate::matcher::{FileFailure, MatchOutcome, TableSet};
use crate::sheets::{self, TabularFilter};
use providers::http::{HttpPredictionConfig, HttpPredictionProvider};
use providers::stub::{NoopProvider, StubProvider};
use providers::{
    FilterCriteria, Prediction, PredictionProvider, PredictionRequest, ProviderError,
    ProviderRegistry,
};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storage::models::{Client, Upload};
use storage::uploads::NewUpload;
use storage::{clients, uploads};
use tracing::{debug, info, warn};

/// Everything a request needs to run the pipeline.
#[derive(Clone)]
pub struct IngestContext {
    pub pool: SqlitePool,
    pub gateway: Arc<dyn PredictionProvider>,
    pub config: Arc<AppConfig>,
    filter: TabularFilter,
}

impl IngestContext {
    pub fn new(
        pool: SqlitePool,
        gateway: Arc<dyn PredictionProvider>,
        config: Arc<AppConfig>,
    ) -> Result<Self> {
        let filter = TabularFilter::new(&config.storage.tabular_patterns)?;
        Ok(Self {
            pool,
            gateway,
            config,
            filter,
        })
    }

    pub fn filter(&self) -> &TabularFilter {
        &self.filter
    }
}

#[derive(Debug)]
pub struct UploadReport {
    pub upload: Upload,
    pub cities: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct ListingReport {
    pub clients: Vec<Client>,
    pub unmatched: Vec<i64>,
    pub failures: Vec<FileFailure>,
}

pub fn build_registry(config: &AppConfig) -> anyhow::Result<ProviderRegistry> {
    let mut reg = ProviderRegistry::new()
        .with_predictor("stub", Arc::new(StubProvider))
        .with_predictor("noop", Arc::new(NoopProvider));

    let url = config
        .gateway
        .url
        .clone()
        .or_else(|| std::env::var("CHURN_MODEL_URL").ok());
    if let Some(base_url) = url {
        let provider = HttpPredictionProvider::new(HttpPredictionConfig {
            base_url,
            api_key: config
                .gateway
                .api_key
                .clone()
                .or_else(|| std::env::var("CHURN_MODEL_API_KEY").ok()),
            timeout: config.gateway.timeout(),
        })?;
        reg = reg.with_predictor("http", Arc::new(provider));
    }

    Ok(reg.set_preferred(&config.gateway.provider))
}

/// Unpacks an uploaded archive, collects its distinct cities and registers it.
///
/// A bundle whose spreadsheets cannot be scanned is deleted again and never
/// registered. Once registered, uploads beyond `storage.keep_uploads` are
/// pruned oldest first.
pub async fn scan_upload(ctx: &IngestContext, bytes: Vec<u8>) -> Result<UploadReport> {
    let uploads_root = ctx.config.storage.uploads_root();
    let layout = ctx.config.storage.layout();
    let max_bytes = ctx.config.storage.max_extracted_bytes;
    let city_column = ctx.config.columns.city.clone();
    let filter = ctx.filter.clone();

    let (bundle, cities) = tokio::task::spawn_blocking(move || -> Result<_> {
        let bundle = archive::extract_archive(&bytes, &uploads_root, &layout, max_bytes)?;
        match sheets::distinct_values(&bundle.marketing, &city_column, &filter) {
            Ok(cities) => Ok((bundle, cities)),
            Err(e) => {
                bundle.discard();
                Err(e)
            }
        }
    })
    .await??;

    let root = bundle.root.to_string_lossy().into_owned();
    let recorded = uploads::record(
        &ctx.pool,
        &NewUpload {
            id: &bundle.id,
            digest: &bundle.digest,
            root: &root,
            cities: cities.len(),
        },
    )
    .await;
    let upload = match recorded {
        Ok(upload) => upload,
        Err(e) => {
            bundle.discard();
            return Err(e.into());
        }
    };

    info!(upload = %upload.id, cities = cities.len(), "upload registered");
    prune_uploads(ctx).await;
    Ok(UploadReport { upload, cities })
}

/// Drops registry rows and directories of uploads past the retention count.
/// Failures are logged; the upload that triggered the pruning stands.
async fn prune_uploads(ctx: &IngestContext) {
    let stale = match uploads::prune(&ctx.pool, ctx.config.storage.keep_uploads).await {
        Ok(stale) => stale,
        Err(e) => {
            warn!(error = %e, "failed to prune old uploads");
            return;
        }
    };
    if stale.is_empty() {
        return;
    }
    let roots: Vec<PathBuf> = stale.iter().map(|u| PathBuf::from(&u.root)).collect();
    let removed = roots.len();
    let cleanup = tokio::task::spawn_blocking(move || {
        for root in &roots {
            ExtractedBundle::discard_root(root);
        }
    })
    .await;
    match cleanup {
        Ok(()) => info!(removed, "old uploads pruned"),
        Err(e) => warn!(error = %e, "upload cleanup task failed"),
    }
}

/// Bundle to read for a listing: the named upload, or the latest one.
pub async fn resolve_bundle(
    ctx: &IngestContext,
    upload_id: Option<&str>,
) -> Result<Option<ExtractedBundle>> {
    let upload = match upload_id {
        Some(id) => Some(
            uploads::get(&ctx.pool, id)
                .await?
                .ok_or_else(|| IngestError::UnknownUpload(id.to_string()))?,
        ),
        None => uploads::latest(&ctx.pool).await?,
    };
    let Some(upload) = upload else {
        return Ok(None);
    };
    let layout = ctx.config.storage.layout();
    let mut bundle = match ExtractedBundle::open(&upload.id, Path::new(&upload.root), &layout) {
        Ok(bundle) => bundle,
        Err(IngestError::Structure(folder)) => {
            warn!(upload = %upload.id, root = %upload.root, missing = %folder, "registered upload is gone from disk");
            return Err(IngestError::StaleUpload(upload.id));
        }
        Err(e) => return Err(e),
    };
    bundle.digest = upload.digest;
    Ok(Some(bundle))
}

/// Scores clients with the gateway, matches them against the marketing
/// spreadsheets and upserts the matches.
///
/// Unmatched identifiers and unreadable spreadsheets are reported in the
/// returned [`ListingReport`] and never abort the batch. A gateway failure
/// aborts before anything is written.
pub async fn run_listing(
    ctx: &IngestContext,
    filters: FilterCriteria,
    bundle: Option<&ExtractedBundle>,
) -> Result<ListingReport> {
    let Some(bundle) = bundle else {
        warn!("no upload registered yet; nothing to score");
        return Ok(ListingReport::default());
    };

    let request = PredictionRequest {
        filters,
        marketing_folder: bundle.marketing.clone(),
        interests_folder: bundle.interests.clone(),
    };
    let predictions = request_predictions(
        ctx.gateway.as_ref(),
        &request,
        ctx.config.gateway.timeout(),
        ctx.config.gateway.retries,
    )
    .await?;
    info!(upload = %bundle.id, predictions = predictions.len(), "predictions received");

    let marketing = bundle.marketing.clone();
    let filter = ctx.filter.clone();
    let tables = tokio::task::spawn_blocking(move || TableSet::load(&marketing, &filter)).await??;
    for failure in tables.failures() {
        warn!(file = %failure.file, reason = %failure.reason, "skipping unreadable spreadsheet");
    }
    debug!(tables = tables.len(), "marketing spreadsheets loaded");

    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    for prediction in &predictions {
        match tables.match_prediction(prediction, &ctx.config.columns) {
            MatchOutcome::Matched(client) => matched.push(client),
            MatchOutcome::Unmatched(id) => {
                warn!(error = %IngestError::NotFound(id), "prediction skipped");
                unmatched.push(id);
            }
        }
    }

    clients::upsert_many(&ctx.pool, &matched).await?;
    let ids: Vec<i64> = matched.iter().map(|c| c.id).collect();
    let stored = clients::fetch_by_ids(&ctx.pool, &ids).await?;
    info!(
        stored = stored.len(),
        unmatched = unmatched.len(),
        "listing complete"
    );

    Ok(ListingReport {
        clients: stored,
        unmatched,
        failures: tables.failures().to_vec(),
    })
}

/// Calls the gateway with a deadline, retrying transient failures.
pub async fn request_predictions(
    gateway: &dyn PredictionProvider,
    request: &PredictionRequest,
    timeout: Duration,
    retries: u32,
) -> std::result::Result<Vec<Prediction>, ProviderError> {
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(timeout, gateway.predict(request)).await {
            Ok(res) => res,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        };
        match outcome {
            Ok(predictions) => return Ok(predictions),
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(attempt, error = %e, "prediction request failed; retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
