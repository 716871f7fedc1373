//! Provider abstractions for the churn prediction model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod http;
pub mod stub;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not implemented")]
    NotImplemented,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Network-style failures that may succeed on a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::RequestFailed(_) | ProviderError::Timeout(_))
    }
}

/// Client filters forwarded verbatim to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(rename = "isMSP", default)]
    pub is_msp: Option<String>,
    #[serde(rename = "companySize", alias = "companySile", default)]
    pub company_size: Option<String>,
    #[serde(rename = "cityActual", default)]
    pub city_actual: Option<String>,
    #[serde(rename = "cityLegal", default)]
    pub city_legal: Option<String>,
    #[serde(default)]
    pub shipper: Option<String>,
    #[serde(default)]
    pub consignee: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub filters: FilterCriteria,
    pub marketing_folder: PathBuf,
    pub interests_folder: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: i64,
    #[serde(rename = "livingChance", alias = "leavingChance", alias = "score")]
    pub score: f64,
}

impl Prediction {
    pub fn new(id: i64, score: f64) -> Self {
        Self { id, score }
    }
}

#[async_trait::async_trait]
pub trait PredictionProvider: Send + Sync {
    async fn predict(&self, request: &PredictionRequest) -> Result<Vec<Prediction>, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    predictors: HashMap<String, Arc<dyn PredictionProvider>>,
    pub preferred: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_predictor(mut self, name: &str, provider: Arc<dyn PredictionProvider>) -> Self {
        self.predictors.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred(mut self, name: &str) -> Self {
        self.preferred = Some(name.to_string());
        self
    }

    pub fn predictor(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn PredictionProvider>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred.clone())
            .ok_or_else(|| {
                ProviderError::UnknownProvider("no prediction provider configured".into())
            })?;
        self.predictors
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.predictors.keys().cloned().collect();
        names.sort();
        names
    }
}
