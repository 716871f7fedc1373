use crate::{Prediction, PredictionProvider, PredictionRequest, ProviderError};

/// Stand-in for the churn model: always scores the same two clients.
#[derive(Debug, Default)]
pub struct StubProvider;

#[async_trait::async_trait]
impl PredictionProvider for StubProvider {
    async fn predict(&self, _request: &PredictionRequest) -> Result<Vec<Prediction>, ProviderError> {
        Ok(vec![Prediction::new(1, 0.85), Prediction::new(2, 0.60)])
    }
}

/// Provider that refuses every call; useful when no model is wired in.
#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl PredictionProvider for NoopProvider {
    async fn predict(&self, _request: &PredictionRequest) -> Result<Vec<Prediction>, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}
