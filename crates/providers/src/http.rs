use crate::{Prediction, PredictionProvider, PredictionRequest, ProviderError};
use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpPredictionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Calls a remote churn model over JSON: `POST {base_url}/predict`.
#[derive(Clone)]
pub struct HttpPredictionProvider {
    client: Client,
    cfg: Arc<HttpPredictionConfig>,
}

impl HttpPredictionProvider {
    pub fn new(cfg: HttpPredictionConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            cfg: Arc::new(cfg),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/predict", self.cfg.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl PredictionProvider for HttpPredictionProvider {
    async fn predict(&self, request: &PredictionRequest) -> Result<Vec<Prediction>, ProviderError> {
        let mut builder = self.client.post(self.endpoint()).json(request);
        if let Some(key) = &self.cfg.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.cfg.timeout)
            } else {
                ProviderError::RequestFailed(e.to_string())
            }
        })?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
            return Err(ProviderError::RequestFailed(format!(
                "status {} body {:?}",
                status, body
            )));
        }
        let parsed: Vec<Prediction> = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        tracing::debug!(count = parsed.len(), "received predictions");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let provider = HttpPredictionProvider::new(HttpPredictionConfig {
            base_url: "http://model.local:9000/".into(),
            api_key: None,
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(provider.endpoint(), "http://model.local:9000/predict");
    }
}
