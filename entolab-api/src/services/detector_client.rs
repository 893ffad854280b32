//! External image-analysis (detection) service client
//!
//! Sends a presigned image URL to the hosted detection model and maps the
//! returned life-stage bounding boxes into typed detections. The model runs
//! elsewhere; this client only speaks HTTP to it.

use entolab_common::pmi::LifeStage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const USER_AGENT: &str = "EntoLab/0.1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Minimum interval between inference calls (the hosted model throttles
/// aggressively; 500ms keeps us under its per-client quota)
const RATE_LIMIT_MS: u64 = 500;

/// Detection service client errors
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Detection service error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid API key")]
    InvalidApiKey,
}

/// Inference request payload
#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    image_url: &'a str,
}

/// Inference response payload
#[derive(Debug, Clone, Deserialize)]
pub struct DetectResponse {
    pub detections: Vec<ModelDetection>,
}

/// One bounding box as returned by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDetection {
    /// Normalized image coordinates [0, 1]
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub life_stage: LifeStage,
    pub species: Option<String>,
    pub confidence: Option<f64>,
}

/// Minimum-interval rate limiter for the inference endpoint
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Detector rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Detection service API client
pub struct DetectorClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
    api_key: Option<String>,
}

impl DetectorClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, DetectorError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DetectorError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Run life-stage detection on an image the service can fetch from
    /// `image_url` (a presigned GET URL).
    pub async fn detect(&self, image_url: &str) -> Result<Vec<ModelDetection>, DetectorError> {
        self.rate_limiter.wait().await;

        let endpoint = format!("{}/v1/detect", self.base_url);
        tracing::debug!(endpoint = %endpoint, "Querying detection service");

        let mut request = self
            .http_client
            .post(&endpoint)
            .json(&DetectRequest { image_url });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DetectorError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(DetectorError::InvalidApiKey);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::ApiError(status.as_u16(), body));
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::ParseError(e.to_string()))?;

        tracing::debug!(count = parsed.detections.len(), "Detection service returned boxes");
        Ok(parsed.detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = DetectorClient::new("http://localhost:9000/".to_string(), None).unwrap();
        assert_eq!(client.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "detections": [
                {"x": 0.1, "y": 0.2, "width": 0.05, "height": 0.08,
                 "life_stage": "instar_3", "species": "lucilia_sericata",
                 "confidence": 0.91}
            ]
        }"#;
        let parsed: DetectResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].life_stage, LifeStage::Instar3);
        assert_eq!(
            parsed.detections[0].species.as_deref(),
            Some("lucilia_sericata")
        );
    }

    #[tokio::test]
    async fn test_rate_limiter_enforces_interval() {
        let limiter = RateLimiter::new(50);
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
