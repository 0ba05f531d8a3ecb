//! API client for communicating with the placement server

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Failure reported by the server in its `{"status": "error"}` envelope
#[derive(Debug, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

/// API client for the placement server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            // Training the full registry can take minutes
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(ApiError { status, message }.into());
        }
        response.json().await.context("Failed to parse response")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_query(path, &[]).await
    }

    /// Make a GET request with encoded query parameters
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// GET that also accepts a 503 body, as health endpoints return one
    pub async fn get_health<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let body = response.json().await.context("Failed to parse response")?;
            return Ok((status, body));
        }
        Ok((status, Self::decode(response).await?))
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request without a body
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(rename = "MSE")]
    pub mse: Option<f64>,
    #[serde(rename = "R2")]
    pub r2: Option<f64>,
    #[serde(rename = "MAE")]
    pub mae: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub models_trained: usize,
    pub results: BTreeMap<String, ModelMetrics>,
    #[serde(default)]
    pub failures: BTreeMap<String, String>,
    pub snapshot_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub results: BTreeMap<String, ModelMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRow {
    pub model_name: String,
    pub mse: Option<f64>,
    pub r2_score: Option<f64>,
    pub mae: Option<f64>,
    pub best_model: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceResponse {
    pub performance_metrics: Vec<PerformanceRow>,
    pub best_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportanceResponse {
    pub model: String,
    pub feature_importance: Vec<FeatureImportance>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub cost: f64,
    pub energy: f64,
    pub load: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub cpu: f64,
    pub memory: f64,
    pub network_io: f64,
    pub power: f64,
    pub vm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<ObjectiveWeights>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommended_host: String,
    pub best_model: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objectives {
    pub cost: f64,
    pub energy: f64,
    pub load_balance: f64,
    pub weighted_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Recommendation,
    pub all_predictions: BTreeMap<String, f64>,
    pub objectives: Objectives,
    #[serde(default)]
    pub unknown_vm: bool,
    pub snapshot_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTuning {
    pub best_params: BTreeMap<String, serde_json::Value>,
    pub best_cv_score: Option<f64>,
    pub combinations_evaluated: usize,
    #[serde(default)]
    pub combinations_failed: usize,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuneResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub updated_results: BTreeMap<String, ModelMetrics>,
    pub tuning: BTreeMap<String, ModelTuning>,
    #[serde(default)]
    pub skipped: Vec<String>,
    #[serde(default)]
    pub failures: BTreeMap<String, String>,
    pub snapshot_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub rows: usize,
    pub columns: Vec<String>,
    pub numeric: BTreeMap<String, ColumnStats>,
    pub distinct: BTreeMap<String, usize>,
    #[serde(default)]
    pub missing_values: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfoResponse {
    pub dataset_info: DatasetInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmsResponse {
    pub vms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    pub models_initialized: bool,
    pub snapshot_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostProfile {
    pub host_id: String,
    pub cpu_capacity: f64,
    pub ram_capacity: f64,
    pub energy: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmDemand {
    pub cpu_demand: f64,
    pub ram_demand: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreHostsRequest {
    pub hosts: Vec<HostProfile>,
    pub vm: VmDemand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreHostsResponse {
    pub best_host: Option<String>,
    pub score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_decodes_success_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/ml/vms")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "success", "vms": ["VM1", "VM2"]}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response: VmsResponse = client.get("api/ml/vms").await.unwrap();
        assert_eq!(response.vms, vec!["VM1", "VM2"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_envelope_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/ml/predict")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "error", "message": "models not initialized"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let request = PredictRequest {
            cpu: 50.0,
            memory: 8.0,
            network_io: 1.5,
            power: 200.0,
            vm: "VM1".to_string(),
            weights: None,
        };
        let err = client
            .post::<PredictResponse, _>("api/ml/predict", &request)
            .await
            .unwrap_err();
        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api_err.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_err.message, "models not initialized");
    }

    #[tokio::test]
    async fn test_health_accepts_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "unhealthy", "components": {}}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let (status, health): (_, ServiceHealth) = client.get_health("healthz").await.unwrap();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.status, "unhealthy");
    }

    #[test]
    fn test_metrics_tolerate_null_scores() {
        let metrics: ModelMetrics =
            serde_json::from_str(r#"{"MSE": 0.5, "R2": null, "MAE": 0.25}"#).unwrap();
        assert!(metrics.r2.is_none());
        assert_eq!(metrics.mse, Some(0.5));
    }
}
