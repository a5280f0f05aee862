//! Runpod GraphQL API client

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::graphql::{GraphQlRequest, GraphQlResponse, NoVariables};
use super::{decode_json, FetchError};
use crate::error::{Error, Result};

const BILLING_SUMMARY_QUERY: &str = r"
query getUserBillingSummary($input: UserBillingInput!) {
  myself {
    billing(input: $input) {
      summary {
        time
        gpuCloudAmount
        cpuCloudAmount
        runpodEndpointAmount
        serverlessAmount
        storageAmount
      }
    }
  }
}";

const BALANCE_QUERY: &str = r"
query myBalance {
  myself {
    clientBalance
  }
}";

const ENDPOINTS_QUERY: &str = r"
query Endpoints {
  myself {
    endpoints {
      gpuIds
      gpuCount
      allowedCudaVersions
      id
      idleTimeout
      locations
      name
      networkVolumeId
      scalerType
      scalerValue
      templateId
      workersMax
      workersMin
      executionTimeoutMs
    }
  }
}";

const SAVE_ENDPOINT_MUTATION: &str = r"
mutation saveEndpoint($input: EndpointInput!) {
  saveEndpoint(input: $input) {
    id
    name
    workersMin
    workersMax
  }
}";

/// Runpod API client
pub struct RunpodClient {
    http: Client,
    endpoint: Url,
}

impl RunpodClient {
    /// Create a client for `{api_base}/graphql`
    pub fn new(http: Client, api_base: &str, api_key: &str) -> Result<Self> {
        let mut endpoint = Url::parse(api_base)
            .and_then(|base| base.join("graphql"))
            .map_err(|e| Error::config(format!("invalid Runpod api_base '{api_base}': {e}")))?;
        endpoint.query_pairs_mut().append_pair("api_key", api_key);

        Ok(Self { http, endpoint })
    }

    async fn execute<V, T>(&self, request: &GraphQlRequest<V>) -> std::result::Result<T, FetchError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        debug!(operation = ?request.operation_name, "Runpod GraphQL request");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        decode_json::<GraphQlResponse<T>>(response).await?.into_data()
    }

    /// Daily billing summary of the account
    pub async fn billing_summary(&self) -> std::result::Result<Vec<BillingSummaryEntry>, FetchError> {
        let request = GraphQlRequest::named(
            "getUserBillingSummary",
            BILLING_SUMMARY_QUERY,
            BillingVariables {
                input: BillingInput {
                    granularity: "DAILY",
                },
            },
        );

        let data: BillingData = self.execute(&request).await?;
        Ok(data.myself.billing.summary)
    }

    /// Prepaid balance of the account, in dollars
    pub async fn client_balance(&self) -> std::result::Result<f64, FetchError> {
        let request = GraphQlRequest::named("myBalance", BALANCE_QUERY, NoVariables {});

        let data: BalanceData = self.execute(&request).await?;
        Ok(data.myself.client_balance)
    }

    /// Serverless endpoints of the account
    pub async fn endpoints(&self) -> std::result::Result<Vec<ServerlessEndpoint>, FetchError> {
        let request = GraphQlRequest {
            operation_name: None,
            variables: NoVariables {},
            query: ENDPOINTS_QUERY,
        };

        let data: EndpointsData = self.execute(&request).await?;
        Ok(data.myself.endpoints)
    }

    /// Save an endpoint definition
    pub async fn save_endpoint(
        &self,
        input: &EndpointInput,
    ) -> std::result::Result<SavedEndpoint, FetchError> {
        let request = GraphQlRequest::named(
            "saveEndpoint",
            SAVE_ENDPOINT_MUTATION,
            SaveEndpointVariables { input },
        );

        let data: SaveEndpointData = self.execute(&request).await?;
        Ok(data.save_endpoint)
    }
}

#[derive(Debug, Serialize)]
struct BillingVariables {
    input: BillingInput,
}

#[derive(Debug, Serialize)]
struct BillingInput {
    granularity: &'static str,
}

#[derive(Debug, Deserialize)]
struct BillingData {
    myself: BillingMyself,
}

#[derive(Debug, Deserialize)]
struct BillingMyself {
    billing: Billing,
}

#[derive(Debug, Deserialize)]
struct Billing {
    summary: Vec<BillingSummaryEntry>,
}

/// One day of the billing summary
#[derive(Debug, Clone, Deserialize)]
pub struct BillingSummaryEntry {
    /// Start of the period, RFC 3339
    pub time: String,
    /// Every other field, including the `*Amount` dollar totals
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl BillingSummaryEntry {
    /// UTC calendar date of the entry
    pub fn date(&self) -> std::result::Result<NaiveDate, FetchError> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&self.time) {
            return Ok(ts.with_timezone(&Utc).date_naive());
        }
        self.time
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .ok_or_else(|| {
                FetchError::MalformedResponse(format!("unparseable billing time '{}'", self.time))
            })
    }

    /// Sum of every numeric `*Amount` field, in dollars
    pub fn total_dollars(&self) -> f64 {
        self.fields
            .iter()
            .filter(|(key, _)| key.ends_with("Amount"))
            .filter_map(|(_, value)| value.as_f64())
            .sum()
    }
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    myself: BalanceMyself,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceMyself {
    client_balance: f64,
}

#[derive(Debug, Deserialize)]
struct EndpointsData {
    myself: EndpointsMyself,
}

#[derive(Debug, Deserialize)]
struct EndpointsMyself {
    endpoints: Vec<ServerlessEndpoint>,
}

/// A serverless endpoint definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessEndpoint {
    /// Endpoint id
    pub id: String,
    /// Endpoint name
    pub name: String,
    /// GPU pool ids, comma separated
    pub gpu_ids: Option<String>,
    /// GPUs per worker
    pub gpu_count: Option<i64>,
    /// Allowed CUDA versions, comma separated
    pub allowed_cuda_versions: Option<String>,
    /// Seconds a worker stays up without work
    pub idle_timeout: Option<i64>,
    /// Allowed data centers
    pub locations: Option<String>,
    /// Attached network volume
    pub network_volume_id: Option<String>,
    /// Autoscaling strategy
    pub scaler_type: Option<String>,
    /// Autoscaling trigger value
    pub scaler_value: Option<i64>,
    /// Template the workers run
    pub template_id: Option<String>,
    /// Maximum number of workers
    pub workers_max: Option<i64>,
    /// Number of always-on workers
    pub workers_min: Option<i64>,
    /// Job timeout in milliseconds
    pub execution_timeout_ms: Option<i64>,
}

/// Input of the `saveEndpoint` mutation
///
/// Runpod replaces the whole definition, so every current setting is sent
/// back unchanged next to the new worker minimum.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointInput {
    /// Endpoint id
    pub id: String,
    /// Endpoint name
    pub name: String,
    /// GPU pool ids, comma separated
    pub gpu_ids: Option<String>,
    /// GPUs per worker
    pub gpu_count: Option<i64>,
    /// Allowed CUDA versions, comma separated
    pub allowed_cuda_versions: Option<String>,
    /// Seconds a worker stays up without work
    pub idle_timeout: Option<i64>,
    /// Allowed data centers
    pub locations: Option<String>,
    /// Attached network volume
    pub network_volume_id: Option<String>,
    /// Autoscaling strategy
    pub scaler_type: Option<String>,
    /// Autoscaling trigger value
    pub scaler_value: Option<i64>,
    /// Maximum number of workers
    pub workers_max: Option<i64>,
    /// Number of always-on workers
    pub workers_min: i64,
    /// Job timeout in milliseconds
    pub execution_timeout_ms: Option<i64>,
}

impl EndpointInput {
    /// Copy of `endpoint` with a new worker minimum
    pub fn with_workers_min(endpoint: &ServerlessEndpoint, workers_min: i64) -> Self {
        Self {
            id: endpoint.id.clone(),
            name: endpoint.name.clone(),
            gpu_ids: endpoint.gpu_ids.clone(),
            gpu_count: endpoint.gpu_count,
            allowed_cuda_versions: endpoint.allowed_cuda_versions.clone(),
            idle_timeout: endpoint.idle_timeout,
            locations: endpoint.locations.clone(),
            network_volume_id: endpoint.network_volume_id.clone(),
            scaler_type: endpoint.scaler_type.clone(),
            scaler_value: endpoint.scaler_value,
            workers_max: endpoint.workers_max,
            workers_min,
            execution_timeout_ms: endpoint.execution_timeout_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct SaveEndpointVariables<'a> {
    input: &'a EndpointInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveEndpointData {
    save_endpoint: SavedEndpoint,
}

/// Endpoint state returned by `saveEndpoint`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedEndpoint {
    /// Endpoint id
    pub id: String,
    /// Endpoint name
    pub name: String,
    /// Number of always-on workers
    pub workers_min: Option<i64>,
    /// Maximum number of workers
    pub workers_max: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RunpodClient {
        let http = crate::providers::http_client(Duration::from_secs(5)).unwrap();
        RunpodClient::new(http, &server.uri(), "test-key").unwrap()
    }

    fn entry(value: serde_json::Value) -> BillingSummaryEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_entry_sums_amount_fields_only() {
        let entry = entry(json!({
            "time": "2024-05-02T00:00:00.000Z",
            "gpuCloudAmount": 10.5,
            "cpuCloudAmount": 0.25,
            "serverlessAmount": null,
            "storageAmount": 1,
            "__typename": "UserBillingSummary"
        }));

        assert_eq!(entry.date().unwrap(), NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert!((entry.total_dollars() - 11.75).abs() < 1e-9);
    }

    #[test]
    fn test_entry_date_is_utc() {
        let entry = entry(json!({"time": "2024-05-01T22:00:00-04:00"}));
        assert_eq!(entry.date().unwrap(), NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
    }

    #[test]
    fn test_entry_date_falls_back_to_prefix() {
        let entry = entry(json!({"time": "2024-05-03 00:00:00"}));
        assert_eq!(entry.date().unwrap(), NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());

        let bad = self::entry(json!({"time": "yesterday"}));
        assert!(matches!(bad.date(), Err(FetchError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_billing_summary_posts_typed_query() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/graphql"))
            .and(matchers::query_param("api_key", "test-key"))
            .and(matchers::body_partial_json(json!({
                "operationName": "getUserBillingSummary",
                "variables": {"input": {"granularity": "DAILY"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"myself": {"billing": {"summary": [
                    {"time": "2024-05-01T00:00:00Z", "gpuCloudAmount": 3.0},
                    {"time": "2024-05-02T00:00:00Z", "gpuCloudAmount": 4.0}
                ]}}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summary = client_for(&server).billing_summary().await.unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[1].time, "2024-05-02T00:00:00Z");
    }

    #[tokio::test]
    async fn test_client_balance() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::body_partial_json(json!({"operationName": "myBalance"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"myself": {"clientBalance": 42.17}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let balance = client_for(&server).client_balance().await.unwrap();
        assert!((balance - 42.17).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_http_error_is_classified() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server).billing_summary().await.unwrap_err();
        assert_eq!(
            err,
            FetchError::HttpStatus {
                status: 502,
                body: "bad gateway".into()
            }
        );
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"myself": {"billing": {"summary": []}}}}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let http = crate::providers::http_client(Duration::from_millis(300)).unwrap();
        let client = RunpodClient::new(http, &server.uri(), "test-key").unwrap();

        let err = client.billing_summary().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_missing_summary_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"myself": {}}})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).billing_summary().await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_save_endpoint_sends_full_definition() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::body_partial_json(json!({
                "operationName": "saveEndpoint",
                "variables": {"input": {"id": "ep1", "name": "US-Summarization", "workersMin": 0, "workersMax": 3, "gpuIds": "AMPERE_16"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"saveEndpoint": {"id": "ep1", "name": "US-Summarization", "workersMin": 0, "workersMax": 3}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = ServerlessEndpoint {
            id: "ep1".into(),
            name: "US-Summarization".into(),
            gpu_ids: Some("AMPERE_16".into()),
            gpu_count: Some(1),
            allowed_cuda_versions: None,
            idle_timeout: Some(5),
            locations: None,
            network_volume_id: None,
            scaler_type: Some("QUEUE_DELAY".into()),
            scaler_value: Some(4),
            template_id: Some("tpl".into()),
            workers_max: Some(3),
            workers_min: Some(1),
            execution_timeout_ms: Some(600_000),
        };

        let saved = client_for(&server)
            .save_endpoint(&EndpointInput::with_workers_min(&endpoint, 0))
            .await
            .unwrap();
        assert_eq!(saved.workers_min, Some(0));
    }
}
