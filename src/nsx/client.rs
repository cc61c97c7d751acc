//! NSX manager API client implementation.
//!
//! This module provides the HTTP client for the NSX policy and fabric
//! REST APIs, with basic authentication, bounded retries, and cursor
//! pagination for list endpoints.

use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{GroupTagError, NsxError, Result};

use super::types::{Gateway, ListResponse, Segment, SegmentPort, Vif, VirtualMachine};

/// Policy API prefix for path-addressed objects.
const POLICY_API: &str = "/policy/api/v1";

/// Realized virtual machine listing endpoint.
const VMS_API: &str = "/policy/api/v1/infra/realized-state/virtual-machines";

/// Fabric VIF listing endpoint.
const VIFS_API: &str = "/api/v1/fabric/vifs";

/// Policy search endpoint.
const SEARCH_API: &str = "/policy/api/v1/search/query";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// NSX manager API client.
#[derive(Debug, Clone)]
pub struct NsxClient {
    /// HTTP client.
    client: Client,
    /// Manager base URL, scheme included, no trailing slash.
    base_url: String,
    /// API user.
    username: String,
    /// API password.
    password: String,
}

impl NsxClient {
    /// Creates a new NSX API client.
    ///
    /// `manager` is a hostname (https is assumed) or a full base URL.
    /// With `insecure` set, certificate validation is skipped, which
    /// self-signed manager certificates require.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(manager: &str, username: &str, password: &str, insecure: bool) -> Result<Self> {
        Self::with_timeout(manager, username, password, insecure, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(
        manager: &str,
        username: &str,
        password: &str,
        insecure: bool,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| NsxError::network(format!("Failed to create HTTP client: {e}")))?;

        let base_url = if manager.starts_with("http://") || manager.starts_with("https://") {
            manager.trim_end_matches('/').to_string()
        } else {
            format!("https://{manager}")
        };

        Ok(Self {
            client,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Executes a request with bounded retries for transient failures.
    async fn execute(
        &self,
        method: Method,
        api: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay_ms = last_error
                    .as_ref()
                    .and_then(GroupTagError::retry_delay_secs)
                    .map_or(RETRY_DELAY_MS * u64::from(attempt), |secs| secs * 1000);
                debug!("Retry attempt {attempt} of {MAX_RETRIES} in {delay_ms}ms");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.execute_once(method.clone(), api, body).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GroupTagError::Nsx(NsxError::NetworkError {
                message: String::from("Max retries exceeded"),
            })
        }))
    }

    /// Executes a single request and maps the response status.
    async fn execute_once(
        &self,
        method: Method,
        api: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{api}", self.base_url);
        trace!("{method} {url}");

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.username, Some(&self.password))
            .header(header::ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            GroupTagError::Nsx(NsxError::NetworkError {
                message: format!("Request failed: {e}"),
            })
        })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(GroupTagError::Nsx(NsxError::RateLimited {
                retry_after_secs: retry_after,
            }));
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GroupTagError::Nsx(NsxError::AuthenticationFailed {
                message: String::from("Invalid username or password"),
            }));
        }

        if status.as_u16() == 404 {
            return Err(GroupTagError::Nsx(NsxError::NotFound {
                path: api.to_string(),
            }));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GroupTagError::Nsx(NsxError::api_error(
                status.as_u16(),
                body,
            )));
        }

        Ok(response)
    }

    /// Fetches a single JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not parse.
    pub async fn get_json<T: DeserializeOwned>(&self, api: &str) -> Result<T> {
        let response = self.execute(Method::GET, api, None).await?;
        response.json().await.map_err(|e| {
            GroupTagError::Nsx(NsxError::invalid_response(format!(
                "Failed to parse response: {e}"
            )))
        })
    }

    /// Fetches every page of a cursor-paginated list endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if any page request fails.
    pub async fn get_results<T: DeserializeOwned>(&self, api: &str) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let url = match &cursor {
                Some(cursor) => {
                    let sep = if api.contains('?') { '&' } else { '?' };
                    format!("{api}{sep}cursor={cursor}")
                }
                None => api.to_string(),
            };

            let page: ListResponse<T> = self.get_json(&url).await?;
            all.extend(page.results);

            match page.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!("Fetched {} results from {api}", all.len());
        Ok(all)
    }

    /// Fetches an object by its policy path.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist or cannot be parsed.
    pub async fn get_by_path<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_json(&format!("{POLICY_API}{path}")).await
    }

    /// Lists all realized virtual machines.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_virtual_machines(&self) -> Result<Vec<VirtualMachine>> {
        self.get_results(VMS_API).await
    }

    /// Lists all fabric VIFs.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_vifs(&self) -> Result<Vec<Vif>> {
        self.get_results(VIFS_API).await
    }

    /// Runs a policy search for one resource type.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn search<T: DeserializeOwned>(&self, resource_type: &str) -> Result<Vec<T>> {
        self.get_results(&format!("{SEARCH_API}?query=resource_type:{resource_type}"))
            .await
    }

    /// Lists all segments known to the policy API.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_segments(&self) -> Result<Vec<Segment>> {
        self.search("Segment").await
    }

    /// Lists all Tier-0 gateways.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_tier0s(&self) -> Result<Vec<Gateway>> {
        self.search("Tier0").await
    }

    /// Lists all Tier-1 gateways.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_tier1s(&self) -> Result<Vec<Gateway>> {
        self.search("Tier1").await
    }

    /// Lists the logical ports of a segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_segment_ports(&self, segment_path: &str) -> Result<Vec<SegmentPort>> {
        self.get_results(&format!("{POLICY_API}{segment_path}/ports"))
            .await
    }

    /// Sends a PATCH with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized or the call fails.
    pub async fn patch<B: Serialize + ?Sized>(&self, api: &str, body: &B) -> Result<()> {
        let body = serde_json::to_value(body)
            .map_err(|e| GroupTagError::internal(format!("Failed to serialize body: {e}")))?;
        self.execute(Method::PATCH, api, Some(&body)).await?;
        Ok(())
    }

    /// Sends a PUT with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized or the call fails.
    pub async fn put<B: Serialize + ?Sized>(&self, api: &str, body: &B) -> Result<()> {
        let body = serde_json::to_value(body)
            .map_err(|e| GroupTagError::internal(format!("Failed to serialize body: {e}")))?;
        self.execute(Method::PUT, api, Some(&body)).await?;
        Ok(())
    }

    /// Sends a DELETE.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn delete(&self, api: &str) -> Result<()> {
        self.execute(Method::DELETE, api, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> NsxClient {
        NsxClient::new(&server.uri(), "admin", "secret", false).unwrap()
    }

    #[tokio::test]
    async fn test_list_virtual_machines_follows_cursor() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/policy/api/v1/infra/realized-state/virtual-machines"))
            .and(query_param_is_missing("cursor"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"external_id": "vm-1", "display_name": "web-01"}],
                "cursor": "c1",
                "result_count": 2
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/policy/api/v1/infra/realized-state/virtual-machines"))
            .and(query_param("cursor", "c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"external_id": "vm-2", "display_name": "web-02"}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let vms = client.list_virtual_machines().await.unwrap();

        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].display_name, "web-01");
        assert_eq!(vms[1].display_name, "web-02");
    }

    #[tokio::test]
    async fn test_auth_failure_maps_to_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.list_virtual_machines().await.unwrap_err();

        assert!(matches!(
            err,
            GroupTagError::Nsx(NsxError::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_object_maps_to_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .get_by_path::<Segment>("/infra/segments/missing")
            .await
            .unwrap_err();

        assert!(matches!(err, GroupTagError::Nsx(NsxError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_retries_after_rate_limit() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/fabric/vifs"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/fabric/vifs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"owner_vm_id": "vm-1", "external_id": "vif-1"}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let vifs = client.list_vifs().await.unwrap();

        assert_eq!(vifs.len(), 1);
        assert_eq!(vifs[0].owner_vm_id, "vm-1");
    }

    #[tokio::test]
    async fn test_patch_sends_json_body() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/policy/api/v1/infra/domains/default/groups/SG_prod"))
            .and(body_json(json!({"display_name": "SG_prod"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client
            .patch(
                "/policy/api/v1/infra/domains/default/groups/SG_prod",
                &json!({"display_name": "SG_prod"}),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_queries_resource_type() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/policy/api/v1/search/query"))
            .and(query_param("query", "resource_type:Tier1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "path": "/infra/tier-1s/t1",
                    "display_name": "t1-edge",
                    "resource_type": "Tier1",
                    "tier0_path": "/infra/tier-0s/t0"
                }]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let gateways = client.list_tier1s().await.unwrap();

        assert_eq!(gateways.len(), 1);
        assert_eq!(gateways[0].tier0_path.as_deref(), Some("/infra/tier-0s/t0"));
    }
}
