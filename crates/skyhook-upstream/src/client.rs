//! HTTP client for the Antigravity upstream.
//!
//! One long-lived `reqwest::Client` per process, HTTP/1.1 only — HTTP/2
//! multiplexing has been observed to add latency to streamed responses.
//! Non-stream requests accept gzip; stream requests force identity
//! encoding because upstream buffers compressed chunks and destroys
//! streaming smoothness.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, AUTHORIZATION};
use tracing::{debug, instrument};

use skyhook_core::types::{AntigravityRequest, AntigravityResponse};

use crate::credentials::Credential;
use crate::endpoints::EndpointSelector;
use crate::error::{extract_error_details, UpstreamError, UpstreamResult};
use crate::retry::{with_retry, RetryPolicy};

/// Transport configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// `User-Agent` sent upstream.
    pub user_agent: String,
    /// Total request timeout.
    pub timeout: Duration,
    /// Optional forward proxy URL.
    pub proxy: Option<String>,
    /// Test hook: replaces the selected endpoint's base URL.
    pub base_url_override: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "antigravity/1.11.3 windows/amd64".into(),
            timeout: Duration::from_millis(180_000),
            proxy: None,
            base_url_override: None,
        }
    }
}

/// The upstream API client.
pub struct UpstreamClient {
    http: reqwest::Client,
    selector: Arc<EndpointSelector>,
    retry: RetryPolicy,
    config: ClientConfig,
}

impl UpstreamClient {
    /// Build the client. Panics only on a malformed proxy URL, which is a
    /// startup configuration error.
    #[must_use]
    pub fn new(config: ClientConfig, retry: RetryPolicy, selector: Arc<EndpointSelector>) -> Self {
        let mut builder = reqwest::Client::builder()
            .http1_only()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(30))
            .timeout(config.timeout);

        if let Some(ref proxy) = config.proxy {
            if let Ok(proxy) = reqwest::Proxy::all(proxy) {
                builder = builder.proxy(proxy);
            }
        }

        Self {
            http: builder.build().expect("reqwest client builds"),
            selector,
            retry,
            config,
        }
    }

    fn headers(&self, credential: &Credential, stream: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(auth) = HeaderValue::from_str(&format!("Bearer {}", credential.access_token)) {
            let _ = headers.insert(AUTHORIZATION, auth);
        }
        if let Ok(ua) = HeaderValue::from_str(&self.config.user_agent) {
            let _ = headers.insert(reqwest::header::USER_AGENT, ua);
        }
        if stream {
            // Upstream gzip buffering ruins streaming smoothness.
            let _ = headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        }
        headers
    }

    async fn stream_url(&self) -> String {
        match self.config.base_url_override {
            Some(ref base) => format!("{base}/v1internal:streamGenerateContent?alt=sse"),
            None => self.selector.next().await.stream_url(),
        }
    }

    async fn generate_url(&self) -> String {
        match self.config.base_url_override {
            Some(ref base) => format!("{base}/v1internal:generateContent"),
            None => self.selector.next().await.generate_url(),
        }
    }

    async fn send_generate(
        &self,
        request: &AntigravityRequest,
        credential: &Credential,
    ) -> UpstreamResult<AntigravityResponse> {
        let url = self.generate_url().await;
        debug!(%url, model = %request.model, "upstream generateContent");

        let response = self
            .http
            .post(&url)
            .headers(self.headers(credential, false))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(UpstreamError::Api(extract_error_details(
                status.as_u16(),
                &body,
            )));
        }

        Ok(response.json().await?)
    }

    async fn send_stream(
        &self,
        request: &AntigravityRequest,
        credential: &Credential,
    ) -> UpstreamResult<reqwest::Response> {
        let url = self.stream_url().await;
        debug!(%url, model = %request.model, "upstream streamGenerateContent");

        let response = self
            .http
            .post(&url)
            .headers(self.headers(credential, true))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(UpstreamError::Api(extract_error_details(
                status.as_u16(),
                &body,
            )));
        }

        Ok(response)
    }

    /// Non-streaming generation with retry.
    #[instrument(skip_all, fields(model = %request.model))]
    pub async fn generate_content(
        &self,
        request: &AntigravityRequest,
        credential: &Credential,
    ) -> UpstreamResult<AntigravityResponse> {
        with_retry(&self.retry, || self.send_generate(request, credential)).await
    }

    /// Streaming generation with retry. Retries only apply before the
    /// response headers arrive; once a body is handed out, mid-stream
    /// failures surface to the caller.
    #[instrument(skip_all, fields(model = %request.model))]
    pub async fn generate_content_stream(
        &self,
        request: &AntigravityRequest,
        credential: &Credential,
    ) -> UpstreamResult<reqwest::Response> {
        with_retry(&self.retry, || self.send_stream(request, credential)).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::EndpointMode;
    use skyhook_core::types::{Content, InnerRequest, Part};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> AntigravityRequest {
        AntigravityRequest {
            project: "proj".into(),
            request_id: "agent-1".into(),
            request: InnerRequest {
                contents: vec![Content::user(vec![Part::text("hi")])],
                session_id: "-42".into(),
                ..InnerRequest::default()
            },
            model: "gemini-3-pro-high".into(),
            user_agent: "test".into(),
            request_type: None,
        }
    }

    fn credential() -> Credential {
        Credential {
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
            expires_in: 3600,
            issued_at_ms: chrono::Utc::now().timestamp_millis(),
            project_id: "proj".into(),
            email: "a@x".into(),
            enabled: true,
            created_at: chrono::Utc::now(),
            session_id: "-1".into(),
        }
    }

    fn test_client(server: &MockServer) -> UpstreamClient {
        let selector = Arc::new(EndpointSelector::new(
            EndpointMode::Direct("daily".into()),
            None,
        ));
        UpstreamClient::new(
            ClientConfig {
                base_url_override: Some(server.uri()),
                ..ClientConfig::default()
            },
            RetryPolicy::default(),
            selector,
        )
    }

    #[tokio::test]
    async fn generate_content_decodes_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1internal:generateContent"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": {
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "hello"}]},
                        "finishReason": "STOP"
                    }]
                }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let resp = client
            .generate_content(&request(), &credential())
            .await
            .unwrap();
        assert_eq!(
            resp.response.candidates[0]
                .content
                .as_ref()
                .unwrap()
                .parts[0]
                .text,
            "hello"
        );
    }

    #[tokio::test]
    async fn stream_request_forces_identity_encoding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1internal:streamGenerateContent"))
            .and(header("accept-encoding", "identity"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("data: {\"response\":{}}\n\n"),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let resp = client
            .generate_content_stream(&request(), &credential())
            .await
            .unwrap();
        assert!(resp.status().is_success());
    }

    #[tokio::test]
    async fn upstream_error_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": "UNAUTHENTICATED", "message": "bad token"}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .generate_content(&request(), &credential())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 401);
        assert!(err.disables_credential());
    }

    #[tokio::test]
    async fn retries_500_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {"code": 500, "message": "internal"}
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": {"candidates": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let resp = client
            .generate_content(&request(), &credential())
            .await
            .unwrap();
        assert!(resp.response.candidates.is_empty());
    }
}
