//! Signed HTTPS transport for AWS APIs
//!
//! A thin wrapper over a pooled `reqwest` client that signs every request
//! with SigV4 and hands back status and body untouched. Protocol adapters
//! (EMR JSON, STS Query) decide what an error response means. There are no
//! retries here: connecting is user-initiated and the user re-runs it.

use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use chrono::Utc;
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::debug;
use uuid::Uuid;

use crate::aws::sigv4::{SignableRequest, Signer};
use crate::aws::Credentials;
use crate::error::{ConnectError, Result};

/// Raw response of a signed call
#[derive(Debug, Clone)]
pub struct AwsResponse {
    pub status: StatusCode,
    pub body: String,
}

/// What a failed AWS call means for the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AccessDenied,
    /// The request named something that does not exist or is malformed
    InvalidRequest,
    Service,
}

/// Classifies an AWS error code together with its HTTP status
pub fn failure_kind(code: &str, status: StatusCode) -> FailureKind {
    // JSON protocols prefix codes with a namespace, e.g. "com.amazon...#Code"
    let code = code.rsplit('#').next().unwrap_or(code);
    if code.contains("AccessDenied") || code.contains("UnauthorizedOperation") || status == StatusCode::FORBIDDEN {
        FailureKind::AccessDenied
    } else if code.contains("InvalidRequest") || code.contains("ResourceNotFound") || code == "ValidationException" {
        FailureKind::InvalidRequest
    } else {
        FailureKind::Service
    }
}

#[derive(Debug, Clone)]
pub struct AwsHttpClient {
    client: Client,
    region: String,
}

impl AwsHttpClient {
    /// Creates a client with the given request timeout
    pub fn new(timeout: Duration, region: impl Into<String>) -> AnyResult<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("emrlink/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            region: region.into(),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Signs `request` for `service` and sends it
    pub async fn send(
        &self,
        service: &str,
        credentials: &Credentials,
        mut request: SignableRequest,
    ) -> Result<AwsResponse> {
        Signer::new(credentials, &self.region, service).sign(&mut request, Utc::now());

        let mut builder = match request.method {
            "GET" => self.client.get(request.url.clone()),
            _ => self.client.post(request.url.clone()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = builder.header("amz-sdk-invocation-id", Uuid::new_v4().to_string());

        debug!("Sending signed {} request to {}", service, request.url);
        let response = builder.body(request.body).send().await.map_err(|e| {
            if e.is_timeout() {
                ConnectError::service(format!("request to {} timed out", service))
            } else if e.is_connect() {
                ConnectError::service(format!("unable to connect to {}: {}", service, e))
            } else {
                ConnectError::service(format!("request to {} failed: {}", service, e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConnectError::service(format!("failed to read {} response body: {}", service, e)))?;

        debug!("{} responded with {}", service, status);
        Ok(AwsResponse { status, body })
    }
}
