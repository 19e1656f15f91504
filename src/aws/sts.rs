//! AWS STS adapter
//!
//! Implements [`IdentityApi`] with the `AssumeRole` Query API. Responses are
//! XML and are deserialized with quick-xml's serde support.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::aws::credentials::DefaultCredentialsProvider;
use crate::aws::http::AwsHttpClient;
use crate::aws::sigv4::SignableRequest;
use crate::aws::Credentials;
use crate::descriptor::IdentityApi;
use crate::error::{ConnectError, Result};

pub const SERVICE: &str = "sts";
pub const API_VERSION: &str = "2011-06-15";
pub const ROLE_SESSION_NAME: &str = "SageMakerStudioUser";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    assume_role_result: AssumeRoleResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResult {
    credentials: RawCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    error: RawError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawError {
    code: Option<String>,
    message: Option<String>,
}

/// Form-encoded `AssumeRole` request body
pub fn assume_role_body(role_arn: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("Action", "AssumeRole")
        .append_pair("Version", API_VERSION)
        .append_pair("RoleArn", role_arn)
        .append_pair("RoleSessionName", ROLE_SESSION_NAME)
        .finish()
}

/// Extracts temporary credentials from an `AssumeRole` response
pub fn parse_assume_role_response(xml: &str) -> std::result::Result<Credentials, String> {
    let response: AssumeRoleResponse =
        from_str(xml).map_err(|e| format!("malformed AssumeRole response: {}", e))?;
    let raw = response.assume_role_result.credentials;
    Ok(Credentials {
        access_key_id: raw.access_key_id,
        secret_access_key: raw.secret_access_key,
        session_token: Some(raw.session_token),
        expiration: raw.expiration,
    })
}

/// Renders an STS error body as `Code: Message`, falling back to the raw text
pub fn parse_error_response(xml: &str) -> String {
    match from_str::<ErrorResponse>(xml) {
        Ok(response) => format!(
            "{}: {}",
            response.error.code.unwrap_or_else(|| "Unknown".to_string()),
            response.error.message.unwrap_or_default()
        ),
        Err(_) => xml.trim().to_string(),
    }
}

pub struct StsClient {
    http: Arc<AwsHttpClient>,
    endpoint: Url,
    default_credentials: DefaultCredentialsProvider,
}

impl StsClient {
    pub fn new(http: Arc<AwsHttpClient>, endpoint: Url, default_credentials: DefaultCredentialsProvider) -> Self {
        Self {
            http,
            endpoint,
            default_credentials,
        }
    }
}

#[async_trait]
impl IdentityApi for StsClient {
    async fn assume_role(&self, role_arn: &str) -> Result<Credentials> {
        let caller = self.default_credentials.credentials().await?;

        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        );
        let request = SignableRequest {
            method: "POST",
            url: self.endpoint.clone(),
            headers,
            body: assume_role_body(role_arn).into_bytes(),
        };

        let response = self.http.send(SERVICE, &caller, request).await?;
        if !response.status.is_success() {
            let message = parse_error_response(&response.body);
            debug!("Failed to assume role {}: {} {}", role_arn, response.status, message);
            return Err(ConnectError::RoleAssumption {
                role_arn: role_arn.to_string(),
                message,
            });
        }

        let credentials = parse_assume_role_response(&response.body).map_err(|message| {
            ConnectError::RoleAssumption {
                role_arn: role_arn.to_string(),
                message,
            }
        })?;
        info!(
            "Assumed role {} (credentials expire {})",
            role_arn,
            credentials.expiration.as_deref().unwrap_or("unknown")
        );
        Ok(credentials)
    }
}
