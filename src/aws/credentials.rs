//! AWS credentials and the default provider chain
//!
//! The chain mirrors what a notebook host offers, first match wins:
//! 1. `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`
//! 2. the shared credentials and config files for `AWS_PROFILE`
//! 3. the container credentials endpoint (`AWS_CONTAINER_CREDENTIALS_RELATIVE_URI`
//!    or `AWS_CONTAINER_CREDENTIALS_FULL_URI`), which is how execution roles
//!    are exposed to notebook containers
//! 4. the EC2 instance metadata service (IMDSv2)

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ConnectError, Result};

const CONTAINER_CREDENTIALS_HOST: &str = "http://169.254.170.2";
const IMDS_ENDPOINT: &str = "http://169.254.169.254";
const IMDS_TOKEN_TTL_SECONDS: &str = "21600";
// Off EC2 the metadata address does not answer; fail fast instead of waiting
// out the client timeout
const IMDS_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// RFC 3339 expiry of temporary credentials
    pub expiration: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expiration: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

// Keep secrets out of debug logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expiration: Option<String>,
}

/// Resolves the ambient identity of the process
#[derive(Debug, Clone)]
pub struct DefaultCredentialsProvider {
    client: Client,
}

impl DefaultCredentialsProvider {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create credentials HTTP client")?;
        Ok(Self { client })
    }

    pub async fn credentials(&self) -> Result<Credentials> {
        let lookup = |key: &str| std::env::var(key).ok();

        if let Some(credentials) = from_env(lookup) {
            debug!("Using credentials from environment");
            return Ok(credentials);
        }

        if let Some(credentials) = from_profile(lookup) {
            debug!("Using credentials from shared credentials file");
            return Ok(credentials);
        }

        if let Some(url) = container_credentials_url(lookup) {
            debug!("Fetching credentials from container endpoint {}", url);
            return self.from_container(&url).await;
        }

        if let Some(endpoint) = instance_metadata_endpoint(lookup) {
            debug!("Fetching credentials from instance metadata at {}", endpoint);
            return self.from_instance_metadata(&endpoint).await;
        }

        Err(ConnectError::Credentials(
            "no credentials in the environment, shared credentials files, container endpoint or instance metadata"
                .to_string(),
        ))
    }

    async fn from_container(&self, url: &str) -> Result<Credentials> {
        let mut request = self.client.get(url);
        if let Ok(token) = std::env::var("AWS_CONTAINER_AUTHORIZATION_TOKEN") {
            request = request.header("Authorization", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConnectError::Credentials(format!("container credentials request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ConnectError::Credentials(format!(
                "container credentials endpoint returned {}",
                response.status()
            )));
        }

        let body: ContainerCredentials = response
            .json()
            .await
            .map_err(|e| ConnectError::Credentials(format!("malformed container credentials: {}", e)))?;

        Ok(body.into())
    }

    /// IMDSv2: session token first, then the attached role's credentials
    async fn from_instance_metadata(&self, endpoint: &str) -> Result<Credentials> {
        let token = self
            .client
            .put(format!("{}/latest/api/token", endpoint))
            .header("X-aws-ec2-metadata-token-ttl-seconds", IMDS_TOKEN_TTL_SECONDS)
            .timeout(IMDS_TIMEOUT)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ConnectError::Credentials(format!("instance metadata token request failed: {}", e)))?
            .text()
            .await
            .map_err(|e| ConnectError::Credentials(format!("instance metadata token request failed: {}", e)))?;

        let roles_url = format!("{}/latest/meta-data/iam/security-credentials/", endpoint);
        let roles = self.imds_get(&roles_url, &token).await?;
        let role = roles
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| ConnectError::Credentials("instance has no IAM role attached".to_string()))?;
        debug!("Instance profile role: {}", role);

        let body = self.imds_get(&format!("{}{}", roles_url, role), &token).await?;
        let credentials: ContainerCredentials = serde_json::from_str(&body)
            .map_err(|e| ConnectError::Credentials(format!("malformed instance metadata credentials: {}", e)))?;
        Ok(credentials.into())
    }

    async fn imds_get(&self, url: &str, token: &str) -> Result<String> {
        self.client
            .get(url)
            .header("X-aws-ec2-metadata-token", token)
            .timeout(IMDS_TIMEOUT)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ConnectError::Credentials(format!("instance metadata request to {} failed: {}", url, e)))?
            .text()
            .await
            .map_err(|e| ConnectError::Credentials(format!("instance metadata request to {} failed: {}", url, e)))
    }
}

impl From<ContainerCredentials> for Credentials {
    fn from(body: ContainerCredentials) -> Self {
        Credentials {
            access_key_id: body.access_key_id,
            secret_access_key: body.secret_access_key,
            session_token: body.token,
            expiration: body.expiration,
        }
    }
}

/// Reads static credentials through `lookup`, normally `std::env::var`
pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Option<Credentials> {
    let access_key_id = lookup("AWS_ACCESS_KEY_ID").filter(|v| !v.is_empty())?;
    let secret_access_key = lookup("AWS_SECRET_ACCESS_KEY").filter(|v| !v.is_empty())?;
    Some(Credentials {
        access_key_id,
        secret_access_key,
        session_token: lookup("AWS_SESSION_TOKEN").filter(|v| !v.is_empty()),
        expiration: None,
    })
}

pub fn container_credentials_url(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(relative) = lookup("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI").filter(|v| !v.is_empty()) {
        return Some(format!("{}{}", CONTAINER_CREDENTIALS_HOST, relative));
    }
    lookup("AWS_CONTAINER_CREDENTIALS_FULL_URI").filter(|v| !v.is_empty())
}

/// Reads the selected profile from the shared credentials file, then the
/// shared config file. `lookup` resolves environment variables.
pub fn from_profile(lookup: impl Fn(&str) -> Option<String>) -> Option<Credentials> {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let profile = non_empty("AWS_PROFILE")
        .or_else(|| non_empty("AWS_DEFAULT_PROFILE"))
        .unwrap_or_else(|| "default".to_string());
    let home = non_empty("HOME").or_else(|| non_empty("USERPROFILE")).map(PathBuf::from);
    let in_home = |name: &str| home.as_ref().map(|home| home.join(".aws").join(name));

    let credentials_file = non_empty("AWS_SHARED_CREDENTIALS_FILE")
        .map(PathBuf::from)
        .or_else(|| in_home("credentials"));
    let config_file = non_empty("AWS_CONFIG_FILE")
        .map(PathBuf::from)
        .or_else(|| in_home("config"));

    // The config file prefixes every profile except the default one
    let config_section = if profile == "default" {
        profile.clone()
    } else {
        format!("profile {}", profile)
    };

    let found = [(credentials_file, profile.as_str()), (config_file, config_section.as_str())]
        .into_iter()
        .filter_map(|(path, section)| path.map(|path| (path, section)))
        .find_map(|(path, section)| {
            let contents = fs::read_to_string(&path).ok()?;
            let credentials = parse_profile(&contents, section);
            if credentials.is_some() {
                debug!("Found profile [{}] in {}", section, path.display());
            }
            credentials
        });
    found
}

/// Extracts static keys from the `[section]` of an INI-style AWS profile file
pub fn parse_profile(contents: &str, section: &str) -> Option<Credentials> {
    let mut current: Option<String> = None;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            current = Some(name.split_whitespace().collect::<Vec<_>>().join(" "));
            continue;
        }

        if current.as_deref() != Some(section) {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "aws_access_key_id" => access_key_id = Some(value),
            "aws_secret_access_key" => secret_access_key = Some(value),
            "aws_session_token" => session_token = Some(value),
            _ => {}
        }
    }

    Some(Credentials {
        access_key_id: access_key_id.filter(|v| !v.is_empty())?,
        secret_access_key: secret_access_key.filter(|v| !v.is_empty())?,
        session_token: session_token.filter(|v| !v.is_empty()),
        expiration: None,
    })
}

/// Instance metadata base URL, `None` when disabled through
/// `AWS_EC2_METADATA_DISABLED`
pub fn instance_metadata_endpoint(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    if lookup("AWS_EC2_METADATA_DISABLED").is_some_and(|v| v.trim().eq_ignore_ascii_case("true")) {
        return None;
    }
    let endpoint = lookup("AWS_EC2_METADATA_SERVICE_ENDPOINT")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| IMDS_ENDPOINT.to_string());
    Some(endpoint.trim_end_matches('/').to_string())
}
