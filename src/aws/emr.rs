//! Amazon EMR adapter
//!
//! Implements [`ClusterApi`] over the EMR JSON 1.1 protocol. This is the only
//! module that knows the shape of EMR responses; everything it returns is
//! already translated into the typed descriptor model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use crate::aws::credentials::DefaultCredentialsProvider;
use crate::aws::http::{failure_kind, AwsHttpClient, AwsResponse, FailureKind};
use crate::aws::sigv4::SignableRequest;
use crate::aws::Credentials;
use crate::descriptor::{
    AdIntegration, ClusterApi, ClusterApiFactory, ClusterState, ClusterSummary, CrossRealmTrust, Instance,
    InstanceCollectionType, InstancePage, InstanceRole, InstanceState, KdcProvider, KerberosSection,
    SecurityConfiguration,
};
use crate::error::{ConnectError, Result};

pub const SERVICE: &str = "elasticmapreduce";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "ElasticMapReduce";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeClusterOutput {
    cluster: RawCluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawCluster {
    id: String,
    name: Option<String>,
    status: Option<RawStatus>,
    security_configuration: Option<String>,
    kerberos_attributes: Option<RawKerberosAttributes>,
    instance_collection_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStatus {
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawKerberosAttributes {
    realm: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ListInstancesOutput {
    instances: Vec<RawInstance>,
    marker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawInstance {
    id: String,
    public_dns_name: Option<String>,
    public_ip_address: Option<String>,
    private_dns_name: Option<String>,
    private_ip_address: Option<String>,
    status: Option<RawStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityConfigurationOutput {
    security_configuration: String,
}

// Security configuration JSON document

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct SecurityDocument {
    authentication_configuration: Option<AuthenticationConfiguration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct AuthenticationConfiguration {
    kerberos_configuration: Option<KerberosConfiguration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct KerberosConfiguration {
    provider: Option<String>,
    cluster_dedicated_kdc_configuration: Option<DedicatedKdcConfiguration>,
    external_kdc_configuration: Option<ExternalKdcConfiguration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DedicatedKdcConfiguration {
    ticket_lifetime_in_hours: Option<u32>,
    cross_realm_trust_configuration: Option<RawCrossRealmTrust>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawCrossRealmTrust {
    realm: Option<String>,
    domain: Option<String>,
    admin_server: Option<String>,
    kdc_server: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ExternalKdcConfiguration {
    admin_server: Option<String>,
    kdc_server: Option<String>,
    ticket_lifetime_in_hours: Option<u32>,
    ad_integration_configuration: Option<RawAdIntegration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawAdIntegration {
    ad_realm: Option<String>,
    ad_domain: Option<String>,
    ad_server: Option<String>,
}

/// Parses a `DescribeCluster` response body
pub fn parse_describe_cluster(body: &str) -> Result<ClusterSummary> {
    let output: DescribeClusterOutput = serde_json::from_str(body)
        .map_err(|e| ConnectError::service(format!("malformed describe-cluster response: {}", e)))?;
    let cluster = output.cluster;

    let collection_type = match cluster.instance_collection_type.as_deref() {
        Some("INSTANCE_FLEET") => InstanceCollectionType::InstanceFleet,
        _ => InstanceCollectionType::InstanceGroup,
    };

    Ok(ClusterSummary {
        id: cluster.id,
        name: cluster.name,
        status: ClusterState::from_api(state_of(&cluster.status)),
        security_configuration: cluster.security_configuration.filter(|name| !name.is_empty()),
        kerberos_realm: cluster.kerberos_attributes.and_then(|attrs| attrs.realm),
        collection_type,
    })
}

/// Parses a `ListInstances` response body, tagging every instance with `role`
pub fn parse_list_instances(body: &str, role: InstanceRole) -> Result<InstancePage> {
    let output: ListInstancesOutput = serde_json::from_str(body)
        .map_err(|e| ConnectError::service(format!("malformed list-instances response: {}", e)))?;

    let instances = output
        .instances
        .into_iter()
        .map(|raw| Instance {
            state: InstanceState::from_api(state_of(&raw.status)),
            public_address: first_present(raw.public_dns_name, raw.public_ip_address),
            private_address: first_present(raw.private_dns_name, raw.private_ip_address),
            id: raw.id,
            role,
        })
        .collect();

    Ok(InstancePage {
        instances,
        marker: output.marker.filter(|m| !m.is_empty()),
    })
}

/// Parses a `DescribeSecurityConfiguration` response body, including the
/// embedded JSON security document
pub fn parse_security_configuration(name: &str, body: &str) -> Result<SecurityConfiguration> {
    let output: DescribeSecurityConfigurationOutput = serde_json::from_str(body)
        .map_err(|e| ConnectError::service(format!("malformed describe-security-configuration response: {}", e)))?;

    let document: SecurityDocument = serde_json::from_str(&output.security_configuration).map_err(|e| {
        ConnectError::configuration(format!("security configuration {} is not a valid document: {}", name, e))
    })?;

    let kerberos = document
        .authentication_configuration
        .and_then(|auth| auth.kerberos_configuration)
        .map(kerberos_section);

    Ok(SecurityConfiguration { kerberos })
}

// Both sub-configurations are mapped whatever the provider says; a missing or
// unknown provider is the classifier's to reject
fn kerberos_section(config: KerberosConfiguration) -> KerberosSection {
    let provider = config
        .provider
        .filter(|name| !name.trim().is_empty())
        .map(|name| match name.as_str() {
            "ClusterDedicatedKdc" => KdcProvider::ClusterDedicatedKdc,
            "ExternalKdc" => KdcProvider::ExternalKdc,
            _ => KdcProvider::Other(name),
        });

    let mut section = KerberosSection {
        provider,
        ..KerberosSection::default()
    };

    if let Some(dedicated) = config.cluster_dedicated_kdc_configuration {
        section.ticket_lifetime_hours = dedicated.ticket_lifetime_in_hours;
        if let Some(trust) = dedicated.cross_realm_trust_configuration {
            section.cross_realm_trusts.push(CrossRealmTrust {
                realm: trust.realm,
                domain: trust.domain,
                kdc_server: trust.kdc_server,
                admin_server: trust.admin_server,
            });
        }
    }

    if let Some(external) = config.external_kdc_configuration {
        section.ticket_lifetime_hours = section.ticket_lifetime_hours.or(external.ticket_lifetime_in_hours);
        section.kdc_hosts = external.kdc_server.into_iter().collect();
        section.admin_server = external.admin_server;
        section.ad_integration = external.ad_integration_configuration.map(|ad| AdIntegration {
            realm: ad.ad_realm,
            domain: ad.ad_domain,
            server: ad.ad_server,
        });
    }

    section
}

/// Extracts `(code, message)` from an EMR error body
pub fn parse_error(body: &str) -> (String, String) {
    let value: serde_json::Value = serde_json::from_str(body).unwrap_or(serde_json::Value::Null);
    let code = value
        .get("__type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let message = value
        .get("message")
        .or_else(|| value.get("Message"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    (code, message)
}

fn state_of(status: &Option<RawStatus>) -> &str {
    status
        .as_ref()
        .and_then(|s| s.state.as_deref())
        .unwrap_or("UNKNOWN")
}

fn first_present(preferred: Option<String>, fallback: Option<String>) -> Option<String> {
    preferred
        .filter(|v| !v.is_empty())
        .or_else(|| fallback.filter(|v| !v.is_empty()))
}

/// EMR client bound to one identity
pub struct EmrClient {
    http: Arc<AwsHttpClient>,
    endpoint: Url,
    credentials: Credentials,
}

impl EmrClient {
    pub fn new(http: Arc<AwsHttpClient>, endpoint: Url, credentials: Credentials) -> Self {
        Self {
            http,
            endpoint,
            credentials,
        }
    }

    async fn call(&self, operation: &str, input: serde_json::Value) -> Result<AwsResponse> {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), CONTENT_TYPE.to_string());
        headers.insert("x-amz-target".to_string(), format!("{}.{}", TARGET_PREFIX, operation));

        let request = SignableRequest {
            method: "POST",
            url: self.endpoint.clone(),
            headers,
            body: input.to_string().into_bytes(),
        };

        let response = self.http.send(SERVICE, &self.credentials, request).await?;
        debug!("{} response: {}", operation, response.body);
        Ok(response)
    }
}

/// Turns a non-success EMR response into a typed error.
///
/// `invalid_request` decides what "the named thing does not exist" means for
/// the operation that failed.
fn api_error(
    operation: &str,
    response: &AwsResponse,
    invalid_request: impl FnOnce(String) -> ConnectError,
) -> ConnectError {
    let (code, message) = parse_error(&response.body);
    match failure_kind(&code, response.status) {
        FailureKind::AccessDenied => ConnectError::AccessDenied(format!("{} denied: {}", operation, message)),
        FailureKind::InvalidRequest => invalid_request(message),
        FailureKind::Service => ConnectError::service(format!(
            "{} failed with status {}: {} {}",
            operation, response.status, code, message
        )),
    }
}

#[async_trait]
impl ClusterApi for EmrClient {
    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterSummary> {
        let response = self
            .call("DescribeCluster", json!({ "ClusterId": cluster_id }))
            .await?;
        if !response.status.is_success() {
            return Err(api_error("DescribeCluster", &response, |message| ConnectError::ClusterNotFound {
                cluster_id: cluster_id.to_string(),
                message,
            }));
        }
        parse_describe_cluster(&response.body)
    }

    async fn list_instances(
        &self,
        cluster: &ClusterSummary,
        role: InstanceRole,
        marker: Option<&str>,
    ) -> Result<InstancePage> {
        let mut input = json!({ "ClusterId": cluster.id });
        match cluster.collection_type {
            InstanceCollectionType::InstanceGroup => {
                input["InstanceGroupTypes"] = json!([role.as_api_str()]);
            }
            InstanceCollectionType::InstanceFleet => {
                input["InstanceFleetType"] = json!(role.as_api_str());
            }
        }
        if let Some(marker) = marker {
            input["Marker"] = json!(marker);
        }

        let response = self.call("ListInstances", input).await?;
        if !response.status.is_success() {
            return Err(api_error("ListInstances", &response, |message| ConnectError::ClusterNotFound {
                cluster_id: cluster.id.clone(),
                message,
            }));
        }
        parse_list_instances(&response.body, role)
    }

    async fn describe_security_configuration(&self, name: &str) -> Result<SecurityConfiguration> {
        let response = self
            .call("DescribeSecurityConfiguration", json!({ "Name": name }))
            .await?;
        if !response.status.is_success() {
            return Err(api_error("DescribeSecurityConfiguration", &response, |message| {
                ConnectError::configuration(format!(
                    "unable to describe security configuration {}: {}",
                    name, message
                ))
            }));
        }
        parse_security_configuration(name, &response.body)
    }
}

/// Builds [`EmrClient`]s for the ambient or an assumed identity
pub struct EmrClientFactory {
    http: Arc<AwsHttpClient>,
    endpoint: Url,
    default_credentials: DefaultCredentialsProvider,
}

impl EmrClientFactory {
    pub fn new(http: Arc<AwsHttpClient>, endpoint: Url, default_credentials: DefaultCredentialsProvider) -> Self {
        Self {
            http,
            endpoint,
            default_credentials,
        }
    }
}

#[async_trait]
impl ClusterApiFactory for EmrClientFactory {
    async fn cluster_api(&self, credentials: Option<Credentials>) -> Result<Box<dyn ClusterApi>> {
        let credentials = match credentials {
            Some(credentials) => credentials,
            None => self.default_credentials.credentials().await?,
        };
        Ok(Box::new(EmrClient::new(self.http.clone(), self.endpoint.clone(), credentials)))
    }
}
