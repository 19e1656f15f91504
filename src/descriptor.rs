//! Cluster descriptor client
//!
//! Reads everything the pipeline needs to know about a cluster through a
//! narrow, typed collaborator interface:
//! - the cluster summary (`describe_cluster`)
//! - the complete instance list, paged until exhausted (`list_instances`)
//! - the referenced security configuration, if any
//!   (`describe_security_configuration`)
//!
//! Cross-account access is handled by exchanging a role ARN for temporary
//! credentials before the first cluster call. The credentials are moved into
//! the API handle built for this fetch and dropped with it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aws::Credentials;
use crate::error::{ConnectError, Result};

/// Node type of an instance within the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceRole {
    Master,
    Core,
    Task,
}

impl InstanceRole {
    pub const ALL: [InstanceRole; 3] = [InstanceRole::Master, InstanceRole::Core, InstanceRole::Task];

    /// Value used by the EMR API for instance group and fleet types
    pub fn as_api_str(&self) -> &'static str {
        match self {
            InstanceRole::Master => "MASTER",
            InstanceRole::Core => "CORE",
            InstanceRole::Task => "TASK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    AwaitingFulfillment,
    Provisioning,
    Bootstrapping,
    Running,
    Terminated,
    Unknown(String),
}

impl InstanceState {
    pub fn from_api(state: &str) -> Self {
        match state {
            "AWAITING_FULFILLMENT" => InstanceState::AwaitingFulfillment,
            "PROVISIONING" => InstanceState::Provisioning,
            "BOOTSTRAPPING" => InstanceState::Bootstrapping,
            "RUNNING" => InstanceState::Running,
            "TERMINATED" => InstanceState::Terminated,
            other => InstanceState::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub role: InstanceRole,
    /// Public DNS name, or public IP when no DNS name is recorded
    pub public_address: Option<String>,
    /// Private DNS name, or private IP when no DNS name is recorded
    pub private_address: Option<String>,
    pub state: InstanceState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterState {
    Starting,
    Bootstrapping,
    Running,
    Waiting,
    Terminating,
    Terminated,
    TerminatedWithErrors,
    Unknown(String),
}

impl ClusterState {
    pub fn from_api(state: &str) -> Self {
        match state {
            "STARTING" => ClusterState::Starting,
            "BOOTSTRAPPING" => ClusterState::Bootstrapping,
            "RUNNING" => ClusterState::Running,
            "WAITING" => ClusterState::Waiting,
            "TERMINATING" => ClusterState::Terminating,
            "TERMINATED" => ClusterState::Terminated,
            "TERMINATED_WITH_ERRORS" => ClusterState::TerminatedWithErrors,
            other => ClusterState::Unknown(other.to_string()),
        }
    }

    /// True when the cluster can accept Livy sessions
    pub fn is_active(&self) -> bool {
        matches!(self, ClusterState::Running | ClusterState::Waiting)
    }
}

/// How the cluster provisions its nodes; decides how instances are filtered by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InstanceCollectionType {
    #[default]
    InstanceGroup,
    InstanceFleet,
}

/// Result of `describe_cluster`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSummary {
    pub id: String,
    pub name: Option<String>,
    pub status: ClusterState,
    /// Name of the security configuration attached to the cluster
    pub security_configuration: Option<String>,
    /// Realm from the cluster's Kerberos attributes
    pub kerberos_realm: Option<String>,
    pub collection_type: InstanceCollectionType,
}

/// One page of `list_instances`
#[derive(Debug, Clone, Default)]
pub struct InstancePage {
    pub instances: Vec<Instance>,
    /// Pagination token for the next page; `None` once exhausted
    pub marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdcProvider {
    /// KDC runs on the cluster's primary node
    ClusterDedicatedKdc,
    ExternalKdc,
    /// Provider name this version does not know how to configure
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossRealmTrust {
    pub realm: Option<String>,
    pub domain: Option<String>,
    pub kdc_server: Option<String>,
    pub admin_server: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdIntegration {
    pub realm: Option<String>,
    pub domain: Option<String>,
    pub server: Option<String>,
}

/// Authentication parameters of a security configuration.
///
/// Every field is optional here; completeness is judged by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KerberosSection {
    pub provider: Option<KdcProvider>,
    pub realm: Option<String>,
    pub kdc_hosts: Vec<String>,
    pub admin_server: Option<String>,
    pub ticket_lifetime_hours: Option<u32>,
    pub cross_realm_trusts: Vec<CrossRealmTrust>,
    pub ad_integration: Option<AdIntegration>,
}

impl KerberosSection {
    pub fn is_empty(&self) -> bool {
        self == &KerberosSection::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfiguration {
    pub kerberos: Option<KerberosSection>,
}

/// Everything known about one cluster for the duration of a connect operation
#[derive(Debug, Clone)]
pub struct ClusterDescriptor {
    pub id: String,
    pub name: Option<String>,
    pub status: ClusterState,
    pub instances: Vec<Instance>,
    pub security_configuration_name: Option<String>,
    pub security_configuration: Option<SecurityConfiguration>,
}

/// Typed view of the cluster-management API
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterSummary>;

    async fn list_instances(
        &self,
        cluster: &ClusterSummary,
        role: InstanceRole,
        marker: Option<&str>,
    ) -> Result<InstancePage>;

    async fn describe_security_configuration(&self, name: &str) -> Result<SecurityConfiguration>;
}

/// Exchanges a role ARN for temporary credentials
#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn assume_role(&self, role_arn: &str) -> Result<Credentials>;
}

/// Builds a [`ClusterApi`] bound to an identity.
///
/// `None` means the ambient identity of the process.
#[async_trait]
pub trait ClusterApiFactory: Send + Sync {
    async fn cluster_api(&self, credentials: Option<Credentials>) -> Result<Box<dyn ClusterApi>>;
}

pub struct DescriptorClient {
    apis: Arc<dyn ClusterApiFactory>,
    identity: Arc<dyn IdentityApi>,
}

impl DescriptorClient {
    pub fn new(apis: Arc<dyn ClusterApiFactory>, identity: Arc<dyn IdentityApi>) -> Self {
        Self { apis, identity }
    }

    /// Fetches the cluster summary, all instances and the security configuration
    pub async fn fetch(&self, cluster_id: &str, role_arn: Option<&str>) -> Result<ClusterDescriptor> {
        let credentials = match role_arn {
            Some(arn) => {
                info!("Assuming role: {}", arn);
                Some(self.identity.assume_role(arn).await?)
            }
            None => None,
        };

        let api = self.apis.cluster_api(credentials).await?;

        let summary = api.describe_cluster(cluster_id).await?;
        debug!("Describe cluster result: {:?}", summary);
        if !summary.status.is_active() {
            warn!("Cluster {} is in state {:?}; Livy may be unreachable", cluster_id, summary.status);
        }

        let instances = list_all_instances(api.as_ref(), &summary).await?;
        debug!("Listed {} instances for cluster {}", instances.len(), cluster_id);

        let security_configuration = match &summary.security_configuration {
            Some(name) => {
                let mut config = api.describe_security_configuration(name).await?;
                debug!("Security configuration {}: {:?}", name, config);
                if let Some(section) = config.kerberos.as_mut() {
                    if section.realm.is_none() {
                        section.realm = summary.kerberos_realm.clone();
                    }
                }
                Some(config)
            }
            None => {
                debug!("Cluster {} has no security configuration attached", cluster_id);
                None
            }
        };

        info!("Successfully read EMR cluster({}) details", cluster_id);

        Ok(ClusterDescriptor {
            id: summary.id,
            name: summary.name,
            status: summary.status,
            instances,
            security_configuration_name: summary.security_configuration,
            security_configuration,
        })
    }
}

/// Pages through `list_instances` for every role until each marker is exhausted
async fn list_all_instances(api: &dyn ClusterApi, cluster: &ClusterSummary) -> Result<Vec<Instance>> {
    let mut instances = Vec::new();

    for role in InstanceRole::ALL {
        let mut marker: Option<String> = None;
        loop {
            let page = api.list_instances(cluster, role, marker.as_deref()).await?;
            instances.extend(page.instances);

            match page.marker {
                Some(next) if marker.as_deref() == Some(next.as_str()) => {
                    return Err(ConnectError::service(format!(
                        "list-instances returned the same pagination marker twice for cluster {}",
                        cluster.id
                    )));
                }
                Some(next) => marker = Some(next),
                None => break,
            }
        }
    }

    Ok(instances)
}
