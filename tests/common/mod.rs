#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use emrlink::aws::Credentials;
use emrlink::config::{OutputPaths, Settings};
use emrlink::descriptor::{
    ClusterApi, ClusterApiFactory, ClusterState, ClusterSummary, IdentityApi, Instance, InstanceCollectionType,
    InstancePage, InstanceRole, InstanceState, KdcProvider, KerberosSection, SecurityConfiguration,
};
use emrlink::error::{ConnectError, Result};
use emrlink::Connector;

/// In-memory cluster-management API
pub struct FakeCluster {
    pub summary: ClusterSummary,
    pub pages: HashMap<InstanceRole, Vec<InstancePage>>,
    pub security: Option<SecurityConfiguration>,
    pub fail_describe: bool,
    pub deny_role: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new(cluster_id: &str) -> Self {
        Self {
            summary: ClusterSummary {
                id: cluster_id.to_string(),
                name: Some("Mycluster".to_string()),
                status: ClusterState::Waiting,
                security_configuration: None,
                kerberos_realm: None,
                collection_type: InstanceCollectionType::InstanceGroup,
            },
            pages: HashMap::new(),
            security: None,
            fail_describe: false,
            deny_role: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_instances(mut self, instances: Vec<Instance>) -> Self {
        for instance in instances {
            let pages = self.pages.entry(instance.role).or_default();
            if pages.is_empty() {
                pages.push(InstancePage::default());
            }
            pages[0].instances.push(instance);
        }
        self
    }

    pub fn with_pages(mut self, role: InstanceRole, pages: Vec<InstancePage>) -> Self {
        self.pages.insert(role, pages);
        self
    }

    pub fn with_security(mut self, name: &str, security: SecurityConfiguration) -> Self {
        self.summary.security_configuration = Some(name.to_string());
        self.security = Some(security);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

struct FakeApi {
    cluster: Arc<FakeCluster>,
    identity: String,
}

#[async_trait]
impl ClusterApi for FakeApi {
    async fn describe_cluster(&self, cluster_id: &str) -> Result<ClusterSummary> {
        self.cluster
            .record(format!("describe_cluster({}) as {}", cluster_id, self.identity));
        if self.cluster.fail_describe || cluster_id != self.cluster.summary.id {
            return Err(ConnectError::ClusterNotFound {
                cluster_id: cluster_id.to_string(),
                message: "Cluster id is not valid.".to_string(),
            });
        }
        Ok(self.cluster.summary.clone())
    }

    async fn list_instances(
        &self,
        cluster: &ClusterSummary,
        role: InstanceRole,
        marker: Option<&str>,
    ) -> Result<InstancePage> {
        self.cluster.record(format!(
            "list_instances({}, {}, {}) as {}",
            cluster.id,
            role.as_api_str(),
            marker.unwrap_or("-"),
            self.identity
        ));
        let pages = match self.cluster.pages.get(&role) {
            Some(pages) => pages,
            None => return Ok(InstancePage::default()),
        };
        let index = match marker {
            None => 0,
            Some(m) => m.trim_start_matches("page-").parse::<usize>().unwrap(),
        };
        Ok(pages[index].clone())
    }

    async fn describe_security_configuration(&self, name: &str) -> Result<SecurityConfiguration> {
        self.cluster
            .record(format!("describe_security_configuration({}) as {}", name, self.identity));
        Ok(self.cluster.security.clone().unwrap_or_default())
    }
}

/// Shared handle standing in for both the API factory and the identity service
#[derive(Clone)]
pub struct FakeHandle(pub Arc<FakeCluster>);

#[async_trait]
impl ClusterApiFactory for FakeHandle {
    async fn cluster_api(&self, credentials: Option<Credentials>) -> Result<Box<dyn ClusterApi>> {
        let identity = credentials
            .map(|c| c.access_key_id)
            .unwrap_or_else(|| "default".to_string());
        Ok(Box::new(FakeApi {
            cluster: self.0.clone(),
            identity,
        }))
    }
}

#[async_trait]
impl IdentityApi for FakeHandle {
    async fn assume_role(&self, role_arn: &str) -> Result<Credentials> {
        self.0.record(format!("assume_role({})", role_arn));
        if self.0.deny_role {
            return Err(ConnectError::RoleAssumption {
                role_arn: role_arn.to_string(),
                message: "AccessDenied: not authorized to perform sts:AssumeRole".to_string(),
            });
        }
        Ok(Credentials::new("ASSUMED", "secret").with_session_token("token"))
    }
}

pub fn instance(id: &str, role: InstanceRole, private: Option<&str>, public: Option<&str>) -> Instance {
    Instance {
        id: id.to_string(),
        role,
        public_address: public.map(String::from),
        private_address: private.map(String::from),
        state: InstanceState::Running,
    }
}

pub fn master(private: &str) -> Instance {
    instance("i-master", InstanceRole::Master, Some(private), None)
}

pub fn core_node(id: &str, private: &str) -> Instance {
    instance(id, InstanceRole::Core, Some(private), None)
}

/// Kerberos section with an explicit realm and KDC host
pub fn kerberos(realm: &str, kdc: &str) -> SecurityConfiguration {
    SecurityConfiguration {
        kerberos: Some(KerberosSection {
            provider: Some(KdcProvider::ClusterDedicatedKdc),
            realm: Some(realm.to_string()),
            kdc_hosts: vec![kdc.to_string()],
            ..KerberosSection::default()
        }),
    }
}

pub fn settings_in(dir: &Path) -> Settings {
    let mut settings = Settings::for_region("us-west-2");
    settings.outputs = OutputPaths {
        config_path: dir.join("sparkmagic").join("config.json"),
        realm_config_path: dir.join("krb5.conf"),
    };
    settings
}

pub fn connector(cluster: &Arc<FakeCluster>, settings: Settings) -> Connector {
    let handle = FakeHandle(cluster.clone());
    Connector::new(settings, Arc::new(handle.clone()), Arc::new(handle))
}
