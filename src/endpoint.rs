//! Livy endpoint resolution
//!
//! The Livy server runs on the cluster's primary node. A cluster must have
//! exactly one non-terminated master instance; anything else is
//! [`ConnectError::NoMasterFound`]. The private address is preferred since
//! notebooks run inside the cluster's network; the public address is used
//! only when no private one is recorded.

use std::net::IpAddr;

use tracing::debug;

use crate::descriptor::{Instance, InstanceRole, InstanceState};
use crate::error::{ConnectError, Result};

/// Port the Livy REST server listens on
pub const LIVY_PORT: u16 = 8998;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub host: String,
    pub port: u16,
}

impl ResolvedEndpoint {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Picks the master instance's address
pub fn resolve(cluster_id: &str, instances: &[Instance]) -> Result<ResolvedEndpoint> {
    let masters: Vec<&Instance> = instances
        .iter()
        .filter(|instance| instance.role == InstanceRole::Master)
        .filter(|instance| instance.state != InstanceState::Terminated)
        .collect();

    let master = match masters.as_slice() {
        [master] => *master,
        other => {
            return Err(ConnectError::NoMasterFound {
                cluster_id: cluster_id.to_string(),
                found: other.len(),
            })
        }
    };

    let host = non_empty(&master.private_address)
        .or_else(|| non_empty(&master.public_address))
        .ok_or_else(|| ConnectError::NoMasterFound {
            cluster_id: cluster_id.to_string(),
            found: 0,
        })?;

    debug!("Resolved primary node {} to {}", master.id, host);

    Ok(ResolvedEndpoint {
        host: host.to_string(),
        port: LIVY_PORT,
    })
}

/// Hostname used for the Kerberos GSS exchange with Livy.
///
/// The notebook host is not registered in the cluster's DNS, so when the
/// environment's search domain differs from the region default the primary
/// node's short name is re-qualified with the search domain.
pub fn kerberos_hostname(host: &str, search_domain: &str, default_search_domain: &str) -> String {
    if search_domain == default_search_domain || host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }

    match host.split_once('.') {
        Some((short_name, _)) => format!("{}.{}", short_name, search_domain),
        None => host.to_string(),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
