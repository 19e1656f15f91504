//! Security mode classification
//!
//! Turns the (optional) security configuration of a cluster into an
//! [`AuthMode`]. A cluster uses Kerberos if and only if its security
//! configuration carries a non-empty Kerberos section. A present but
//! incomplete section is reported as [`ConnectError::Configuration`]; it never
//! degrades to [`AuthMode::None`].

use tracing::debug;

use crate::descriptor::{AdIntegration, CrossRealmTrust, KdcProvider, KerberosSection, SecurityConfiguration};
use crate::error::{ConnectError, Result};

pub const DEFAULT_TICKET_LIFETIME_HOURS: u32 = 24;

/// Where the realm's KDC lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KdcLocation {
    /// Cluster-dedicated KDC on the primary node; the host is only known after
    /// endpoint resolution
    PrimaryNode,
    Hosts(Vec<String>),
}

/// A realm trusted by the cluster realm, rendered alongside it in krb5.conf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedRealm {
    pub realm: String,
    pub domain: String,
    pub kdc_server: String,
    pub admin_server: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KerberosSettings {
    pub realm: String,
    pub kdc: KdcLocation,
    /// Explicit admin server; `None` falls back to the KDC host
    pub admin_server: Option<String>,
    pub ticket_lifetime_hours: u32,
    pub cross_realm_trusts: Vec<TrustedRealm>,
    /// Realm users authenticate against when it differs from the cluster realm
    pub principal_realm: Option<String>,
}

impl KerberosSettings {
    /// Principal to pass to `kinit` for the given user
    pub fn principal_for(&self, user: &str) -> String {
        match &self.principal_realm {
            Some(realm) => format!("{}@{}", user, realm),
            None => user.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Kerberos(KerberosSettings),
}

impl AuthMode {
    pub fn is_kerberos(&self) -> bool {
        matches!(self, AuthMode::Kerberos(_))
    }

    /// Value of the `auth` key in the connection config
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::None => "none",
            AuthMode::Kerberos(_) => "kerberos",
        }
    }
}

/// Classifies a cluster's authentication mode from its security configuration
pub fn classify(security: Option<&SecurityConfiguration>) -> Result<AuthMode> {
    let section = match security.and_then(|config| config.kerberos.as_ref()) {
        Some(section) if !section.is_empty() => section,
        _ => {
            debug!("No Kerberos section found, cluster does not require ticket authentication");
            return Ok(AuthMode::None);
        }
    };

    check_provider(&section.provider)?;
    let realm = required(&section.realm, "Kerberos realm")?;
    let kdc = kdc_location(section)?;

    let mut cross_realm_trusts = section
        .cross_realm_trusts
        .iter()
        .map(trusted_realm)
        .collect::<Result<Vec<_>>>()?;

    let principal_realm = match &section.ad_integration {
        Some(ad) => {
            let trust = ad_realm(ad)?;
            let realm = trust.realm.clone();
            cross_realm_trusts.push(trust);
            Some(realm)
        }
        None => None,
    };

    Ok(AuthMode::Kerberos(KerberosSettings {
        realm,
        kdc,
        admin_server: optional(&section.admin_server),
        ticket_lifetime_hours: section
            .ticket_lifetime_hours
            .unwrap_or(DEFAULT_TICKET_LIFETIME_HOURS),
        cross_realm_trusts,
        principal_realm,
    }))
}

fn kdc_location(section: &KerberosSection) -> Result<KdcLocation> {
    let hosts: Vec<String> = section
        .kdc_hosts
        .iter()
        .map(|host| host.trim())
        .filter(|host| !host.is_empty())
        .map(String::from)
        .collect();

    if !hosts.is_empty() {
        return Ok(KdcLocation::Hosts(hosts));
    }

    match section.provider {
        Some(KdcProvider::ClusterDedicatedKdc) => Ok(KdcLocation::PrimaryNode),
        _ => Err(ConnectError::configuration(
            "external KDC configuration does not name a KDC server",
        )),
    }
}

fn check_provider(provider: &Option<KdcProvider>) -> Result<()> {
    match provider {
        Some(KdcProvider::ClusterDedicatedKdc) | Some(KdcProvider::ExternalKdc) => Ok(()),
        Some(KdcProvider::Other(name)) => Err(ConnectError::configuration(format!(
            "unsupported Kerberos KDC provider {:?}",
            name
        ))),
        None => Err(ConnectError::configuration(
            "cluster is configured for Kerberos but its KDC provider is missing",
        )),
    }
}

fn trusted_realm(trust: &CrossRealmTrust) -> Result<TrustedRealm> {
    let kdc_server = required(&trust.kdc_server, "cross-realm trust KDC server")?;
    Ok(TrustedRealm {
        realm: required(&trust.realm, "cross-realm trust realm")?,
        domain: required(&trust.domain, "cross-realm trust domain")?,
        admin_server: optional(&trust.admin_server).unwrap_or_else(|| kdc_server.clone()),
        kdc_server,
    })
}

fn ad_realm(ad: &AdIntegration) -> Result<TrustedRealm> {
    let domain = required(&ad.domain, "Active Directory domain")?;
    // AdServer is optional; the AD domain itself resolves to a domain controller
    let server = optional(&ad.server).unwrap_or_else(|| domain.clone());
    Ok(TrustedRealm {
        realm: required(&ad.realm, "Active Directory realm")?,
        domain,
        kdc_server: server.clone(),
        admin_server: server,
    })
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn required(value: &Option<String>, what: &str) -> Result<String> {
    optional(value).ok_or_else(|| {
        ConnectError::configuration(format!(
            "cluster is configured for Kerberos but its {} is missing",
            what
        ))
    })
}
