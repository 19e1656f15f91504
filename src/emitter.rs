//! Artifact generation
//!
//! Renders and writes the two files the notebook kernel consumes:
//! - the SparkMagic connection config (JSON), always
//! - the Kerberos realm configuration (krb5.conf), only for Kerberos clusters
//!
//! Rendering is deterministic so that identical inputs produce byte-identical
//! files. Each file is replaced atomically: content goes to a temporary file
//! in the destination directory which is then renamed over the target.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::classifier::{AuthMode, KdcLocation, KerberosSettings};
use crate::config::{OutputPaths, Settings};
use crate::endpoint::{kerberos_hostname, ResolvedEndpoint};
use crate::error::{ConnectError, Result};

/// User name SparkMagic submits Livy jobs as when none is given
pub const DEFAULT_LIVY_USER: &str = "livy";

const KDC_PORT: u16 = 88;
const KADMIN_PORT: u16 = 749;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct KernelCredentials {
    username: String,
    password: String,
    url: String,
    auth: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct SessionConfigs {
    kind: String,
    #[serde(rename = "driverMemory")]
    driver_memory: String,
    #[serde(rename = "executorCores")]
    executor_cores: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct KerberosAuthConfiguration {
    mutual_authentication: u8,
    service: &'static str,
    delegate: bool,
    force_preemptive: bool,
    principal: String,
    hostname_override: String,
    sanitize_mutual_error_response: bool,
    send_cbt: bool,
}

/// SparkMagic connection config
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ConnectionConfig {
    endpoint_url: String,
    auth: &'static str,
    session_configs: SessionConfigs,
    kernel_python_credentials: KernelCredentials,
    kernel_scala_credentials: KernelCredentials,
    custom_headers: BTreeMap<String, String>,
    ignore_ssl_errors: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kerberos_auth_configuration: Option<KerberosAuthConfiguration>,
}

/// Renders the SparkMagic connection config for an endpoint and auth mode
pub fn render_connection_config(
    settings: &Settings,
    endpoint: &ResolvedEndpoint,
    auth: &AuthMode,
    user_name: Option<&str>,
) -> Result<String> {
    let url = endpoint.url();
    let kernel_auth = match auth {
        AuthMode::None => "None",
        AuthMode::Kerberos(_) => "Kerberos",
    };
    let credentials = KernelCredentials {
        username: user_name.unwrap_or(DEFAULT_LIVY_USER).to_string(),
        password: String::new(),
        url: url.clone(),
        auth: kernel_auth,
    };

    let kerberos_auth_configuration = auth.is_kerberos().then(|| KerberosAuthConfiguration {
        mutual_authentication: 1,
        service: "HTTP",
        delegate: false,
        force_preemptive: true,
        principal: String::new(),
        hostname_override: kerberos_hostname(
            &endpoint.host,
            &settings.search_domain,
            &settings.default_search_domain(),
        ),
        sanitize_mutual_error_response: true,
        send_cbt: false,
    });

    let mut custom_headers = BTreeMap::new();
    custom_headers.insert("Content-Type".to_string(), settings.session.content_type.clone());

    let config = ConnectionConfig {
        endpoint_url: url,
        auth: auth.as_str(),
        session_configs: SessionConfigs {
            kind: settings.session.language.clone(),
            driver_memory: settings.session.driver_memory.clone(),
            executor_cores: settings.session.executor_cores,
        },
        kernel_python_credentials: credentials.clone(),
        kernel_scala_credentials: credentials,
        custom_headers,
        ignore_ssl_errors: true,
        kerberos_auth_configuration,
    };

    let mut rendered = serde_json::to_string_pretty(&config)
        .map_err(|e| ConnectError::service(format!("failed to serialize connection config: {}", e)))?;
    rendered.push('\n');
    Ok(rendered)
}

/// One `[realms]` entry of krb5.conf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmEntry {
    pub name: String,
    pub kdcs: Vec<String>,
    pub admin_server: String,
    pub default_domain: String,
}

/// In-memory form of krb5.conf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmConfig {
    pub default_realm: String,
    pub ticket_lifetime_hours: u32,
    pub realms: Vec<RealmEntry>,
    pub domain_realm: BTreeMap<String, String>,
}

impl RealmConfig {
    pub fn build(kerberos: &KerberosSettings, endpoint: &ResolvedEndpoint, search_domain: &str) -> Self {
        let (kdcs, default_admin) = match &kerberos.kdc {
            KdcLocation::Hosts(hosts) if !hosts.is_empty() => (hosts.clone(), hosts[0].clone()),
            _ => (
                vec![format!("{}:{}", endpoint.host, KDC_PORT)],
                format!("{}:{}", endpoint.host, KADMIN_PORT),
            ),
        };

        let mut realms = vec![RealmEntry {
            name: kerberos.realm.clone(),
            kdcs,
            admin_server: kerberos.admin_server.clone().unwrap_or(default_admin),
            default_domain: search_domain.to_string(),
        }];

        let mut domain_realm = BTreeMap::new();
        domain_realm.insert(search_domain.to_string(), kerberos.realm.clone());
        domain_realm.insert(format!(".{}", search_domain), kerberos.realm.clone());

        for trust in &kerberos.cross_realm_trusts {
            if !realms.iter().any(|entry| entry.name == trust.realm) {
                realms.push(RealmEntry {
                    name: trust.realm.clone(),
                    kdcs: vec![trust.kdc_server.clone()],
                    admin_server: trust.admin_server.clone(),
                    default_domain: trust.domain.clone(),
                });
            }
            domain_realm.insert(trust.domain.clone(), trust.realm.clone());
            domain_realm.insert(format!(".{}", trust.domain), trust.realm.clone());
        }

        Self {
            default_realm: kerberos.realm.clone(),
            ticket_lifetime_hours: kerberos.ticket_lifetime_hours,
            realms,
            domain_realm,
        }
    }

    pub fn realm(&self, name: &str) -> Option<&RealmEntry> {
        self.realms.iter().find(|entry| entry.name == name)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        // Writing to a String cannot fail
        let _ = writeln!(out, "[libdefaults]");
        let _ = writeln!(out, "  default_realm = {}", self.default_realm);
        let _ = writeln!(out, "  ticket_lifetime = {}h", self.ticket_lifetime_hours);
        let _ = writeln!(out);

        let _ = writeln!(out, "[realms]");
        for realm in &self.realms {
            let _ = writeln!(out, "  {} = {{", realm.name);
            for kdc in &realm.kdcs {
                let _ = writeln!(out, "    kdc = {}", kdc);
            }
            let _ = writeln!(out, "    admin_server = {}", realm.admin_server);
            let _ = writeln!(out, "    default_domain = {}", realm.default_domain);
            let _ = writeln!(out, "  }}");
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "[domain_realm]");
        for (domain, realm) in &self.domain_realm {
            let _ = writeln!(out, "  {} = {}", domain, realm);
        }

        out
    }
}

/// Paths written by one emit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    pub config_path: PathBuf,
    pub realm_config_path: Option<PathBuf>,
}

impl Emitted {
    pub fn paths(&self) -> Vec<&Path> {
        std::iter::once(self.config_path.as_path())
            .chain(self.realm_config_path.as_deref())
            .collect()
    }
}

pub struct ConfigEmitter<'a> {
    settings: &'a Settings,
    paths: &'a OutputPaths,
}

impl<'a> ConfigEmitter<'a> {
    pub fn new(settings: &'a Settings, paths: &'a OutputPaths) -> Self {
        Self { settings, paths }
    }

    /// Writes the connection config and, for Kerberos, the realm config
    pub fn emit(&self, endpoint: &ResolvedEndpoint, auth: &AuthMode, user_name: Option<&str>) -> Result<Emitted> {
        // Render everything before touching the filesystem
        let config = render_connection_config(self.settings, endpoint, auth, user_name)?;
        let realm_config = match auth {
            AuthMode::Kerberos(kerberos) => {
                Some(RealmConfig::build(kerberos, endpoint, &self.settings.search_domain).render())
            }
            AuthMode::None => None,
        };

        // Stage both files first so a failure leaves neither destination touched
        let staged_config = StagedFile::stage(&self.paths.config_path, config.as_bytes())?;
        let staged_realm = match &realm_config {
            Some(contents) => Some(StagedFile::stage(&self.paths.realm_config_path, contents.as_bytes())?),
            None => None,
        };

        let realm_config_path = match staged_realm {
            Some(staged) => {
                let previous = read_existing(&self.paths.realm_config_path)?;
                staged.commit()?;
                if let Err(e) = staged_config.commit() {
                    restore(&self.paths.realm_config_path, previous);
                    return Err(e);
                }
                info!(
                    "Kerberos configuration file location: {}",
                    self.paths.realm_config_path.display()
                );
                Some(self.paths.realm_config_path.clone())
            }
            None => {
                staged_config.commit()?;
                None
            }
        };

        info!("SparkMagic config file location: {}", self.paths.config_path.display());

        Ok(Emitted {
            config_path: self.paths.config_path.clone(),
            realm_config_path,
        })
    }
}

/// Replaces `path` with `contents` via a temporary file and rename
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    StagedFile::stage(path, contents)?.commit()
}

/// Fully written temporary file next to its destination, not yet renamed
/// into place. Dropping it removes the temporary file.
struct StagedFile<'a> {
    path: &'a Path,
    file: NamedTempFile,
    len: usize,
}

impl<'a> StagedFile<'a> {
    fn stage(path: &'a Path, contents: &[u8]) -> Result<Self> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        fs::create_dir_all(dir).map_err(|e| ConnectError::write(path, e))?;

        let mut file = NamedTempFile::new_in(dir).map_err(|e| ConnectError::write(path, e))?;
        file.write_all(contents).map_err(|e| ConnectError::write(path, e))?;
        file.as_file().sync_all().map_err(|e| ConnectError::write(path, e))?;

        // Both artifacts are read by other processes; temp files start out 0600
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(file.path(), fs::Permissions::from_mode(0o644))
                .map_err(|e| ConnectError::write(path, e))?;
        }

        Ok(StagedFile {
            path,
            file,
            len: contents.len(),
        })
    }

    fn commit(self) -> Result<()> {
        let path = self.path;
        self.file.persist(path).map_err(|e| ConnectError::write(path, e.error))?;
        debug!("Wrote {} bytes to {}", self.len, path.display());
        Ok(())
    }
}

/// Current contents of `path`, `None` when it does not exist yet
fn read_existing(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConnectError::write(path, e)),
    }
}

/// Puts `path` back the way it was before a partially applied emit
fn restore(path: &Path, previous: Option<Vec<u8>>) {
    let result = match previous {
        Some(contents) => write_atomic(path, &contents),
        None => fs::remove_file(path).map_err(|e| ConnectError::write(path, e)),
    };
    match result {
        Ok(()) => debug!("Restored {}", path.display()),
        Err(e) => warn!("Could not restore {}: {}", path.display(), e),
    }
}
