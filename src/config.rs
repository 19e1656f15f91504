//! Runtime settings
//!
//! Everything the pipeline needs that does not come from the cluster itself:
//! region and service endpoints, request timeout, the environment's DNS search
//! domain, Livy session defaults, and where the two artifacts are written.
//! Settings are assembled once in `main` and passed explicitly to the
//! [`Connector`](crate::connector::Connector); nothing here is global.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sparkmagic/config.json";
pub const DEFAULT_REALM_CONFIG_PATH: &str = "/etc/krb5.conf";
pub const RESOLV_CONF_PATH: &str = "/etc/resolv.conf";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Destination of the two generated artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// SparkMagic connection config (JSON)
    pub config_path: PathBuf,
    /// Kerberos realm configuration (krb5.conf)
    pub realm_config_path: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            realm_config_path: PathBuf::from(DEFAULT_REALM_CONFIG_PATH),
        }
    }
}

/// Livy session defaults embedded in the connection config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Livy session kind
    pub language: String,
    pub content_type: String,
    pub driver_memory: String,
    pub executor_cores: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            language: "pyspark".to_string(),
            content_type: "application/json".to_string(),
            driver_memory: "1000M".to_string(),
            executor_cores: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub region: String,
    pub emr_endpoint: String,
    pub sts_endpoint: String,
    pub timeout: Duration,
    /// First `search` domain of the environment's resolver configuration
    pub search_domain: String,
    pub outputs: OutputPaths,
    pub session: SessionSettings,
}

impl Settings {
    /// Settings with regional endpoints and defaults everywhere else.
    ///
    /// The search domain starts out as the region default; use
    /// [`Settings::with_search_domain_from`] to read the real one.
    pub fn for_region(region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            emr_endpoint: emr_endpoint(&region),
            sts_endpoint: sts_endpoint(&region),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            search_domain: default_search_domain(&region),
            outputs: OutputPaths::default(),
            session: SessionSettings::default(),
            region,
        }
    }

    pub fn with_search_domain_from(mut self, resolv_conf: &Path) -> Self {
        if let Some(search) = read_search_domain(resolv_conf) {
            self.search_domain = search;
        }
        self
    }

    pub fn default_search_domain(&self) -> String {
        default_search_domain(&self.region)
    }
}

/// EMR endpoint for a region, built explicitly so private-link setups without
/// internet access resolve the regional name
pub fn emr_endpoint(region: &str) -> String {
    format!("https://elasticmapreduce.{}.{}", region, dns_suffix(region))
}

pub fn sts_endpoint(region: &str) -> String {
    format!("https://sts.{}.{}", region, dns_suffix(region))
}

fn dns_suffix(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    }
}

/// Search domain assumed for a region when resolv.conf names none
pub fn default_search_domain(region: &str) -> String {
    format!("{}.compute.internal", region)
}

/// Extracts the first `search` domain from resolv.conf contents
pub fn parse_search_domain(contents: &str) -> Option<String> {
    contents
        .lines()
        .map(|line| line.split(['#', ';']).next().unwrap_or_default())
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("search") => tokens.next().map(|domain| domain.trim_end_matches('.').to_string()),
                _ => None,
            }
        })
        .next()
}

fn read_search_domain(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let search = parse_search_domain(&contents);
            debug!("Search domain from {}: {:?}", path.display(), search);
            search
        }
        Err(e) => {
            warn!(
                "Unable to read {} ({}), using the region default search domain",
                path.display(),
                e
            );
            None
        }
    }
}
