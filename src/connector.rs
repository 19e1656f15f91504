//! Connection orchestration
//!
//! The [`Connector`] runs one connect operation through four stages:
//! fetching the cluster descriptor, classifying its security mode, resolving
//! the Livy endpoint, and emitting the configuration files. Stages run in
//! order with no retries; the first error stops the run and is returned with
//! the stage that raised it.
//!
//! A `Connector` holds no per-connection state. Output locations and other
//! settings are passed in at construction, so the same instance can serve any
//! number of independent `connect` calls.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::aws::{AwsHttpClient, DefaultCredentialsProvider, EmrClientFactory, StsClient};
use crate::classifier::{classify, AuthMode};
use crate::config::{OutputPaths, Settings};
use crate::descriptor::{ClusterApiFactory, DescriptorClient, IdentityApi};
use crate::emitter::ConfigEmitter;
use crate::endpoint;
use crate::error::{ConnectError, Stage, StageFailure};
use crate::validation::{validate_cluster_id, validate_role_arn, validate_user_name};

/// Placeholder principal shown when no user name was given
pub const USER_PLACEHOLDER: &str = "$user";

/// Per-request replacements for the configured artifact paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputPathOverrides {
    pub config_path: Option<PathBuf>,
    pub realm_config_path: Option<PathBuf>,
}

/// Input of one connect operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub cluster_id: String,
    /// User submitting Livy jobs; also the Kerberos principal on Kerberos clusters
    pub user_name: Option<String>,
    /// Role to assume before describing the cluster (cross-account access)
    pub role_arn: Option<String>,
    pub output_paths: OutputPathOverrides,
    /// The caller restarts the kernel itself, so no restart step is listed
    pub restart_kernel: bool,
    /// Write a plain (non-Kerberos) connection config even for Kerberos clusters
    pub skip_kerberos: bool,
}

impl ConnectionRequest {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            ..Self::default()
        }
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn with_role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }

    pub fn with_output_paths(mut self, overrides: OutputPathOverrides) -> Self {
        self.output_paths = overrides;
        self
    }
}

/// Outcome of a successful connect operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub cluster_id: String,
    /// Auth mode written to the connection config (`none` or `kerberos`)
    pub auth: String,
    pub config_path: PathBuf,
    pub realm_config_path: Option<PathBuf>,
    /// Steps the user still has to perform, in order
    pub instructions: Vec<String>,
    /// The caller asked to restart the kernel itself
    pub restart_requested: bool,
}

impl ConnectionReport {
    /// Human-readable summary for the terminal
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Successfully read EMR cluster({}) details", self.cluster_id);
        let _ = writeln!(out, "SparkMagic config file location: {}", self.config_path.display());
        if let Some(path) = &self.realm_config_path {
            let _ = writeln!(out, "Kerberos configuration file location: {}", path.display());
        }
        if !self.instructions.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "To complete the setup, follow these steps:");
            for (i, step) in self.instructions.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, step);
            }
        }
        if self.restart_requested {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "The kernel was not restarted. Restart it from your notebook so SparkMagic picks up the new configuration"
            );
        }
        out
    }
}

pub type ConnectionResult = std::result::Result<ConnectionReport, StageFailure>;

fn at(stage: Stage) -> impl FnOnce(ConnectError) -> StageFailure {
    move |error| StageFailure::new(stage, error)
}

/// Orchestrates fetch → classify → resolve → emit for one cluster at a time
///
/// # Examples
///
/// ```no_run
/// use emrlink::config::Settings;
/// use emrlink::connector::{ConnectionRequest, Connector};
///
/// # async fn example() -> anyhow::Result<()> {
/// let connector = Connector::from_settings(Settings::for_region("us-west-2"))?;
/// let request = ConnectionRequest::new("j-3DD9ZR01DAU14").with_user_name("ec2-user");
///
/// match connector.connect(&request).await {
///     Ok(report) => print!("{}", report.render()),
///     Err(failure) => eprintln!("{}", failure),
/// }
/// # Ok(())
/// # }
/// ```
pub struct Connector {
    descriptors: DescriptorClient,
    settings: Settings,
}

impl Connector {
    pub fn new(settings: Settings, apis: Arc<dyn ClusterApiFactory>, identity: Arc<dyn IdentityApi>) -> Self {
        Self {
            descriptors: DescriptorClient::new(apis, identity),
            settings,
        }
    }

    /// Creates a connector backed by the real EMR and STS endpoints in `settings`
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let http = Arc::new(AwsHttpClient::new(settings.timeout, settings.region.clone())?);
        let credentials = DefaultCredentialsProvider::new(settings.timeout)?;

        let emr_endpoint = Url::parse(&settings.emr_endpoint)
            .with_context(|| format!("Invalid EMR endpoint: {}", settings.emr_endpoint))?;
        let sts_endpoint = Url::parse(&settings.sts_endpoint)
            .with_context(|| format!("Invalid STS endpoint: {}", settings.sts_endpoint))?;

        let apis = Arc::new(EmrClientFactory::new(http.clone(), emr_endpoint, credentials.clone()));
        let identity = Arc::new(StsClient::new(http, sts_endpoint, credentials));

        Ok(Self::new(settings, apis, identity))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Generates the configuration needed to connect to one EMR cluster
    pub async fn connect(&self, request: &ConnectionRequest) -> ConnectionResult {
        validate(request).map_err(at(Stage::Fetching))?;

        debug!("Stage: {}", Stage::Fetching);
        let descriptor = self
            .descriptors
            .fetch(&request.cluster_id, request.role_arn.as_deref())
            .await
            .map_err(at(Stage::Fetching))?;

        debug!("Stage: {}", Stage::Classifying);
        let auth = classify(descriptor.security_configuration.as_ref()).map_err(at(Stage::Classifying))?;
        info!("Cluster {} auth mode: {}", descriptor.id, auth.as_str());

        debug!("Stage: {}", Stage::Resolving);
        let endpoint = endpoint::resolve(&descriptor.id, &descriptor.instances).map_err(at(Stage::Resolving))?;
        info!("Livy endpoint: {}", endpoint.url());

        debug!("Stage: {}", Stage::Emitting);
        let plain = AuthMode::None;
        let emitted_auth = if request.skip_kerberos { &plain } else { &auth };
        let paths = self.output_paths(request);
        let emitted = ConfigEmitter::new(&self.settings, &paths)
            .emit(&endpoint, emitted_auth, request.user_name.as_deref())
            .map_err(at(Stage::Emitting))?;

        info!(
            "Completed setting up configuration files for SparkMagic to connect to EMR cluster {}",
            descriptor.id
        );

        Ok(ConnectionReport {
            cluster_id: descriptor.id,
            auth: emitted_auth.as_str().to_string(),
            config_path: emitted.config_path,
            realm_config_path: emitted.realm_config_path,
            instructions: instructions(&auth, request),
            restart_requested: request.restart_kernel,
        })
    }

    fn output_paths(&self, request: &ConnectionRequest) -> OutputPaths {
        let defaults = &self.settings.outputs;
        OutputPaths {
            config_path: request
                .output_paths
                .config_path
                .clone()
                .unwrap_or_else(|| defaults.config_path.clone()),
            realm_config_path: request
                .output_paths
                .realm_config_path
                .clone()
                .unwrap_or_else(|| defaults.realm_config_path.clone()),
        }
    }
}

fn validate(request: &ConnectionRequest) -> Result<(), ConnectError> {
    validate_cluster_id(&request.cluster_id).map_err(ConnectError::InvalidRequest)?;
    if let Some(role_arn) = &request.role_arn {
        validate_role_arn(role_arn).map_err(ConnectError::InvalidRequest)?;
    }
    if let Some(user_name) = &request.user_name {
        validate_user_name(user_name).map_err(ConnectError::InvalidRequest)?;
    }
    Ok(())
}

/// Steps left to the user once the files are written
fn instructions(auth: &AuthMode, request: &ConnectionRequest) -> Vec<String> {
    let mut steps = Vec::new();

    if let AuthMode::Kerberos(kerberos) = auth {
        let user = request.user_name.as_deref().unwrap_or(USER_PLACEHOLDER);
        steps.push(format!(
            "Open the image terminal and run 'kinit {}' to get a Kerberos ticket",
            kerberos.principal_for(user)
        ));
    }

    if !request.restart_kernel {
        steps.push("Restart the kernel. This is required so that SparkMagic can pick up the generated configuration".to_string());
    }

    steps
}
