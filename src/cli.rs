//! Command-line interface for emrlink
//!
//! Parses arguments with clap and turns them into [`Settings`] and a
//! [`ConnectionRequest`]. The only subcommand is `connect`:
//!
//! ```text
//! emrlink connect --cluster-id j-3DD9ZR01DAU14 --user-name ec2-user
//! emrlink --region eu-west-1 connect --cluster-id j-3DD9ZR01DAU14 \
//!     --role-arn arn:aws:iam::123456789012:role/EmrReadAccess
//! ```
//!
//! Global options may also come from the environment (`AWS_REGION`,
//! `EMRLINK_EMR_ENDPOINT`). Failures exit non-zero after printing the stage
//! and error.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Settings, DEFAULT_REGION, DEFAULT_TIMEOUT_MS, RESOLV_CONF_PATH};
use crate::connector::{ConnectionRequest, OutputPathOverrides};

/// Main command-line interface structure
///
/// Global options configure how AWS is reached and apply to every subcommand.
#[derive(Parser)]
#[command(
    name = "emrlink",
    about = "Generates configuration to connect SparkMagic kernels to Amazon EMR clusters",
    version
)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// AWS region of the cluster
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION, global = true)]
    pub region: String,

    /// Override the EMR endpoint URL (e.g. a VPC endpoint)
    #[arg(long, env = "EMRLINK_EMR_ENDPOINT", global = true)]
    pub emr_endpoint: Option<String>,

    /// Timeout in milliseconds for each AWS request
    #[arg(short = 't', long, default_value_t = DEFAULT_TIMEOUT_MS, global = true)]
    pub timeout_ms: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate configuration needed to connect to an EMR cluster
    ///
    /// Describes the cluster to find its primary node and security
    /// configuration, then writes the SparkMagic config and, for Kerberos
    /// clusters, krb5.conf.
    Connect {
        /// The EMR cluster id; configuration is generated for this cluster
        #[arg(long)]
        cluster_id: String,

        /// User name used when submitting jobs to Livy and for kinit
        #[arg(long)]
        user_name: Option<String>,

        /// Role to assume when describing the cluster (cross-account access).
        /// By default the execution role of the environment is used
        #[arg(long)]
        role_arn: Option<String>,

        /// Write the SparkMagic config here instead of the default location
        #[arg(long)]
        config_path: Option<PathBuf>,

        /// Write krb5.conf here instead of the default location
        #[arg(long)]
        krb_conf_path: Option<PathBuf>,

        /// Do not generate Kerberos configuration even if the cluster uses it
        #[arg(long)]
        skip_krb: bool,

        /// The notebook restarts the kernel itself; the restart step is replaced by a reminder
        #[arg(long)]
        restart_kernel: bool,

        /// Print the result as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Builds runtime settings from the global options
    pub fn settings(&self) -> Settings {
        self.settings_with_resolv_conf(Path::new(RESOLV_CONF_PATH))
    }

    pub fn settings_with_resolv_conf(&self, resolv_conf: &Path) -> Settings {
        let mut settings = Settings::for_region(self.region.clone()).with_search_domain_from(resolv_conf);
        if let Some(endpoint) = &self.emr_endpoint {
            settings.emr_endpoint = endpoint.clone();
        }
        settings.timeout = Duration::from_millis(self.timeout_ms);
        settings
    }
}

impl Commands {
    pub fn to_request(&self) -> ConnectionRequest {
        match self {
            Commands::Connect {
                cluster_id,
                user_name,
                role_arn,
                config_path,
                krb_conf_path,
                skip_krb,
                restart_kernel,
                ..
            } => ConnectionRequest {
                cluster_id: cluster_id.clone(),
                user_name: user_name.clone(),
                role_arn: role_arn.clone(),
                output_paths: OutputPathOverrides {
                    config_path: config_path.clone(),
                    realm_config_path: krb_conf_path.clone(),
                },
                restart_kernel: *restart_kernel,
                skip_kerberos: *skip_krb,
            },
        }
    }
}
