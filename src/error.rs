//! Error taxonomy for the connect pipeline
//!
//! Every component returns a [`ConnectError`]. The orchestrator never recovers
//! from one; it tags it with the [`Stage`] that produced it and hands the
//! resulting [`StageFailure`] back to the caller unchanged.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the descriptor client, classifier, resolver and emitter.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The request was rejected before any remote call was made
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No usable AWS credentials could be located
    #[error("unable to load AWS credentials: {0}")]
    Credentials(String),

    #[error("unable to get EMR cluster ({cluster_id}) details: {message}")]
    ClusterNotFound { cluster_id: String, message: String },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("unable to assume role ({role_arn}), ensure permissions are set up correctly: {message}")]
    RoleAssumption { role_arn: String, message: String },

    /// Transient or unexpected failure of the remote service
    #[error("service error: {0}")]
    Service(String),

    /// The cluster claims Kerberos but its security configuration is incomplete
    #[error("inconsistent security configuration: {0}")]
    Configuration(String),

    #[error("expected exactly one primary node in cluster {cluster_id}, found {found}")]
    NoMasterFound { cluster_id: String, found: usize },

    #[error("unable to write {}: {source}", path.display())]
    WritePermission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConnectError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ConnectError::Configuration(message.into())
    }

    pub fn service(message: impl Into<String>) -> Self {
        ConnectError::Service(message.into())
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConnectError::WritePermission {
            path: path.into(),
            source,
        }
    }
}

/// Pipeline stage a connect operation was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Classifying,
    Resolving,
    Emitting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching cluster details",
            Stage::Classifying => "classifying security mode",
            Stage::Resolving => "resolving Livy endpoint",
            Stage::Emitting => "writing configuration",
        };
        f.write_str(name)
    }
}

/// A [`ConnectError`] tagged with the stage at which it occurred.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: ConnectError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: ConnectError) -> Self {
        Self { stage, error }
    }
}

pub type Result<T, E = ConnectError> = std::result::Result<T, E>;
