// emrlink: SparkMagic configuration for Amazon EMR clusters
// Exposes the connect pipeline and its collaborators as a library

pub mod aws;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod connector;
pub mod descriptor;
pub mod emitter;
pub mod endpoint;
pub mod error;
pub mod validation;

pub use connector::{ConnectionReport, ConnectionRequest, ConnectionResult, Connector, OutputPathOverrides};
pub use error::{ConnectError, Stage, StageFailure};
