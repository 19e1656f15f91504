//! AWS collaborators: credentials, request signing, and the EMR and STS adapters

pub mod credentials;
pub mod emr;
pub mod http;
pub mod sigv4;
pub mod sts;

pub use credentials::{Credentials, DefaultCredentialsProvider};
pub use emr::{EmrClient, EmrClientFactory};
pub use http::AwsHttpClient;
pub use sts::StsClient;
