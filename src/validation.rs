use std::sync::OnceLock;

use regex::Regex;

fn cluster_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^j-[A-Za-z0-9]{1,255}$").expect("valid cluster id pattern"))
}

fn role_arn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^arn:aws(-cn|-us-gov)?:iam::\d{12}:role/[\w+=,.@/-]{1,512}$").expect("valid role ARN pattern")
    })
}

/// Validates the caller-supplied parts of a connect request
pub struct RequestValidator;

impl RequestValidator {
    pub fn new() -> Self {
        Self {}
    }

    /// Checks that a cluster id has the EMR shape: `j-` followed by
    /// alphanumerics
    pub fn validate_cluster_id(&self, cluster_id: &str) -> bool {
        cluster_id_pattern().is_match(cluster_id)
    }

    /// Checks that a role ARN names an IAM role in a standard, China or
    /// GovCloud partition
    pub fn validate_role_arn(&self, role_arn: &str) -> bool {
        role_arn_pattern().is_match(role_arn)
    }

    /// Checks that a user name can be used as a Kerberos principal and Livy
    /// proxy user
    ///
    /// Allowed: ASCII alphanumerics plus `.`, `_`, `-`, `@` and `$`, at most
    /// 256 characters.
    pub fn validate_user_name(&self, user_name: &str) -> bool {
        if user_name.is_empty() || user_name.len() > 256 {
            return false;
        }

        user_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@' | '$'))
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates a cluster id, returning a message describing the problem
pub fn validate_cluster_id(cluster_id: &str) -> Result<(), String> {
    if !RequestValidator::new().validate_cluster_id(cluster_id) {
        return Err(format!("Invalid EMR cluster id: {}", cluster_id));
    }
    Ok(())
}

pub fn validate_role_arn(role_arn: &str) -> Result<(), String> {
    if !RequestValidator::new().validate_role_arn(role_arn) {
        return Err(format!("Invalid IAM role ARN: {}", role_arn));
    }
    Ok(())
}

pub fn validate_user_name(user_name: &str) -> Result<(), String> {
    if !RequestValidator::new().validate_user_name(user_name) {
        return Err(format!("Invalid user name: {:?}", user_name));
    }
    Ok(())
}
