#[path = "../src/validation.rs"]
mod validation;
use validation::{validate_cluster_id, validate_role_arn, validate_user_name, RequestValidator};

#[test]
fn test_valid_cluster_ids() {
    let validator = RequestValidator::new();

    assert!(validator.validate_cluster_id("j-3DD9ZR01DAU14"));
    assert!(validator.validate_cluster_id("j-ABC"));
    assert!(validator.validate_cluster_id("j-1"));
}

#[test]
fn test_invalid_cluster_ids() {
    let validator = RequestValidator::new();

    assert!(!validator.validate_cluster_id("")); // Empty
    assert!(!validator.validate_cluster_id("j-")); // No id part
    assert!(!validator.validate_cluster_id("3DD9ZR01DAU14")); // Missing prefix
    assert!(!validator.validate_cluster_id("J-3DD9ZR01DAU14")); // Uppercase prefix
    assert!(!validator.validate_cluster_id("j-3DD9 ZR01")); // Whitespace
    assert!(!validator.validate_cluster_id("j-abc;rm")); // Invalid character
}

#[test]
fn test_role_arns() {
    let validator = RequestValidator::new();

    assert!(validator.validate_role_arn("arn:aws:iam::123456789012:role/EmrReadAccess"));
    assert!(validator.validate_role_arn("arn:aws:iam::123456789012:role/service-role/emr.access@team"));
    assert!(validator.validate_role_arn("arn:aws-cn:iam::123456789012:role/Reader"));
    assert!(validator.validate_role_arn("arn:aws-us-gov:iam::123456789012:role/Reader"));

    assert!(!validator.validate_role_arn("EmrReadAccess")); // Bare name
    assert!(!validator.validate_role_arn("arn:aws:iam::12345:role/Reader")); // Short account
    assert!(!validator.validate_role_arn("arn:aws:iam::123456789012:user/alice")); // Not a role
    assert!(!validator.validate_role_arn("arn:aws:iam::123456789012:role/")); // No role name
}

#[test]
fn test_user_names() {
    let validator = RequestValidator::default();

    assert!(validator.validate_user_name("ec2-user"));
    assert!(validator.validate_user_name("alice@CORP.EXAMPLE.COM"));
    assert!(validator.validate_user_name("svc_livy.1"));

    assert!(!validator.validate_user_name(""));
    assert!(!validator.validate_user_name(&"x".repeat(257)));
    assert!(!validator.validate_user_name("alice bob"));
    assert!(!validator.validate_user_name("alice'; kinit"));
}

#[test]
fn test_validate_functions() {
    assert!(validate_cluster_id("j-3DD9ZR01DAU14").is_ok());
    let err = validate_cluster_id("cluster-1").unwrap_err();
    assert!(err.contains("Invalid EMR cluster id"));

    assert!(validate_role_arn("arn:aws:iam::123456789012:role/EmrReadAccess").is_ok());
    let err = validate_role_arn("not-an-arn").unwrap_err();
    assert!(err.contains("Invalid IAM role ARN"));

    assert!(validate_user_name("ec2-user").is_ok());
    let err = validate_user_name("a b").unwrap_err();
    assert!(err.contains("Invalid user name"));
}
