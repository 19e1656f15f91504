use anyhow::Result;
use emrlink::aws::emr::{parse_describe_cluster, parse_error, parse_list_instances, parse_security_configuration};
use emrlink::aws::http::{failure_kind, FailureKind};
use emrlink::classifier::{classify, AuthMode};
use emrlink::descriptor::{ClusterState, InstanceCollectionType, InstanceRole, InstanceState, KdcProvider};
use emrlink::emitter::RealmConfig;
use emrlink::endpoint::{kerberos_hostname, resolve};
use emrlink::ConnectError;
use reqwest::StatusCode;

const DESCRIBE_KERBEROS_CLUSTER: &str = r#"{
    "Cluster": {
        "Id": "j-3DD9ZR01DAU14",
        "Name": "Mycluster",
        "Status": {"State": "WAITING"},
        "SecurityConfiguration": "kerb-security-config",
        "KerberosAttributes": {"Realm": "MYKERBEROSREALM.COM", "KdcAdminPassword": "********"},
        "InstanceCollectionType": "INSTANCE_GROUP",
        "MasterPublicDnsName": "ec2-34-222-47-14.us-west-2.compute.amazonaws.com"
    }
}"#;

const LIST_MASTER: &str = r#"{
    "Instances": [{
        "Id": "ci-1",
        "Ec2InstanceId": "i-0736242069217a485",
        "PublicDnsName": "ec2-34-222-47-14.us-west-2.compute.amazonaws.com",
        "PublicIpAddress": "34.222.47.14",
        "PrivateDnsName": "ip-172-31-1-113.us-west-2.compute.internal",
        "PrivateIpAddress": "172.31.1.113",
        "Status": {"State": "RUNNING"}
    }],
    "Marker": "next-page"
}"#;

fn security_response(document: &str) -> String {
    serde_json::json!({
        "Name": "kerb-security-config",
        "SecurityConfiguration": document,
    })
    .to_string()
}

#[test]
fn test_parse_describe_cluster() -> Result<()> {
    let summary = parse_describe_cluster(DESCRIBE_KERBEROS_CLUSTER)?;

    assert_eq!(summary.id, "j-3DD9ZR01DAU14");
    assert_eq!(summary.name.as_deref(), Some("Mycluster"));
    assert_eq!(summary.status, ClusterState::Waiting);
    assert_eq!(summary.security_configuration.as_deref(), Some("kerb-security-config"));
    assert_eq!(summary.kerberos_realm.as_deref(), Some("MYKERBEROSREALM.COM"));
    assert_eq!(summary.collection_type, InstanceCollectionType::InstanceGroup);
    Ok(())
}

#[test]
fn test_parse_minimal_cluster() -> Result<()> {
    let summary = parse_describe_cluster(
        r#"{"Cluster": {"Id": "j-3DD9ZR01DAU14", "Name": "Mycluster", "InstanceCollectionType": "INSTANCE_FLEET"}}"#,
    )?;

    assert_eq!(summary.security_configuration, None);
    assert_eq!(summary.status, ClusterState::Unknown("UNKNOWN".to_string()));
    assert_eq!(summary.collection_type, InstanceCollectionType::InstanceFleet);
    assert!(matches!(parse_describe_cluster("not json"), Err(ConnectError::Service(_))));
    Ok(())
}

#[test]
fn test_parse_list_instances() -> Result<()> {
    let page = parse_list_instances(LIST_MASTER, InstanceRole::Master)?;

    assert_eq!(page.marker.as_deref(), Some("next-page"));
    let master = &page.instances[0];
    assert_eq!(master.role, InstanceRole::Master);
    assert_eq!(master.state, InstanceState::Running);
    assert_eq!(
        master.private_address.as_deref(),
        Some("ip-172-31-1-113.us-west-2.compute.internal")
    );
    assert_eq!(
        master.public_address.as_deref(),
        Some("ec2-34-222-47-14.us-west-2.compute.amazonaws.com")
    );
    Ok(())
}

#[test]
fn test_list_instances_falls_back_to_ip_addresses() -> Result<()> {
    let page = parse_list_instances(
        r#"{"Instances": [{"Id": "ci-2", "PrivateDnsName": "", "PrivateIpAddress": "10.0.1.5"}], "Marker": ""}"#,
        InstanceRole::Core,
    )?;

    assert_eq!(page.marker, None);
    assert_eq!(page.instances[0].private_address.as_deref(), Some("10.0.1.5"));
    assert_eq!(page.instances[0].public_address, None);
    Ok(())
}

#[test]
fn test_empty_security_document_has_no_kerberos() -> Result<()> {
    let config = parse_security_configuration("kerb-security-config", &security_response("{}"))?;
    assert_eq!(config.kerberos, None);
    assert_eq!(classify(Some(&config))?, AuthMode::None);
    Ok(())
}

#[test]
fn test_invalid_security_document_is_a_configuration_error() {
    let result = parse_security_configuration("broken", &security_response("{not json"));
    assert!(matches!(result, Err(ConnectError::Configuration(_))));
}

#[test]
fn test_dedicated_kdc_with_cross_realm_trust() -> Result<()> {
    let document = r#"{"EncryptionConfiguration": {"EnableInTransitEncryption": false, "EnableAtRestEncryption": false},
        "AuthenticationConfiguration": {"KerberosConfiguration": {"Provider": "ClusterDedicatedKdc",
        "ClusterDedicatedKdcConfiguration": {"TicketLifetimeInHours": 24,
        "CrossRealmTrustConfiguration": {"Realm": "KOLLOJUN.NET", "Domain": "kollojun.net",
        "AdminServer": "kollojun.net", "KdcServer": "kollojun.net"}}}}}"#;
    let mut config = parse_security_configuration("kerb-security-config", &security_response(document))?;

    let section = config.kerberos.as_mut().unwrap();
    assert_eq!(section.provider, Some(KdcProvider::ClusterDedicatedKdc));
    assert_eq!(section.ticket_lifetime_hours, Some(24));
    assert_eq!(section.realm, None);
    section.realm = Some("EC2.INTERNAL".to_string());

    let kerberos = match classify(Some(&config))? {
        AuthMode::Kerberos(kerberos) => kerberos,
        AuthMode::None => panic!("Expected Kerberos"),
    };
    let instances = parse_list_instances(LIST_MASTER, InstanceRole::Master)?.instances;
    let endpoint = resolve("j-3DD9ZR01DAU14", &instances)?;
    let realm_config = RealmConfig::build(&kerberos, &endpoint, "test.me");

    let primary = realm_config.realm("EC2.INTERNAL").unwrap();
    assert_eq!(primary.kdcs, vec!["ip-172-31-1-113.us-west-2.compute.internal:88"]);
    assert_eq!(primary.admin_server, "ip-172-31-1-113.us-west-2.compute.internal:749");
    assert_eq!(primary.default_domain, "test.me");

    let trusted = realm_config.realm("KOLLOJUN.NET").unwrap();
    assert_eq!(trusted.kdcs, vec!["kollojun.net"]);
    assert_eq!(realm_config.domain_realm[".kollojun.net"], "KOLLOJUN.NET");
    assert_eq!(realm_config.domain_realm["test.me"], "EC2.INTERNAL");
    assert_eq!(kerberos.principal_for("ec2-user"), "ec2-user");
    Ok(())
}

#[test]
fn test_external_kdc_with_ad_integration() -> Result<()> {
    let document = r#"{"AuthenticationConfiguration":{"KerberosConfiguration":
        {"ExternalKdcConfiguration":{"KdcServerType":"Single","AdIntegrationConfiguration":
        {"AdRealm":"MYADDOMAIN.COM","AdDomain":"myaddomain.com","AdServer":"myaddomain.com"},
        "AdminServer":"ip-10-0-0-164.us-west-2.compute.internal",
        "KdcServer":"ip-10-0-0-164.us-west-2.compute.internal"},"Provider":"ExternalKdc"}}}"#;
    let mut config = parse_security_configuration("kerb-security-config", &security_response(document))?;
    let summary = parse_describe_cluster(DESCRIBE_KERBEROS_CLUSTER)?;
    config.kerberos.as_mut().unwrap().realm = summary.kerberos_realm;

    let kerberos = match classify(Some(&config))? {
        AuthMode::Kerberos(kerberos) => kerberos,
        AuthMode::None => panic!("Expected Kerberos"),
    };
    let instances = parse_list_instances(LIST_MASTER, InstanceRole::Master)?.instances;
    let endpoint = resolve("j-3DD9ZR01DAU14", &instances)?;
    let realm_config = RealmConfig::build(&kerberos, &endpoint, "test.me");

    assert_eq!(realm_config.default_realm, "MYKERBEROSREALM.COM");
    assert_eq!(realm_config.ticket_lifetime_hours, 24);
    let primary = realm_config.realm("MYKERBEROSREALM.COM").unwrap();
    assert_eq!(primary.kdcs, vec!["ip-10-0-0-164.us-west-2.compute.internal"]);
    assert_eq!(primary.admin_server, "ip-10-0-0-164.us-west-2.compute.internal");
    let ad = realm_config.realm("MYADDOMAIN.COM").unwrap();
    assert_eq!(ad.admin_server, "myaddomain.com");
    assert_eq!(realm_config.domain_realm["myaddomain.com"], "MYADDOMAIN.COM");

    assert_eq!(kerberos.principal_for("ec2-user"), "ec2-user@MYADDOMAIN.COM");
    assert_eq!(
        kerberos_hostname(&endpoint.host, "test.me", "us-west-2.compute.internal"),
        "ip-172-31-1-113.test.me"
    );
    Ok(())
}

#[test]
fn test_unknown_kdc_provider_is_a_configuration_error() -> Result<()> {
    let document = r#"{"AuthenticationConfiguration":{"KerberosConfiguration":
        {"Provider":"SomeNewKdc","ExternalKdcConfiguration":{"KdcServer":"kdc.corp"}}}}"#;
    let mut config = parse_security_configuration("kerb-security-config", &security_response(document))?;

    let section = config.kerberos.as_mut().unwrap();
    assert_eq!(section.provider, Some(KdcProvider::Other("SomeNewKdc".to_string())));
    assert_eq!(section.kdc_hosts, vec!["kdc.corp"]);
    section.realm = Some("CORP.EXAMPLE.COM".to_string());

    let error = classify(Some(&config)).unwrap_err();
    assert!(matches!(error, ConnectError::Configuration(_)));
    assert!(error.to_string().contains("SomeNewKdc"));
    Ok(())
}

#[test]
fn test_missing_kdc_provider_is_a_configuration_error() -> Result<()> {
    let document = r#"{"AuthenticationConfiguration":{"KerberosConfiguration":
        {"ExternalKdcConfiguration":{"KdcServer":"kdc.corp","AdminServer":"kdc.corp"}}}}"#;
    let mut config = parse_security_configuration("kerb-security-config", &security_response(document))?;

    let section = config.kerberos.as_mut().unwrap();
    assert_eq!(section.provider, None);
    assert!(!section.is_empty());
    section.realm = Some("CORP.EXAMPLE.COM".to_string());

    assert!(matches!(classify(Some(&config)), Err(ConnectError::Configuration(_))));

    // Without a realm from the cluster attributes it is still rejected, never downgraded
    config.kerberos.as_mut().unwrap().realm = None;
    assert!(matches!(classify(Some(&config)), Err(ConnectError::Configuration(_))));
    Ok(())
}

#[test]
fn test_error_body_and_classification() {
    let (code, message) = parse_error(r#"{"__type": "InvalidRequestException", "Message": "Cluster id 'j-XYZ' is not valid."}"#);
    assert_eq!(code, "InvalidRequestException");
    assert_eq!(message, "Cluster id 'j-XYZ' is not valid.");
    assert_eq!(failure_kind(&code, StatusCode::BAD_REQUEST), FailureKind::InvalidRequest);

    let (code, _) = parse_error(r#"{"__type": "com.amazon.coral.service#AccessDeniedException", "message": "denied"}"#);
    assert_eq!(failure_kind(&code, StatusCode::BAD_REQUEST), FailureKind::AccessDenied);
    assert_eq!(failure_kind("", StatusCode::FORBIDDEN), FailureKind::AccessDenied);
    assert_eq!(
        failure_kind("InternalServerError", StatusCode::INTERNAL_SERVER_ERROR),
        FailureKind::Service
    );

    assert_eq!(parse_error("<html>"), (String::new(), String::new()));
}
