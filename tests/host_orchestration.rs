use std::sync::Arc;
use std::time::Duration;

use hostkit::error::{ErrorKind, ExitReport, RemoteError};
use hostkit::formatter::NoopFormatter;
use hostkit::session::{
    Credentials, ExecContext, HostGroup, HostSpec, Inventory, RemoteHost, SecurityLevel,
    execute_on_group_func,
};
use tokio::time::Instant;

const INVENTORY: &str = r#"{
  "hosts": [
    { "address": "10.0.0.1", "user": "deploy", "password": "pw", "properties": { "role": "web" } },
    { "address": "10.0.0.2", "port": 2222, "user": "deploy", "key_file": "/keys/id_ed25519",
      "security": "legacy_compatible", "scp_path": "/opt/bin/scp" }
  ]
}"#;

fn host(address: &str, credentials: Credentials) -> Result<RemoteHost, RemoteError> {
    RemoteHost::new(address, 22, "ops", credentials)
}

#[test]
fn host_needs_a_password_or_a_key() {
    let empty = Credentials {
        password: Some(String::new()),
        key_file: None,
        key_passphrase: None,
    };
    let err = host("10.0.0.3", empty).expect_err("both credentials empty");
    assert_eq!(err.kind(), ErrorKind::Authentication);

    assert!(host("10.0.0.3", Credentials::password("pw")).is_ok());
    assert!(host("10.0.0.3", Credentials::key_file("/keys/id_rsa")).is_ok());
    assert!(host("10.0.0.3", Credentials::key_file("/keys/id_rsa").with_passphrase("pp")).is_ok());
}

#[test]
fn empty_address_is_a_configuration_error() {
    let err = host("  ", Credentials::password("pw")).expect_err("no address");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn inventory_parses_defaults_and_overrides() {
    let inventory = Inventory::from_json(INVENTORY).expect("parse inventory");
    assert_eq!(inventory.hosts.len(), 2);

    let web = &inventory.hosts[0];
    assert_eq!(web.port, 22);
    assert_eq!(web.security, SecurityLevel::Secure);
    assert_eq!(web.properties.get("role").map(String::as_str), Some("web"));

    let legacy = &inventory.hosts[1];
    assert_eq!(legacy.port, 2222);
    assert_eq!(legacy.security, SecurityLevel::LegacyCompatible);

    let host = RemoteHost::from_spec(legacy).expect("host");
    assert_eq!(host.label(), "deploy@10.0.0.2:2222");
    assert_eq!(host.options().scp_path, "/opt/bin/scp");

    let reparsed = Inventory::from_json(&inventory.to_json().expect("serialize")).expect("reparse");
    assert_eq!(reparsed, inventory);
}

#[test]
fn malformed_inventory_is_a_configuration_error() {
    let err = Inventory::from_json(r#"{ "hosts": [ { "address": "a" } ] }"#).expect_err("no user");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn inventory_schema_describes_hosts() {
    let schema = Inventory::schema().to_string();
    assert!(schema.contains("hosts"));
    assert!(schema.contains("key_file"));
}

#[tokio::test(start_paused = true)]
async fn group_runs_hosts_concurrently_and_keeps_every_result() {
    let spec = HostSpec::new("10.0.0.1", "ops").password("pw");
    let first = RemoteHost::from_spec(&spec).expect("first");
    let second = RemoteHost::from_spec(&HostSpec::new("10.0.0.2", "ops").password("pw"))
        .expect("second");
    let group = HostGroup::new([first, second]);

    let started = Instant::now();
    let results = execute_on_group_func(&group, |host| async move {
        if host.address() == "10.0.0.1" {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(host.label())
        } else {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Err(RemoteError::Command {
                target: host.label(),
                command: "false".to_string(),
                exit: ExitReport {
                    status: Some(1),
                    signal: None,
                },
            })
        }
    })
    .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(800), "{elapsed:?}");

    assert_eq!(results.len(), 2);
    assert!(matches!(results.get("ops@10.0.0.1:22"), Some(Ok(label)) if label == "ops@10.0.0.1:22"));
    let second = results.get("ops@10.0.0.2:22").expect("second host result");
    assert!(matches!(second, Err(e) if e.kind() == ErrorKind::Command));
    assert_eq!(results.failures().count(), 1);
}

#[tokio::test]
async fn group_execute_on_cancelled_hosts_reports_each_host() {
    let ctx = ExecContext::with_formatter(NoopFormatter);
    ctx.cancel();
    let group = HostGroup::new(["a", "b", "c"].map(|address| {
        host(address, Credentials::password("pw"))
            .expect("host")
            .with_context(ctx.clone())
    }));

    let results = group.execute("uptime").await;

    assert_eq!(results.len(), 3);
    assert!(
        results
            .iter()
            .all(|o| matches!(&o.result, Err(e) if e.kind() == ErrorKind::Cancelled))
    );
}

#[tokio::test]
async fn shared_host_can_join_a_group() {
    let shared = Arc::new(host("10.0.0.4", Credentials::password("pw")).expect("host"));
    let mut group = HostGroup::default();
    group.push(Arc::clone(&shared));

    let results = group
        .execute_func(|host| async move { Ok(host.id().to_string()) })
        .await;

    assert!(matches!(results.get(shared.id()), Some(Ok(id)) if id == shared.id()));
    assert!(group.close_all().await.is_all_ok());
}
