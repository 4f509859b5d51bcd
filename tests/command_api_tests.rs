use rwc_registry::{
    FeatureFlags, InMemoryDefaultsStore, InMemoryRegistryForwarder, RegistryConfig,
    RegistryService, StaticTopologyGate, TopologyRole, VotingShape, run_command,
};
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Clone, Copy)]
struct Expectations {
    read_concern_local: bool,
    write_concern_majority: bool,
    implicit_write_majority: bool,
}

struct ReplicaSet {
    primary: Arc<RegistryService>,
    secondary: Arc<RegistryService>,
}

fn replica_set(
    name: &str,
    primary_role: TopologyRole,
    shape: VotingShape,
    flags: FeatureFlags,
) -> ReplicaSet {
    let store = InMemoryDefaultsStore::new(shape.voting_members());
    let node = |suffix: &str, role: TopologyRole| {
        Arc::new(
            RegistryService::new(
                RegistryConfig::new(&format!("{}-{}", name, suffix)).flags(flags),
                Arc::new(StaticTopologyGate::replica_set(role, shape)),
                Arc::new(store.clone()),
            )
            .unwrap(),
        )
    };
    ReplicaSet {
        primary: node("0", primary_role),
        secondary: node("1", primary_role.stepped_down()),
    }
}

async fn command_worked(service: &RegistryService, command: Value) -> Value {
    let reply = run_command(service, &command).await;
    assert_eq!(reply["ok"], json!(1), "command {} failed: {}", command, reply);
    reply
}

async fn command_failed_with(service: &RegistryService, command: Value, code_name: &str) {
    let reply = run_command(service, &command).await;
    assert_eq!(reply["ok"], json!(0), "command {} unexpectedly worked: {}", command, reply);
    assert_eq!(
        reply["codeName"],
        json!(code_name),
        "command {} failed with the wrong error: {}",
        command,
        reply
    );
}

fn has(res: &Value, field: &str) -> bool {
    res.get(field).is_some()
}

fn verify_fields(res: &Value, expect_rc: bool, expect_wc: bool, persisted: bool, exp: Expectations) {
    let mut expected = vec!["updateOpTime", "updateWallClockTime"];
    let mut unexpected = vec!["inMemory"];

    if persisted {
        unexpected.push("localUpdateWallClockTime");
    } else {
        expected.push("localUpdateWallClockTime");
    }

    if expect_rc || (exp.read_concern_local && !persisted) {
        expected.push("defaultReadConcern");
    } else {
        unexpected.push("defaultReadConcern");
    }
    if exp.read_concern_local && !persisted {
        expected.push("defaultReadConcernSource");
    } else {
        unexpected.push("defaultReadConcernSource");
    }

    if expect_wc || (exp.implicit_write_majority && !persisted) {
        expected.push("defaultWriteConcern");
    } else {
        unexpected.push("defaultWriteConcern");
    }
    if exp.write_concern_majority && !persisted {
        expected.push("defaultWriteConcernSource");
    } else {
        unexpected.push("defaultWriteConcernSource");
    }

    for field in expected {
        assert!(has(res, field), "response did not have field '{}': {}", field, res);
    }
    for field in unexpected {
        assert!(!has(res, field), "response unexpectedly had field '{}': {}", field, res);
    }

    if exp.write_concern_majority && !persisted {
        let source = if expect_wc { "global" } else { "implicit" };
        assert_eq!(res["defaultWriteConcernSource"], json!(source), "{}", res);
    }
}

async fn persisted(service: &RegistryService) -> Value {
    service.persisted_document().await.unwrap().unwrap_or(Value::Null)
}

async fn verify_default_state(service: &RegistryService, exp: Expectations) {
    let res = command_worked(service, json!({"getDefaultRWConcern": 1})).await;
    let in_memory_res =
        command_worked(service, json!({"getDefaultRWConcern": 1, "inMemory": true})).await;

    let mut expected = vec!["localUpdateWallClockTime"];
    let mut unexpected = vec!["updateOpTime", "updateWallClockTime"];
    if exp.implicit_write_majority {
        expected.push("defaultWriteConcern");
    } else {
        unexpected.push("defaultWriteConcern");
    }
    if exp.write_concern_majority {
        expected.push("defaultWriteConcernSource");
    } else {
        unexpected.push("defaultWriteConcernSource");
    }
    if exp.read_concern_local {
        expected.extend(["defaultReadConcern", "defaultReadConcernSource"]);
    } else {
        unexpected.extend(["defaultReadConcern", "defaultReadConcernSource"]);
    }

    for field in &expected {
        assert!(has(&res, field), "missing '{}': {}", field, res);
        assert!(has(&in_memory_res, field), "missing '{}': {}", field, in_memory_res);
    }
    for field in &unexpected {
        assert!(!has(&res, field), "unexpected '{}': {}", field, res);
        assert!(!has(&in_memory_res, field), "unexpected '{}': {}", field, in_memory_res);
    }
    assert_eq!(in_memory_res["inMemory"], json!(true));
    assert!(!has(&res, "inMemory"));

    if exp.write_concern_majority {
        assert_eq!(res["defaultWriteConcernSource"], json!("implicit"));
        assert_eq!(in_memory_res["defaultWriteConcernSource"], json!("implicit"));
    }

    assert_eq!(persisted(service).await, Value::Null);
}

async fn verify_valid_input(service: &RegistryService, exp: Expectations) {
    command_worked(service, json!({"getDefaultRWConcern": 1})).await;
    command_worked(service, json!({"getDefaultRWConcern": 1, "inMemory": false})).await;
    let in_memory_res =
        command_worked(service, json!({"getDefaultRWConcern": 1, "inMemory": true})).await;
    assert_eq!(in_memory_res["inMemory"], json!(true));

    // Read concern only.
    let res = command_worked(
        service,
        json!({"setDefaultRWConcern": 1, "defaultReadConcern": {"level": "local"}}),
    )
    .await;
    verify_fields(&res, true, false, false, exp);
    verify_fields(&persisted(service).await, true, false, true, exp);
    let res = command_worked(service, json!({"getDefaultRWConcern": 1})).await;
    verify_fields(&res, true, false, false, exp);

    // Unset read concern.
    let res = command_worked(
        service,
        json!({"setDefaultRWConcern": 1, "defaultReadConcern": {}}),
    )
    .await;
    verify_fields(&res, false, false, false, exp);
    verify_fields(&persisted(service).await, false, false, true, exp);
    let res = command_worked(service, json!({"getDefaultRWConcern": 1})).await;
    verify_fields(&res, false, false, false, exp);

    // Empty write concern is allowed while none has been set.
    let res = command_worked(
        service,
        json!({"setDefaultRWConcern": 1, "defaultWriteConcern": {}}),
    )
    .await;
    verify_fields(&res, false, false, false, exp);
    verify_fields(&persisted(service).await, false, false, true, exp);

    // Write concern only.
    for wc in [json!({"w": 1}), json!({"w": 1, "j": false}), json!({"w": "majority"})] {
        command_worked(
            service,
            json!({"setDefaultRWConcern": 1, "defaultWriteConcern": wc}),
        )
        .await;
    }
    let res = command_worked(
        service,
        json!({"setDefaultRWConcern": 1, "defaultWriteConcern": {"w": 1}}),
    )
    .await;
    verify_fields(&res, false, true, false, exp);
    verify_fields(&persisted(service).await, false, true, true, exp);
    let res = command_worked(service, json!({"getDefaultRWConcern": 1})).await;
    verify_fields(&res, false, true, false, exp);

    // Both.
    let res = command_worked(
        service,
        json!({
            "setDefaultRWConcern": 1,
            "defaultReadConcern": {"level": "local"},
            "defaultWriteConcern": {"w": 1}
        }),
    )
    .await;
    verify_fields(&res, true, true, false, exp);
    verify_fields(&persisted(service).await, true, true, true, exp);
    let res = command_worked(service, json!({"getDefaultRWConcern": 1})).await;
    verify_fields(&res, true, true, false, exp);
}

async fn verify_invalid_input(service: &RegistryService, exp: Expectations) {
    command_failed_with(
        service,
        json!({"getDefaultRWConcern": 1, "inMemory": "true"}),
        "TypeMismatch",
    )
    .await;
    command_failed_with(service, json!({"setDefaultRWConcern": 1}), "MissingArgument").await;
    command_failed_with(
        service,
        json!({"setDefaultRWConcern": 1, "defaultWriteConcern": 1}),
        "TypeMismatch",
    )
    .await;
    command_failed_with(
        service,
        json!({"setDefaultRWConcern": 1, "defaultWriteConcern": {"w": 0}}),
        "BadValue",
    )
    .await;
    if exp.write_concern_majority {
        command_failed_with(
            service,
            json!({"setDefaultRWConcern": 1, "defaultWriteConcern": {}}),
            "IllegalOperation",
        )
        .await;
    }
    command_failed_with(
        service,
        json!({"setDefaultRWConcern": 1, "defaultReadConcern": 1}),
        "TypeMismatch",
    )
    .await;
    command_failed_with(
        service,
        json!({"setDefaultRWConcern": 1, "defaultReadConcern": {"level": "dummy"}}),
        "FailedToParse",
    )
    .await;
    for level in ["linearizable", "snapshot"] {
        command_failed_with(
            service,
            json!({"setDefaultRWConcern": 1, "defaultReadConcern": {"level": level}}),
            "BadValue",
        )
        .await;
    }
    for rc in [
        json!({"level": "local", "afterClusterTime": {"t": 50, "i": 1}}),
        json!({"level": "snapshot", "atClusterTime": {"t": 50, "i": 1}}),
        json!({"level": "local", "afterOpTime": {"ts": {"t": 50, "i": 1}, "t": 1}}),
    ] {
        command_failed_with(
            service,
            json!({"setDefaultRWConcern": 1, "defaultReadConcern": rc}),
            "BadValue",
        )
        .await;
    }
}

async fn verify_unsupported(service: &RegistryService, code_name: &str) {
    command_failed_with(service, json!({"getDefaultRWConcern": 1}), code_name).await;
    command_failed_with(
        service,
        json!({"setDefaultRWConcern": 1, "defaultReadConcern": {"level": "local"}}),
        code_name,
    )
    .await;
}

fn expectations(flags: FeatureFlags, implicit_topology_majority: bool) -> Expectations {
    Expectations {
        read_concern_local: flags.default_read_concern_local,
        write_concern_majority: flags.default_write_concern_majority,
        implicit_write_majority: flags.default_write_concern_majority && implicit_topology_majority,
    }
}

async fn run_replica_set_suite(flags: FeatureFlags, shape: VotingShape, implicit_majority: bool) {
    let rs = replica_set("rs", TopologyRole::ReplicaSetPrimary, shape, flags);
    let exp = expectations(flags, implicit_majority);

    verify_default_state(&rs.primary, exp).await;
    verify_valid_input(&rs.primary, exp).await;
    verify_invalid_input(&rs.primary, exp).await;

    command_worked(&rs.secondary, json!({"getDefaultRWConcern": 1})).await;
    command_failed_with(
        &rs.secondary,
        json!({"setDefaultRWConcern": 1, "defaultReadConcern": {"level": "local"}}),
        "NotWritablePrimary",
    )
    .await;
}

#[tokio::test]
async fn standalone_node_rejects_both_commands() {
    let standalone = RegistryService::new(
        RegistryConfig::new("standalone"),
        Arc::new(StaticTopologyGate::standalone()),
        Arc::new(InMemoryDefaultsStore::new(1)),
    )
    .unwrap();
    verify_unsupported(&standalone, "RegistryUnsupportedOnStandalone").await;

    let reply = run_command(&standalone, &json!({"getDefaultRWConcern": 1})).await;
    assert_eq!(reply["code"], json!(51300));
}

#[tokio::test]
async fn replica_set_with_implicit_majority() {
    run_replica_set_suite(FeatureFlags::default(), VotingShape::new(2, 0), true).await;
}

#[tokio::test]
async fn replica_set_with_implicit_w1() {
    // primary-secondary-arbiter
    run_replica_set_suite(FeatureFlags::default(), VotingShape::new(2, 1), false).await;
}

#[tokio::test]
async fn replica_set_with_capabilities_disabled() {
    run_replica_set_suite(FeatureFlags::all_disabled(), VotingShape::new(2, 0), true).await;
}

#[tokio::test]
async fn replica_set_with_only_read_concern_capability() {
    let flags = FeatureFlags {
        default_read_concern_local: true,
        default_write_concern_majority: false,
    };
    run_replica_set_suite(flags, VotingShape::new(3, 0), true).await;
}

async fn run_sharded_cluster_suite(shard_shape: VotingShape) {
    let flags = FeatureFlags::default();
    let config_rs = replica_set(
        "config",
        TopologyRole::ConfigServerPrimary,
        VotingShape::new(2, 0),
        flags,
    );
    let shard = replica_set("shard0", TopologyRole::ShardPrimary, shard_shape, flags);

    let forwarder = InMemoryRegistryForwarder::new();
    forwarder
        .register_peer("config-0", config_rs.primary.clone())
        .await
        .unwrap();
    forwarder
        .register_peer("config-1", config_rs.secondary.clone())
        .await
        .unwrap();
    let router = RegistryService::router(
        RegistryConfig::new("router").flags(flags),
        Arc::new(StaticTopologyGate::router()),
        Arc::new(forwarder),
        vec!["config-1".to_string(), "config-0".to_string()],
    )
    .unwrap();

    // The router answers with the config servers' defaults, whatever the shard shape.
    let exp = expectations(flags, true);
    verify_default_state(&router, exp).await;
    verify_valid_input(&router, exp).await;
    verify_invalid_input(&router, exp).await;

    verify_unsupported(&shard.primary, "RegistryUnsupportedOnShardMember").await;
    command_failed_with(
        &shard.secondary,
        json!({"getDefaultRWConcern": 1}),
        "RegistryUnsupportedOnShardMember",
    )
    .await;
    // Secondaries refuse writes before looking at the command.
    command_failed_with(
        &shard.secondary,
        json!({"setDefaultRWConcern": 1, "defaultReadConcern": {"level": "local"}}),
        "NotWritablePrimary",
    )
    .await;
}

#[tokio::test]
async fn sharded_cluster_with_implicit_majority() {
    run_sharded_cluster_suite(VotingShape::new(2, 0)).await;
}

#[tokio::test]
async fn sharded_cluster_with_psa_shard() {
    run_sharded_cluster_suite(VotingShape::new(2, 1)).await;
}

#[tokio::test]
async fn config_server_primary_serves_registry_directly() {
    let flags = FeatureFlags::default();
    let config_rs = replica_set(
        "config",
        TopologyRole::ConfigServerPrimary,
        VotingShape::new(2, 0),
        flags,
    );
    let exp = expectations(flags, true);

    verify_default_state(&config_rs.primary, exp).await;
    verify_valid_input(&config_rs.primary, exp).await;
    verify_invalid_input(&config_rs.primary, exp).await;

    command_worked(&config_rs.secondary, json!({"getDefaultRWConcern": 1})).await;
    command_failed_with(
        &config_rs.secondary,
        json!({"setDefaultRWConcern": 1, "defaultReadConcern": {"level": "local"}}),
        "NotWritablePrimary",
    )
    .await;
}

#[tokio::test]
async fn unknown_command_is_reported() {
    let rs = replica_set(
        "rs",
        TopologyRole::ReplicaSetPrimary,
        VotingShape::new(2, 0),
        FeatureFlags::default(),
    );
    command_failed_with(&rs.primary, json!({"getDefaultRWConcernz": 1}), "CommandNotFound").await;
}
