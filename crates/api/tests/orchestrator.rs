use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value as Json};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, Instant};

use cutover_api::{
    Alert, ChannelSink, EngineConfig, HookCluster, HookSpec, Notification, OperationEvent, OperationKind,
    OperationRequest, Orchestrator, Outcome, PlanValues, PvSelection, ResourceKind, ResourceRef, Severity, Status,
};
use cutover_core::ClientError;
use cutover_kubehub::mock::{ReadStep, ScriptedClient, Verb};

const NS: &str = "openshift-migration";

fn setup() -> (Arc<ScriptedClient>, Orchestrator, UnboundedReceiver<Alert>) {
    let client = Arc::new(ScriptedClient::new());
    let (sink, alerts) = ChannelSink::new();
    let orch = Orchestrator::new(client.clone(), Arc::new(sink), EngineConfig::default());
    (client, orch, alerts)
}

fn drain(rx: &mut UnboundedReceiver<Alert>) -> Vec<Alert> {
    let mut out = Vec::new();
    while let Ok(a) = rx.try_recv() {
        out.push(a);
    }
    out
}

fn notices(alerts: &[Alert]) -> Vec<Notification> {
    alerts
        .iter()
        .filter_map(|a| match a {
            Alert::Notice(n) => Some(n.clone()),
            Alert::CertificateTrustError { .. } => None,
        })
        .collect()
}

fn cert_alerts(alerts: &[Alert]) -> usize {
    alerts.iter().filter(|a| matches!(a, Alert::CertificateTrustError { .. })).count()
}

fn plan(name: &str, spec: Json) -> Json {
    json!({
        "apiVersion": "migration.openshift.io/v1alpha1",
        "kind": "MigPlan",
        "metadata": {"name": name, "namespace": NS},
        "spec": spec
    })
}

fn migrate(plan: &str) -> OperationRequest {
    OperationRequest::Migrate { plan: plan.into(), quiesce: false }
}

#[tokio::test(start_paused = true)]
async fn migration_reports_success_with_plan_name() {
    let (client, orch, mut alerts) = setup();
    client.script_reads(
        ResourceKind::MigMigration,
        vec![
            ReadStep::conditions(json!([])),
            ReadStep::conditions(json!([])),
            ReadStep::conditions(json!([])),
            ReadStep::conditions(json!([{"type": "Running"}])),
            ReadStep::conditions(json!([{"type": "Succeeded"}])),
        ],
    );
    let mut handle = orch.start(orch.operation(migrate("plan-a"))).await;
    let mut progress = Vec::new();
    let outcome = loop {
        match handle.next().await.expect("run ended without Finished") {
            OperationEvent::Progress { result, .. } => progress.push(result.status),
            OperationEvent::Finished { outcome, .. } => break outcome,
            _ => {}
        }
    };
    assert_eq!(progress, vec![Status::Pending, Status::Pending, Status::Pending, Status::Running]);
    match outcome {
        Outcome::Completed(r) => {
            assert_eq!(r.status, Status::Succeeded);
            assert_eq!(r.subject_name.as_deref(), Some("plan-a"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.count(Verb::Create, ResourceKind::MigMigration), 1);
    assert_eq!(client.count(Verb::Get, ResourceKind::MigMigration), 5);
    assert_eq!(
        notices(&drain(&mut alerts)),
        vec![Notification::progress("Migration Started"), Notification::success("Migration Successful")]
    );
    assert!(!orch.is_active(OperationKind::Migrate));
}

#[tokio::test(start_paused = true)]
async fn migration_failure_carries_condition_message() {
    let (client, orch, mut alerts) = setup();
    client.script_reads(
        ResourceKind::MigMigration,
        vec![ReadStep::conditions(json!([{"type": "Failed", "category": "Critical", "message": "disk full"}]))],
    );
    let outcome = orch.start(orch.operation(OperationRequest::Stage { plan: "plan-a".into() })).await.wait().await;
    match outcome {
        Outcome::Completed(r) => {
            assert_eq!(r.status, Status::Failed);
            assert_eq!(r.message.as_deref(), Some("disk full"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.count(Verb::Get, ResourceKind::MigMigration), 1);
    let notes = notices(&drain(&mut alerts));
    assert_eq!(notes.last(), Some(&Notification::error("disk full")));
    assert_eq!(notes.iter().filter(|n| n.severity == Severity::Error).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stage_ends_on_warning_without_success() {
    let (client, orch, mut alerts) = setup();
    client.script_reads(
        ResourceKind::MigMigration,
        vec![ReadStep::conditions(json!([{"type": "StageNoOp", "category": "Warn", "message": "no PVs found"}]))],
    );
    let outcome = orch.start(orch.operation(OperationRequest::Stage { plan: "plan-a".into() })).await.wait().await;
    match outcome {
        Outcome::Completed(r) => {
            assert_eq!(r.status, Status::Warn);
            assert_eq!(r.message.as_deref(), Some("no PVs found"));
            assert_eq!(r.subject_name.as_deref(), Some("plan-a"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.count(Verb::Get, ResourceKind::MigMigration), 1);
    let notes = notices(&drain(&mut alerts));
    assert_eq!(notes.last(), Some(&Notification::warn("Warning(s) occurred during stage: no PVs found")));
}

#[tokio::test(start_paused = true)]
async fn create_with_lost_reply_adopts_the_existing_object() {
    let (client, orch, _alerts) = setup();
    client.lose_replies(Verb::Create, ResourceKind::MigMigration, vec![ClientError::Timeout("deadline exceeded".into())]);
    client.script_reads(ResourceKind::MigMigration, vec![ReadStep::conditions(json!([{"type": "Succeeded"}]))]);

    let t0 = Instant::now();
    let outcome = orch.start(orch.operation(OperationRequest::Stage { plan: "plan-a".into() })).await.wait().await;
    assert_eq!(outcome.status(), Some(Status::Succeeded));
    assert!(t0.elapsed() >= Duration::from_secs(5));

    let creates: Vec<String> =
        client.calls().into_iter().filter(|c| c.verb == Verb::Create).map(|c| c.name).collect();
    assert_eq!(creates.len(), 2);
    assert_eq!(creates[0], creates[1]);
    assert!(creates[0].starts_with("stage-"));
    assert_eq!(client.count(Verb::Get, ResourceKind::MigMigration), 2);
    assert!(client.object(ResourceKind::MigMigration, NS, &creates[0]).is_some());
}

#[tokio::test(start_paused = true)]
async fn plan_validate_waits_for_new_digest_then_checks_status() {
    let (client, orch, mut alerts) = setup();
    let mut existing = plan(
        "plan-a",
        json!({"persistentVolumes": [{"name": "pv-1", "selection": {"action": "copy", "storageClass": "gp2"}}]}),
    );
    existing["status"] = json!({"observedDigest": "d1", "conditions": []});
    client.insert(ResourceKind::MigPlan, existing);
    client.script_reads(
        ResourceKind::MigPlan,
        vec![
            ReadStep::Merge(json!({})),
            ReadStep::Merge(json!({})),
            ReadStep::Merge(json!({})),
            ReadStep::status(json!({"observedDigest": "d2", "conditions": [{"type": "Ready"}]})),
        ],
    );

    let mut bus = orch.subscribe();
    let values = PlanValues {
        persistent_volumes: vec![PvSelection { name: "pv-1".into(), storage_class: Some("gp3".into()), ..PvSelection::default() }],
        ..PlanValues::for_plan("plan-a")
    };
    let mut handle = orch.start(orch.operation(OperationRequest::PlanValidate { values })).await;
    let mut pending = 0;
    let outcome = loop {
        match handle.next().await.expect("run ended without Finished") {
            OperationEvent::Progress { result, .. } => {
                assert_eq!(result.status, Status::Pending);
                pending += 1;
            }
            OperationEvent::Finished { outcome, .. } => break outcome,
            _ => {}
        }
    };
    assert_eq!(outcome.status(), Some(Status::Succeeded));
    assert_eq!(pending, 2);
    assert_eq!(client.count(Verb::Patch, ResourceKind::MigPlan), 1);
    let stored = client.object(ResourceKind::MigPlan, NS, "plan-a").unwrap();
    assert_eq!(stored["spec"]["persistentVolumes"][0]["selection"]["storageClass"], json!("gp3"));

    let status_outcome = loop {
        if let Ok(OperationEvent::Finished { kind: OperationKind::PlanStatus, outcome, .. }) = bus.recv().await {
            break outcome;
        }
    };
    assert_eq!(status_outcome.status(), Some(Status::Succeeded));
    let notes = notices(&drain(&mut alerts));
    assert!(notes.contains(&Notification::success("Plan \"plan-a\" updated")));
    assert!(notes.contains(&Notification::success("Plan \"plan-a\" is ready")));
    assert!(orch.active_kinds().is_empty());
}

#[tokio::test(start_paused = true)]
async fn plan_validate_exhausts_retries_without_polling() {
    let (client, orch, mut alerts) = setup();
    client.insert(ResourceKind::MigPlan, plan("plan-a", json!({})));
    client.fail_writes(Verb::Patch, ResourceKind::MigPlan, vec![ClientError::Transport("connection reset".into()); 6]);

    let t0 = Instant::now();
    let values = PlanValues { namespaces: vec!["app".into()], ..PlanValues::for_plan("plan-a") };
    let mut handle = orch.start(orch.operation(OperationRequest::PlanValidate { values })).await;
    let mut events = Vec::new();
    while let Some(ev) = handle.next().await {
        events.push(ev);
    }
    match events.as_slice() {
        [OperationEvent::Finished { outcome: Outcome::RetryExhausted { attempts, error }, .. }] => {
            assert_eq!(*attempts, 6);
            assert_eq!(error, &ClientError::Transport("connection reset".into()));
        }
        other => panic!("unexpected events: {:?}", other),
    }
    assert_eq!(client.count(Verb::Patch, ResourceKind::MigPlan), 6);
    assert_eq!(client.count(Verb::Get, ResourceKind::MigPlan), 6);
    assert!(t0.elapsed() >= Duration::from_secs(25));
    assert!(orch.active_kinds().is_empty());

    let notes = notices(&drain(&mut alerts));
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].severity, Severity::Error);
    assert!(notes[0].message.starts_with("Failed to update plan \"plan-a\""));
}

#[tokio::test(start_paused = true)]
async fn restarting_a_kind_stops_the_previous_loop() {
    let (client, orch, mut alerts) = setup();
    let mut first = orch.start(orch.operation(migrate("plan-a"))).await;
    let first_name = match first.next().await {
        Some(OperationEvent::Started { resource, .. }) => resource,
        other => panic!("expected Started, got {:?}", other),
    };
    sleep(Duration::from_secs(12)).await;
    let reads_before = client.reads_of(ResourceKind::MigMigration, &first_name);
    assert_eq!(reads_before, 3);

    let second = orch.start(orch.operation(migrate("plan-a"))).await;
    assert_eq!(first.wait().await, Outcome::Stopped);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(client.reads_of(ResourceKind::MigMigration, &first_name), reads_before);
    assert_eq!(client.count(Verb::Create, ResourceKind::MigMigration), 2);
    assert!(orch.is_active(OperationKind::Migrate));

    assert!(orch.stop(OperationKind::Migrate).await);
    assert_eq!(second.wait().await, Outcome::Stopped);
    let notes = notices(&drain(&mut alerts));
    assert_eq!(notes, vec![Notification::progress("Migration Started"), Notification::progress("Migration Started")]);
}

#[tokio::test(start_paused = true)]
async fn certificate_errors_are_reported_once_until_acknowledged() {
    let (client, orch, mut alerts) = setup();
    client.insert(ResourceKind::MigPlan, plan("plan-a", json!({})));
    client.script_reads(
        ResourceKind::MigPlan,
        vec![ReadStep::Fail(ClientError::CertificateTrust {
            url: "https://api.cluster.invalid:6443".into(),
            message: "x509: certificate signed by unknown authority".into(),
        })],
    );
    let handle = orch.start(orch.operation(OperationRequest::PlanStatus { plan: "plan-a".into() })).await;
    sleep(Duration::from_secs(21)).await;
    assert_eq!(client.reads_of(ResourceKind::MigPlan, "plan-a"), 5);
    assert_eq!(cert_alerts(&drain(&mut alerts)), 1);
    assert!(orch.is_active(OperationKind::PlanStatus));

    orch.acknowledge_certificate_error();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(cert_alerts(&drain(&mut alerts)), 1);

    assert!(orch.stop(OperationKind::PlanStatus).await);
    assert_eq!(handle.wait().await, Outcome::Stopped);
    assert!(notices(&drain(&mut alerts)).is_empty());
}

#[tokio::test]
async fn stop_without_active_loop_is_a_no_op() {
    let (_client, orch, mut alerts) = setup();
    assert!(!orch.stop(OperationKind::Stage).await);
    assert_eq!(orch.stop_all().await, 0);
    assert!(orch.active_kinds().is_empty());
    assert!(drain(&mut alerts).is_empty());
}

#[tokio::test(start_paused = true)]
async fn plan_status_times_out_after_budget() {
    let (client, orch, mut alerts) = setup();
    client.insert(ResourceKind::MigPlan, plan("plan-a", json!({})));
    let outcome = orch.start(orch.operation(OperationRequest::PlanStatus { plan: "plan-a".into() })).await.wait().await;
    assert_eq!(outcome.status(), Some(Status::TimedOut));
    assert_eq!(client.reads_of(ResourceKind::MigPlan, "plan-a"), 10);
    assert_eq!(
        notices(&drain(&mut alerts)),
        vec![Notification::error("Timed out waiting for plan \"plan-a\" to become ready")]
    );
    assert_eq!(orch.current_plan().map(|p| p.name().to_string()), Some("plan-a".to_string()));
}

#[tokio::test(start_paused = true)]
async fn non_transient_write_errors_fail_fast() {
    let (client, orch, mut alerts) = setup();
    client.fail_writes(
        Verb::Create,
        ResourceKind::MigMigration,
        vec![ClientError::CertificateTrust { url: "https://api.cluster.invalid:6443".into(), message: "x509".into() }],
    );
    let mut handle = orch.start(orch.operation(OperationRequest::Rollback { plan: "plan-a".into() })).await;
    let first = handle.next().await;
    assert!(matches!(first, Some(OperationEvent::Finished { outcome: Outcome::WriteRejected { attempts: 1, .. }, .. })));
    assert_eq!(client.count(Verb::Get, ResourceKind::MigMigration), 0);

    let alerts = drain(&mut alerts);
    assert_eq!(cert_alerts(&alerts), 1);
    let notes = notices(&alerts);
    assert_eq!(notes.len(), 1);
    assert!(notes[0].message.starts_with("Rollback Failed: certificate trust"));
}

#[tokio::test(start_paused = true)]
async fn hook_create_attaches_to_plan_and_waits_for_ready() {
    let (client, orch, mut alerts) = setup();
    client.insert(ResourceKind::MigPlan, plan("plan-a", json!({})));
    client.script_reads(
        ResourceKind::MigHook,
        vec![ReadStep::conditions(json!([])), ReadStep::conditions(json!([{"type": "Ready"}]))],
    );
    let hook = HookSpec {
        name: "pre-backup".into(),
        image: "quay.io/konveyor/hook-runner:latest".into(),
        playbook: Some("- hosts: localhost".into()),
        target_cluster: HookCluster::Source,
        phase: "PreBackup".into(),
        service_account: Some("migration-controller".into()),
        execution_namespace: Some(NS.into()),
        ..HookSpec::default()
    };
    let request = OperationRequest::HookCreate { hook, plan: Some("plan-a".into()) };
    let outcome = orch.start(orch.operation(request)).await.wait().await;
    assert!(outcome.is_success());
    assert_eq!(client.reads_of(ResourceKind::MigHook, "pre-backup"), 2);

    let stored = client.object(ResourceKind::MigPlan, NS, "plan-a").unwrap();
    assert_eq!(stored["spec"]["hooks"][0]["phase"], json!("PreBackup"));
    assert_eq!(stored["spec"]["hooks"][0]["reference"]["name"], json!("pre-backup"));
    let hook_obj = client.object(ResourceKind::MigHook, NS, "pre-backup").unwrap();
    assert_eq!(hook_obj["spec"]["playbook"], json!("LSBob3N0czogbG9jYWxob3N0"));
    assert_eq!(
        notices(&drain(&mut alerts)),
        vec![
            Notification::progress("Adding hook \"pre-backup\""),
            Notification::success("Successfully added a hook to plan.")
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn hook_update_patches_hook_and_plan_entry() {
    let (client, orch, mut alerts) = setup();
    let entry = json!({
        "executionNamespace": NS,
        "phase": "PreBackup",
        "reference": {"name": "h1", "namespace": NS},
        "serviceAccount": "migration-controller"
    });
    client.insert(ResourceKind::MigPlan, plan("plan-a", json!({"hooks": [entry]})));
    client.insert(
        ResourceKind::MigHook,
        json!({"metadata": {"name": "h1", "namespace": NS}, "spec": {"image": "quay.io/konveyor/hook-runner:1.0", "custom": false}}),
    );
    client.script_reads(ResourceKind::MigHook, vec![ReadStep::conditions(json!([{"type": "Ready"}]))]);

    let hook = HookSpec {
        name: "h1".into(),
        image: "quay.io/acme/custom-hook:2.0".into(),
        custom: true,
        target_cluster: HookCluster::Destination,
        phase: "PostRestore".into(),
        service_account: Some("hook-runner".into()),
        execution_namespace: Some("app".into()),
        ..HookSpec::default()
    };
    let request = OperationRequest::HookUpdate { hook, plan: Some("plan-a".into()) };
    let outcome = orch.start(orch.operation(request)).await.wait().await;
    assert!(outcome.is_success());

    let hook_obj = client.object(ResourceKind::MigHook, NS, "h1").unwrap();
    assert_eq!(hook_obj["spec"]["image"], json!("quay.io/acme/custom-hook:2.0"));
    assert_eq!(hook_obj["spec"]["custom"], json!(true));
    assert_eq!(hook_obj["spec"]["targetCluster"], json!("destination"));
    let hooks = client.object(ResourceKind::MigPlan, NS, "plan-a").unwrap()["spec"]["hooks"].clone();
    assert_eq!(hooks.as_array().map(|a| a.len()), Some(1));
    assert_eq!(hooks[0]["phase"], json!("PostRestore"));
    assert_eq!(hooks[0]["serviceAccount"], json!("hook-runner"));
    assert_eq!(hooks[0]["executionNamespace"], json!("app"));
    assert_eq!(
        notices(&drain(&mut alerts)),
        vec![Notification::progress("Updating hook \"h1\""), Notification::success("Successfully updated hook.")]
    );
}

#[tokio::test(start_paused = true)]
async fn hook_remove_detaches_and_waits_until_gone() {
    let (client, orch, mut alerts) = setup();
    let entry = json!({
        "executionNamespace": NS,
        "phase": "PreBackup",
        "reference": {"name": "h1", "namespace": NS},
        "serviceAccount": "migration-controller"
    });
    client.insert(ResourceKind::MigPlan, plan("plan-a", json!({"hooks": [entry]})));
    client.insert(ResourceKind::MigHook, json!({"metadata": {"name": "h1", "namespace": NS}, "spec": {}}));

    let request = OperationRequest::HookRemove { name: "h1".into(), plan: Some("plan-a".into()) };
    let outcome = orch.start(orch.operation(request)).await.wait().await;
    assert!(outcome.is_success());
    assert!(client.object(ResourceKind::MigHook, NS, "h1").is_none());
    assert_eq!(client.object(ResourceKind::MigPlan, NS, "plan-a").unwrap()["spec"]["hooks"], json!([]));
    assert_eq!(orch.current_plan().map(|p| p.name().to_string()), Some("plan-a".to_string()));
    let notes = notices(&drain(&mut alerts));
    assert_eq!(notes.last(), Some(&Notification::success("Successfully removed hook \"h1\"!")));
}

#[tokio::test(start_paused = true)]
async fn plan_close_waits_for_closed_then_deletes() {
    let (client, orch, mut alerts) = setup();
    client.insert(ResourceKind::MigPlan, plan("plan-a", json!({})));
    client.script_reads(
        ResourceKind::MigPlan,
        vec![
            ReadStep::Merge(json!({})),
            ReadStep::Merge(json!({})),
            ReadStep::conditions(json!([{"type": "Closed"}])),
        ],
    );
    let outcome = orch.start(orch.operation(OperationRequest::PlanClose { plan: "plan-a".into() })).await.wait().await;
    assert!(outcome.is_success());
    assert_eq!(client.count(Verb::Patch, ResourceKind::MigPlan), 1);
    assert!(client.object(ResourceKind::MigPlan, NS, "plan-a").is_none());
    assert_eq!(client.count(Verb::Delete, ResourceKind::MigAnalytic), 1);
    assert!(orch.current_plan().is_none());
    let notes = notices(&drain(&mut alerts));
    assert_eq!(notes.last(), Some(&Notification::success("Successfully removed plan \"plan-a\"!")));
}

#[tokio::test(start_paused = true)]
async fn pv_discovery_chains_status_and_analytics() {
    let (client, orch, _alerts) = setup();
    let mut existing = plan("plan-a", json!({}));
    existing["status"] = json!({"conditions": []});
    client.insert(ResourceKind::MigPlan, existing);
    client.script_reads(ResourceKind::MigPlan, vec![ReadStep::Merge(json!({})), ReadStep::Merge(json!({"spec": {"refresh": false}}))]);

    let mut bus = orch.subscribe();
    let values = PlanValues { namespaces: vec!["app".into()], ..PlanValues::for_plan("plan-a") };
    let outcome = orch.start(orch.operation(OperationRequest::PvDiscovery { values })).await.wait().await;
    assert!(outcome.is_success());

    let mut chained = Vec::new();
    while chained.len() < 2 {
        if let Ok(OperationEvent::Started { kind, .. }) = bus.recv().await {
            if kind != OperationKind::PvDiscovery {
                chained.push(kind);
            }
        }
    }
    chained.sort_by_key(|k| k.label());
    assert_eq!(chained, vec![OperationKind::AnalyticRefresh, OperationKind::PlanStatus]);
    assert!(client.object(ResourceKind::MigAnalytic, NS, "plan-a").is_some());
    assert_eq!(orch.stop_all().await, 2);
    assert!(orch.active_kinds().is_empty());
}

#[tokio::test(start_paused = true)]
async fn analytic_refresh_times_out_after_budget() {
    let (client, orch, mut alerts) = setup();
    client.insert(ResourceKind::MigPlan, plan("plan-a", json!({})));
    client.insert(
        ResourceKind::MigAnalytic,
        json!({"metadata": {"name": "plan-a", "namespace": NS}, "status": {"analytics": {"percentComplete": 100}}}),
    );
    client.script_reads(ResourceKind::MigAnalytic, vec![ReadStep::status(json!({"analytics": {"percentComplete": 40}}))]);

    let t0 = Instant::now();
    let outcome = orch.start(orch.operation(OperationRequest::AnalyticRefresh { plan: "plan-a".into() })).await.wait().await;
    match outcome {
        Outcome::Completed(r) => {
            assert_eq!(r.status, Status::TimedOut);
            assert_eq!(r.subject_name.as_deref(), Some("plan-a"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.count(Verb::Delete, ResourceKind::MigAnalytic), 1);
    assert_eq!(client.count(Verb::Create, ResourceKind::MigAnalytic), 1);
    assert_eq!(client.reads_of(ResourceKind::MigAnalytic, "plan-a"), 240);
    assert!(t0.elapsed() >= Duration::from_secs(239) && t0.elapsed() < Duration::from_secs(241));
    let notes = notices(&drain(&mut alerts));
    assert_eq!(notes.last(), Some(&Notification::error("Timed out during analytics fetch.")));
    assert_eq!(notes.iter().filter(|n| n.severity == Severity::Error).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_all_never_leaves_a_follow_up_running() {
    for round in 0..25u32 {
        let (client, orch, _alerts) = setup();
        client.insert(ResourceKind::MigPlan, plan("plan-a", json!({})));
        let _handle = orch.start(orch.operation(OperationRequest::PlanValidate { values: PlanValues::for_plan("plan-a") })).await;
        for _ in 0..round {
            tokio::task::yield_now().await;
        }
        orch.stop_all().await;
        sleep(Duration::from_millis(20)).await;
        assert!(orch.active_kinds().is_empty(), "round {}: {:?}", round, orch.active_kinds());
    }
}

#[tokio::test(start_paused = true)]
async fn refresh_lists_every_tick_until_stopped() {
    let (client, orch, _alerts) = setup();
    client.insert(ResourceKind::MigPlan, plan("plan-a", json!({})));
    client.insert(ResourceKind::MigPlan, plan("plan-b", json!({})));
    let mut handle = orch.start(orch.operation(OperationRequest::Refresh { kind: ResourceKind::MigPlan })).await;
    assert!(matches!(handle.next().await, Some(OperationEvent::Started { .. })));
    match handle.next().await {
        Some(OperationEvent::Listed { items, .. }) => {
            let names: Vec<&str> = items.iter().map(|r| r.name()).collect();
            assert_eq!(names, vec!["plan-a", "plan-b"]);
        }
        other => panic!("expected Listed, got {:?}", other),
    }
    sleep(Duration::from_secs(11)).await;
    assert_eq!(client.count(Verb::List, ResourceKind::MigPlan), 3);
    assert!(orch.stop(OperationKind::Refresh(ResourceKind::MigPlan)).await);
    assert_eq!(handle.wait().await, Outcome::Stopped);
}

#[tokio::test(start_paused = true)]
async fn cancel_migration_patches_once() {
    let (client, orch, mut alerts) = setup();
    client.insert(
        ResourceKind::MigMigration,
        json!({"metadata": {"name": "migration-abcde", "namespace": NS}, "spec": {"migPlanRef": {"name": "plan-a"}}}),
    );
    assert!(orch.cancel_migration("migration-abcde").await.unwrap());
    assert!(!orch.cancel_migration("migration-abcde").await.unwrap());
    assert_eq!(client.count(Verb::Patch, ResourceKind::MigMigration), 1);
    assert_eq!(
        notices(&drain(&mut alerts)),
        vec![Notification::success("Cancel requested for \"migration-abcde\"!")]
    );
    assert!(orch.cancel_migration("missing").await.is_err());
}

#[tokio::test]
async fn describe_many_classifies_in_input_order() {
    let (client, orch, _alerts) = setup();
    client.insert(
        ResourceKind::Pod,
        json!({"metadata": {"name": "web-0", "namespace": "app"}, "status": {"phase": "Running"}}),
    );
    client.insert(
        ResourceKind::PersistentVolumeClaim,
        json!({"metadata": {"name": "data", "namespace": "app"}, "status": {"phase": "Bound"}}),
    );
    let out = orch
        .describe_many(vec![
            ResourceRef::new(ResourceKind::Pod, "web-0").in_namespace("app"),
            ResourceRef::new(ResourceKind::PersistentVolumeClaim, "data").in_namespace("app"),
            ResourceRef::new(ResourceKind::MigPlan, "missing"),
        ])
        .await;
    let statuses: Vec<Status> = out.iter().map(|d| d.as_ref().unwrap().result.status).collect();
    assert_eq!(statuses, vec![Status::Running, Status::Bound, Status::Pending]);
    assert!(out[2].as_ref().unwrap().resource.is_none());
}
