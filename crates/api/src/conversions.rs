//! Request and patch bodies for the migration resources.

use base64::Engine as _;
use serde_json::{json, Map, Value as Json};

use cutover_core::{Resource, ResourceKind};

use crate::operation::{HookSpec, PlanValues};

/// Which migration a MigMigration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationFlavor {
    Stage,
    Migrate { quiesce: bool },
    Rollback,
}

impl MigrationFlavor {
    pub fn prefix(&self) -> &'static str {
        match self {
            MigrationFlavor::Stage => "stage",
            MigrationFlavor::Migrate { .. } => "migration",
            MigrationFlavor::Rollback => "rollback",
        }
    }

    /// `(stage, quiescePods, rollback)`.
    fn flags(&self) -> (bool, bool, bool) {
        match self {
            MigrationFlavor::Stage => (true, true, false),
            MigrationFlavor::Migrate { quiesce } => (false, *quiesce, false),
            MigrationFlavor::Rollback => (false, false, true),
        }
    }
}

/// `prefix-xxxxx` with five random hex characters.
pub fn generated_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..5])
}

fn type_meta(kind: ResourceKind, name: &str, namespace: &str) -> Map<String, Json> {
    let mut m = Map::new();
    m.insert("apiVersion".into(), Json::String(kind.api_version()));
    m.insert("kind".into(), Json::String(kind.kind().to_string()));
    m.insert("metadata".into(), json!({ "name": name, "namespace": namespace }));
    m
}

pub fn mig_migration_body(name: &str, plan: &str, namespace: &str, flavor: MigrationFlavor) -> Json {
    let (stage, quiesce, rollback) = flavor.flags();
    let mut body = type_meta(ResourceKind::MigMigration, name, namespace);
    body.insert(
        "spec".into(),
        json!({
            "migPlanRef": { "name": plan, "namespace": namespace },
            "stage": stage,
            "quiescePods": quiesce,
            "rollback": rollback,
        }),
    );
    Json::Object(body)
}

/// MigAnalytic for a plan; named after the plan.
pub fn mig_analytic_body(plan: &str, namespace: &str) -> Json {
    let mut body = type_meta(ResourceKind::MigAnalytic, plan, namespace);
    body.insert(
        "spec".into(),
        json!({
            "analyzeImageCount": true,
            "analyzeK8SResources": true,
            "analyzePVCapacity": true,
            "migPlanRef": { "name": plan, "namespace": namespace },
        }),
    );
    Json::Object(body)
}

fn hook_spec_fields(hook: &HookSpec) -> Json {
    let mut spec = Map::new();
    spec.insert("image".into(), Json::String(hook.image.clone()));
    spec.insert("custom".into(), Json::Bool(hook.custom));
    spec.insert("targetCluster".into(), Json::String(hook.target_cluster.as_str().to_string()));
    if let Some(playbook) = &hook.playbook {
        let encoded = base64::engine::general_purpose::STANDARD.encode(playbook.as_bytes());
        spec.insert("playbook".into(), Json::String(encoded));
    }
    if let Some(secs) = hook.active_deadline_seconds {
        spec.insert("activeDeadlineSeconds".into(), json!(secs));
    }
    Json::Object(spec)
}

pub fn mig_hook_body(hook: &HookSpec, namespace: &str) -> Json {
    let mut body = type_meta(ResourceKind::MigHook, &hook.name, namespace);
    body.insert("spec".into(), hook_spec_fields(hook));
    Json::Object(body)
}

/// Merge patch bringing an existing MigHook in line with `hook`.
pub fn hook_patch(hook: &HookSpec) -> Json {
    json!({ "spec": hook_spec_fields(hook) })
}

/// Entry for `spec.hooks` on a plan.
pub fn plan_hook_entry(hook: &HookSpec, namespace: &str) -> Json {
    json!({
        "executionNamespace": hook.execution_namespace,
        "phase": hook.phase,
        "reference": { "name": hook.name, "namespace": namespace },
        "serviceAccount": hook.service_account,
    })
}

fn plan_hooks(plan: &Resource) -> Vec<Json> {
    plan.pointer("/spec/hooks").and_then(|v| v.as_array()).cloned().unwrap_or_default()
}

fn hook_ref_name(entry: &Json) -> Option<&str> {
    entry.pointer("/reference/name").and_then(|v| v.as_str())
}

/// Patch adding `entry` to the plan's hooks, or `None` when a hook for the
/// same phase is already attached.
pub fn plan_hooks_with(plan: &Resource, entry: Json) -> Option<Json> {
    let mut hooks = plan_hooks(plan);
    let phase = entry.get("phase").cloned();
    if hooks.iter().any(|h| h.get("phase").cloned() == phase) {
        return None;
    }
    hooks.push(entry);
    Some(json!({ "spec": { "hooks": hooks } }))
}

/// Patch dropping the entry that references `hook_name`, or `None` if the
/// plan does not reference it.
pub fn plan_hooks_without(plan: &Resource, hook_name: &str) -> Option<Json> {
    let hooks = plan_hooks(plan);
    let kept: Vec<Json> = hooks.iter().filter(|h| hook_ref_name(h) != Some(hook_name)).cloned().collect();
    if kept.len() == hooks.len() {
        return None;
    }
    Some(json!({ "spec": { "hooks": kept } }))
}

/// Patch replacing the entry that references the hook, or `None` if the
/// plan does not reference it.
pub fn plan_hooks_updated(plan: &Resource, hook: &HookSpec, namespace: &str) -> Option<Json> {
    let mut hooks = plan_hooks(plan);
    let slot = hooks.iter_mut().find(|h| hook_ref_name(h) == Some(hook.name.as_str()))?;
    *slot = plan_hook_entry(hook, namespace);
    Some(json!({ "spec": { "hooks": hooks } }))
}

/// Merge patch applying `values` to `plan`. `refresh` asks the controller
/// to rediscover persistent volumes.
pub fn plan_patch_from_values(plan: &Resource, values: &PlanValues, refresh: bool) -> Json {
    let ns = plan.namespace().unwrap_or_default();
    let mut spec = Map::new();
    let named_ref = |name: &str| json!({ "name": name, "namespace": ns });
    if let Some(src) = &values.source_cluster {
        spec.insert("srcMigClusterRef".into(), named_ref(src));
    }
    if let Some(dst) = &values.target_cluster {
        spec.insert("destMigClusterRef".into(), named_ref(dst));
    }
    if let Some(storage) = &values.storage {
        spec.insert("migStorageRef".into(), named_ref(storage));
    }
    if !values.namespaces.is_empty() {
        spec.insert("namespaces".into(), json!(values.namespaces));
    }
    if let Some(flag) = values.indirect_image_migration {
        spec.insert("indirectImageMigration".into(), Json::Bool(flag));
    }
    if let Some(flag) = values.indirect_volume_migration {
        spec.insert("indirectVolumeMigration".into(), Json::Bool(flag));
    }
    if !values.persistent_volumes.is_empty() {
        if let Some(pvs) = plan.pointer("/spec/persistentVolumes").and_then(|v| v.as_array()) {
            spec.insert("persistentVolumes".into(), Json::Array(pvs.iter().map(|pv| select_pv(pv, values)).collect()));
        }
    }
    if refresh {
        spec.insert("refresh".into(), Json::Bool(true));
    }
    json!({ "spec": spec })
}

fn select_pv(pv: &Json, values: &PlanValues) -> Json {
    let mut out = pv.clone();
    let name = pv.get("name").and_then(|v| v.as_str());
    let Some(sel) = values.persistent_volumes.iter().find(|s| Some(s.name.as_str()) == name) else {
        return out;
    };
    let Some(selection) = out.as_object_mut().map(|o| o.entry("selection").or_insert_with(|| json!({}))) else {
        return out;
    };
    if let Some(obj) = selection.as_object_mut() {
        if let Some(action) = &sel.action {
            obj.insert("action".into(), Json::String(action.clone()));
        }
        if let Some(sc) = &sel.storage_class {
            obj.insert("storageClass".into(), Json::String(sc.clone()));
        }
        if let Some(mode) = &sel.access_mode {
            obj.insert("accessMode".into(), Json::String(mode.clone()));
        }
        if let Some(verify) = sel.verify {
            obj.insert("verify".into(), Json::Bool(verify));
        }
    }
    out
}

/// Whether `values` moves any volume of `plan` to a different storage class.
pub fn storage_class_reassigned(plan: &Resource, values: &PlanValues) -> bool {
    let Some(pvs) = plan.pointer("/spec/persistentVolumes").and_then(|v| v.as_array()) else {
        return false;
    };
    pvs.iter().any(|pv| {
        let name = pv.get("name").and_then(|v| v.as_str());
        let current = pv.pointer("/selection/storageClass").and_then(|v| v.as_str());
        values
            .persistent_volumes
            .iter()
            .filter(|s| Some(s.name.as_str()) == name)
            .any(|s| (current.is_some() || s.storage_class.is_some()) && s.storage_class.as_deref() != current)
    })
}

pub fn closed_patch() -> Json {
    json!({ "spec": { "closed": true } })
}

pub fn canceled_patch() -> Json {
    json!({ "spec": { "canceled": true } })
}
