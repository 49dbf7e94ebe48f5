//! Resource-tree classifiers: one summary status per object for display.

use serde::{Deserialize, Serialize};

use cutover_core::{Category, ClassificationResult, Resource, Status};

use crate::Classifier;

/// Signals observed on one object. Several may hold at once; [`StatusFlags::current`]
/// picks one by the fixed priority
/// Terminating > Running > Failure > Canceled > Warning > Pending > Bound > Admitted > Completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub terminating: bool,
    pub running: bool,
    pub failure: bool,
    pub canceled: bool,
    pub warning: bool,
    pub pending: bool,
    pub bound: bool,
    pub admitted: bool,
    pub completed: bool,
}

impl StatusFlags {
    /// No signal reads as Pending.
    pub fn current(&self) -> Status {
        let order = [
            (self.terminating, Status::Terminating),
            (self.running, Status::Running),
            (self.failure, Status::Failed),
            (self.canceled, Status::Canceled),
            (self.warning, Status::Warn),
            (self.pending, Status::Pending),
            (self.bound, Status::Bound),
            (self.admitted, Status::Admitted),
            (self.completed, Status::Completed),
        ];
        order.iter().find(|(set, _)| *set).map(|(_, s)| *s).unwrap_or(Status::Pending)
    }

    fn result(&self, r: &Resource, message: Option<&str>) -> ClassificationResult {
        ClassificationResult::new(self.current()).with_optional_message(message).with_subject(Some(r.name()))
    }
}

fn terminating(r: &Resource) -> bool {
    r.deletion_timestamp().is_some()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PodClassifier;

impl Classifier for PodClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let phase = r.phase().unwrap_or("");
        let flags = StatusFlags {
            terminating: terminating(r),
            failure: matches!(phase, "Failed" | "Unknown"),
            completed: phase == "Succeeded",
            running: phase == "Running",
            pending: phase == "Pending",
            ..Default::default()
        };
        let message = r.pointer("/status/message").and_then(|v| v.as_str());
        flags.result(r, message)
    }
}

/// PersistentVolumeClaim by phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimClassifier;

impl Classifier for ClaimClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let phase = r.phase().unwrap_or("");
        let flags = StatusFlags {
            terminating: terminating(r),
            failure: phase == "Lost",
            pending: phase == "Pending",
            bound: phase == "Bound",
            ..Default::default()
        };
        flags.result(r, None)
    }
}

/// PersistentVolume by phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeClassifier;

impl Classifier for VolumeClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let phase = r.phase().unwrap_or("");
        let flags = StatusFlags {
            terminating: terminating(r),
            failure: phase == "Failed",
            pending: phase == "Pending",
            bound: phase == "Bound",
            ..Default::default()
        };
        let message = r.pointer("/status/message").and_then(|v| v.as_str());
        flags.result(r, message)
    }
}

/// How route ingress condition statuses combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteAdmission {
    /// Admitted if any ingress admitted the route, else Pending if any
    /// refused it, else Failure if any is unknown.
    #[default]
    AnyAdmitted,
    /// The last condition status seen across all ingress entries decides.
    LastSeen,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteClassifier {
    policy: RouteAdmission,
}

impl RouteClassifier {
    pub fn new(policy: RouteAdmission) -> Self {
        Self { policy }
    }
}

impl Classifier for RouteClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let statuses: Vec<&str> = r
            .pointer("/status/ingress")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|ing| ing.get("conditions").and_then(|c| c.as_array()))
            .flatten()
            .filter_map(|c| c.get("status").and_then(|s| s.as_str()))
            .collect();
        let mut flags = StatusFlags { terminating: terminating(r), ..Default::default() };
        let set = |flags: &mut StatusFlags, s: &str| match s {
            "True" => flags.admitted = true,
            "False" => flags.pending = true,
            "Unknown" => flags.failure = true,
            _ => {}
        };
        match self.policy {
            RouteAdmission::LastSeen => {
                if let Some(last) = statuses.last() {
                    set(&mut flags, last);
                }
            }
            RouteAdmission::AnyAdmitted => {
                if statuses.contains(&"True") {
                    flags.admitted = true;
                } else if statuses.contains(&"False") {
                    flags.pending = true;
                } else if let Some(s) = statuses.first() {
                    set(&mut flags, s);
                }
            }
        }
        flags.result(r, None)
    }
}

/// Velero Backup and Restore.
#[derive(Debug, Clone, Copy, Default)]
pub struct VeleroClassifier;

impl Classifier for VeleroClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let phase = r.phase().unwrap_or("");
        let flags = StatusFlags {
            terminating: terminating(r),
            warning: r.status_count("warnings") > 0 || phase == "PartiallyFailed",
            failure: r.status_count("errors") > 0 || phase == "Failed",
            completed: phase == "Completed",
            running: phase == "InProgress",
            ..Default::default()
        };
        let message = r.pointer("/status/failureReason").and_then(|v| v.as_str());
        flags.result(r, message)
    }
}

/// Velero PodVolumeBackup and PodVolumeRestore, by phase only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PodVolumeClassifier;

impl Classifier for PodVolumeClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let phase = r.phase().unwrap_or("");
        let flags = StatusFlags {
            terminating: terminating(r),
            warning: phase == "PartiallyFailed",
            failure: phase == "Failed",
            completed: phase == "Completed",
            running: phase == "InProgress",
            ..Default::default()
        };
        let message = r.pointer("/status/message").and_then(|v| v.as_str());
        flags.result(r, message)
    }
}

/// Condition-reporting migration kinds (MigPlan, MigMigration and the direct migrations).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionTreeClassifier;

impl Classifier for ConditionTreeClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let conds = r.conditions();
        let warn = conds.iter().find(|c| matches!(c.category, Some(Category::Error) | Some(Category::Warn)));
        let failure = conds.failure();
        let flags = StatusFlags {
            terminating: terminating(r),
            failure: failure.is_some(),
            canceled: conds.any_type(&["Canceled"]),
            warning: warn.is_some(),
            completed: conds.any_type(&["Completed", "Succeeded"]),
            running: conds.any_type(&["Running"]),
            ..Default::default()
        };
        let message = failure.or(warn).and_then(|c| c.message.as_deref());
        flags.result(r, message)
    }
}

/// DirectVolumeMigrationProgress: per-pod rsync progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressClassifier;

impl Classifier for ProgressClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let conds = r.conditions();
        let failure = conds.iter().find(|c| c.is_failure() || matches!(c.kind.as_str(), "InvalidPod" | "InvalidPodRef"));
        let warn = conds.iter().find(|c| matches!(c.category, Some(Category::Error) | Some(Category::Warn)));
        let flags = StatusFlags {
            terminating: terminating(r),
            failure: failure.is_some(),
            warning: warn.is_some(),
            ..Default::default()
        };
        let message = failure.or(warn).and_then(|c| c.message.as_deref());
        flags.result(r, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn obj(v: Value) -> Resource {
        Resource::from_value(v)
    }

    #[test]
    fn priority_order_is_fixed() {
        let all = StatusFlags {
            terminating: true,
            running: true,
            failure: true,
            canceled: true,
            warning: true,
            pending: true,
            bound: true,
            admitted: true,
            completed: true,
        };
        assert_eq!(all.current(), Status::Terminating);
        assert_eq!(StatusFlags { terminating: false, ..all }.current(), Status::Running);
        assert_eq!(StatusFlags { failure: true, warning: true, completed: true, ..Default::default() }.current(), Status::Failed);
        assert_eq!(StatusFlags { bound: true, completed: true, ..Default::default() }.current(), Status::Bound);
        assert_eq!(StatusFlags::default().current(), Status::Pending);
    }

    #[test]
    fn pod_phases() {
        let pod = |phase: &str| obj(json!({"metadata": {"name": "p"}, "status": {"phase": phase}}));
        assert_eq!(PodClassifier.classify(Some(&pod("Unknown"))).status, Status::Failed);
        assert_eq!(PodClassifier.classify(Some(&pod("Succeeded"))).status, Status::Completed);
        assert_eq!(PodClassifier.classify(Some(&pod("Running"))).status, Status::Running);
        let deleting = obj(json!({"metadata": {"name": "p", "deletionTimestamp": "t"}, "status": {"phase": "Succeeded"}}));
        assert_eq!(PodClassifier.classify(Some(&deleting)).status, Status::Terminating);
    }

    #[test]
    fn claims_and_volumes_use_phase() {
        let with_phase = |phase: &str| obj(json!({"metadata": {"name": "v"}, "status": {"phase": phase}}));
        assert_eq!(ClaimClassifier.classify(Some(&with_phase("Lost"))).status, Status::Failed);
        assert_eq!(ClaimClassifier.classify(Some(&with_phase("Bound"))).status, Status::Bound);
        assert_eq!(VolumeClassifier.classify(Some(&with_phase("Failed"))).status, Status::Failed);
        assert_eq!(VolumeClassifier.classify(Some(&with_phase("Available"))).status, Status::Pending);
        let bare = obj(json!({"metadata": {"name": "v"}}));
        assert_eq!(ClaimClassifier.classify(Some(&bare)).status, Status::Pending);
    }

    #[test]
    fn route_policies_differ_on_mixed_ingress() {
        let route = obj(json!({
            "metadata": {"name": "web"},
            "status": {"ingress": [
                {"conditions": [{"type": "Admitted", "status": "True"}]},
                {"conditions": [{"type": "Admitted", "status": "False"}]}
            ]}
        }));
        assert_eq!(RouteClassifier::new(RouteAdmission::AnyAdmitted).classify(Some(&route)).status, Status::Admitted);
        assert_eq!(RouteClassifier::new(RouteAdmission::LastSeen).classify(Some(&route)).status, Status::Pending);

        let unknown = obj(json!({"metadata": {"name": "web"}, "status": {"ingress": [{"conditions": [{"status": "Unknown"}]}]}}));
        assert_eq!(RouteClassifier::default().classify(Some(&unknown)).status, Status::Failed);
        let no_ingress = obj(json!({"metadata": {"name": "web"}, "status": {}}));
        assert_eq!(RouteClassifier::default().classify(Some(&no_ingress)).status, Status::Pending);
    }

    #[test]
    fn velero_counts_and_phases() {
        let backup = |status: Value| obj(json!({"metadata": {"name": "b"}, "status": status}));
        assert_eq!(VeleroClassifier.classify(Some(&backup(json!({"phase": "Completed"})))).status, Status::Completed);
        assert_eq!(VeleroClassifier.classify(Some(&backup(json!({"phase": "Completed", "warnings": 3})))).status, Status::Warn);
        assert_eq!(VeleroClassifier.classify(Some(&backup(json!({"phase": "PartiallyFailed", "errors": 1})))).status, Status::Failed);
        assert_eq!(VeleroClassifier.classify(Some(&backup(json!({"phase": "InProgress", "errors": 1})))).status, Status::Running);
        assert_eq!(PodVolumeClassifier.classify(Some(&backup(json!({"phase": "PartiallyFailed"})))).status, Status::Warn);
    }

    #[test]
    fn condition_tree_kinds() {
        let m = |conds: Value| obj(json!({"metadata": {"name": "dvm"}, "status": {"conditions": conds}}));
        let out = ConditionTreeClassifier.classify(Some(&m(json!([{"type": "Succeeded"}, {"type": "X", "category": "Warn", "message": "w"}]))));
        assert_eq!(out.status, Status::Warn);
        assert_eq!(out.message.as_deref(), Some("w"));
        assert_eq!(ConditionTreeClassifier.classify(Some(&m(json!([{"type": "Completed"}])))).status, Status::Completed);
        assert_eq!(ConditionTreeClassifier.classify(Some(&m(json!([{"type": "Running"}, {"type": "Failed"}])))).status, Status::Running);
        assert_eq!(ProgressClassifier.classify(Some(&m(json!([{"type": "InvalidPod", "message": "gone"}])))).status, Status::Failed);
    }
}
