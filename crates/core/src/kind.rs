use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const MIGRATION_GROUP: &str = "migration.openshift.io";
const MIGRATION_VERSION: &str = "v1alpha1";
const VELERO_GROUP: &str = "velero.io";

/// Remote resource kinds the engine reads or writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    MigPlan,
    MigMigration,
    MigHook,
    MigAnalytic,
    Pod,
    PersistentVolumeClaim,
    PersistentVolume,
    Route,
    Backup,
    Restore,
    PodVolumeBackup,
    PodVolumeRestore,
    DirectImageMigration,
    DirectVolumeMigration,
    DirectImageStreamMigration,
    DirectVolumeMigrationProgress,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 16] = [
        ResourceKind::MigPlan,
        ResourceKind::MigMigration,
        ResourceKind::MigHook,
        ResourceKind::MigAnalytic,
        ResourceKind::Pod,
        ResourceKind::PersistentVolumeClaim,
        ResourceKind::PersistentVolume,
        ResourceKind::Route,
        ResourceKind::Backup,
        ResourceKind::Restore,
        ResourceKind::PodVolumeBackup,
        ResourceKind::PodVolumeRestore,
        ResourceKind::DirectImageMigration,
        ResourceKind::DirectVolumeMigration,
        ResourceKind::DirectImageStreamMigration,
        ResourceKind::DirectVolumeMigrationProgress,
    ];

    /// Kind name as served by the API.
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceKind::MigPlan => "MigPlan",
            ResourceKind::MigMigration => "MigMigration",
            ResourceKind::MigHook => "MigHook",
            ResourceKind::MigAnalytic => "MigAnalytic",
            ResourceKind::Pod => "Pod",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::PersistentVolume => "PersistentVolume",
            ResourceKind::Route => "Route",
            ResourceKind::Backup => "Backup",
            ResourceKind::Restore => "Restore",
            ResourceKind::PodVolumeBackup => "PodVolumeBackup",
            ResourceKind::PodVolumeRestore => "PodVolumeRestore",
            ResourceKind::DirectImageMigration => "DirectImageMigration",
            ResourceKind::DirectVolumeMigration => "DirectVolumeMigration",
            ResourceKind::DirectImageStreamMigration => "DirectImageStreamMigration",
            ResourceKind::DirectVolumeMigrationProgress => "DirectVolumeMigrationProgress",
        }
    }

    pub fn group(&self) -> &'static str {
        match self {
            ResourceKind::Pod | ResourceKind::PersistentVolumeClaim | ResourceKind::PersistentVolume => "",
            ResourceKind::Route => "route.openshift.io",
            ResourceKind::Backup
            | ResourceKind::Restore
            | ResourceKind::PodVolumeBackup
            | ResourceKind::PodVolumeRestore => VELERO_GROUP,
            _ => MIGRATION_GROUP,
        }
    }

    pub fn version(&self) -> &'static str {
        match self.group() {
            "" | VELERO_GROUP | "route.openshift.io" => "v1",
            _ => MIGRATION_VERSION,
        }
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        match self.group() {
            "" => self.version().to_string(),
            g => format!("{}/{}", g, self.version()),
        }
    }

    /// Lowercase plural used in request paths.
    pub fn plural(&self) -> String {
        let lower = self.kind().to_ascii_lowercase();
        if lower.ends_with('s') { format!("{}es", lower) } else { format!("{}s", lower) }
    }

    pub fn namespaced(&self) -> bool {
        !matches!(self, ResourceKind::PersistentVolume)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let alias = match lower.as_str() {
            "plan" | "plans" => Some(ResourceKind::MigPlan),
            "migration" | "migrations" => Some(ResourceKind::MigMigration),
            "hook" | "hooks" => Some(ResourceKind::MigHook),
            "analytic" | "analytics" => Some(ResourceKind::MigAnalytic),
            "pvc" => Some(ResourceKind::PersistentVolumeClaim),
            "pv" => Some(ResourceKind::PersistentVolume),
            "pvb" => Some(ResourceKind::PodVolumeBackup),
            "pvr" => Some(ResourceKind::PodVolumeRestore),
            "dim" => Some(ResourceKind::DirectImageMigration),
            "dvm" => Some(ResourceKind::DirectVolumeMigration),
            "dism" => Some(ResourceKind::DirectImageStreamMigration),
            "dvmp" => Some(ResourceKind::DirectVolumeMigrationProgress),
            _ => None,
        };
        if let Some(k) = alias {
            return Ok(k);
        }
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|k| k.kind().eq_ignore_ascii_case(&lower) || k.plural() == lower)
            .ok_or_else(|| format!("unknown resource kind: {}", s))
    }
}

/// Lifecycle actions the orchestrator runs; at most one active loop per value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Stage,
    Migrate,
    Rollback,
    PlanValidate,
    PvDiscovery,
    PlanStatus,
    PlanClose,
    AnalyticRefresh,
    HookCreate,
    HookUpdate,
    HookRemove,
    /// Pure-read list loop over one kind.
    Refresh(ResourceKind),
}

impl OperationKind {
    /// Short label for logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Stage => "stage",
            OperationKind::Migrate => "migrate",
            OperationKind::Rollback => "rollback",
            OperationKind::PlanValidate => "plan_validate",
            OperationKind::PvDiscovery => "pv_discovery",
            OperationKind::PlanStatus => "plan_status",
            OperationKind::PlanClose => "plan_close",
            OperationKind::AnalyticRefresh => "analytic_refresh",
            OperationKind::HookCreate => "hook_create",
            OperationKind::HookUpdate => "hook_update",
            OperationKind::HookRemove => "hook_remove",
            OperationKind::Refresh(_) => "refresh",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Refresh(k) => write!(f, "refresh({})", k),
            other => f.write_str(other.label()),
        }
    }
}
