//! Operation requests, lifecycle events and outcomes.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use cutover_core::{ClassificationResult, ClientError, OperationKind, Resource, ResourceKind, Status};

/// What the caller wants to happen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationRequest {
    Stage { plan: String },
    Migrate { plan: String, quiesce: bool },
    Rollback { plan: String },
    PlanValidate { values: PlanValues },
    PvDiscovery { values: PlanValues },
    PlanStatus { plan: String },
    PlanClose { plan: String },
    AnalyticRefresh { plan: String },
    HookCreate { hook: HookSpec, plan: Option<String> },
    HookUpdate { hook: HookSpec, plan: Option<String> },
    HookRemove { name: String, plan: Option<String> },
    Refresh { kind: ResourceKind },
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Stage { .. } => OperationKind::Stage,
            OperationRequest::Migrate { .. } => OperationKind::Migrate,
            OperationRequest::Rollback { .. } => OperationKind::Rollback,
            OperationRequest::PlanValidate { .. } => OperationKind::PlanValidate,
            OperationRequest::PvDiscovery { .. } => OperationKind::PvDiscovery,
            OperationRequest::PlanStatus { .. } => OperationKind::PlanStatus,
            OperationRequest::PlanClose { .. } => OperationKind::PlanClose,
            OperationRequest::AnalyticRefresh { .. } => OperationKind::AnalyticRefresh,
            OperationRequest::HookCreate { .. } => OperationKind::HookCreate,
            OperationRequest::HookUpdate { .. } => OperationKind::HookUpdate,
            OperationRequest::HookRemove { .. } => OperationKind::HookRemove,
            OperationRequest::Refresh { kind } => OperationKind::Refresh(*kind),
        }
    }

    /// Name of the object the operation is about.
    pub fn target(&self) -> String {
        match self {
            OperationRequest::Stage { plan }
            | OperationRequest::Migrate { plan, .. }
            | OperationRequest::Rollback { plan }
            | OperationRequest::PlanStatus { plan }
            | OperationRequest::PlanClose { plan }
            | OperationRequest::AnalyticRefresh { plan } => plan.clone(),
            OperationRequest::PlanValidate { values } | OperationRequest::PvDiscovery { values } => {
                values.plan_name.clone()
            }
            OperationRequest::HookCreate { hook, .. } | OperationRequest::HookUpdate { hook, .. } => hook.name.clone(),
            OperationRequest::HookRemove { name, .. } => name.clone(),
            OperationRequest::Refresh { kind } => kind.plural(),
        }
    }
}

/// A request bound to the namespace it runs in. Immutable once started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub namespace: String,
    pub request: OperationRequest,
}

impl Operation {
    pub fn new(namespace: impl Into<String>, request: OperationRequest) -> Self {
        Self { namespace: namespace.into(), request }
    }

    pub fn kind(&self) -> OperationKind {
        self.request.kind()
    }

    pub fn target(&self) -> String {
        self.request.target()
    }
}

/// Plan edits submitted by validate and PV discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanValues {
    pub plan_name: String,
    pub source_cluster: Option<String>,
    pub target_cluster: Option<String>,
    pub storage: Option<String>,
    pub namespaces: Vec<String>,
    pub persistent_volumes: Vec<PvSelection>,
    pub indirect_image_migration: Option<bool>,
    pub indirect_volume_migration: Option<bool>,
}

impl PlanValues {
    pub fn for_plan(plan: impl Into<String>) -> Self {
        Self { plan_name: plan.into(), ..Self::default() }
    }
}

/// Per-volume choices; unset fields keep what the plan already has.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PvSelection {
    pub name: String,
    pub action: Option<String>,
    pub storage_class: Option<String>,
    pub access_mode: Option<String>,
    pub verify: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookCluster {
    #[default]
    Source,
    Destination,
}

impl HookCluster {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookCluster::Source => "source",
            HookCluster::Destination => "destination",
        }
    }
}

/// A MigHook plus how it attaches to a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HookSpec {
    pub name: String,
    pub image: String,
    /// Ansible playbook text; stored base64-encoded.
    pub playbook: Option<String>,
    pub custom: bool,
    pub target_cluster: HookCluster,
    /// Migration step: PreBackup, PostBackup, PreRestore or PostRestore.
    pub phase: String,
    pub service_account: Option<String>,
    pub execution_namespace: Option<String>,
    pub active_deadline_seconds: Option<u64>,
}

/// Final result of one operation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// The poll loop reached a terminal classification (TimedOut included).
    Completed(ClassificationResult),
    /// Stopped by the caller or superseded by a newer run of the same kind.
    Stopped,
    /// A transient write failure outlasted the retry budget.
    RetryExhausted { attempts: u32, error: ClientError },
    /// A write failed in a way retrying cannot fix.
    WriteRejected { attempts: u32, error: ClientError },
}

impl Outcome {
    pub fn status(&self) -> Option<Status> {
        match self {
            Outcome::Completed(r) => Some(r.status),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status(), Some(Status::Succeeded))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed(r) => r.status.as_str(),
            Outcome::Stopped => "stopped",
            Outcome::RetryExhausted { .. } => "retry_exhausted",
            Outcome::WriteRejected { .. } => "write_rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationEvent {
    /// The initiating write landed (or, for pure reads, polling began).
    Started { id: u64, kind: OperationKind, target: String, resource: String },
    /// Non-terminal tick.
    Progress { id: u64, kind: OperationKind, result: ClassificationResult },
    /// One tick of a list refresh.
    Listed { id: u64, kind: OperationKind, items: Vec<Resource> },
    ReadFailed { id: u64, kind: OperationKind, error: ClientError },
    Finished { id: u64, kind: OperationKind, outcome: Outcome },
}

impl OperationEvent {
    pub fn id(&self) -> u64 {
        match self {
            OperationEvent::Started { id, .. }
            | OperationEvent::Progress { id, .. }
            | OperationEvent::Listed { id, .. }
            | OperationEvent::ReadFailed { id, .. }
            | OperationEvent::Finished { id, .. } => *id,
        }
    }
}

/// Caller's view of one started operation.
#[derive(Debug)]
pub struct OperationHandle {
    pub id: u64,
    pub kind: OperationKind,
    pub(crate) events: mpsc::UnboundedReceiver<OperationEvent>,
}

impl OperationHandle {
    /// Next lifecycle event; `None` after `Finished` has been taken.
    pub async fn next(&mut self) -> Option<OperationEvent> {
        self.events.recv().await
    }

    /// Drain events until the run finishes.
    pub async fn wait(mut self) -> Outcome {
        while let Some(ev) = self.events.recv().await {
            if let OperationEvent::Finished { outcome, .. } = ev {
                return outcome;
            }
        }
        Outcome::Stopped
    }
}
