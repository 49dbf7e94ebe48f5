//! Condition classifiers: pure mappings from a resource snapshot to a
//! [`ClassificationResult`].
//!
//! Two families live here. Operation classifiers decide when a poll loop
//! is done (failure and cancellation win over everything else). Resource-tree
//! classifiers summarize one object for display using a fixed signal priority,
//! see [`tree::StatusFlags`]. Both implement [`Classifier`] and can be looked
//! up by kind through [`ClassifierTable`].

#![forbid(unsafe_code)]

use std::sync::Arc;

use rustc_hash::FxHashMap;

use cutover_core::{ClassificationResult, Conditions, Resource, ResourceKind, Status};

pub mod lifecycle;
pub mod migration;
pub mod plan;
pub mod tree;

pub use lifecycle::{AnalyticClassifier, HookReadyClassifier, HookRemovedClassifier};
pub use migration::MigrationClassifier;
pub use plan::{PlanClosedClassifier, PlanStatusClassifier, PlanValidateClassifier, PvDiscoveryClassifier};
pub use tree::{RouteAdmission, StatusFlags};

/// Maps the current snapshot of a resource to a status.
///
/// `None` means the resource does not exist (yet, or any more).
/// Implementations must be deterministic in their input.
pub trait Classifier: Send + Sync {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult;
}

impl<F> Classifier for F
where
    F: Fn(Option<&Resource>) -> ClassificationResult + Send + Sync,
{
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        self(resource)
    }
}

/// Failure or cancellation signals that end any operation regardless of
/// what else the condition list says. Failure ranks above cancellation.
pub fn terminal_override(conditions: &Conditions) -> Option<ClassificationResult> {
    if let Some(c) = conditions.failure() {
        return Some(ClassificationResult::failed(c.message.clone()));
    }
    conditions
        .find_type("Canceled")
        .map(|c| ClassificationResult::new(Status::Canceled).with_optional_message(c.message.as_deref()))
}

/// Kind → classifier mapping used for one-shot resource summaries.
#[derive(Clone, Default)]
pub struct ClassifierTable {
    by_kind: FxHashMap<ResourceKind, Arc<dyn Classifier>>,
}

impl ClassifierTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table covering every kind the debug tree can show.
    pub fn resource_tree(route: RouteAdmission) -> Self {
        let mut t = Self::empty();
        t.register(ResourceKind::Pod, tree::PodClassifier);
        t.register(ResourceKind::PersistentVolumeClaim, tree::ClaimClassifier);
        t.register(ResourceKind::PersistentVolume, tree::VolumeClassifier);
        t.register(ResourceKind::Route, tree::RouteClassifier::new(route));
        t.register(ResourceKind::Backup, tree::VeleroClassifier);
        t.register(ResourceKind::Restore, tree::VeleroClassifier);
        t.register(ResourceKind::PodVolumeBackup, tree::PodVolumeClassifier);
        t.register(ResourceKind::PodVolumeRestore, tree::PodVolumeClassifier);
        for kind in [
            ResourceKind::DirectImageMigration,
            ResourceKind::DirectVolumeMigration,
            ResourceKind::DirectImageStreamMigration,
            ResourceKind::MigMigration,
            ResourceKind::MigPlan,
        ] {
            t.register(kind, tree::ConditionTreeClassifier);
        }
        t.register(ResourceKind::DirectVolumeMigrationProgress, tree::ProgressClassifier);
        t.register(ResourceKind::MigHook, HookReadyClassifier);
        t.register(ResourceKind::MigAnalytic, AnalyticClassifier);
        t
    }

    pub fn register<C: Classifier + 'static>(&mut self, kind: ResourceKind, classifier: C) {
        self.by_kind.insert(kind, Arc::new(classifier));
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&dyn Classifier> {
        self.by_kind.get(&kind).map(|c| c.as_ref())
    }

    /// Classify with the registered classifier; unknown kinds read as Pending.
    pub fn classify(&self, kind: ResourceKind, resource: Option<&Resource>) -> ClassificationResult {
        match self.get(kind) {
            Some(c) => c.classify(resource),
            None => {
                tracing::debug!(kind = %kind, "classify: no classifier registered");
                ClassificationResult::pending()
            }
        }
    }
}
