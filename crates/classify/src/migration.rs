use cutover_core::{Category, ClassificationResult, Resource, Status};

use crate::{terminal_override, Classifier};

/// Classifier for stage, migrate and rollback runs of a MigMigration.
///
/// Results carry the plan name (`spec.migPlanRef.name`) as subject.
///
/// Stage and rollback runs end on a `Warn` condition alone; a final
/// migration only reports `Warn` once it has also succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationClassifier {
    warn_is_terminal: bool,
}

impl MigrationClassifier {
    pub fn stage() -> Self {
        Self { warn_is_terminal: true }
    }

    pub fn rollback() -> Self {
        Self { warn_is_terminal: true }
    }

    pub fn migrate() -> Self {
        Self { warn_is_terminal: false }
    }
}

impl Classifier for MigrationClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let subject = r.mig_plan_ref();
        let conds = r.conditions();
        if let Some(done) = terminal_override(&conds) {
            return done.with_subject(subject);
        }
        if self.warn_is_terminal {
            if let Some(w) = conds.find_category(&Category::Warn) {
                return ClassificationResult::new(Status::Warn).with_optional_message(w.message.as_deref()).with_subject(subject);
            }
        }
        if conds.any_type(&["Succeeded", "Completed"]) {
            let result = match conds.find_category(&Category::Warn) {
                Some(w) => ClassificationResult::new(Status::Warn).with_optional_message(w.message.as_deref()),
                None => ClassificationResult::succeeded(),
            };
            return result.with_subject(subject);
        }
        if r.deletion_timestamp().is_some() {
            return ClassificationResult::new(Status::Terminating).with_subject(subject);
        }
        if conds.any_type(&["Running"]) {
            return ClassificationResult::running().with_subject(subject);
        }
        ClassificationResult::pending().with_subject(subject)
    }
}
