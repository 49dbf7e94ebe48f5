use cutover_core::{ClassificationResult, Resource, Status};

use crate::{terminal_override, Classifier};

/// MigAnalytic refresh: done at `status.analytics.percentComplete == 100`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyticClassifier;

impl Classifier for AnalyticClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let subject = Some(r.name());
        if let Some(done) = terminal_override(&r.conditions()) {
            return done.with_subject(subject);
        }
        let percent = r.pointer("/status/analytics/percentComplete").and_then(|v| v.as_f64());
        match percent {
            Some(p) if p >= 100.0 => ClassificationResult::succeeded().with_subject(subject),
            Some(p) => ClassificationResult::running().with_message(format!("{}% complete", p)).with_subject(subject),
            None => ClassificationResult::pending().with_subject(subject),
        }
    }
}

/// A created or updated MigHook is usable once it reports `Ready`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookReadyClassifier;

impl Classifier for HookReadyClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let subject = Some(r.name());
        let conds = r.conditions();
        if let Some(done) = terminal_override(&conds) {
            return done.with_subject(subject);
        }
        if conds.find_type("Ready").is_some() {
            ClassificationResult::succeeded().with_subject(subject)
        } else {
            ClassificationResult::pending().with_subject(subject)
        }
    }
}

/// A removed MigHook is done once reads stop finding it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookRemovedClassifier;

impl Classifier for HookRemovedClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::succeeded() };
        let subject = Some(r.name());
        if let Some(done) = terminal_override(&r.conditions()) {
            return done.with_subject(subject);
        }
        let status = if r.deletion_timestamp().is_some() { Status::Terminating } else { Status::Pending };
        ClassificationResult::new(status).with_subject(subject)
    }
}
