//! Plan lifecycle classifiers.

use cutover_core::{Category, ClassificationResult, Resource, Status};

use crate::{terminal_override, Classifier};

/// Readiness of a MigPlan after validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanStatusClassifier;

impl Classifier for PlanStatusClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let subject = Some(r.name());
        let conds = r.conditions();
        if let Some(done) = terminal_override(&conds) {
            return done.with_subject(subject);
        }
        if let Some(c) = conds.find_category(&Category::Error).or_else(|| conds.find_type("PlanConflict")) {
            return ClassificationResult::failed(c.message.clone()).with_subject(subject);
        }
        if conds.find_type("Ready").is_some() {
            let result = match conds.find_category(&Category::Warn) {
                Some(w) => ClassificationResult::new(Status::Warn).with_optional_message(w.message.as_deref()),
                None => ClassificationResult::succeeded(),
            };
            return result.with_subject(subject);
        }
        ClassificationResult::pending().with_subject(subject)
    }
}

/// Waits for the controller to acknowledge a validation patch.
///
/// When the patch reassigned storage classes the plan is only settled once
/// `status.observedDigest` moves away from the baseline taken before the write.
#[derive(Debug, Clone, Default)]
pub struct PlanValidateClassifier {
    baseline_digest: Option<String>,
    awaiting_digest: bool,
}

impl PlanValidateClassifier {
    pub fn immediate() -> Self {
        Self { baseline_digest: None, awaiting_digest: false }
    }

    pub fn awaiting_digest_change(baseline: Option<&str>) -> Self {
        Self { baseline_digest: baseline.map(|d| d.to_string()), awaiting_digest: true }
    }
}

impl Classifier for PlanValidateClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let subject = Some(r.name());
        if let Some(done) = terminal_override(&r.conditions()) {
            return done.with_subject(subject);
        }
        if !self.awaiting_digest {
            return ClassificationResult::succeeded().with_subject(subject);
        }
        match r.observed_digest() {
            Some(d) if Some(d) != self.baseline_digest.as_deref() => ClassificationResult::succeeded().with_subject(subject),
            _ => ClassificationResult::pending().with_subject(subject),
        }
    }
}

/// Persistent volume discovery on a MigPlan.
///
/// A plan that already had a status is done once `spec.refresh` clears; a
/// brand-new plan is done once any status appears.
#[derive(Debug, Clone, Copy)]
pub struct PvDiscoveryClassifier {
    had_status: bool,
}

impl PvDiscoveryClassifier {
    pub fn new(had_status: bool) -> Self {
        Self { had_status }
    }
}

impl Classifier for PvDiscoveryClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let subject = Some(r.name());
        if let Some(done) = terminal_override(&r.conditions()) {
            return done.with_subject(subject);
        }
        let settled = if self.had_status { !r.spec_flag("refresh") } else { r.has_status() };
        if settled {
            ClassificationResult::succeeded().with_subject(subject)
        } else if self.had_status {
            ClassificationResult::running().with_subject(subject)
        } else {
            ClassificationResult::pending().with_subject(subject)
        }
    }
}

/// Succeeds once the plan reports a `Closed` condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanClosedClassifier;

impl Classifier for PlanClosedClassifier {
    fn classify(&self, resource: Option<&Resource>) -> ClassificationResult {
        let Some(r) = resource else { return ClassificationResult::pending() };
        let subject = Some(r.name());
        let conds = r.conditions();
        if let Some(done) = terminal_override(&conds) {
            return done.with_subject(subject);
        }
        if conds.find_type("Closed").is_some() {
            ClassificationResult::succeeded().with_subject(subject)
        } else {
            ClassificationResult::pending().with_subject(subject)
        }
    }
}
