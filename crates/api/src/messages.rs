//! Notification wording for operation starts and outcomes.

use cutover_core::{ClassificationResult, OperationKind, Status};

use crate::notify::Notification;
use crate::operation::Outcome;

/// Names used by the stage / migrate / rollback wording.
struct MigrationWords {
    started: &'static str,
    succeeded: &'static str,
    failed: &'static str,
    canceled: &'static str,
}

fn migration_words(kind: OperationKind) -> Option<MigrationWords> {
    match kind {
        OperationKind::Stage => Some(MigrationWords {
            started: "Staging Started",
            succeeded: "Staging Successful",
            failed: "Staging Failed",
            canceled: "Staging canceled",
        }),
        OperationKind::Migrate => Some(MigrationWords {
            started: "Migration Started",
            succeeded: "Migration Successful",
            failed: "Migration Failed",
            canceled: "Migration canceled",
        }),
        OperationKind::Rollback => Some(MigrationWords {
            started: "Rollback Started",
            succeeded: "Rollback Successful",
            failed: "Rollback Failed",
            canceled: "Rollback canceled",
        }),
        _ => None,
    }
}

/// Progress notice sent once the initiating write landed.
pub fn started(kind: OperationKind, target: &str) -> Option<Notification> {
    if let Some(w) = migration_words(kind) {
        return Some(Notification::progress(w.started));
    }
    let text = match kind {
        OperationKind::PlanValidate => format!("Validating plan \"{}\"", target),
        OperationKind::PvDiscovery => format!("Discovering persistent volumes for plan \"{}\"", target),
        OperationKind::PlanClose => format!("Closing plan \"{}\"", target),
        OperationKind::AnalyticRefresh => format!("Refreshing analytics for plan \"{}\"", target),
        OperationKind::HookCreate => format!("Adding hook \"{}\"", target),
        OperationKind::HookUpdate => format!("Updating hook \"{}\"", target),
        OperationKind::HookRemove => format!("Removing hook \"{}\"", target),
        _ => return None,
    };
    Some(Notification::progress(text))
}

/// The one notification for a finished run. A caller stop gets none.
pub fn finished(kind: OperationKind, target: &str, outcome: &Outcome) -> Option<Notification> {
    match outcome {
        Outcome::Stopped => None,
        Outcome::Completed(result) => Some(completed(kind, target, result)),
        Outcome::RetryExhausted { error, .. } | Outcome::WriteRejected { error, .. } => {
            Some(Notification::error(format!("{}: {}", write_failed(kind, target), error)))
        }
    }
}

fn completed(kind: OperationKind, target: &str, r: &ClassificationResult) -> Notification {
    let msg = r.message.as_deref();
    if let Some(w) = migration_words(kind) {
        return match r.status {
            Status::Succeeded => Notification::success(w.succeeded),
            Status::Canceled => Notification::success(w.canceled),
            Status::Warn if kind == OperationKind::Stage => {
                Notification::warn(format!("Warning(s) occurred during stage: {}", msg.unwrap_or_default()))
            }
            Status::Warn => {
                let noun = if kind == OperationKind::Rollback { "Rollback" } else { "Migration" };
                Notification::warn(format!("{} succeeded with warnings. {}", noun, msg.unwrap_or_default()))
            }
            Status::TimedOut => Notification::error(format!("Timed out waiting for \"{}\"", target)),
            _ => Notification::error(msg.unwrap_or(w.failed)),
        };
    }
    match (kind, r.status) {
        (OperationKind::PlanClose, Status::Succeeded) => {
            Notification::success(format!("Successfully removed plan \"{}\"!", target))
        }
        (OperationKind::PlanClose, Status::TimedOut) => {
            Notification::error(format!("Timed out during plan close {}", target))
        }
        (OperationKind::PvDiscovery, Status::TimedOut) => Notification::error("Timed out during PV discovery"),
        (OperationKind::AnalyticRefresh, Status::TimedOut) => Notification::error("Timed out during analytics fetch."),
        (OperationKind::PlanStatus, Status::TimedOut) => {
            Notification::error(format!("Timed out waiting for plan \"{}\" to become ready", target))
        }
        (OperationKind::PlanValidate, Status::TimedOut) => {
            Notification::error(format!("Timed out waiting for plan \"{}\" to accept changes", target))
        }
        (OperationKind::HookCreate, Status::Succeeded) => Notification::success("Successfully added a hook to plan."),
        (OperationKind::HookUpdate, Status::Succeeded) => Notification::success("Successfully updated hook."),
        (OperationKind::HookRemove, Status::Succeeded) => {
            Notification::success(format!("Successfully removed hook \"{}\"!", target))
        }
        (OperationKind::PlanStatus, Status::Succeeded) => Notification::success(format!("Plan \"{}\" is ready", target)),
        (OperationKind::PlanStatus, Status::Warn) => {
            Notification::warn(format!("Plan \"{}\" is ready with warnings: {}", target, msg.unwrap_or_default()))
        }
        (OperationKind::PlanValidate, Status::Succeeded) => {
            Notification::success(format!("Plan \"{}\" updated", target))
        }
        (OperationKind::PvDiscovery, Status::Succeeded) => {
            Notification::success(format!("Persistent volumes discovered for plan \"{}\"", target))
        }
        (OperationKind::AnalyticRefresh, Status::Succeeded) => {
            Notification::success(format!("Analytics refreshed for plan \"{}\"", target))
        }
        (_, Status::Succeeded) => Notification::success(format!("{} finished", kind)),
        (_, Status::Warn) => Notification::warn(msg.unwrap_or("Finished with warnings").to_string()),
        (_, Status::Canceled) => Notification::success(format!("{} canceled", kind)),
        (_, Status::TimedOut) => Notification::error(format!("Timed out during {}", kind)),
        _ => Notification::error(msg.map(str::to_string).unwrap_or_else(|| write_failed(kind, target))),
    }
}

fn write_failed(kind: OperationKind, target: &str) -> String {
    match kind {
        OperationKind::Stage => "Staging Failed".to_string(),
        OperationKind::Migrate => "Migration Failed".to_string(),
        OperationKind::Rollback => "Rollback Failed".to_string(),
        OperationKind::PlanValidate => format!("Failed to update plan \"{}\"", target),
        OperationKind::PvDiscovery => format!("PV discovery request failed for plan \"{}\"", target),
        OperationKind::PlanStatus => format!("Failed to read plan \"{}\"", target),
        OperationKind::PlanClose => format!("Plan close request failed for plan \"{}\"", target),
        OperationKind::AnalyticRefresh => format!("Failed to refresh analytics for plan \"{}\"", target),
        OperationKind::HookCreate => "Failed to add hook.".to_string(),
        OperationKind::HookUpdate => "Failed to update hook.".to_string(),
        OperationKind::HookRemove => format!("Failed to remove hook \"{}\"", target),
        OperationKind::Refresh(k) => format!("Failed to list {}", k.plural()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Severity;
    use cutover_core::ClientError;

    #[test]
    fn migration_family_wording() {
        let ok = Outcome::Completed(ClassificationResult::succeeded());
        assert_eq!(finished(OperationKind::Stage, "p", &ok), Some(Notification::success("Staging Successful")));
        let warn = Outcome::Completed(ClassificationResult::new(Status::Warn).with_message("slow"));
        assert_eq!(
            finished(OperationKind::Migrate, "p", &warn).map(|n| n.message),
            Some("Migration succeeded with warnings. slow".to_string())
        );
        let failed = Outcome::Completed(ClassificationResult::failed(Some("disk full".into())));
        assert_eq!(finished(OperationKind::Rollback, "p", &failed), Some(Notification::error("disk full")));
        let bare = Outcome::Completed(ClassificationResult::failed(None));
        assert_eq!(finished(OperationKind::Rollback, "p", &bare), Some(Notification::error("Rollback Failed")));
        assert_eq!(started(OperationKind::Migrate, "p"), Some(Notification::progress("Migration Started")));
    }

    #[test]
    fn stop_is_silent_and_writes_report_errors() {
        assert_eq!(finished(OperationKind::Migrate, "p", &Outcome::Stopped), None);
        let exhausted = Outcome::RetryExhausted { attempts: 6, error: ClientError::Transport("reset".into()) };
        let n = finished(OperationKind::PlanValidate, "plan-a", &exhausted).unwrap();
        assert_eq!(n.severity, Severity::Error);
        assert_eq!(n.message, "Failed to update plan \"plan-a\": transport: reset");
    }

    #[test]
    fn lifecycle_wording() {
        let timed_out = Outcome::Completed(ClassificationResult::timed_out(16));
        assert_eq!(
            finished(OperationKind::PlanClose, "plan-a", &timed_out).map(|n| n.message),
            Some("Timed out during plan close plan-a".to_string())
        );
        let ok = Outcome::Completed(ClassificationResult::succeeded());
        assert_eq!(
            finished(OperationKind::PlanClose, "plan-a", &ok).map(|n| n.message),
            Some("Successfully removed plan \"plan-a\"!".to_string())
        );
        assert!(started(OperationKind::PlanStatus, "plan-a").is_none());
        assert!(started(OperationKind::Refresh(cutover_core::ResourceKind::Pod), "pods").is_none());
    }
}
