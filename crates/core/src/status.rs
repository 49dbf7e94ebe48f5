use std::fmt;

use serde::{Deserialize, Serialize};

/// Status taxonomy produced by classifiers and loops.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Running,
    Succeeded,
    Failed,
    Warn,
    Canceled,
    TimedOut,
    Bound,
    Admitted,
    Terminating,
    Completed,
}

impl Status {
    /// Statuses that end a poll loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Succeeded | Status::Failed | Status::Warn | Status::Canceled | Status::TimedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Running => "Running",
            Status::Succeeded => "Succeeded",
            Status::Failed => "Failed",
            Status::Warn => "Warn",
            Status::Canceled => "Canceled",
            Status::TimedOut => "TimedOut",
            Status::Bound => "Bound",
            Status::Admitted => "Admitted",
            Status::Terminating => "Terminating",
            Status::Completed => "Completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ClassificationResult {
    pub status: Status,
    pub message: Option<String>,
    pub subject_name: Option<String>,
}

impl ClassificationResult {
    pub fn new(status: Status) -> Self {
        Self { status, message: None, subject_name: None }
    }

    pub fn pending() -> Self {
        Self::new(Status::Pending)
    }

    pub fn running() -> Self {
        Self::new(Status::Running)
    }

    pub fn succeeded() -> Self {
        Self::new(Status::Succeeded)
    }

    pub fn failed(message: Option<String>) -> Self {
        Self { message, ..Self::new(Status::Failed) }
    }

    pub fn timed_out(ticks: u32) -> Self {
        Self::new(Status::TimedOut).with_message(format!("no terminal condition after {} ticks", ticks))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_optional_message(mut self, message: Option<&str>) -> Self {
        self.message = message.map(|m| m.to_string());
        self
    }

    pub fn with_subject(mut self, subject: Option<&str>) -> Self {
        self.subject_name = subject.map(|s| s.to_string());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_set() {
        let terminal: Vec<Status> = [
            Status::Pending,
            Status::Running,
            Status::Succeeded,
            Status::Failed,
            Status::Warn,
            Status::Canceled,
            Status::TimedOut,
            Status::Bound,
            Status::Admitted,
            Status::Terminating,
            Status::Completed,
        ]
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();
        assert_eq!(terminal, vec![Status::Succeeded, Status::Failed, Status::Warn, Status::Canceled, Status::TimedOut]);
    }

    #[test]
    fn builders_compose() {
        let r = ClassificationResult::failed(Some("disk full".into())).with_subject(Some("plan-a"));
        assert_eq!(r.status, Status::Failed);
        assert_eq!(r.message.as_deref(), Some("disk full"));
        assert_eq!(r.subject_name.as_deref(), Some("plan-a"));
        assert_eq!(ClassificationResult::timed_out(10).status, Status::TimedOut);
    }
}
