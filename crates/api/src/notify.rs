//! User-facing notifications and the sinks that receive them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Progress,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

impl Notification {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self { severity, message: message.into() }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(Severity::Progress, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, message)
    }
}

/// Everything a sink can be told, as one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alert {
    Notice(Notification),
    CertificateTrustError { url: String },
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);

    /// TLS trust failure against `url`; the user has to accept the
    /// certificate out of band before calls can succeed.
    fn certificate_trust_error(&self, url: &str);
}

/// Forwards alerts into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        let _ = self.tx.send(Alert::Notice(notification));
    }

    fn certificate_trust_error(&self, url: &str) {
        let _ = self.tx.send(Alert::CertificateTrustError { url: url.to_string() });
    }
}

/// Writes alerts to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, n: Notification) {
        match n.severity {
            Severity::Error => error!(message = %n.message, "notify"),
            Severity::Warn => warn!(message = %n.message, "notify"),
            Severity::Success | Severity::Progress => info!(severity = ?n.severity, message = %n.message, "notify"),
        }
    }

    fn certificate_trust_error(&self, url: &str) {
        warn!(url = %url, "notify: certificate not trusted");
    }
}

/// Sink wrapper holding the certificate-trust dedup flag.
pub(crate) struct Notifier {
    sink: Arc<dyn NotificationSink>,
    cert_pending: AtomicBool,
}

impl Notifier {
    pub(crate) fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink, cert_pending: AtomicBool::new(false) }
    }

    pub(crate) fn notify(&self, notification: Notification) {
        self.sink.notify(notification);
    }

    /// Reports a certificate failure unless one is already pending.
    /// Returns whether the sink was told.
    pub(crate) fn certificate(&self, url: &str) -> bool {
        if self.cert_pending.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return false;
        }
        self.sink.certificate_trust_error(url);
        true
    }

    pub(crate) fn acknowledge(&self) {
        self.cert_pending.store(false, Ordering::Release);
    }
}
