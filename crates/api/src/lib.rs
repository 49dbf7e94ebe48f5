//! Cutover API façade (in-process).
//!
//! [`Orchestrator`] is what frontends hold: it starts operations, enforces one
//! active run per operation kind, and reports progress through
//! [`OperationHandle`]s, a broadcast bus and a [`NotificationSink`].

#![forbid(unsafe_code)]

pub mod config;
pub mod conversions;
pub mod messages;
pub mod notify;
pub mod operation;
pub mod orchestrator;

pub use config::{EngineConfig, PollSettings, DEFAULT_NAMESPACE};
pub use notify::{Alert, ChannelSink, LogSink, Notification, NotificationSink, Severity};
pub use operation::{
    HookCluster, HookSpec, Operation, OperationEvent, OperationHandle, OperationRequest, Outcome, PlanValues,
    PvSelection,
};
pub use orchestrator::{Described, OperationError, Orchestrator, ResourceRef};

pub use cutover_core::{ClassificationResult, OperationKind, Resource, ResourceKind, Status};
