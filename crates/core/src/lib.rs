//! Cutover core types shared by the client, classifiers, loops and orchestrator.

#![forbid(unsafe_code)]

pub mod diff;
pub mod error;
pub mod kind;
pub mod resource;
pub mod status;

pub use diff::{diff_summary, is_materially_changed, strip_volatile, DiffSummary};
pub use error::{ClientError, ClientResult};
pub use kind::{OperationKind, ResourceKind};
pub use resource::{Category, Condition, Conditions, Resource};
pub use status::{ClassificationResult, Status};
