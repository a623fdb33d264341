//! Notification delivery: rendering, fan-out to destinations and the reconciliation driver
//! that detects updates in the first place.

pub mod chat;
pub mod fanout;
pub mod metrics_defs;
pub mod reconciler;
pub mod render;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use chat::{ChatPlatform, Destination, DestinationKind, LoggingChat, Message, Permissions};
pub use fanout::{Delivery, DeliveryOutcome, FanoutEngine, SkipReason};
pub use reconciler::{
    Command, ReconcileError, ReconcileOutcome, Reconciler, ReconcilerConfig, SweepSummary,
};
