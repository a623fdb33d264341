//! Metrics definitions for fan-out and reconciliation.

use shared::metrics_defs::{MetricDef, MetricType};

pub const NOTIFICATIONS_DELIVERED: MetricDef = MetricDef {
    name: "notifications.delivered",
    metric_type: MetricType::Counter,
    description: "Update notifications posted to a destination. Tagged with style.",
};

pub const NOTIFICATIONS_SKIPPED: MetricDef = MetricDef {
    name: "notifications.skipped",
    metric_type: MetricType::Counter,
    description: "Destinations skipped during fan-out. Tagged with reason.",
};

pub const NOTIFICATIONS_FAILED: MetricDef = MetricDef {
    name: "notifications.failed",
    metric_type: MetricType::Counter,
    description: "Deliveries the chat platform rejected or that panicked.",
};

pub const RECONCILE_UPDATED: MetricDef = MetricDef {
    name: "reconcile.updated",
    metric_type: MetricType::Counter,
    description: "Reconciliations that found a new version. Tagged with platform.",
};

pub const RECONCILE_UNCHANGED: MetricDef = MetricDef {
    name: "reconcile.unchanged",
    metric_type: MetricType::Counter,
    description: "Reconciliations where the latest version was already known. Tagged with platform.",
};

pub const RECONCILE_FAILED: MetricDef = MetricDef {
    name: "reconcile.failed",
    metric_type: MetricType::Counter,
    description: "Reconciliations that ended in an error. Tagged with platform.",
};

pub const SWEEP_DURATION: MetricDef = MetricDef {
    name: "reconcile.sweep.duration",
    metric_type: MetricType::Histogram,
    description: "Time in seconds to reconcile every cached project once.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    NOTIFICATIONS_DELIVERED,
    NOTIFICATIONS_SKIPPED,
    NOTIFICATIONS_FAILED,
    RECONCILE_UPDATED,
    RECONCILE_UNCHANGED,
    RECONCILE_FAILED,
    SWEEP_DURATION,
];
