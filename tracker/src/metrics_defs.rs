//! Metrics definitions for the registry and the tracking ledger.

use shared::metrics_defs::{MetricDef, MetricType};

pub const PROJECTS_CACHED: MetricDef = MetricDef {
    name: "registry.projects.cached",
    metric_type: MetricType::Counter,
    description: "Projects fetched from upstream and added to the local cache. Tagged with platform.",
};

pub const VERSIONS_RECORDED: MetricDef = MetricDef {
    name: "registry.versions.recorded",
    metric_type: MetricType::Counter,
    description: "New versions appended to a cached project's seen set. Tagged with platform.",
};

pub const ENTRIES_CREATED: MetricDef = MetricDef {
    name: "ledger.entries.created",
    metric_type: MetricType::Counter,
    description: "Ledger entries created by a track request.",
};

pub const QUOTA_EXCEEDED: MetricDef = MetricDef {
    name: "ledger.quota_exceeded",
    metric_type: MetricType::Counter,
    description: "Track requests rejected because the tenant is at its project limit.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    PROJECTS_CACHED,
    VERSIONS_RECORDED,
    ENTRIES_CREATED,
    QUOTA_EXCEEDED,
];
