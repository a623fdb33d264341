//! Metrics definitions for the upstream platform clients.

use shared::metrics_defs::{MetricDef, MetricType};

pub const UPSTREAM_REQUESTS: MetricDef = MetricDef {
    name: "upstream.requests",
    metric_type: MetricType::Counter,
    description: "Requests sent to an upstream platform. Tagged with platform, operation.",
};

pub const UPSTREAM_RETRIES: MetricDef = MetricDef {
    name: "upstream.retries",
    metric_type: MetricType::Counter,
    description: "Transport failures that were retried. Tagged with platform, operation.",
};

pub const UPSTREAM_UNAVAILABLE: MetricDef = MetricDef {
    name: "upstream.unavailable",
    metric_type: MetricType::Counter,
    description: "Calls that exhausted their retry budget. Tagged with platform, operation.",
};

pub const NEGATIVE_CACHE_HIT: MetricDef = MetricDef {
    name: "negative_cache.hit",
    metric_type: MetricType::Counter,
    description: "Identifier lookups answered by the negative cache",
};

pub const NEGATIVE_CACHE_MISS: MetricDef = MetricDef {
    name: "negative_cache.miss",
    metric_type: MetricType::Counter,
    description: "Identifier lookups that missed the negative cache",
};

pub const ALL_METRICS: &[MetricDef] = &[
    UPSTREAM_REQUESTS,
    UPSTREAM_RETRIES,
    UPSTREAM_UNAVAILABLE,
    NEGATIVE_CACHE_HIT,
    NEGATIVE_CACHE_MISS,
];
