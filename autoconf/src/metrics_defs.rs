//! Metrics definitions for the autoconf client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const FETCH_OK: MetricDef = MetricDef {
    name: "autoconf.fetch.ok",
    metric_type: MetricType::Counter,
    description: "Fetches that returned a new or unchanged payload with status 200",
};

pub const FETCH_NOT_MODIFIED: MetricDef = MetricDef {
    name: "autoconf.fetch.not_modified",
    metric_type: MetricType::Counter,
    description: "Conditional fetches answered with 304 Not Modified",
};

pub const FETCH_FAILURE: MetricDef = MetricDef {
    name: "autoconf.fetch.failure",
    metric_type: MetricType::Counter,
    description: "Fetches that failed. Tagged with kind.",
};

pub const FETCH_DURATION: MetricDef = MetricDef {
    name: "autoconf.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a remote fetch in seconds",
};

pub const CACHE_FALLBACK: MetricDef = MetricDef {
    name: "autoconf.cache.fallback",
    metric_type: MetricType::Counter,
    description: "Failed fetches served from the on-disk cache",
};

pub const CACHE_EVICTED: MetricDef = MetricDef {
    name: "autoconf.cache.evicted",
    metric_type: MetricType::Counter,
    description: "Cached payload files removed by eviction",
};

pub const FALLBACK_DOCUMENT: MetricDef = MetricDef {
    name: "autoconf.fallback_document",
    metric_type: MetricType::Counter,
    description: "Reads resolved to the hardcoded fallback document",
};

pub const REFRESH_FAILURE: MetricDef = MetricDef {
    name: "autoconf.refresh.failure",
    metric_type: MetricType::Counter,
    description: "Background refresh ticks that failed and entered backoff",
};

pub const ALL_METRICS: &[MetricDef] = &[
    FETCH_OK,
    FETCH_NOT_MODIFIED,
    FETCH_FAILURE,
    FETCH_DURATION,
    CACHE_FALLBACK,
    CACHE_EVICTED,
    FALLBACK_DOCUMENT,
    REFRESH_FAILURE,
];
