//! Metrics definitions for the geolocation resolver.

use shared::metrics_defs::{MetricDef, MetricType};

pub const LOOKUP_SUCCESS: MetricDef = MetricDef {
    name: "geo.lookup.success",
    metric_type: MetricType::Counter,
    description: "Lookups that resolved a country from the upstream service",
};

pub const LOOKUP_UNKNOWN: MetricDef = MetricDef {
    name: "geo.lookup.unknown",
    metric_type: MetricType::Counter,
    description: "Successful responses that carried no country field",
};

pub const LOOKUP_FALLBACK: MetricDef = MetricDef {
    name: "geo.lookup.fallback",
    metric_type: MetricType::Counter,
    description: "Lookups answered with the fallback country",
};

pub const BREAKER_REJECTED: MetricDef = MetricDef {
    name: "geo.breaker.rejected",
    metric_type: MetricType::Counter,
    description: "Lookups short-circuited by the open circuit breaker",
};

pub const ALL_METRICS: &[MetricDef] = &[
    LOOKUP_SUCCESS,
    LOOKUP_UNKNOWN,
    LOOKUP_FALLBACK,
    BREAKER_REJECTED,
];
