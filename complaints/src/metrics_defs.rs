//! Metrics definitions for the complaint service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const SUBMIT_CREATED: MetricDef = MetricDef {
    name: "complaints.submit.created",
    metric_type: MetricType::Counter,
    description: "Submissions that created a new complaint record",
};

pub const SUBMIT_DEDUPLICATED: MetricDef = MetricDef {
    name: "complaints.submit.deduplicated",
    metric_type: MetricType::Counter,
    description: "Submissions folded into an existing record by incrementing its report count",
};

pub const SUBMIT_CREATE_RETRIES: MetricDef = MetricDef {
    name: "complaints.submit.create_retries",
    metric_type: MetricType::Counter,
    description: "Submit attempts retried after losing the create race",
};

pub const ALL_METRICS: &[MetricDef] = &[SUBMIT_CREATED, SUBMIT_DEDUPLICATED, SUBMIT_CREATE_RETRIES];
