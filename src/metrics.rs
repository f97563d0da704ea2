//! Buffer counters exported through the `metrics` facade.
//!
//! Every counter carries a `stage` label taken from
//! [`BufferConfig::label`](crate::buffer::BufferConfig::label).

use ::metrics::counter;

pub const ITEMS_PRODUCED: &str = "lookahead_items_produced_total";
pub const ITEMS_CONSUMED: &str = "lookahead_items_consumed_total";
pub const FAILURES: &str = "lookahead_failures_total";
pub const ABANDONED: &str = "lookahead_abandoned_total";

pub(crate) fn record_produced(stage: &str) {
    counter!(ITEMS_PRODUCED, "stage" => stage.to_string()).increment(1);
}

pub(crate) fn record_consumed(stage: &str) {
    counter!(ITEMS_CONSUMED, "stage" => stage.to_string()).increment(1);
}

pub(crate) fn record_failure(stage: &str) {
    counter!(FAILURES, "stage" => stage.to_string()).increment(1);
}

pub(crate) fn record_abandoned(stage: &str) {
    counter!(ABANDONED, "stage" => stage.to_string()).increment(1);
}
