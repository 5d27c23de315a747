//! Metrics definitions for extract function monitoring.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

/// Label for the outcome (`success` or `failure`) of an operation.
pub const OUTCOME_LABEL: &str = "outcome";

/// Label for error kind in metrics.
pub const ERROR_KIND_LABEL: &str = "error_kind";

pub const OUTCOME_SUCCESS: &str = "success";

pub const OUTCOME_FAILURE: &str = "failure";

/// Counter for handled invocations, labelled by outcome and error kind.
pub const BQ_GCS_INVOCATIONS_TOTAL: &str = "bq_gcs_invocations_total";

/// Counter for finished extract jobs, labelled by outcome.
pub const BQ_GCS_EXTRACT_JOBS_TOTAL: &str = "bq_gcs_extract_jobs_total";

/// Histogram of the time between extract job submission and completion.
pub const BQ_GCS_EXTRACT_JOB_DURATION_SECONDS: &str = "bq_gcs_extract_job_duration_seconds";

/// Counter for acknowledged completion notifications.
pub const BQ_GCS_NOTIFICATIONS_PUBLISHED_TOTAL: &str = "bq_gcs_notifications_published_total";

/// Counter for completion notifications that could not be published.
pub const BQ_GCS_PUBLISH_FAILURES_TOTAL: &str = "bq_gcs_publish_failures_total";

/// Describes the function metrics. Safe to call multiple times.
pub fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            BQ_GCS_INVOCATIONS_TOTAL,
            Unit::Count,
            "Total number of handled extract invocations, labeled by outcome and error_kind"
        );

        describe_counter!(
            BQ_GCS_EXTRACT_JOBS_TOTAL,
            Unit::Count,
            "Total number of finished extract jobs, labeled by outcome"
        );

        describe_histogram!(
            BQ_GCS_EXTRACT_JOB_DURATION_SECONDS,
            Unit::Seconds,
            "Time in seconds between extract job submission and completion"
        );

        describe_counter!(
            BQ_GCS_NOTIFICATIONS_PUBLISHED_TOTAL,
            Unit::Count,
            "Total number of acknowledged completion notifications"
        );

        describe_counter!(
            BQ_GCS_PUBLISH_FAILURES_TOTAL,
            Unit::Count,
            "Total number of completion notifications that failed to publish"
        );
    });
}
