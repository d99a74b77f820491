use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};

lazy_static! {
    pub static ref VERIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "contract_verification_verifications_total",
        "number of finished verification jobs",
        &["endpoint", "status"],
    )
    .unwrap();

    pub static ref IN_FLIGHT_VERIFICATIONS: IntGauge = register_int_gauge!(
        "contract_verification_in_flight_verifications",
        "number of verifications currently being processed",
    )
    .unwrap();

    pub static ref SINK_STORE_TIME: HistogramVec = register_histogram_vec!(
        "contract_verification_sink_store_time_seconds",
        "time spent storing a verification into a single sink",
        &["sink"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    pub static ref SINK_STORE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "contract_verification_sink_store_errors_total",
        "number of failed sink writes",
        &["sink", "class"],
    )
    .unwrap();

    pub static ref SIMILARITY_CANDIDATES_COUNT: HistogramVec = register_histogram_vec!(
        "contract_verification_similarity_candidates_count",
        "number of candidate compilations retrieved for a similarity verification",
        &["outcome"],
        [0, 1, 2, 3, 5, 10, 20].into_iter().map(|v| v as f64).collect()
    )
    .unwrap();
}
