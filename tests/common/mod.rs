use inciscope::config::UpstreamTuning;

/// Tuning with sub-millisecond backoff so failure paths stay fast in tests
pub fn fast_tuning() -> UpstreamTuning {
    UpstreamTuning {
        retry_base_delay_ms: 1,
        bulkhead_wait_ms: 50,
        ..UpstreamTuning::default()
    }
}

pub fn setup_test_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}
