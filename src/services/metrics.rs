use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Gauge,
};

lazy_static! {
    // ── Auth ────────────────────────────────────────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by status",
        &["status"]
    ).unwrap();

    pub static ref REFRESH_COUNTER: CounterVec = register_counter_vec!(
        "api_token_refresh_total",
        "Refresh attempts by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref REVOCATIONS_GAUGE: Gauge = register_gauge!(
        "session_revocation_entries",
        "Refresh token ids currently held in the revocation list"
    ).unwrap();

    // ── Fan-out ─────────────────────────────────────────────────────────────
    pub static ref BROADCASTS_COUNTER: CounterVec = register_counter_vec!(
        "shapes_broadcasts_total",
        "Change events published, by action",
        &["action"]
    ).unwrap();

    pub static ref EVICTIONS_COUNTER: Counter = register_counter!(
        "shapes_subscribers_evicted_total",
        "Subscribers dropped because their queue was full or closed"
    ).unwrap();

    pub static ref SUBSCRIBERS_GAUGE: Gauge = register_gauge!(
        "shapes_subscribers",
        "Currently registered WebSocket subscribers"
    ).unwrap();
}
