/*
    Metrics - handshake, frame and session counters

    Recorded through the `metrics` facade everywhere; nothing is exported unless
    `install_prometheus` has been called with a listen address.

    - Handshake steps by step and result (ok, replay, auth, state, malformed)
    - Frames dropped by direction and cause (malformed, bad_resize, crypto, closed)
    - Sessions opened, closed by close reason, and a gauge of live sessions
*/

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

mod exporter;

pub use exporter::{install_prometheus, MetricsInstallError};

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    describe_counter!(
        "tormonol_handshake_steps_total",
        "Handshake requests, labeled by step (challenge, ticket, salt, admission) and result"
    );

    describe_histogram!(
        "tormonol_handshake_step_duration_seconds",
        "Time spent serving one handshake step"
    );

    describe_counter!(
        "tormonol_frames_dropped_total",
        "Frames discarded, labeled by direction (inbound, outbound) and cause"
    );

    describe_counter!("tormonol_sessions_opened_total", "Sessions admitted and spawned");

    describe_counter!(
        "tormonol_sessions_closed_total",
        "Sessions closed, labeled by reason (disconnect, exited, unexpected, spawn_failed)"
    );

    describe_gauge!("tormonol_active_sessions", "Sessions currently attached to a shell");

    describe_gauge!(
        "tormonol_store_entries",
        "Entries held by a handshake store, labeled by store"
    );
}

/// Record the outcome of one handshake step
pub fn handshake_step(step: &'static str, result: &'static str) {
    counter!("tormonol_handshake_steps_total", "step" => step, "result" => result).increment(1);
}

/// Record handshake step latency
pub fn handshake_step_duration(step: &'static str, duration_secs: f64) {
    histogram!("tormonol_handshake_step_duration_seconds", "step" => step).record(duration_secs);
}

/// Record a dropped frame
pub fn frame_dropped(direction: &'static str, cause: &'static str) {
    counter!("tormonol_frames_dropped_total", "direction" => direction, "cause" => cause)
        .increment(1);
}

pub fn session_opened() {
    counter!("tormonol_sessions_opened_total").increment(1);
    gauge!("tormonol_active_sessions").increment(1.0);
}

pub fn session_closed(reason: &'static str) {
    counter!("tormonol_sessions_closed_total", "reason" => reason).increment(1);
    gauge!("tormonol_active_sessions").decrement(1.0);
}

pub fn session_spawn_failed() {
    counter!("tormonol_sessions_closed_total", "reason" => "spawn_failed").increment(1);
}

/// Update a handshake store size gauge
pub fn set_store_entries(store: &'static str, count: usize) {
    gauge!("tormonol_store_entries", "store" => store).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_compilation() {
        // No recorder installed; every call must be a cheap no-op
        init_metrics();
        handshake_step("ticket", "ok");
        handshake_step_duration("salt", 0.002);
        frame_dropped("inbound", "crypto");
        session_opened();
        session_closed("exited");
        session_spawn_failed();
        set_store_entries("nonces", 3);
    }
}
