//! Integration tests for call serialization
//!
//! A session is shared across threads behind an `Arc`. Overlapping calls
//! must fail fast with `Busy`, `close` must wait for the call in flight, and
//! a pending non-blocking measurement must block every other operation.

mod common;

use common::{init_tracing, standard_config};
use glaz::api::SimulatedGlaz;
use glaz::{DeviceType, GlazError, Session, SessionState, TriggerMode};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const ACQUISITION: Duration = Duration::from_millis(500);
const SETTLE: Duration = Duration::from_millis(100);

fn slow_session() -> (Arc<Session<SimulatedGlaz>>, glaz::api::SimProbe) {
    init_tracing();
    let api = SimulatedGlaz::new().with_acquisition_latency(ACQUISITION);
    let probe = api.probe();
    let session = Session::open(api, DeviceType::LinescanIIV2, true).expect("open");
    session.configure(&standard_config()).expect("configure");
    (Arc::new(session), probe)
}

#[test]
fn test_session_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Session<SimulatedGlaz>>();
}

/// A call overlapping an in-flight measurement is rejected, not queued
#[test]
fn test_overlapping_call_is_busy() {
    let (session, _probe) = slow_session();

    let worker = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.run_measurement())
    };
    thread::sleep(SETTLE);

    let started = Instant::now();
    let err = session
        .set_trigger_mode(TriggerMode::External)
        .expect_err("call should overlap the measurement");
    assert!(matches!(err, GlazError::Busy { operation: "set_trigger_mode" }));
    assert!(started.elapsed() < ACQUISITION, "busy call waited for the lock");

    worker
        .join()
        .expect("worker panicked")
        .expect("measurement failed");
    assert_eq!(session.state(), SessionState::Measured);

    // Once the measurement returns, the session accepts calls again.
    session
        .set_trigger_mode(TriggerMode::External)
        .expect("trigger after measurement");
}

/// `close` waits for the in-flight call, then releases once
#[test]
fn test_close_waits_for_in_flight_call() {
    let (session, probe) = slow_session();

    let worker = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.run_measurement())
    };
    thread::sleep(SETTLE);

    session.close();
    assert!(probe.measurements() >= 1, "close returned before the measurement");
    worker
        .join()
        .expect("worker panicked")
        .expect("measurement failed");

    assert_eq!(probe.releases(), 1);
    assert!(matches!(
        session.run_measurement(),
        Err(GlazError::UseAfterClose { .. })
    ));
}

/// While a started measurement is pending only polling and close are allowed
#[test]
fn test_pending_measurement_blocks_other_calls() {
    init_tracing();
    let session =
        Session::open(SimulatedGlaz::new(), DeviceType::LinescanIIV2, true).expect("open");
    session.configure(&standard_config()).expect("configure");

    session.start_measurement().expect("start");
    assert!(matches!(
        session.get_result(),
        Err(GlazError::Busy { operation: "get_result" })
    ));
    assert!(matches!(
        session.start_measurement(),
        Err(GlazError::Busy { .. })
    ));

    assert!(session.is_measurement_done().expect("poll"));
    assert_eq!(session.state(), SessionState::Measured);
    let result = session.get_result().expect("result");
    assert_eq!(result.samples.len(), result.length);
    assert_eq!(session.measurement_count(), 1);
}

/// Closing with a measurement pending is allowed
#[test]
fn test_close_with_pending_measurement() {
    init_tracing();
    let api = SimulatedGlaz::new();
    let probe = api.probe();
    let session = Session::open(api, DeviceType::LinescanIIV2, true).expect("open");
    session.configure(&standard_config()).expect("configure");
    session.start_measurement().expect("start");

    session.close();
    assert_eq!(probe.releases(), 1);
    assert!(matches!(
        session.is_measurement_done(),
        Err(GlazError::UseAfterClose { .. })
    ));
}
