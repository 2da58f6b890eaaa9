//! Integration tests for the session lifecycle
//!
//! These tests verify that a Session:
//! - Releases its handle exactly once (close, drop, unwind)
//! - Rejects every call after close without reaching the library
//! - Honours the demo-mode flag on open
//! - Validates and rolls back configuration
//! - Produces results only after a measurement

mod common;

use common::{demo_session, init_tracing, standard_config};
use glaz::api::SimulatedGlaz;
use glaz::{
    DeviceType, ErrorCode, GlazError, GlazResult, HardwareAveraging, OpenOptions, Session,
    SessionState, Setting, TriggerMode, WavelengthRange,
};
use std::panic::{self, AssertUnwindSafe};

/// Every operation on a closed session fails without touching the library
#[test]
fn test_use_after_close() {
    let (session, probe) = demo_session();
    session.configure(&standard_config()).expect("configure");
    session.close();
    let calls = probe.native_calls();

    let results: Vec<(&str, GlazResult<()>)> = vec![
        ("configure", session.configure(&standard_config())),
        ("set_trigger_mode", session.set_trigger_mode(TriggerMode::External)),
        ("set_integration_time", session.set_integration_time(50)),
        ("capture_background", session.capture_background(1)),
        ("run_measurement", session.run_measurement()),
        ("start_measurement", session.start_measurement()),
        ("get_result", session.get_result().map(drop)),
        ("all_scans", session.all_scans(0).map(drop)),
        ("version", session.version().map(drop)),
        ("reset_all_devices", session.reset_all_devices()),
        ("is_measurement_done", session.is_measurement_done().map(drop)),
        ("complex_scan", session.complex_scan(0, 0).map(drop)),
        // Arguments that would fail local validation on an open session.
        ("set_integration_time", session.set_integration_time(-1)),
        (
            "set_wavelengths",
            session.set_wavelengths(WavelengthRange::new(800.0, 400.0)),
        ),
        ("set_scan_count", session.set_scan_count(0)),
        (
            "set_internal_trigger_frequency",
            session.set_internal_trigger_frequency(f64::NAN),
        ),
        ("set_timeout", session.set_timeout(0)),
        (
            "set_usb_parameters",
            session.set_usb_parameters(&glaz::UsbParameters {
                timeout_ms: 0,
                bulk_size: 0,
                queue_size: 0,
            }),
        ),
        ("capture_background", session.capture_background(0)),
    ];

    for (operation, result) in results {
        match result {
            Err(GlazError::UseAfterClose { operation: reported }) => {
                assert_eq!(reported, operation)
            }
            other => panic!("{operation}: expected UseAfterClose, got {other:?}"),
        }
    }
    assert_eq!(probe.native_calls(), calls, "closed session reached the library");
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.handle_id(), None);
}

/// Closing twice, then dropping, releases the native session once
#[test]
fn test_close_is_idempotent() {
    let (session, probe) = demo_session();
    session.close();
    session.close();
    assert!(session.is_closed());
    drop(session);

    assert_eq!(probe.releases(), 1);
    assert!(!probe.is_initialised());
}

/// Dropping an open session releases it
#[test]
fn test_drop_releases_handle() {
    let (session, probe) = demo_session();
    assert!(probe.is_initialised());
    drop(session);
    assert_eq!(probe.releases(), 1);
}

fn measure_then_fail(api: SimulatedGlaz) -> GlazResult<()> {
    let session = Session::open(api, DeviceType::LinescanIIV2, true)?;
    session.configure(&standard_config())?;
    session.result(7)?;
    session.close();
    Ok(())
}

/// An early `?` return releases the handle through Drop
#[test]
fn test_early_return_releases_handle() {
    let api = SimulatedGlaz::new();
    let probe = api.probe();

    let err = measure_then_fail(api).expect_err("no measurement was run");
    assert!(matches!(err, GlazError::Result(_)));
    assert_eq!(probe.releases(), 1);
}

/// A panic while the session is open still releases it exactly once
#[test]
fn test_panic_releases_handle() {
    init_tracing();
    let api = SimulatedGlaz::new();
    let probe = api.probe();

    let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
        let session = Session::open(api, DeviceType::LinescanIIV2, true).expect("open");
        session.configure(&standard_config()).expect("configure");
        panic!("operator aborted the run");
    }));

    assert!(outcome.is_err());
    assert_eq!(probe.releases(), 1);
    assert!(!probe.is_initialised());
}

/// Without hardware, open succeeds only when demo mode is allowed
#[test]
fn test_demo_mode_gate() {
    init_tracing();

    let api = SimulatedGlaz::new();
    let probe = api.probe();
    let err = Session::open(api, DeviceType::LinescanIIV2, false)
        .err()
        .expect("open without hardware should fail");
    match err {
        GlazError::DeviceOpen(failure) => {
            assert_eq!(failure.code, ErrorCode::ConnectingToCameras.as_raw());
            assert!(!failure.message.is_empty());
        }
        other => panic!("expected DeviceOpen, got {other:?}"),
    }
    assert_eq!(probe.opens(), 0);

    let api = SimulatedGlaz::new();
    let probe = api.probe();
    let session = Session::open(api, DeviceType::LinescanIIV2, true).expect("demo open");
    assert!(probe.is_demo());
    assert_eq!(session.device_type(), Some(DeviceType::LinescanIIV2));
    assert!(session.handle_id().is_some());
}

/// Demo mode accepts every device type
#[test]
fn test_demo_mode_for_every_device_type() {
    for &device_type in DeviceType::ALL {
        let api = SimulatedGlaz::new();
        let probe = api.probe();
        let session = Session::open(api, device_type, true).expect("demo open");
        assert_eq!(probe.device_type(), Some(device_type));
        session.close();
    }
}

/// Connected hardware is used even when demo mode is disallowed
#[test]
fn test_open_with_hardware_present() {
    let api = SimulatedGlaz::new().with_hardware(DeviceType::LinescanEc);
    let probe = api.probe();
    let _session = Session::open(api, DeviceType::LinescanEc, false).expect("hardware open");
    assert!(!probe.is_demo());
}

/// A session opened from a vendor XML file must exist on disk
#[test]
fn test_open_from_config_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("single_spectrometer.xml");
    std::fs::write(&path, "<glaz/>").expect("write config");

    let session =
        Session::open_with(SimulatedGlaz::new(), OpenOptions::config_file(&path)).expect("open");
    assert_eq!(session.device_type(), None);
    assert_eq!(session.state(), SessionState::Configured);

    let err = Session::open_with(
        SimulatedGlaz::new(),
        OpenOptions::config_file(dir.path().join("missing.xml")),
    )
    .err()
    .expect("missing file");
    assert_eq!(err.code(), Some(ErrorCode::Script.as_raw()));
}

/// Results are unavailable until a measurement has run
#[test]
fn test_result_before_measurement() {
    let (session, _probe) = demo_session();
    session.configure(&standard_config()).expect("configure");

    match session.get_result() {
        Err(GlazError::Result(failure)) => {
            assert_eq!(failure.code, ErrorCode::NoMeasurementRun.as_raw())
        }
        other => panic!("expected Result error, got {other:?}"),
    }
    assert!(matches!(session.photodiode_values(0, 0), Err(GlazError::Result(_))));
}

/// A negative integration time is rejected locally and leaves the
/// configuration untouched
#[test]
fn test_negative_integration_time() {
    let (session, probe) = demo_session();
    session.configure(&standard_config()).expect("configure");
    let before = session.applied_configuration();
    let calls = probe.native_calls();

    let mut bad = standard_config();
    bad.integration_time_us = -100;
    bad.hardware_averaging = HardwareAveraging::X1;
    match session.configure(&bad) {
        Err(GlazError::Configuration { setting, failure }) => {
            assert_eq!(setting, Setting::IntegrationTime);
            assert_eq!(failure.code, ErrorCode::InvalidIntegrationTime.as_raw());
        }
        other => panic!("expected Configuration error, got {other:?}"),
    }

    let err = session.set_integration_time(-1).expect_err("negative setter");
    assert!(matches!(err, GlazError::Configuration { .. }));

    assert_eq!(probe.native_calls(), calls);
    assert_eq!(session.applied_configuration(), before);
    assert_eq!(probe.integration_time_us(), 100);
    assert_eq!(probe.hardware_averaging(), HardwareAveraging::X16.as_raw());
}

/// A device-side rejection restores the fields already sent
#[test]
fn test_rejected_configuration_rolls_back() {
    let (session, probe) = demo_session();
    session.configure(&standard_config()).expect("configure");
    session.run_measurement().expect("measure");

    let mut too_long = standard_config();
    too_long.wavelength_range = WavelengthRange::new(500.0, 600.0);
    too_long.trigger_mode = TriggerMode::External;
    too_long.integration_time_us = 20_000_000;

    match session.configure(&too_long) {
        Err(GlazError::Configuration { setting, failure }) => {
            assert_eq!(setting, Setting::IntegrationTime);
            assert_eq!(failure.code, ErrorCode::InvalidIntegrationTime.as_raw());
            assert!(failure.message.contains("20000000"));
        }
        other => panic!("expected Configuration error, got {other:?}"),
    }

    assert_eq!(probe.wavelengths(), (400.0, 800.0));
    assert_eq!(probe.trigger_mode(), TriggerMode::Internal.as_raw());
    assert_eq!(session.applied_configuration().complete(), Some(standard_config()));
    // Fully restored, so the earlier result is still valid.
    assert_eq!(session.state(), SessionState::Measured);
    session.get_result().expect("previous result");
}

/// A measurement on a session that was never configured is rejected
#[test]
fn test_measurement_requires_configuration() {
    init_tracing();
    let session = Session::open_with(
        SimulatedGlaz::new(),
        OpenOptions::Device {
            device_type: DeviceType::LinescanIIV2,
            use_defaults: false,
            allow_demo: true,
        },
    )
    .expect("open");

    let err = session.run_measurement().expect_err("unconfigured");
    assert!(matches!(err, GlazError::Acquisition(_)));
    assert_eq!(session.state(), SessionState::Open);
}

/// Open, configure, background, measure, read, close
#[test]
fn test_end_to_end_demo_measurement() {
    let (session, probe) = demo_session();

    session
        .set_wavelengths(WavelengthRange::new(400.0, 800.0))
        .expect("wavelengths");
    session.set_trigger_mode(TriggerMode::Internal).expect("trigger");
    session.set_integration_time(100).expect("integration time");
    session
        .set_hardware_averaging(HardwareAveraging::X16)
        .expect("averaging");
    session.capture_background(5).expect("background");
    session.run_measurement().expect("measurement");

    let result = session.get_result().expect("result");
    assert!(!result.is_empty());
    assert_eq!(result.samples.len(), result.length);
    assert_eq!(result.index, 0);
    assert_eq!(session.measurement_count(), 1);

    // Re-running reuses the configuration.
    session.run_measurement().expect("second measurement");
    assert_eq!(session.get_result().expect("result").length, result.length);

    session.close();
    assert_eq!(probe.releases(), 1);
    assert_eq!(probe.measurements(), 2);
}

/// Scans written by the library land in the requested file
#[test]
fn test_write_all_scans_to_file() {
    let (session, _probe) = demo_session();
    session.configure(&standard_config()).expect("configure");
    session.set_scan_count(3).expect("scan count");
    session.run_measurement().expect("measure");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scans.txt");
    session
        .write_all_scans_to_file(0, &path, true)
        .expect("write scans");

    let contents = std::fs::read_to_string(&path).expect("read scans");
    let mut lines = contents.lines();
    assert!(lines.next().expect("header").starts_with("# scans=3"));
    assert_eq!(lines.count(), 3);
}

/// Library metadata and USB settings are reachable through the session
#[test]
fn test_maintenance_calls() {
    let (session, probe) = demo_session();

    let version = session.version().expect("version");
    assert_eq!(version.to_string(), "9.23");

    let usb = glaz::UsbParameters {
        timeout_ms: 2_000,
        bulk_size: 4_096,
        queue_size: 8,
    };
    session.set_usb_parameters(&usb).expect("usb");
    assert_eq!(session.usb_parameters().expect("usb read"), usb);

    session.enable_data_stream_log(true).expect("stream log");
    assert!(probe.stream_log_enabled());

    // Demo devices have no USB link to test.
    let err = session.run_usb_comms_test().expect_err("demo");
    assert_eq!(err.code(), Some(ErrorCode::RunningUsbCommsTest.as_raw()));
}
