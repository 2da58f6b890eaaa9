//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use glaz::api::{SimProbe, SimulatedGlaz};
use glaz::{DeviceConfiguration, DeviceType, HardwareAveraging, Session, TriggerMode, WavelengthRange};
use tracing_subscriber::EnvFilter;

/// Install a log subscriber honouring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A demo-mode session plus a probe into the simulated library.
pub fn demo_session() -> (Session<SimulatedGlaz>, SimProbe) {
    init_tracing();
    let api = SimulatedGlaz::new();
    let probe = api.probe();
    let session =
        Session::open(api, DeviceType::LinescanIIV2, true).expect("Failed to open demo session");
    (session, probe)
}

/// 400–800 nm, internal trigger, 100 µs, 16× averaging.
pub fn standard_config() -> DeviceConfiguration {
    DeviceConfiguration {
        wavelength_range: WavelengthRange::new(400.0, 800.0),
        trigger_mode: TriggerMode::Internal,
        integration_time_us: 100,
        hardware_averaging: HardwareAveraging::X16,
    }
}
