//! Simulated Glaz device.
//!
//! Stands in for the vendor library when no spectrometer is attached, the
//! way the vendor's own demo mode does, and backs the test-suite. The
//! simulated sensor is a 1024-pixel line covering 190–1100 nm. Spectra are
//! two Gaussian lines on a dark baseline with seeded noise, scaled by
//! integration time and clipped to the ADC resolution.
//!
//! All state lives behind an `Arc<Mutex<_>>` so a [`SimProbe`] can observe
//! the device after the `SimulatedGlaz` has been moved into a session.

use super::{GlazApi, Status, STATUS_OK};
use crate::error::ErrorCode;
use crate::types::DeviceType;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Pixels on the simulated sensor.
pub const SENSOR_PIXELS: usize = 1024;
/// Shortest wavelength the simulated sensor sees, in nm.
pub const SENSOR_MIN_NM: f64 = 190.0;
/// Longest wavelength the simulated sensor sees, in nm.
pub const SENSOR_MAX_NM: f64 = 1100.0;

const LIBRARY_VERSION: (i32, i32) = (9, 23);
const PHOTODIODE_CHANNELS: i32 = 2;
const AUX_CHANNELS: i32 = 2;
const MAX_INTEGRATION_TIME_US: i32 = 10_000_000;
const MAX_TRIGGER_FREQUENCY_HZ: f64 = 10_000.0;
const MAX_SCAN_COUNT: i32 = 10_000;
const DARK_LEVEL: f64 = 500.0;
const NOISE_AMPLITUDE: f64 = 20.0;
/// Integration time at which the lines reach full amplitude.
const SATURATION_TIME_US: f64 = 10_000.0;

fn code(code: ErrorCode) -> Status {
    code.as_raw()
}

/// Wavelength of sensor pixel `pixel`.
pub fn pixel_wavelength(pixel: usize) -> f64 {
    SENSOR_MIN_NM + pixel as f64 * (SENSOR_MAX_NM - SENSOR_MIN_NM) / (SENSOR_PIXELS - 1) as f64
}

#[derive(Debug, Clone)]
struct Registers {
    wavelengths: (f64, f64),
    averaging: i32,
    resolution: i32,
    scan_count: i32,
    scan_clock_speed: i32,
    adc_gain: i32,
    trigger_delay_us: i32,
    trigger_mode: i32,
    trigger_frequency_hz: f64,
    // Stored for the setters only; the simulation does not model them.
    #[allow(dead_code)]
    integration_mode: i32,
    integration_time_us: i32,
    #[allow(dead_code)]
    sync_out_mode: i32,
    #[allow(dead_code)]
    sync_out_polarity: i32,
    #[allow(dead_code)]
    aux_out_mode: i32,
    aux_out_polarity: i32,
    out_cycle_count: i32,
    #[allow(dead_code)]
    timeout_ms: i32,
    test_mode: i32,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            wavelengths: (SENSOR_MIN_NM, SENSOR_MAX_NM),
            averaging: 0,
            resolution: 3,
            scan_count: 1,
            scan_clock_speed: 0,
            adc_gain: 0,
            trigger_delay_us: 0,
            trigger_mode: 1,
            trigger_frequency_hz: 100.0,
            integration_mode: 0,
            integration_time_us: 1_000,
            sync_out_mode: 5,
            sync_out_polarity: 1,
            aux_out_mode: 5,
            aux_out_polarity: 1,
            out_cycle_count: 0,
            timeout_ms: 5_000,
            test_mode: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Measurement {
    spectrum: Vec<f64>,
    scans: Vec<Vec<u16>>,
    time_stamps: Vec<f64>,
    photodiodes: Vec<Vec<f64>>,
    aux_states: Vec<bool>,
    aux_cycle_counts: Vec<Vec<i32>>,
}

#[derive(Debug)]
struct SimState {
    attached: Option<DeviceType>,
    latency: Duration,
    rng: StdRng,
    initialised: bool,
    demo: bool,
    device_type: Option<DeviceType>,
    last_error: String,
    native_calls: u64,
    opens: u64,
    releases: u64,
    measurements: u64,
    usb: (i32, i32, i32),
    stream_log: bool,
    registers: Registers,
    background: Option<Vec<f64>>,
    result: Option<Measurement>,
    pending: Option<Measurement>,
}

impl SimState {
    fn fail(&mut self, status: Status, message: impl Into<String>) -> Status {
        self.last_error = message.into();
        status
    }

    /// Count the call and reject it if no session is open.
    fn enter(&mut self) -> Result<(), Status> {
        self.native_calls += 1;
        if !self.initialised {
            return Err(self.fail(code(ErrorCode::NotInitialised), "Session not initialised"));
        }
        Ok(())
    }

    fn in_range(&mut self, value: i32, max: i32, error: ErrorCode, what: &str) -> Status {
        if let Err(status) = self.enter() {
            return status;
        }
        if !(0..=max).contains(&value) {
            return self.fail(code(error), format!("Invalid {what}: {value}"));
        }
        STATUS_OK
    }

    fn selected_pixels(&self) -> std::ops::Range<usize> {
        let (min, max) = self.registers.wavelengths;
        let first = (0..SENSOR_PIXELS)
            .find(|&p| pixel_wavelength(p) >= min)
            .unwrap_or(SENSOR_PIXELS);
        let end = (0..SENSOR_PIXELS)
            .rev()
            .find(|&p| pixel_wavelength(p) <= max)
            .map_or(first, |p| p + 1);
        first..end.max(first)
    }

    fn max_count(&self) -> f64 {
        let bits = 10 + 2 * self.registers.resolution;
        f64::from((1u32 << bits) - 1)
    }

    /// One averaged raw scan over the selected pixels.
    fn acquire_scan(&mut self, illuminated: bool) -> Vec<f64> {
        let factor = f64::from(1u32 << self.registers.averaging);
        let noise = NOISE_AMPLITUDE / factor.sqrt();
        let gain = f64::from(1u32 << self.registers.adc_gain);
        let exposure =
            (f64::from(self.registers.integration_time_us) / SATURATION_TIME_US).min(1.0);
        let max_count = self.max_count();
        let test_mode = self.registers.test_mode;

        self.selected_pixels()
            .map(|pixel| {
                let raw = match test_mode {
                    1 => {
                        if pixel % 2 == 0 {
                            max_count
                        } else {
                            0.0
                        }
                    }
                    2 => max_count,
                    3 => 0.0,
                    _ => {
                        let wavelength = pixel_wavelength(pixel);
                        let lines = if illuminated {
                            let green = (-((wavelength - 550.0) / 40.0).powi(2) / 2.0).exp();
                            let red = 0.6 * (-((wavelength - 656.0) / 8.0).powi(2) / 2.0).exp();
                            20_000.0 * exposure * (green + red)
                        } else {
                            0.0
                        };
                        DARK_LEVEL + gain * lines + self.rng.gen_range(-noise..=noise)
                    }
                };
                raw.clamp(0.0, max_count)
            })
            .collect()
    }

    fn simulate_measurement(&mut self) -> Measurement {
        let scan_count = self.registers.scan_count.max(1) as usize;
        let raw: Vec<Vec<f64>> = (0..scan_count).map(|_| self.acquire_scan(true)).collect();
        let pixels = raw.first().map_or(0, Vec::len);

        let mut spectrum = vec![0.0; pixels];
        for scan in &raw {
            for (acc, value) in spectrum.iter_mut().zip(scan) {
                *acc += value / scan_count as f64;
            }
        }
        if let Some(background) = &self.background {
            for (value, dark) in spectrum.iter_mut().zip(background) {
                *value -= dark;
            }
        }

        let registers = &self.registers;
        let averaging = f64::from(1u32 << registers.averaging);
        let clock = if registers.scan_clock_speed == 1 { 2.0 } else { 1.0 };
        let frame_s = f64::from(registers.integration_time_us) * 1e-6 * averaging * clock;
        let delay_s = f64::from(registers.trigger_delay_us) * 1e-6;
        let (first_s, period_s) = if registers.trigger_mode == 1 {
            (0.0, frame_s.max(1.0 / registers.trigger_frequency_hz))
        } else {
            (delay_s, frame_s + delay_s)
        };
        let time_stamps = (0..scan_count)
            .map(|k| first_s + k as f64 * period_s)
            .collect();

        let photodiodes = (0..PHOTODIODE_CHANNELS)
            .map(|channel| {
                raw.iter()
                    .map(|scan| {
                        let mean = scan.iter().sum::<f64>() / scan.len().max(1) as f64;
                        mean / self.max_count() * if channel == 0 { 1.0 } else { 0.5 }
                    })
                    .collect()
            })
            .collect();

        let active_high = self.registers.aux_out_polarity == 1;
        let aux_states = (0..scan_count).map(|k| (k % 2 == 0) == active_high).collect();
        let wrap = self.registers.out_cycle_count;
        let aux_cycle_counts = (0..AUX_CHANNELS)
            .map(|channel| {
                (0..scan_count as i32)
                    .map(|k| {
                        let count = k * (channel + 1);
                        if wrap > 0 {
                            count % wrap
                        } else {
                            count
                        }
                    })
                    .collect()
            })
            .collect();

        let scans = raw
            .iter()
            .map(|scan| scan.iter().map(|&v| v.round() as u16).collect())
            .collect();

        Measurement {
            spectrum,
            scans,
            time_stamps,
            photodiodes,
            aux_states,
            aux_cycle_counts,
        }
    }

    /// Shared entry for every result getter.
    fn measurement(&mut self, index: i32) -> Result<&Measurement, Status> {
        self.enter()?;
        if self.result.is_none() {
            return Err(self.fail(code(ErrorCode::NoMeasurementRun), "No measurement has been run"));
        }
        if index != 0 {
            return Err(self.fail(
                code(ErrorCode::InvalidCalculationIndex),
                format!("Invalid calculation index: {index}"),
            ));
        }
        self.result.as_ref().ok_or(code(ErrorCode::NoMeasurementRun))
    }

    fn scan_in_range(&mut self, index: i32, scan_index: i32) -> Result<usize, Status> {
        let count = self.measurement(index)?.scans.len();
        match usize::try_from(scan_index) {
            Ok(scan) if scan < count => Ok(scan),
            _ => Err(self.fail(
                code(ErrorCode::InvalidScanCount),
                format!("Scan index {scan_index} out of range (0..{count})"),
            )),
        }
    }
}

/// Copy `source` into `target` using the two-phase size protocol.
fn copy_sized<T: Copy>(
    state: &mut SimState,
    source: &[T],
    size: &mut i32,
    target: Option<&mut [T]>,
) -> Status {
    let len = source.len() as i32;
    match target {
        None => {
            *size = len;
            STATUS_OK
        }
        Some(buffer) if buffer.len() < source.len() => state.fail(
            code(ErrorCode::InvalidResultDataSize),
            format!("Buffer holds {} elements, result needs {len}", buffer.len()),
        ),
        Some(buffer) => {
            buffer[..source.len()].copy_from_slice(source);
            *size = len;
            STATUS_OK
        }
    }
}

/// Two-phase copy of a real signal; the imaginary part is zero.
fn copy_pair(
    state: &mut SimState,
    source: &[f64],
    size: &mut i32,
    buffers: Option<(&mut [f64], &mut [f64])>,
) -> Status {
    let Some((real, imag)) = buffers else {
        return copy_sized(state, source, size, None);
    };
    let status = copy_sized(state, source, size, Some(real));
    if status != STATUS_OK {
        return status;
    }
    let zeros = vec![0.0; source.len()];
    copy_sized(state, &zeros, size, Some(imag))
}

/// In-process demo device implementing [`GlazApi`].
///
/// # Example
///
/// ```
/// use glaz::api::SimulatedGlaz;
/// use glaz::{DeviceType, Session};
///
/// let api = SimulatedGlaz::new();
/// let probe = api.probe();
/// let session = Session::open(api, DeviceType::LinescanIIV2, true)?;
/// assert!(probe.is_demo());
/// session.close();
/// assert_eq!(probe.releases(), 1);
/// # Ok::<(), glaz::GlazError>(())
/// ```
pub struct SimulatedGlaz {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedGlaz {
    /// A library with no hardware attached.
    pub fn new() -> Self {
        Self::with_seed(0x6c61_7a67)
    }

    /// A library with no hardware attached and a fixed noise seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                attached: None,
                latency: Duration::ZERO,
                rng: StdRng::seed_from_u64(seed),
                initialised: false,
                demo: false,
                device_type: None,
                last_error: String::new(),
                native_calls: 0,
                opens: 0,
                releases: 0,
                measurements: 0,
                usb: (1_000, 65_536, 16),
                stream_log: false,
                registers: Registers::default(),
                background: None,
                result: None,
                pending: None,
            })),
        }
    }

    /// Attach a spectrometer of the given type.
    pub fn with_hardware(self, device_type: DeviceType) -> Self {
        self.state.lock().attached = Some(device_type);
        self
    }

    /// Make every acquisition (background or measurement) take `latency`.
    pub fn with_acquisition_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    /// Observer that stays valid after this value moves into a session.
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn wait_for_acquisition(&self) {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
    }
}

impl Default for SimulatedGlaz {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! ranged_setter {
    ($fn:ident, $field:ident, $max:expr, $error:expr, $what:literal) => {
        fn $fn(&mut self, value: i32) -> Status {
            let mut state = self.state.lock();
            let status = state.in_range(value, $max, $error, $what);
            if status == STATUS_OK {
                state.registers.$field = value;
            }
            status
        }
    };
}

impl GlazApi for SimulatedGlaz {
    fn version(&mut self) -> (i32, i32) {
        self.state.lock().native_calls += 1;
        LIBRARY_VERSION
    }

    fn last_error_message(&mut self) -> String {
        let mut state = self.state.lock();
        state.native_calls += 1;
        state.last_error.clone()
    }

    fn usb_parameters(&mut self) -> (i32, i32, i32) {
        let mut state = self.state.lock();
        state.native_calls += 1;
        state.usb
    }

    fn set_usb_parameters(&mut self, timeout_ms: i32, bulk_size: i32, queue_size: i32) {
        let mut state = self.state.lock();
        state.native_calls += 1;
        state.usb = (timeout_ms, bulk_size, queue_size);
    }

    fn enable_data_stream_log(&mut self, enable: bool) {
        let mut state = self.state.lock();
        state.native_calls += 1;
        state.stream_log = enable;
    }

    fn initialise_session(&mut self, config_path: &Path) -> Status {
        let mut state = self.state.lock();
        state.native_calls += 1;
        if state.initialised {
            return state.fail(code(ErrorCode::Script), "Session already initialised");
        }
        if let Err(err) = std::fs::metadata(config_path) {
            return state.fail(
                code(ErrorCode::Script),
                format!("Could not read configuration file {}: {err}", config_path.display()),
            );
        }
        // The file selects whatever hardware is attached, demo otherwise.
        state.demo = state.attached.is_none();
        state.device_type = state.attached;
        state.initialised = true;
        state.opens += 1;
        state.registers = Registers::default();
        STATUS_OK
    }

    fn initialise_single_device_session(
        &mut self,
        device_type: i32,
        use_defaults: bool,
        allow_demo: bool,
    ) -> Status {
        let mut state = self.state.lock();
        state.native_calls += 1;
        if state.initialised {
            return state.fail(
                code(ErrorCode::InitialisingSingleDevice),
                "Session already initialised",
            );
        }
        let Some(requested) = DeviceType::from_raw(device_type) else {
            return state.fail(
                code(ErrorCode::InvalidSingleDeviceType),
                format!("Invalid single device type: {device_type}"),
            );
        };
        let present = state.attached == Some(requested);
        if !present && !allow_demo {
            return state.fail(
                code(ErrorCode::ConnectingToCameras),
                format!("No {requested:?} device connected and demo mode is disabled"),
            );
        }
        state.demo = !present;
        state.device_type = Some(requested);
        state.initialised = true;
        state.opens += 1;
        // Without defaults the device keeps whatever it was last programmed with.
        if use_defaults {
            state.registers = Registers::default();
        }
        STATUS_OK
    }

    fn close_session(&mut self) -> Status {
        let mut state = self.state.lock();
        state.native_calls += 1;
        if !state.initialised {
            return state.fail(code(ErrorCode::NotInitialised), "Session not initialised");
        }
        state.initialised = false;
        state.demo = false;
        state.device_type = None;
        state.background = None;
        state.result = None;
        state.pending = None;
        state.releases += 1;
        STATUS_OK
    }

    fn reset_all_devices(&mut self) {
        let mut state = self.state.lock();
        state.native_calls += 1;
        state.registers = Registers::default();
        state.background = None;
        state.result = None;
        state.pending = None;
    }

    fn reset_all_ports(&mut self) {
        self.reset_all_devices();
    }

    ranged_setter!(set_test_mode, test_mode, 3, ErrorCode::InvalidTestMode, "test mode");
    ranged_setter!(set_hardware_averaging, averaging, 12, ErrorCode::InvalidAveraging, "averaging");
    ranged_setter!(set_resolution, resolution, 3, ErrorCode::ResolutionOutOfRange, "resolution");
    ranged_setter!(set_scan_clock_speed, scan_clock_speed, 1, ErrorCode::InvalidScanClockSpeed, "scan clock speed");
    ranged_setter!(set_adc_gain, adc_gain, 2, ErrorCode::InvalidAdcGain, "ADC gain");
    ranged_setter!(set_trigger_delay, trigger_delay_us, i32::MAX, ErrorCode::InvalidTriggerDelay, "trigger delay");
    ranged_setter!(set_trigger_mode, trigger_mode, 2, ErrorCode::InvalidTriggerMode, "trigger mode");
    ranged_setter!(set_integration_mode, integration_mode, 1, ErrorCode::InvalidIntegrationMode, "integration mode");
    ranged_setter!(set_sync_out_mode, sync_out_mode, 5, ErrorCode::InvalidSyncOutMode, "sync output mode");
    ranged_setter!(set_sync_out_polarity, sync_out_polarity, 1, ErrorCode::InvalidOutPolarity, "sync output polarity");
    ranged_setter!(set_aux_out_mode, aux_out_mode, 5, ErrorCode::InvalidAuxOutMode, "aux output mode");
    ranged_setter!(set_aux_out_polarity, aux_out_polarity, 1, ErrorCode::InvalidOutPolarity, "aux output polarity");
    ranged_setter!(set_out_cycle_count, out_cycle_count, i32::MAX, ErrorCode::InvalidCycleCount, "output cycle count");

    fn set_wavelengths(&mut self, min_nm: f64, max_nm: f64) -> Status {
        let mut state = self.state.lock();
        if let Err(status) = state.enter() {
            return status;
        }
        if !(SENSOR_MIN_NM..=SENSOR_MAX_NM).contains(&min_nm)
            || !(SENSOR_MIN_NM..=SENSOR_MAX_NM).contains(&max_nm)
            || min_nm >= max_nm
        {
            return state.fail(
                code(ErrorCode::InvalidWavelengths),
                format!(
                    "Invalid wavelengths ({min_nm}, {max_nm}); sensor covers {SENSOR_MIN_NM}-{SENSOR_MAX_NM} nm"
                ),
            );
        }
        state.registers.wavelengths = (min_nm, max_nm);
        if state.selected_pixels().is_empty() {
            state.registers.wavelengths = (SENSOR_MIN_NM, SENSOR_MAX_NM);
            return state.fail(
                code(ErrorCode::InvalidWavelengths),
                format!("No pixels between {min_nm} and {max_nm} nm"),
            );
        }
        STATUS_OK
    }

    fn set_scan_count(&mut self, count: i32) -> Status {
        let mut state = self.state.lock();
        if let Err(status) = state.enter() {
            return status;
        }
        if !(1..=MAX_SCAN_COUNT).contains(&count) {
            return state.fail(
                code(ErrorCode::InvalidScanCount),
                format!("Invalid scan count: {count}"),
            );
        }
        state.registers.scan_count = count;
        STATUS_OK
    }

    fn set_internal_trigger_frequency(&mut self, frequency_hz: f64) -> Status {
        let mut state = self.state.lock();
        if let Err(status) = state.enter() {
            return status;
        }
        if !(frequency_hz > 0.0 && frequency_hz <= MAX_TRIGGER_FREQUENCY_HZ) {
            return state.fail(
                code(ErrorCode::InvalidTriggerFrequency),
                format!("Invalid internal trigger frequency: {frequency_hz} Hz"),
            );
        }
        state.registers.trigger_frequency_hz = frequency_hz;
        STATUS_OK
    }

    fn set_integration_time(&mut self, time_us: i32) -> Status {
        let mut state = self.state.lock();
        if let Err(status) = state.enter() {
            return status;
        }
        if !(1..=MAX_INTEGRATION_TIME_US).contains(&time_us) {
            return state.fail(
                code(ErrorCode::InvalidIntegrationTime),
                format!("Invalid integration time: {time_us} us (max {MAX_INTEGRATION_TIME_US})"),
            );
        }
        state.registers.integration_time_us = time_us;
        STATUS_OK
    }

    fn set_timeout(&mut self, timeout_ms: i32) -> Status {
        let mut state = self.state.lock();
        if let Err(status) = state.enter() {
            return status;
        }
        if timeout_ms <= 0 {
            return state.fail(
                code(ErrorCode::InvalidSettings),
                format!("Invalid timeout: {timeout_ms} ms"),
            );
        }
        state.registers.timeout_ms = timeout_ms;
        STATUS_OK
    }

    fn capture_background(&mut self, count: i32) -> Status {
        {
            let mut state = self.state.lock();
            if let Err(status) = state.enter() {
                return status;
            }
            if count < 1 {
                return state.fail(
                    code(ErrorCode::CapturingBackgrounds),
                    format!("Background count must be at least 1, got {count}"),
                );
            }
        }
        self.wait_for_acquisition();

        let mut state = self.state.lock();
        let scans: Vec<Vec<f64>> = (0..count).map(|_| state.acquire_scan(false)).collect();
        let pixels = scans.first().map_or(0, Vec::len);
        let mut background = vec![0.0; pixels];
        for scan in &scans {
            for (acc, value) in background.iter_mut().zip(scan) {
                *acc += value / f64::from(count);
            }
        }
        state.background = Some(background);
        STATUS_OK
    }

    fn run_measurement(&mut self) -> Status {
        {
            let mut state = self.state.lock();
            if let Err(status) = state.enter() {
                return status;
            }
            if state.pending.is_some() {
                return state.fail(
                    code(ErrorCode::RunningMeasurement),
                    "A measurement is already in progress",
                );
            }
        }
        self.wait_for_acquisition();

        let mut state = self.state.lock();
        let measurement = state.simulate_measurement();
        state.result = Some(measurement);
        state.measurements += 1;
        STATUS_OK
    }

    fn start_measurement(&mut self) -> Status {
        let mut state = self.state.lock();
        if let Err(status) = state.enter() {
            return status;
        }
        if state.pending.is_some() {
            return state.fail(
                code(ErrorCode::RunningMeasurement),
                "A measurement is already in progress",
            );
        }
        let measurement = state.simulate_measurement();
        state.pending = Some(measurement);
        STATUS_OK
    }

    fn is_measurement_done(&mut self, done: &mut bool) -> Status {
        let mut state = self.state.lock();
        if let Err(status) = state.enter() {
            return status;
        }
        match state.pending.take() {
            Some(measurement) => {
                state.result = Some(measurement);
                state.measurements += 1;
                *done = true;
                STATUS_OK
            }
            None if state.result.is_some() => {
                *done = true;
                STATUS_OK
            }
            None => state.fail(code(ErrorCode::NoMeasurementRun), "No measurement has been started"),
        }
    }

    fn get_result(&mut self, index: i32, size: &mut i32, data: Option<&mut [f64]>) -> Status {
        let mut state = self.state.lock();
        let spectrum = match state.measurement(index) {
            Ok(measurement) => measurement.spectrum.clone(),
            Err(status) => return status,
        };
        copy_sized(&mut state, &spectrum, size, data)
    }

    fn get_complex_result(
        &mut self,
        index: i32,
        size: &mut i32,
        buffers: Option<(&mut [f64], &mut [f64])>,
    ) -> Status {
        let mut state = self.state.lock();
        let spectrum = match state.measurement(index) {
            Ok(measurement) => measurement.spectrum.clone(),
            Err(status) => return status,
        };
        copy_pair(&mut state, &spectrum, size, buffers)
    }

    fn get_time_stamp(&mut self, index: i32, scan_index: i32, value: &mut f64) -> Status {
        let mut state = self.state.lock();
        let scan = match state.scan_in_range(index, scan_index) {
            Ok(scan) => scan,
            Err(status) => return status,
        };
        if let Some(measurement) = &state.result {
            *value = measurement.time_stamps[scan];
        }
        STATUS_OK
    }

    fn get_scan(
        &mut self,
        index: i32,
        scan_index: i32,
        size: &mut i32,
        data: Option<&mut [f64]>,
    ) -> Status {
        let mut state = self.state.lock();
        let scan = match state.scan_in_range(index, scan_index) {
            Ok(scan) => scan,
            Err(status) => return status,
        };
        let samples: Vec<f64> = state
            .result
            .as_ref()
            .map(|m| m.scans[scan].iter().map(|&v| f64::from(v)).collect())
            .unwrap_or_default();
        copy_sized(&mut state, &samples, size, data)
    }

    fn get_complex_scan(
        &mut self,
        index: i32,
        scan_index: i32,
        size: &mut i32,
        buffers: Option<(&mut [f64], &mut [f64])>,
    ) -> Status {
        let mut state = self.state.lock();
        let scan = match state.scan_in_range(index, scan_index) {
            Ok(scan) => scan,
            Err(status) => return status,
        };
        let samples: Vec<f64> = state
            .result
            .as_ref()
            .map(|m| m.scans[scan].iter().map(|&v| f64::from(v)).collect())
            .unwrap_or_default();
        copy_pair(&mut state, &samples, size, buffers)
    }

    fn get_all_scans_sizes(
        &mut self,
        index: i32,
        num_scans: &mut i32,
        pixels_per_scan: &mut i32,
    ) -> Status {
        let mut state = self.state.lock();
        match state.measurement(index) {
            Ok(measurement) => {
                *num_scans = measurement.scans.len() as i32;
                *pixels_per_scan = measurement.scans.first().map_or(0, Vec::len) as i32;
                STATUS_OK
            }
            Err(status) => status,
        }
    }

    fn get_all_scans(&mut self, index: i32, data: &mut [u16]) -> Status {
        let mut state = self.state.lock();
        let flat: Vec<u16> = match state.measurement(index) {
            Ok(measurement) => measurement.scans.concat(),
            Err(status) => return status,
        };
        if data.len() != flat.len() {
            return state.fail(
                code(ErrorCode::InvalidResultDataSize),
                format!("Buffer holds {} elements, scans need {}", data.len(), flat.len()),
            );
        }
        data.copy_from_slice(&flat);
        STATUS_OK
    }

    fn write_all_scans_to_file(&mut self, index: i32, path: &Path, include_header: bool) -> Status {
        let mut state = self.state.lock();
        let scans = match state.measurement(index) {
            Ok(measurement) => measurement.scans.clone(),
            Err(status) => return status,
        };

        let mut text = String::new();
        if include_header {
            let pixels = scans.first().map_or(0, Vec::len);
            let _ = writeln!(text, "# scans={} pixels={}", scans.len(), pixels);
        }
        for scan in &scans {
            let row: Vec<String> = scan.iter().map(u16::to_string).collect();
            let _ = writeln!(text, "{}", row.join(" "));
        }

        match std::fs::write(path, text) {
            Ok(()) => STATUS_OK,
            Err(err) => state.fail(
                code(ErrorCode::Script),
                format!("Could not write {}: {err}", path.display()),
            ),
        }
    }

    fn get_pd_values(
        &mut self,
        index: i32,
        channel: i32,
        size: &mut i32,
        values: Option<&mut [f64]>,
    ) -> Status {
        let mut state = self.state.lock();
        let readings = match state.measurement(index) {
            Ok(measurement) => measurement.photodiodes.get(channel as usize).cloned(),
            Err(status) => return status,
        };
        match readings {
            Some(readings) if channel >= 0 => copy_sized(&mut state, &readings, size, values),
            _ => state.fail(
                code(ErrorCode::InvalidPdChannel),
                format!("Invalid photodiode channel: {channel}"),
            ),
        }
    }

    fn get_pd_reference(&mut self, index: i32, channel: i32, value: &mut f64) -> Status {
        let mut state = self.state.lock();
        let readings = match state.measurement(index) {
            Ok(measurement) => measurement.photodiodes.get(channel as usize).cloned(),
            Err(status) => return status,
        };
        match readings {
            Some(readings) if channel >= 0 => {
                *value = readings.iter().sum::<f64>() / readings.len().max(1) as f64;
                STATUS_OK
            }
            _ => state.fail(
                code(ErrorCode::InvalidPdChannel),
                format!("Invalid photodiode channel: {channel}"),
            ),
        }
    }

    fn get_aux_states(&mut self, index: i32, size: &mut i32, states: Option<&mut [bool]>) -> Status {
        let mut state = self.state.lock();
        let aux = match state.measurement(index) {
            Ok(measurement) => measurement.aux_states.clone(),
            Err(status) => return status,
        };
        copy_sized(&mut state, &aux, size, states)
    }

    fn get_aux_cycle_counts(
        &mut self,
        index: i32,
        channel: i32,
        size: &mut i32,
        counts: Option<&mut [i32]>,
    ) -> Status {
        let mut state = self.state.lock();
        let cycles = match state.measurement(index) {
            Ok(measurement) => measurement.aux_cycle_counts.get(channel as usize).cloned(),
            Err(status) => return status,
        };
        match cycles {
            Some(cycles) if channel >= 0 => copy_sized(&mut state, &cycles, size, counts),
            _ => state.fail(
                code(ErrorCode::AuxCycleCountInvalid),
                format!("Invalid aux channel: {channel}"),
            ),
        }
    }

    fn run_usb_comms_test(&mut self) -> Status {
        let mut state = self.state.lock();
        if let Err(status) = state.enter() {
            return status;
        }
        if state.demo {
            return state.fail(
                code(ErrorCode::RunningUsbCommsTest),
                "USB communications test needs a connected device",
            );
        }
        STATUS_OK
    }
}

/// Read-only view of a [`SimulatedGlaz`], shared with the test-suite.
#[derive(Clone)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    /// Every call made into the simulated library so far.
    pub fn native_calls(&self) -> u64 {
        self.state.lock().native_calls
    }

    /// Successful `close_session` calls.
    pub fn releases(&self) -> u64 {
        self.state.lock().releases
    }

    /// Successful initialiser calls.
    pub fn opens(&self) -> u64 {
        self.state.lock().opens
    }

    /// Whether a native session is open.
    pub fn is_initialised(&self) -> bool {
        self.state.lock().initialised
    }

    /// Whether the open session fell back to demo mode.
    pub fn is_demo(&self) -> bool {
        self.state.lock().demo
    }

    /// Device type of the open single-device session.
    pub fn device_type(&self) -> Option<DeviceType> {
        self.state.lock().device_type
    }

    /// Completed measurements, blocking or not.
    pub fn measurements(&self) -> u64 {
        self.state.lock().measurements
    }

    /// Wavelength window register.
    pub fn wavelengths(&self) -> (f64, f64) {
        self.state.lock().registers.wavelengths
    }

    /// Raw trigger mode register.
    pub fn trigger_mode(&self) -> i32 {
        self.state.lock().registers.trigger_mode
    }

    /// Integration time register, in microseconds.
    pub fn integration_time_us(&self) -> i32 {
        self.state.lock().registers.integration_time_us
    }

    /// Raw averaging register.
    pub fn hardware_averaging(&self) -> i32 {
        self.state.lock().registers.averaging
    }

    /// Scan count register.
    pub fn scan_count(&self) -> i32 {
        self.state.lock().registers.scan_count
    }

    /// Whether a background has been captured.
    pub fn has_background(&self) -> bool {
        self.state.lock().background.is_some()
    }

    /// Whether the data-stream log is on.
    pub fn stream_log_enabled(&self) -> bool {
        self.state.lock().stream_log
    }
}
