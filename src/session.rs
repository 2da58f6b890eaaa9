//! Device session: the owner of one open GlazLib handle.
//!
//! A [`Session`] wraps a [`GlazApi`] implementation and tracks its lifecycle:
//!
//! ```text
//! open ──► Open ──configure──► Configured ◄──run──► Measured
//!            │                     │                   │
//!            └──────────── close ──┴───────────────────┴──► Closed
//! ```
//!
//! ## Guarantees
//!
//! - The handle is released exactly once: by [`Session::close`], or by `Drop`
//!   on early return and during unwinding.
//! - After close every operation returns [`GlazError::UseAfterClose`] without
//!   calling into the library.
//! - Calls are serialized by a non-blocking lock. An overlapping call returns
//!   [`GlazError::Busy`] immediately; only `close` waits for the call in
//!   flight.
//! - Settings are validated before the native call. A failed
//!   [`configure`](Session::configure) restores the fields it had already
//!   changed.

use crate::api::{GlazApi, STATUS_OK};
use crate::config::GlazSettings;
use crate::error::{ErrorCode, GlazError, GlazResult, NativeFailure, Setting};
use crate::types::{
    validate_integration_time, AdcGain, AppliedConfiguration, ComplexResult, DeviceConfiguration,
    DeviceType, HardwareAveraging, IntegrationMode, LibraryVersion, MeasurementResult,
    OutputMode, OutputPolarity, Resolution, ScanBlock, ScanClockSpeed, ScanData, TestMode,
    TriggerMode, UsbParameters, WavelengthRange,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest buffer, in elements, a single result read may allocate.
pub const MAX_RESULT_ELEMENTS: usize = 64 * 1024 * 1024;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Ownership token for the open native session.
///
/// Neither `Clone` nor `Copy`; the owning [`Session`] drops it on release.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceHandle {
    id: u64,
}

impl DeviceHandle {
    fn acquire() -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Process-unique identifier, used in log fields.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handle acquired, nothing configured yet.
    Open,
    /// Settings applied; ready to measure.
    Configured,
    /// A result is available.
    Measured,
    /// Handle released.
    Closed,
}

/// How to initialise the native library.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOptions {
    /// One device of the given type.
    Device {
        /// Model to open.
        device_type: DeviceType,
        /// Load the device's factory settings.
        use_defaults: bool,
        /// Fall back to demo mode when no matching device is connected.
        allow_demo: bool,
    },
    /// Devices described by a vendor XML configuration file.
    ConfigFile(PathBuf),
}

impl OpenOptions {
    /// Single device with factory settings.
    pub fn device(device_type: DeviceType, allow_demo: bool) -> Self {
        OpenOptions::Device {
            device_type,
            use_defaults: true,
            allow_demo,
        }
    }

    /// Devices described by the vendor XML file at `path`.
    pub fn config_file(path: impl Into<PathBuf>) -> Self {
        OpenOptions::ConfigFile(path.into())
    }
}

struct Inner<A> {
    api: A,
    handle: Option<DeviceHandle>,
    state: SessionState,
    applied: AppliedConfiguration,
    device_type: Option<DeviceType>,
    /// A non-blocking measurement was started and not yet collected.
    pending: bool,
    measurements: u64,
    last_measured_at: Option<DateTime<Utc>>,
}

impl<A: GlazApi> Inner<A> {
    fn id(&self) -> u64 {
        self.handle.as_ref().map_or(0, DeviceHandle::id)
    }

    fn failure(&mut self, status: i32) -> NativeFailure {
        NativeFailure::new(status, self.api.last_error_message())
    }

    /// Translate a native status. "No measurement run" is always a result
    /// error, whatever call reported it.
    fn check(
        &mut self,
        status: i32,
        wrap: impl FnOnce(NativeFailure) -> GlazError,
    ) -> GlazResult<()> {
        if status == STATUS_OK {
            return Ok(());
        }
        let failure = self.failure(status);
        if status == ErrorCode::NoMeasurementRun.as_raw() {
            return Err(GlazError::Result(failure));
        }
        Err(wrap(failure))
    }

    fn require_measured(&self) -> GlazResult<()> {
        if self.state == SessionState::Measured {
            return Ok(());
        }
        Err(GlazError::Result(NativeFailure::new(
            ErrorCode::NoMeasurementRun.as_raw(),
            "No measurement has been run since the session was last configured",
        )))
    }

    fn require_configured(&self, operation: &str) -> GlazResult<()> {
        if self.state == SessionState::Open {
            return Err(GlazError::Acquisition(NativeFailure::new(
                ErrorCode::InvalidSettings.as_raw(),
                format!("Session must be configured before {operation}"),
            )));
        }
        Ok(())
    }

    /// Send one of the four core fields of `values`, if it is set.
    fn apply_field(&mut self, setting: Setting, values: &AppliedConfiguration) -> Option<i32> {
        match setting {
            Setting::Wavelengths => values
                .wavelength_range
                .map(|range| self.api.set_wavelengths(range.min_nm, range.max_nm)),
            Setting::TriggerMode => values
                .trigger_mode
                .map(|mode| self.api.set_trigger_mode(mode.as_raw())),
            Setting::IntegrationTime => values
                .integration_time_us
                .map(|time_us| self.api.set_integration_time(time_us)),
            Setting::HardwareAveraging => values
                .hardware_averaging
                .map(|averaging| self.api.set_hardware_averaging(averaging.as_raw())),
            _ => None,
        }
    }

    /// Re-send `previous` for every field in `changed`. Returns whether the
    /// device is back to its prior configuration.
    fn restore(&mut self, changed: &[Setting], previous: &AppliedConfiguration) -> bool {
        let mut restored = true;
        for &setting in changed {
            match self.apply_field(setting, previous) {
                Some(STATUS_OK) => {}
                Some(status) => {
                    let failure = self.failure(status);
                    tracing::warn!(
                        session = self.id(),
                        %setting,
                        code = failure.code,
                        "Failed to restore setting after rejected configuration: {}",
                        failure.message
                    );
                    restored = false;
                }
                None => {
                    tracing::warn!(
                        session = self.id(),
                        %setting,
                        "No prior value to restore; device keeps the rejected configuration's value"
                    );
                    restored = false;
                }
            }
        }
        restored
    }

    /// Two-phase read: query the element count, then copy the data out.
    fn read_sized<T: Clone + Default>(
        &mut self,
        mut read: impl FnMut(&mut A, &mut i32, Option<&mut [T]>) -> i32,
    ) -> GlazResult<Vec<T>> {
        let mut size = 0;
        let status = read(&mut self.api, &mut size, None);
        self.check(status, GlazError::Result)?;
        if size <= 0 {
            return Ok(Vec::new());
        }
        let len = checked_len(i64::from(size))?;
        let mut buffer = vec![T::default(); len];
        let status = read(&mut self.api, &mut size, Some(buffer.as_mut_slice()));
        self.check(status, GlazError::Result)?;
        buffer.truncate(usize::try_from(size).unwrap_or(0));
        Ok(buffer)
    }

    /// Two-phase read into paired real and imaginary buffers.
    fn read_complex(
        &mut self,
        mut read: impl FnMut(&mut A, &mut i32, Option<(&mut [f64], &mut [f64])>) -> i32,
    ) -> GlazResult<ComplexResult> {
        let mut size = 0;
        let status = read(&mut self.api, &mut size, None);
        self.check(status, GlazError::Result)?;
        let len = checked_len(i64::from(size.max(0)))?;
        let (mut real, mut imag) = (vec![0.0; len], vec![0.0; len]);
        if len > 0 {
            let status = read(
                &mut self.api,
                &mut size,
                Some((real.as_mut_slice(), imag.as_mut_slice())),
            );
            self.check(status, GlazError::Result)?;
            let written = usize::try_from(size).unwrap_or(0);
            real.truncate(written);
            imag.truncate(written);
        }
        Ok(ComplexResult {
            length: real.len(),
            real,
            imag,
        })
    }

    fn release(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let status = self.api.close_session();
        if status != STATUS_OK {
            let failure = self.failure(status);
            if status == ErrorCode::NotInitialised.as_raw() {
                tracing::debug!(session = handle.id(), "Native session was already closed");
            } else {
                tracing::warn!(
                    session = handle.id(),
                    code = failure.code,
                    "Native close failed: {}",
                    failure.message
                );
            }
        }
        self.state = SessionState::Closed;
        self.pending = false;
        tracing::info!(session = handle.id(), measurements = self.measurements, "Closed Glaz session");
    }
}

fn checked_len(elements: i64) -> GlazResult<usize> {
    match usize::try_from(elements) {
        Ok(len) if len <= MAX_RESULT_ELEMENTS => Ok(len),
        _ => Err(GlazError::Result(NativeFailure::new(
            ErrorCode::InvalidResultDataSize.as_raw(),
            format!("Result of {elements} elements exceeds the {MAX_RESULT_ELEMENTS} element limit"),
        ))),
    }
}

/// Convert an unsigned setting to the native integer, enforcing `min`.
fn native_count(value: u32, min: u32, setting: Setting, code: ErrorCode) -> Result<i32, NativeFailure> {
    if value < min {
        return Err(NativeFailure::new(
            code.as_raw(),
            format!("{setting} must be at least {min}, got {value}"),
        ));
    }
    i32::try_from(value).map_err(|_| {
        NativeFailure::new(code.as_raw(), format!("{setting} {value} exceeds {}", i32::MAX))
    })
}

/// An open Glaz device session.
///
/// `Session` is `Sync`; share it behind an `Arc` if several threads need
/// it, but expect [`GlazError::Busy`] when their calls overlap.
pub struct Session<A: GlazApi> {
    inner: Mutex<Inner<A>>,
}

impl<A: GlazApi> Session<A> {
    /// Open a single device with factory settings.
    ///
    /// # Errors
    ///
    /// `GlazError::DeviceOpen` when no device of `device_type` is connected
    /// and `allow_demo` is false, or when the library fails to initialise.
    pub fn open(api: A, device_type: DeviceType, allow_demo: bool) -> GlazResult<Self> {
        Self::open_with(api, OpenOptions::device(device_type, allow_demo))
    }

    /// Open with explicit initialiser options.
    pub fn open_with(mut api: A, options: OpenOptions) -> GlazResult<Self> {
        let (status, device_type, state) = match &options {
            OpenOptions::Device {
                device_type,
                use_defaults,
                allow_demo,
            } => {
                let status = api.initialise_single_device_session(
                    device_type.as_raw(),
                    *use_defaults,
                    *allow_demo,
                );
                let state = if *use_defaults {
                    SessionState::Configured
                } else {
                    SessionState::Open
                };
                (status, Some(*device_type), state)
            }
            OpenOptions::ConfigFile(path) => (
                api.initialise_session(path),
                None,
                SessionState::Configured,
            ),
        };

        if status != STATUS_OK {
            let failure = NativeFailure::new(status, api.last_error_message());
            tracing::warn!(?options, code = failure.code, "Failed to open Glaz session: {}", failure.message);
            return Err(GlazError::DeviceOpen(failure));
        }

        let handle = DeviceHandle::acquire();
        tracing::info!(session = handle.id(), ?device_type, ?state, "Opened Glaz session");

        Ok(Self {
            inner: Mutex::new(Inner {
                api,
                handle: Some(handle),
                state,
                applied: AppliedConfiguration::default(),
                device_type,
                pending: false,
                measurements: 0,
                last_measured_at: None,
            }),
        })
    }

    /// Open and prepare a session from loaded settings.
    ///
    /// Resolves the vendor configuration file when one is named (or when
    /// discovery is enabled), then applies USB parameters, the initial
    /// measurement configuration and the background capture, in that order.
    /// If any step fails the session is closed before the error is returned.
    pub fn open_with_settings(api: A, settings: &GlazSettings) -> GlazResult<Self> {
        settings.validate()?;
        let session = Self::open_with(api, settings.open_options()?)?;
        if let Some(usb) = &settings.usb {
            session.set_usb_parameters(usb)?;
        }
        if let Some(measurement) = &settings.measurement {
            session.configure(measurement)?;
        }
        if settings.background_scans > 0 {
            session.capture_background(settings.background_scans)?;
        }
        Ok(session)
    }

    /// Lock for one operation on an open session with no measurement pending.
    fn enter(&self, operation: &'static str) -> GlazResult<MutexGuard<'_, Inner<A>>> {
        let inner = self.enter_any(operation)?;
        if inner.pending {
            return Err(GlazError::Busy { operation });
        }
        Ok(inner)
    }

    fn enter_any(&self, operation: &'static str) -> GlazResult<MutexGuard<'_, Inner<A>>> {
        let inner = self
            .inner
            .try_lock()
            .ok_or(GlazError::Busy { operation })?;
        if inner.handle.is_none() {
            return Err(GlazError::UseAfterClose { operation });
        }
        Ok(inner)
    }

    /// Apply a single setting. A success invalidates any previous result.
    ///
    /// `value` carries the outcome of local validation. It is only inspected
    /// once the session is known to be open, so a closed session reports
    /// `UseAfterClose` whatever the argument.
    fn apply<T>(
        &self,
        operation: &'static str,
        setting: Setting,
        value: Result<T, NativeFailure>,
        call: impl FnOnce(&mut A, T) -> i32,
    ) -> GlazResult<MutexGuard<'_, Inner<A>>> {
        let mut inner = self.enter(operation)?;
        let value = value.map_err(|failure| GlazError::Configuration { setting, failure })?;
        let status = call(&mut inner.api, value);
        inner.check(status, |failure| GlazError::Configuration { setting, failure })?;
        inner.state = SessionState::Configured;
        tracing::debug!(session = inner.id(), %setting, "Applied setting");
        Ok(inner)
    }

    /// Apply the core measurement settings as one unit.
    ///
    /// The whole record is validated first. Fields are then sent in the order
    /// wavelengths, trigger mode, integration time, averaging; if the device
    /// rejects one, the fields already sent are restored to their previous
    /// values and the rejection is returned.
    pub fn configure(&self, config: &DeviceConfiguration) -> GlazResult<()> {
        let mut inner = self.enter("configure")?;
        config
            .validate()
            .map_err(|(setting, failure)| GlazError::Configuration { setting, failure })?;

        const ORDER: [Setting; 4] = [
            Setting::Wavelengths,
            Setting::TriggerMode,
            Setting::IntegrationTime,
            Setting::HardwareAveraging,
        ];
        let previous = inner.applied;
        let previous_state = inner.state;
        let target = AppliedConfiguration::from(*config);

        for (sent, &setting) in ORDER.iter().enumerate() {
            let status = inner.apply_field(setting, &target).unwrap_or(STATUS_OK);
            if status == STATUS_OK {
                continue;
            }
            let failure = inner.failure(status);
            tracing::warn!(
                session = inner.id(),
                %setting,
                code = failure.code,
                "Configuration rejected, restoring previous settings"
            );
            let restored = inner.restore(&ORDER[..sent], &previous);
            inner.state = if restored {
                previous_state
            } else {
                SessionState::Configured
            };
            return Err(GlazError::Configuration { setting, failure });
        }

        inner.applied = target;
        inner.state = SessionState::Configured;
        tracing::debug!(session = inner.id(), ?config, "Applied configuration");
        Ok(())
    }

    /// Wavelength window, in nanometres.
    pub fn set_wavelengths(&self, range: WavelengthRange) -> GlazResult<()> {
        let mut inner = self.apply(
            "set_wavelengths",
            Setting::Wavelengths,
            range.validate(),
            |api, ()| api.set_wavelengths(range.min_nm, range.max_nm),
        )?;
        inner.applied.wavelength_range = Some(range);
        Ok(())
    }

    /// Trigger source for the next measurement.
    pub fn set_trigger_mode(&self, mode: TriggerMode) -> GlazResult<()> {
        let mut inner = self.apply("set_trigger_mode", Setting::TriggerMode, Ok(mode), |api, mode| {
            api.set_trigger_mode(mode.as_raw())
        })?;
        inner.applied.trigger_mode = Some(mode);
        Ok(())
    }

    /// Integration time in microseconds; must be positive.
    pub fn set_integration_time(&self, time_us: i32) -> GlazResult<()> {
        let mut inner = self.apply(
            "set_integration_time",
            Setting::IntegrationTime,
            validate_integration_time(time_us),
            |api, ()| api.set_integration_time(time_us),
        )?;
        inner.applied.integration_time_us = Some(time_us);
        Ok(())
    }

    /// On-device averaging factor.
    pub fn set_hardware_averaging(&self, averaging: HardwareAveraging) -> GlazResult<()> {
        let mut inner = self.apply(
            "set_hardware_averaging",
            Setting::HardwareAveraging,
            Ok(averaging),
            |api, averaging| api.set_hardware_averaging(averaging.as_raw()),
        )?;
        inner.applied.hardware_averaging = Some(averaging);
        Ok(())
    }

    /// ADC resolution.
    pub fn set_resolution(&self, resolution: Resolution) -> GlazResult<()> {
        self.apply("set_resolution", Setting::Resolution, Ok(resolution), |api, resolution| {
            api.set_resolution(resolution.as_raw())
        })
        .map(drop)
    }

    /// Raw scans per measurement; at least one.
    pub fn set_scan_count(&self, count: u32) -> GlazResult<()> {
        self.apply(
            "set_scan_count",
            Setting::ScanCount,
            native_count(count, 1, Setting::ScanCount, ErrorCode::InvalidScanCount),
            |api, count| api.set_scan_count(count),
        )
        .map(drop)
    }

    /// Pixel readout clock.
    pub fn set_scan_clock_speed(&self, speed: ScanClockSpeed) -> GlazResult<()> {
        self.apply("set_scan_clock_speed", Setting::ScanClockSpeed, Ok(speed), |api, speed| {
            api.set_scan_clock_speed(speed.as_raw())
        })
        .map(drop)
    }

    /// Analogue gain ahead of the ADC.
    pub fn set_adc_gain(&self, gain: AdcGain) -> GlazResult<()> {
        self.apply("set_adc_gain", Setting::AdcGain, Ok(gain), |api, gain| {
            api.set_adc_gain(gain.as_raw())
        })
        .map(drop)
    }

    /// Delay between trigger and integration start, in microseconds.
    pub fn set_trigger_delay(&self, delay_us: u32) -> GlazResult<()> {
        self.apply(
            "set_trigger_delay",
            Setting::TriggerDelay,
            native_count(delay_us, 0, Setting::TriggerDelay, ErrorCode::InvalidTriggerDelay),
            |api, delay| api.set_trigger_delay(delay),
        )
        .map(drop)
    }

    /// Free-run rate for [`TriggerMode::Internal`], in hertz.
    pub fn set_internal_trigger_frequency(&self, frequency_hz: f64) -> GlazResult<()> {
        let checked = if frequency_hz.is_finite() && frequency_hz > 0.0 {
            Ok(frequency_hz)
        } else {
            Err(NativeFailure::new(
                ErrorCode::InvalidTriggerFrequency.as_raw(),
                format!("trigger frequency must be positive, got {frequency_hz} Hz"),
            ))
        };
        self.apply(
            "set_internal_trigger_frequency",
            Setting::InternalTriggerFrequency,
            checked,
            |api, frequency_hz| api.set_internal_trigger_frequency(frequency_hz),
        )
        .map(drop)
    }

    /// Normal or extended integration.
    pub fn set_integration_mode(&self, mode: IntegrationMode) -> GlazResult<()> {
        self.apply("set_integration_mode", Setting::IntegrationMode, Ok(mode), |api, mode| {
            api.set_integration_mode(mode.as_raw())
        })
        .map(drop)
    }

    /// Behaviour of the sync output line.
    pub fn set_sync_out_mode(&self, mode: OutputMode) -> GlazResult<()> {
        self.apply("set_sync_out_mode", Setting::SyncOutMode, Ok(mode), |api, mode| {
            api.set_sync_out_mode(mode.as_raw())
        })
        .map(drop)
    }

    /// Active level of the sync output line.
    pub fn set_sync_out_polarity(&self, polarity: OutputPolarity) -> GlazResult<()> {
        self.apply(
            "set_sync_out_polarity",
            Setting::SyncOutPolarity,
            Ok(polarity),
            |api, polarity| api.set_sync_out_polarity(polarity.as_raw()),
        )
        .map(drop)
    }

    /// Behaviour of the auxiliary output line.
    pub fn set_aux_out_mode(&self, mode: OutputMode) -> GlazResult<()> {
        self.apply("set_aux_out_mode", Setting::AuxOutMode, Ok(mode), |api, mode| {
            api.set_aux_out_mode(mode.as_raw())
        })
        .map(drop)
    }

    /// Active level of the auxiliary output line.
    pub fn set_aux_out_polarity(&self, polarity: OutputPolarity) -> GlazResult<()> {
        self.apply(
            "set_aux_out_polarity",
            Setting::AuxOutPolarity,
            Ok(polarity),
            |api, polarity| api.set_aux_out_polarity(polarity.as_raw()),
        )
        .map(drop)
    }

    /// Trigger cycles the outputs follow before idling; 0 runs indefinitely.
    pub fn set_out_cycle_count(&self, count: u32) -> GlazResult<()> {
        self.apply(
            "set_out_cycle_count",
            Setting::OutCycleCount,
            native_count(count, 0, Setting::OutCycleCount, ErrorCode::InvalidCycleCount),
            |api, count| api.set_out_cycle_count(count),
        )
        .map(drop)
    }

    /// Hardware acquisition timeout, in milliseconds.
    pub fn set_timeout(&self, timeout_ms: u32) -> GlazResult<()> {
        self.apply(
            "set_timeout",
            Setting::Timeout,
            native_count(timeout_ms, 1, Setting::Timeout, ErrorCode::InvalidSettings),
            |api, timeout| api.set_timeout(timeout),
        )
        .map(drop)
    }

    /// Synthetic test pattern in place of sensor data.
    pub fn set_test_mode(&self, mode: TestMode) -> GlazResult<()> {
        self.apply("set_test_mode", Setting::TestMode, Ok(mode), |api, mode| {
            api.set_test_mode(mode.as_raw())
        })
        .map(drop)
    }

    /// USB transfer timeout and buffering.
    pub fn set_usb_parameters(&self, parameters: &UsbParameters) -> GlazResult<()> {
        let mut inner = self.enter("set_usb_parameters")?;
        parameters
            .validate()
            .map_err(|failure| GlazError::Configuration {
                setting: Setting::UsbParameters,
                failure,
            })?;
        inner.api.set_usb_parameters(
            parameters.timeout_ms,
            parameters.bulk_size,
            parameters.queue_size,
        );
        tracing::debug!(session = inner.id(), ?parameters, "Applied USB parameters");
        Ok(())
    }

    /// Current USB transfer settings.
    pub fn usb_parameters(&self) -> GlazResult<UsbParameters> {
        let mut inner = self.enter("usb_parameters")?;
        let (timeout_ms, bulk_size, queue_size) = inner.api.usb_parameters();
        Ok(UsbParameters {
            timeout_ms,
            bulk_size,
            queue_size,
        })
    }

    /// Toggle the library's raw data-stream log.
    pub fn enable_data_stream_log(&self, enable: bool) -> GlazResult<()> {
        let mut inner = self.enter("enable_data_stream_log")?;
        inner.api.enable_data_stream_log(enable);
        Ok(())
    }

    /// Acquire `count` dark scans for background subtraction.
    ///
    /// Does not change the session state or invalidate a previous result.
    pub fn capture_background(&self, count: u32) -> GlazResult<()> {
        let mut inner = self.enter("capture_background")?;
        let count = i32::try_from(count)
            .ok()
            .filter(|&count| count >= 1)
            .ok_or_else(|| {
                GlazError::Acquisition(NativeFailure::new(
                    ErrorCode::CapturingBackgrounds.as_raw(),
                    format!("background count must be between 1 and {}, got {count}", i32::MAX),
                ))
            })?;
        let status = inner.api.capture_background(count);
        inner.check(status, GlazError::Acquisition)?;
        tracing::debug!(session = inner.id(), count, "Captured background");
        Ok(())
    }

    /// Blocking acquisition using the current configuration.
    ///
    /// # Errors
    ///
    /// `GlazError::Acquisition` if the session has never been configured or
    /// the device reports a failure. A failure discards any previous result.
    pub fn run_measurement(&self) -> GlazResult<()> {
        let mut inner = self.enter("run_measurement")?;
        inner.require_configured("measuring")?;
        let status = inner.api.run_measurement();
        if let Err(err) = inner.check(status, GlazError::Acquisition) {
            inner.state = SessionState::Configured;
            return Err(err);
        }
        inner.state = SessionState::Measured;
        inner.measurements += 1;
        inner.last_measured_at = Some(Utc::now());
        tracing::debug!(session = inner.id(), measurement = inner.measurements, "Measurement complete");
        Ok(())
    }

    /// Start an acquisition and return without waiting for it.
    ///
    /// Until [`is_measurement_done`](Self::is_measurement_done) reports
    /// completion, every other operation except `close` returns
    /// [`GlazError::Busy`].
    pub fn start_measurement(&self) -> GlazResult<()> {
        let mut inner = self.enter("start_measurement")?;
        inner.require_configured("measuring")?;
        let status = inner.api.start_measurement();
        if let Err(err) = inner.check(status, GlazError::Acquisition) {
            inner.state = SessionState::Configured;
            return Err(err);
        }
        inner.pending = true;
        inner.state = SessionState::Configured;
        tracing::debug!(session = inner.id(), "Measurement started");
        Ok(())
    }

    /// Poll a measurement started with [`start_measurement`](Self::start_measurement).
    pub fn is_measurement_done(&self) -> GlazResult<bool> {
        let mut inner = self.enter_any("is_measurement_done")?;
        let mut done = false;
        let status = inner.api.is_measurement_done(&mut done);
        if let Err(err) = inner.check(status, GlazError::Acquisition) {
            inner.pending = false;
            return Err(err);
        }
        if done && inner.pending {
            inner.pending = false;
            inner.state = SessionState::Measured;
            inner.measurements += 1;
            inner.last_measured_at = Some(Utc::now());
            tracing::debug!(session = inner.id(), measurement = inner.measurements, "Measurement complete");
        }
        Ok(done)
    }

    /// The processed spectrum of the last measurement.
    pub fn get_result(&self) -> GlazResult<MeasurementResult> {
        self.read_result("get_result", 0)
    }

    /// The processed result at calculation `index`.
    pub fn result(&self, index: i32) -> GlazResult<MeasurementResult> {
        self.read_result("result", index)
    }

    fn read_result(&self, operation: &'static str, index: i32) -> GlazResult<MeasurementResult> {
        let mut inner = self.enter(operation)?;
        inner.require_measured()?;
        let samples = inner.read_sized(|api, size, data| api.get_result(index, size, data))?;
        Ok(MeasurementResult {
            index,
            length: samples.len(),
            samples,
            acquired_at: inner.last_measured_at.unwrap_or_else(Utc::now),
        })
    }

    /// Real and imaginary parts of the result at calculation `index`.
    pub fn complex_result(&self, index: i32) -> GlazResult<ComplexResult> {
        let mut inner = self.enter("complex_result")?;
        inner.require_measured()?;
        inner.read_complex(|api, size, buffers| api.get_complex_result(index, size, buffers))
    }

    /// Real and imaginary parts of one raw scan.
    pub fn complex_scan(&self, index: i32, scan_index: i32) -> GlazResult<ComplexResult> {
        let mut inner = self.enter("complex_scan")?;
        inner.require_measured()?;
        inner.read_complex(|api, size, buffers| {
            api.get_complex_scan(index, scan_index, size, buffers)
        })
    }

    /// One raw scan of the last measurement.
    pub fn scan(&self, index: i32, scan_index: i32) -> GlazResult<ScanData> {
        let mut inner = self.enter("scan")?;
        inner.require_measured()?;
        let samples =
            inner.read_sized(|api, size, data| api.get_scan(index, scan_index, size, data))?;
        Ok(ScanData {
            scan_index,
            length: samples.len(),
            samples,
        })
    }

    /// `(num_scans, pixels_per_scan)` of the last measurement.
    pub fn all_scans_sizes(&self, index: i32) -> GlazResult<(usize, usize)> {
        let mut inner = self.enter("all_scans_sizes")?;
        inner.require_measured()?;
        let (mut scans, mut pixels) = (0, 0);
        let status = inner.api.get_all_scans_sizes(index, &mut scans, &mut pixels);
        inner.check(status, GlazError::Result)?;
        Ok((
            usize::try_from(scans).unwrap_or(0),
            usize::try_from(pixels).unwrap_or(0),
        ))
    }

    /// Every raw scan of the last measurement as one matrix.
    pub fn all_scans(&self, index: i32) -> GlazResult<ScanBlock> {
        let mut inner = self.enter("all_scans")?;
        inner.require_measured()?;
        let (mut scans, mut pixels) = (0, 0);
        let status = inner.api.get_all_scans_sizes(index, &mut scans, &mut pixels);
        inner.check(status, GlazError::Result)?;

        let num_scans = usize::try_from(scans).unwrap_or(0);
        let pixels_per_scan = usize::try_from(pixels).unwrap_or(0);
        let total = checked_len(i64::from(scans.max(0)) * i64::from(pixels.max(0)))?;
        let mut data = vec![0u16; total];
        if total > 0 {
            let status = inner.api.get_all_scans(index, &mut data);
            inner.check(status, GlazError::Result)?;
        }
        Ok(ScanBlock {
            num_scans,
            pixels_per_scan,
            data,
        })
    }

    /// Seconds from the start of the measurement to scan `scan_index`.
    pub fn time_stamp(&self, index: i32, scan_index: i32) -> GlazResult<f64> {
        let mut inner = self.enter("time_stamp")?;
        inner.require_measured()?;
        let mut value = 0.0;
        let status = inner.api.get_time_stamp(index, scan_index, &mut value);
        inner.check(status, GlazError::Result)?;
        Ok(value)
    }

    /// Photodiode readings on `channel`, one per scan.
    pub fn photodiode_values(&self, index: i32, channel: i32) -> GlazResult<Vec<f64>> {
        let mut inner = self.enter("photodiode_values")?;
        inner.require_measured()?;
        inner.read_sized(|api, size, values| api.get_pd_values(index, channel, size, values))
    }

    /// Reference level of photodiode `channel`.
    pub fn photodiode_reference(&self, index: i32, channel: i32) -> GlazResult<f64> {
        let mut inner = self.enter("photodiode_reference")?;
        inner.require_measured()?;
        let mut value = 0.0;
        let status = inner.api.get_pd_reference(index, channel, &mut value);
        inner.check(status, GlazError::Result)?;
        Ok(value)
    }

    /// Auxiliary input level captured with each scan.
    pub fn aux_states(&self, index: i32) -> GlazResult<Vec<bool>> {
        let mut inner = self.enter("aux_states")?;
        inner.require_measured()?;
        inner.read_sized(|api, size, states| api.get_aux_states(index, size, states))
    }

    /// Output cycle counter on auxiliary `channel`, one per scan.
    pub fn aux_cycle_counts(&self, index: i32, channel: i32) -> GlazResult<Vec<i32>> {
        let mut inner = self.enter("aux_cycle_counts")?;
        inner.require_measured()?;
        inner.read_sized(|api, size, counts| api.get_aux_cycle_counts(index, channel, size, counts))
    }

    /// Have the library write every raw scan of the last measurement to `path`.
    pub fn write_all_scans_to_file(
        &self,
        index: i32,
        path: impl AsRef<Path>,
        include_header: bool,
    ) -> GlazResult<()> {
        let mut inner = self.enter("write_all_scans_to_file")?;
        inner.require_measured()?;
        let path = path.as_ref();
        let status = inner.api.write_all_scans_to_file(index, path, include_header);
        inner.check(status, GlazError::Result)?;
        tracing::debug!(session = inner.id(), path = %path.display(), "Wrote scans to file");
        Ok(())
    }

    /// Version of the loaded GlazLib.
    pub fn version(&self) -> GlazResult<LibraryVersion> {
        let mut inner = self.enter("version")?;
        let (major, minor) = inner.api.version();
        Ok(LibraryVersion { major, minor })
    }

    /// Reset every device to its power-on state.
    ///
    /// The session returns to [`SessionState::Open`] and forgets the applied
    /// configuration.
    pub fn reset_all_devices(&self) -> GlazResult<()> {
        let mut inner = self.enter("reset_all_devices")?;
        inner.api.reset_all_devices();
        inner.state = SessionState::Open;
        inner.applied = AppliedConfiguration::default();
        tracing::info!(session = inner.id(), "Reset all devices");
        Ok(())
    }

    /// Reset the USB ports. Same session effect as
    /// [`reset_all_devices`](Self::reset_all_devices).
    pub fn reset_all_ports(&self) -> GlazResult<()> {
        let mut inner = self.enter("reset_all_ports")?;
        inner.api.reset_all_ports();
        inner.state = SessionState::Open;
        inner.applied = AppliedConfiguration::default();
        tracing::info!(session = inner.id(), "Reset all ports");
        Ok(())
    }

    /// Exercise the USB link. Fails on demo devices.
    pub fn run_usb_comms_test(&self) -> GlazResult<()> {
        let mut inner = self.enter("run_usb_comms_test")?;
        let status = inner.api.run_usb_comms_test();
        inner.check(status, GlazError::Acquisition)
    }

    /// Release the native handle. Safe to call any number of times.
    ///
    /// Waits for a call in flight on another thread to return first. A native
    /// close failure is logged; the session is closed regardless.
    pub fn close(&self) {
        self.inner.lock().release();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Whether the handle has been released.
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Settings applied through this session since open or the last reset.
    pub fn applied_configuration(&self) -> AppliedConfiguration {
        self.inner.lock().applied
    }

    /// Device type requested at open; `None` for config-file sessions.
    pub fn device_type(&self) -> Option<DeviceType> {
        self.inner.lock().device_type
    }

    /// Identifier of the held handle; `None` once closed.
    pub fn handle_id(&self) -> Option<u64> {
        self.inner.lock().handle.as_ref().map(DeviceHandle::id)
    }

    /// Completed measurements.
    pub fn measurement_count(&self) -> u64 {
        self.inner.lock().measurements
    }
}

impl<A: GlazApi> Drop for Session<A> {
    fn drop(&mut self) {
        self.inner.get_mut().release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SimulatedGlaz;
    use tracing_test::traced_test;

    fn demo_session() -> (Session<SimulatedGlaz>, crate::api::SimProbe) {
        let api = SimulatedGlaz::new();
        let probe = api.probe();
        let session = Session::open(api, DeviceType::LinescanIIV2, true).expect("demo open");
        (session, probe)
    }

    fn config() -> DeviceConfiguration {
        DeviceConfiguration {
            wavelength_range: WavelengthRange::new(400.0, 800.0),
            trigger_mode: TriggerMode::Internal,
            integration_time_us: 100,
            hardware_averaging: HardwareAveraging::X16,
        }
    }

    #[test]
    fn test_handle_ids_are_unique() {
        let first = DeviceHandle::acquire();
        let second = DeviceHandle::acquire();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_open_without_defaults_requires_configuration() {
        let session = Session::open_with(
            SimulatedGlaz::new(),
            OpenOptions::Device {
                device_type: DeviceType::LinescanII,
                use_defaults: false,
                allow_demo: true,
            },
        )
        .expect("open");
        assert_eq!(session.state(), SessionState::Open);

        let err = session.run_measurement().expect_err("unconfigured");
        assert!(matches!(err, GlazError::Acquisition(_)));

        session.configure(&config()).expect("configure");
        session.run_measurement().expect("measure");
        assert_eq!(session.state(), SessionState::Measured);
    }

    #[test]
    fn test_configure_records_applied_values() {
        let (session, probe) = demo_session();
        session.configure(&config()).expect("configure");
        assert_eq!(session.applied_configuration().complete(), Some(config()));
        assert_eq!(probe.wavelengths(), (400.0, 800.0));
        assert_eq!(probe.hardware_averaging(), HardwareAveraging::X16.as_raw());
    }

    #[test]
    fn test_setter_invalidates_previous_result() {
        let (session, _probe) = demo_session();
        session.configure(&config()).expect("configure");
        session.run_measurement().expect("measure");
        session.get_result().expect("result");

        session.set_resolution(Resolution::Bits14).expect("resolution");
        assert_eq!(session.state(), SessionState::Configured);
        assert!(matches!(session.get_result(), Err(GlazError::Result(_))));
    }

    #[test]
    fn test_local_validation_skips_native_call() {
        let (session, probe) = demo_session();
        let before = probe.native_calls();
        let err = session.set_scan_count(0).expect_err("zero scans");
        assert_eq!(err.code(), Some(ErrorCode::InvalidScanCount.as_raw()));
        let err = session
            .set_internal_trigger_frequency(f64::NAN)
            .expect_err("nan");
        assert_eq!(err.code(), Some(ErrorCode::InvalidTriggerFrequency.as_raw()));
        assert_eq!(probe.native_calls(), before);
    }

    #[test]
    fn test_background_keeps_state() {
        let (session, probe) = demo_session();
        session.configure(&config()).expect("configure");
        session.run_measurement().expect("measure");
        session.capture_background(3).expect("background");
        assert_eq!(session.state(), SessionState::Measured);
        assert!(probe.has_background());

        let err = session.capture_background(0).expect_err("zero");
        assert_eq!(err.code(), Some(ErrorCode::CapturingBackgrounds.as_raw()));
    }

    #[test]
    fn test_reset_returns_to_open() {
        let (session, _probe) = demo_session();
        session.configure(&config()).expect("configure");
        session.reset_all_devices().expect("reset");
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.applied_configuration(), AppliedConfiguration::default());
    }

    #[test]
    fn test_scan_accessors() {
        let (session, _probe) = demo_session();
        session.configure(&config()).expect("configure");
        session.set_scan_count(4).expect("scan count");
        session.run_measurement().expect("measure");

        let (scans, pixels) = session.all_scans_sizes(0).expect("sizes");
        assert_eq!(scans, 4);
        let block = session.all_scans(0).expect("all scans");
        assert_eq!(block.data.len(), scans * pixels);
        assert_eq!(block.rows().count(), 4);

        let scan = session.scan(0, 3).expect("scan");
        assert_eq!(scan.length, pixels);
        assert!(session.scan(0, 4).is_err());

        assert_eq!(session.time_stamp(0, 0).expect("t0"), 0.0);
        assert!(session.time_stamp(0, 1).expect("t1") > 0.0);
        assert_eq!(session.photodiode_values(0, 0).expect("pd").len(), 4);
        assert_eq!(session.aux_states(0).expect("aux").len(), 4);
        assert_eq!(session.aux_cycle_counts(0, 1).expect("cycles"), vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_complex_result_matches_result_length() {
        let (session, _probe) = demo_session();
        session.configure(&config()).expect("configure");
        session.run_measurement().expect("measure");
        let result = session.get_result().expect("result");
        let complex = session.complex_result(0).expect("complex");
        assert_eq!(complex.length, result.length);
        assert!(complex.imag.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_complex_scan_matches_raw_scan() {
        let (session, _probe) = demo_session();
        session.configure(&config()).expect("configure");
        session.set_scan_count(3).expect("scan count");
        assert!(matches!(session.complex_scan(0, 0), Err(GlazError::Result(_))));

        session.run_measurement().expect("measure");
        let scan = session.scan(0, 1).expect("scan");
        let complex = session.complex_scan(0, 1).expect("complex scan");
        assert_eq!(complex.length, scan.length);
        assert_eq!(complex.real, scan.samples);
        assert!(complex.imag.iter().all(|&v| v == 0.0));

        let err = session.complex_scan(0, 3).expect_err("scan 3 of 3");
        assert_eq!(err.code(), Some(ErrorCode::InvalidScanCount.as_raw()));
    }

    #[test]
    fn test_bad_result_index() {
        let (session, _probe) = demo_session();
        session.configure(&config()).expect("configure");
        session.run_measurement().expect("measure");
        let err = session.result(3).expect_err("index 3");
        assert!(matches!(err, GlazError::Result(_)));
        assert_eq!(err.code(), Some(ErrorCode::InvalidCalculationIndex.as_raw()));
    }

    #[test]
    #[traced_test]
    fn test_rollback_and_close_are_logged() {
        let (session, _probe) = demo_session();
        session.configure(&config()).expect("configure");

        let mut rejected = config();
        rejected.integration_time_us = 20_000_000;
        assert!(session.configure(&rejected).is_err());
        assert!(logs_contain("Configuration rejected, restoring previous settings"));

        session.close();
        assert!(logs_contain("Closed Glaz session"));
    }

    #[test]
    #[traced_test]
    fn test_rollback_without_prior_values() {
        let (session, _probe) = demo_session();
        assert_eq!(session.state(), SessionState::Configured);

        let mut rejected = config();
        rejected.integration_time_us = 20_000_000;
        match session.configure(&rejected) {
            Err(GlazError::Configuration { setting, .. }) => {
                assert_eq!(setting, Setting::IntegrationTime)
            }
            other => panic!("expected Configuration error, got {other:?}"),
        }

        assert_eq!(session.state(), SessionState::Configured);
        assert_eq!(session.applied_configuration(), AppliedConfiguration::default());
        assert!(logs_contain("No prior value to restore"));
    }
}
