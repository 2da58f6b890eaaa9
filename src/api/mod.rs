//! The native GlazLib call surface.
//!
//! [`GlazApi`] mirrors the vendor entry points one-to-one: integer arguments,
//! integer statuses, out-parameters and nullable buffers for the two-phase
//! size/data reads. It deliberately does no validation and no error
//! translation; [`Session`](crate::Session) layers both on top.
//!
//! Two implementations exist:
//!
//! - [`SimulatedGlaz`]: an in-process demo device, always available.
//! - `NativeGlaz` (feature `glaz_hardware`): calls into `glaz-sys`.

use std::path::Path;

pub mod simulated;

#[cfg(feature = "glaz_hardware")]
pub mod native;

pub use simulated::{SimProbe, SimulatedGlaz};

#[cfg(feature = "glaz_hardware")]
pub use native::NativeGlaz;

/// Raw status returned by a native call.
pub type Status = i32;

/// The status every native call returns on success.
pub const STATUS_OK: Status = 0;

/// One-to-one view of the vendor library.
///
/// Buffer arguments follow the vendor's two-phase protocol: pass `None` to
/// receive the element count in `size`, then pass a buffer of at least that
/// many elements. Implementations must not write past the end of a buffer.
pub trait GlazApi: Send {
    /// `(major, minor)` version of the library.
    fn version(&mut self) -> (i32, i32);

    /// Message describing the most recent failed call.
    fn last_error_message(&mut self) -> String;

    /// `(timeout_ms, bulk_size, queue_size)`.
    fn usb_parameters(&mut self) -> (i32, i32, i32);
    /// Replace the USB transfer parameters.
    fn set_usb_parameters(&mut self, timeout_ms: i32, bulk_size: i32, queue_size: i32);
    /// Toggle the raw data-stream log.
    fn enable_data_stream_log(&mut self, enable: bool);

    /// Open a session described by a vendor XML configuration file.
    fn initialise_session(&mut self, config_path: &Path) -> Status;
    /// Open a session for one device of the given type.
    fn initialise_single_device_session(
        &mut self,
        device_type: i32,
        use_defaults: bool,
        allow_demo: bool,
    ) -> Status;
    /// Release the native session.
    fn close_session(&mut self) -> Status;
    /// Reset every device to its power-on state.
    fn reset_all_devices(&mut self);
    /// Reset the USB ports.
    fn reset_all_ports(&mut self);

    /// Select a DAC test pattern.
    fn set_test_mode(&mut self, mode: i32) -> Status;
    /// Set the wavelength window, in nanometres.
    fn set_wavelengths(&mut self, min_nm: f64, max_nm: f64) -> Status;
    /// Set the averaging exponent.
    fn set_hardware_averaging(&mut self, averaging: i32) -> Status;
    /// Set the ADC resolution.
    fn set_resolution(&mut self, resolution: i32) -> Status;
    /// Set raw scans per measurement.
    fn set_scan_count(&mut self, count: i32) -> Status;
    /// Set the readout clock.
    fn set_scan_clock_speed(&mut self, speed: i32) -> Status;
    /// Set the ADC gain.
    fn set_adc_gain(&mut self, gain: i32) -> Status;
    /// Set the trigger delay, in microseconds.
    fn set_trigger_delay(&mut self, delay_us: i32) -> Status;
    /// Set the trigger source.
    fn set_trigger_mode(&mut self, mode: i32) -> Status;
    /// Set the internal trigger rate, in hertz.
    fn set_internal_trigger_frequency(&mut self, frequency_hz: f64) -> Status;
    /// Set the integration timing mode.
    fn set_integration_mode(&mut self, mode: i32) -> Status;
    /// Set the integration time, in microseconds.
    fn set_integration_time(&mut self, time_us: i32) -> Status;
    /// Set the sync output signal.
    fn set_sync_out_mode(&mut self, mode: i32) -> Status;
    /// Set the sync output level.
    fn set_sync_out_polarity(&mut self, polarity: i32) -> Status;
    /// Set the auxiliary output signal.
    fn set_aux_out_mode(&mut self, mode: i32) -> Status;
    /// Set the auxiliary output level.
    fn set_aux_out_polarity(&mut self, polarity: i32) -> Status;
    /// Set output trigger cycles; 0 runs indefinitely.
    fn set_out_cycle_count(&mut self, count: i32) -> Status;
    /// Set the acquisition timeout, in milliseconds.
    fn set_timeout(&mut self, timeout_ms: i32) -> Status;

    /// Run `count` acquisitions and keep them as the background.
    fn capture_background(&mut self, count: i32) -> Status;
    /// Blocking acquisition.
    fn run_measurement(&mut self) -> Status;
    /// Non-blocking acquisition; poll with `is_measurement_done`.
    fn start_measurement(&mut self) -> Status;
    /// Whether a started acquisition has finished.
    fn is_measurement_done(&mut self, done: &mut bool) -> Status;

    /// Processed result at calculation `index`.
    fn get_result(&mut self, index: i32, size: &mut i32, data: Option<&mut [f64]>) -> Status;
    /// Processed result split into real and imaginary parts.
    fn get_complex_result(
        &mut self,
        index: i32,
        size: &mut i32,
        buffers: Option<(&mut [f64], &mut [f64])>,
    ) -> Status;
    /// Seconds from measurement start to scan `scan_index`.
    fn get_time_stamp(&mut self, index: i32, scan_index: i32, value: &mut f64) -> Status;
    /// One raw scan.
    fn get_scan(
        &mut self,
        index: i32,
        scan_index: i32,
        size: &mut i32,
        data: Option<&mut [f64]>,
    ) -> Status;
    /// One raw scan split into real and imaginary parts.
    fn get_complex_scan(
        &mut self,
        index: i32,
        scan_index: i32,
        size: &mut i32,
        buffers: Option<(&mut [f64], &mut [f64])>,
    ) -> Status;
    /// Shape of the raw scan matrix.
    fn get_all_scans_sizes(
        &mut self,
        index: i32,
        num_scans: &mut i32,
        pixels_per_scan: &mut i32,
    ) -> Status;
    /// `data` must hold exactly `num_scans * pixels_per_scan` elements as
    /// reported by `get_all_scans_sizes`.
    fn get_all_scans(&mut self, index: i32, data: &mut [u16]) -> Status;
    /// Write every raw scan to `path` as text.
    fn write_all_scans_to_file(&mut self, index: i32, path: &Path, include_header: bool) -> Status;
    /// Photodiode readings on `channel`, one per scan.
    fn get_pd_values(
        &mut self,
        index: i32,
        channel: i32,
        size: &mut i32,
        values: Option<&mut [f64]>,
    ) -> Status;
    /// Photodiode reference level on `channel`.
    fn get_pd_reference(&mut self, index: i32, channel: i32, value: &mut f64) -> Status;
    /// Auxiliary input level, one per scan.
    fn get_aux_states(&mut self, index: i32, size: &mut i32, states: Option<&mut [bool]>) -> Status;
    /// Output cycle counter on `channel`, one per scan.
    fn get_aux_cycle_counts(
        &mut self,
        index: i32,
        channel: i32,
        size: &mut i32,
        counts: Option<&mut [i32]>,
    ) -> Status;

    /// Exercise the USB link.
    fn run_usb_comms_test(&mut self) -> Status;
}
