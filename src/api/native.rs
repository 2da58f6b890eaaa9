//! GlazLib bindings behind [`GlazApi`].
//!
//! The vendor library keeps one implicit session per process and none of its
//! entry points take a handle. [`NativeGlaz`] therefore claims a process-wide
//! slot on construction; a second instance cannot be created until the first
//! is dropped.
//!
//! Every pointer handed to the library is checked against the size the
//! library reports first, so a short buffer becomes a status code instead of
//! an out-of-bounds write.

#![allow(unsafe_code)]

use super::{GlazApi, Status, STATUS_OK};
use crate::error::{ErrorCode, GlazError, GlazResult, NativeFailure};
use glaz_sys as sys;
use std::ffi::{c_char, c_double, c_int, CStr, CString};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

static LIBRARY_CLAIMED: AtomicBool = AtomicBool::new(false);

/// The process's connection to the vendor library.
pub struct NativeGlaz {
    /// Failure detected on the Rust side, reported instead of the library's
    /// own message by the next `last_error_message`.
    local_error: Option<String>,
}

impl NativeGlaz {
    /// Claim the library for this process.
    ///
    /// # Errors
    ///
    /// Returns `GlazError::DeviceOpen` if another `NativeGlaz` is alive.
    pub fn new() -> GlazResult<Self> {
        if LIBRARY_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(GlazError::DeviceOpen(NativeFailure::new(
                ErrorCode::InitialisingSingleDevice.as_raw(),
                "GlazLib is already in use by another session in this process",
            )));
        }
        tracing::debug!("Claimed GlazLib");
        Ok(Self { local_error: None })
    }

    fn local_failure(&mut self, code: ErrorCode, message: String) -> Status {
        self.local_error = Some(message);
        code.as_raw()
    }

    fn c_path(&mut self, path: &Path) -> Result<CString, Status> {
        CString::new(path.to_string_lossy().into_owned()).map_err(|_| {
            self.local_failure(
                ErrorCode::Script,
                format!("Path contains an interior NUL byte: {}", path.display()),
            )
        })
    }

    /// Two-phase read: query the size, then fill `buffer` if it is large enough.
    fn sized<T>(
        &mut self,
        size: &mut i32,
        buffer: Option<&mut [T]>,
        call: impl Fn(*mut c_int, *mut T) -> c_int,
    ) -> Status {
        let mut required: c_int = 0;
        let status = call(&mut required, ptr::null_mut());
        *size = required;
        let Some(buffer) = buffer else {
            return status;
        };
        if status != STATUS_OK {
            return status;
        }
        if (buffer.len() as i64) < i64::from(required) {
            return self.local_failure(
                ErrorCode::InvalidResultDataSize,
                format!("Buffer holds {} elements, result needs {required}", buffer.len()),
            );
        }
        call(size, buffer.as_mut_ptr())
    }

    /// Two-phase read into a real and an imaginary buffer.
    fn sized_pair(
        &mut self,
        size: &mut i32,
        buffers: Option<(&mut [f64], &mut [f64])>,
        call: impl Fn(*mut c_int, *mut c_double, *mut c_double) -> c_int,
    ) -> Status {
        let mut required: c_int = 0;
        let status = call(&mut required, ptr::null_mut(), ptr::null_mut());
        *size = required;
        let Some((real, imag)) = buffers else {
            return status;
        };
        if status != STATUS_OK {
            return status;
        }
        let shortest = real.len().min(imag.len());
        if (shortest as i64) < i64::from(required) {
            return self.local_failure(
                ErrorCode::InvalidResultDataSize,
                format!("Buffers hold {shortest} elements, result needs {required}"),
            );
        }
        call(size, real.as_mut_ptr(), imag.as_mut_ptr())
    }
}

impl Drop for NativeGlaz {
    fn drop(&mut self) {
        LIBRARY_CLAIMED.store(false, Ordering::Release);
        tracing::debug!("Released GlazLib");
    }
}

impl GlazApi for NativeGlaz {
    fn version(&mut self) -> (i32, i32) {
        let (mut major, mut minor) = (0, 0);
        unsafe { sys::getVersion(&mut major, &mut minor) };
        (major, minor)
    }

    fn last_error_message(&mut self) -> String {
        if let Some(message) = self.local_error.take() {
            return message;
        }
        let mut buffer = vec![0 as c_char; sys::ERROR_MESSAGE_BUFFER_LEN];
        unsafe {
            sys::getLastErrorMessage(buffer.as_mut_ptr());
            // Guarantee termination even if the library filled the buffer.
            buffer[sys::ERROR_MESSAGE_BUFFER_LEN - 1] = 0;
            CStr::from_ptr(buffer.as_ptr())
                .to_string_lossy()
                .into_owned()
        }
    }

    fn usb_parameters(&mut self) -> (i32, i32, i32) {
        let (mut timeout, mut bulk, mut queue) = (0, 0, 0);
        unsafe { sys::getUSBParameters(&mut timeout, &mut bulk, &mut queue) };
        (timeout, bulk, queue)
    }

    fn set_usb_parameters(&mut self, timeout_ms: i32, bulk_size: i32, queue_size: i32) {
        unsafe { sys::setUSBParameters(timeout_ms, bulk_size, queue_size) }
    }

    fn enable_data_stream_log(&mut self, enable: bool) {
        unsafe { sys::enableDataStreamLog(enable) }
    }

    fn initialise_session(&mut self, config_path: &Path) -> Status {
        match self.c_path(config_path) {
            Ok(path) => unsafe { sys::initialiseSession(path.as_ptr()) },
            Err(status) => status,
        }
    }

    fn initialise_single_device_session(
        &mut self,
        device_type: i32,
        use_defaults: bool,
        allow_demo: bool,
    ) -> Status {
        unsafe { sys::initialiseSingleDeviceSession(device_type, use_defaults, allow_demo) }
    }

    fn close_session(&mut self) -> Status {
        unsafe { sys::closeSession() }
    }

    fn reset_all_devices(&mut self) {
        unsafe { sys::resetAllDevices() }
    }

    fn reset_all_ports(&mut self) {
        unsafe { sys::resetAllPorts() }
    }

    fn set_test_mode(&mut self, mode: i32) -> Status {
        unsafe { sys::setTestMode(mode) }
    }

    fn set_wavelengths(&mut self, min_nm: f64, max_nm: f64) -> Status {
        unsafe { sys::setWavelengths(min_nm, max_nm) }
    }

    fn set_hardware_averaging(&mut self, averaging: i32) -> Status {
        unsafe { sys::setHardwareAveraging(averaging) }
    }

    fn set_resolution(&mut self, resolution: i32) -> Status {
        unsafe { sys::setResolution(resolution) }
    }

    fn set_scan_count(&mut self, count: i32) -> Status {
        unsafe { sys::setScanCount(count) }
    }

    fn set_scan_clock_speed(&mut self, speed: i32) -> Status {
        unsafe { sys::setScanClockSpeed(speed) }
    }

    fn set_adc_gain(&mut self, gain: i32) -> Status {
        unsafe { sys::setADCGain(gain) }
    }

    fn set_trigger_delay(&mut self, delay_us: i32) -> Status {
        unsafe { sys::setTriggerDelay(delay_us) }
    }

    fn set_trigger_mode(&mut self, mode: i32) -> Status {
        unsafe { sys::setTriggerMode(mode) }
    }

    fn set_internal_trigger_frequency(&mut self, frequency_hz: f64) -> Status {
        unsafe { sys::setInternalTriggerFrequency(frequency_hz) }
    }

    fn set_integration_mode(&mut self, mode: i32) -> Status {
        unsafe { sys::setIntegrationMode(mode) }
    }

    fn set_integration_time(&mut self, time_us: i32) -> Status {
        unsafe { sys::setIntegrationTime(time_us) }
    }

    fn set_sync_out_mode(&mut self, mode: i32) -> Status {
        unsafe { sys::setSyncOutMode(mode) }
    }

    fn set_sync_out_polarity(&mut self, polarity: i32) -> Status {
        unsafe { sys::setSyncOutPolarity(polarity) }
    }

    fn set_aux_out_mode(&mut self, mode: i32) -> Status {
        unsafe { sys::setAuxOutMode(mode) }
    }

    fn set_aux_out_polarity(&mut self, polarity: i32) -> Status {
        unsafe { sys::setAuxOutPolarity(polarity) }
    }

    fn set_out_cycle_count(&mut self, count: i32) -> Status {
        unsafe { sys::setOutCycleCount(count) }
    }

    fn set_timeout(&mut self, timeout_ms: i32) -> Status {
        unsafe { sys::setTimeout(timeout_ms) }
    }

    fn capture_background(&mut self, count: i32) -> Status {
        unsafe { sys::captureBackground(count) }
    }

    fn run_measurement(&mut self) -> Status {
        unsafe { sys::runMeasurement() }
    }

    fn start_measurement(&mut self) -> Status {
        unsafe { sys::startMeasurement() }
    }

    fn is_measurement_done(&mut self, done: &mut bool) -> Status {
        unsafe { sys::isMeasurementDone(done) }
    }

    fn get_result(&mut self, index: i32, size: &mut i32, data: Option<&mut [f64]>) -> Status {
        self.sized(size, data, |size, data| unsafe { sys::getResult(index, size, data) })
    }

    fn get_complex_result(
        &mut self,
        index: i32,
        size: &mut i32,
        buffers: Option<(&mut [f64], &mut [f64])>,
    ) -> Status {
        self.sized_pair(size, buffers, |size, real, imag| unsafe {
            sys::getComplexResult(index, size, real, imag)
        })
    }

    fn get_time_stamp(&mut self, index: i32, scan_index: i32, value: &mut f64) -> Status {
        unsafe { sys::getTimeStamp(index, scan_index, value) }
    }

    fn get_scan(
        &mut self,
        index: i32,
        scan_index: i32,
        size: &mut i32,
        data: Option<&mut [f64]>,
    ) -> Status {
        self.sized(size, data, |size, data| unsafe {
            sys::getScan(index, scan_index, size, data)
        })
    }

    fn get_complex_scan(
        &mut self,
        index: i32,
        scan_index: i32,
        size: &mut i32,
        buffers: Option<(&mut [f64], &mut [f64])>,
    ) -> Status {
        self.sized_pair(size, buffers, |size, real, imag| unsafe {
            sys::getComplexScan(index, scan_index, size, real, imag)
        })
    }

    fn get_all_scans_sizes(
        &mut self,
        index: i32,
        num_scans: &mut i32,
        pixels_per_scan: &mut i32,
    ) -> Status {
        unsafe { sys::getAllScansSizes(index, num_scans, pixels_per_scan) }
    }

    fn get_all_scans(&mut self, index: i32, data: &mut [u16]) -> Status {
        let (mut scans, mut pixels) = (0, 0);
        let status = self.get_all_scans_sizes(index, &mut scans, &mut pixels);
        if status != STATUS_OK {
            return status;
        }
        let required = i64::from(scans) * i64::from(pixels);
        if data.len() as i64 != required {
            return self.local_failure(
                ErrorCode::InvalidResultDataSize,
                format!("Buffer holds {} elements, scans need {required}", data.len()),
            );
        }
        unsafe { sys::getAllScans(index, data.as_mut_ptr()) }
    }

    fn write_all_scans_to_file(&mut self, index: i32, path: &Path, include_header: bool) -> Status {
        match self.c_path(path) {
            Ok(path) => unsafe { sys::writeAllScansToFile(index, path.as_ptr(), include_header) },
            Err(status) => status,
        }
    }

    fn get_pd_values(
        &mut self,
        index: i32,
        channel: i32,
        size: &mut i32,
        values: Option<&mut [f64]>,
    ) -> Status {
        self.sized(size, values, |size, values| unsafe {
            sys::getPDValues(index, channel, size, values)
        })
    }

    fn get_pd_reference(&mut self, index: i32, channel: i32, value: &mut f64) -> Status {
        unsafe { sys::getPDReference(index, channel, value) }
    }

    fn get_aux_states(&mut self, index: i32, size: &mut i32, states: Option<&mut [bool]>) -> Status {
        self.sized(size, states, |size, states| unsafe {
            sys::getAUXStates(index, size, states)
        })
    }

    fn get_aux_cycle_counts(
        &mut self,
        index: i32,
        channel: i32,
        size: &mut i32,
        counts: Option<&mut [i32]>,
    ) -> Status {
        self.sized(size, counts, |size, counts| unsafe {
            sys::getAUXCycleCounts(index, channel, size, counts)
        })
    }

    fn run_usb_comms_test(&mut self) -> Status {
        unsafe { sys::runUSBCommsTest() }
    }
}
