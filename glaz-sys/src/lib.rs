//! Raw FFI declarations for the vendor GlazLib spectrometer library.
//!
//! Every entry point returns an integer status (`ERROR_NONE` on success)
//! unless noted otherwise. Functions that fill a variable-length buffer
//! follow a two-phase protocol: call once with a null data pointer to learn
//! the size, then again with a buffer of at least that many elements.
//!
//! The library keeps a single global session; none of the functions take a
//! handle argument and none of them are thread-safe.
//!
//! Linking happens only with the `glaz-sdk` feature. Without it these
//! declarations compile but must not be called.

#![allow(non_snake_case)]
#![allow(missing_docs)]

use std::os::raw::{c_char, c_double, c_int};

// Status codes
pub const ERROR_NONE: c_int = 0;
pub const ERROR_NOT_INITIALISED: c_int = 1;
pub const ERROR_SCRIPT: c_int = 2;
pub const ERROR_CONNECTING_TO_CAMERAS: c_int = 3;
pub const ERROR_DOWNLOADING_CALIBRATIONS: c_int = 4;
pub const ERROR_INVALID_WAVELENGTHS: c_int = 5;
pub const ERROR_INVALID_AVERAGING: c_int = 6;
pub const ERROR_INVALID_SCAN_COUNT: c_int = 7;
pub const ERROR_INVALID_TRIGGER_MODE: c_int = 8;
pub const ERROR_INVALID_TRIGGER_DELAY: c_int = 9;
pub const ERROR_INVALID_INTEGRATION_TIME: c_int = 10;
pub const ERROR_INVALID_SCAN_CLOCK_SPEED: c_int = 11;
pub const ERROR_INVALID_SETTINGS: c_int = 12;
pub const ERROR_CAPTURING_BACKGROUNDS: c_int = 13;
pub const ERROR_RUNNING_MEASUREMENT: c_int = 14;
pub const ERROR_INVALID_CALCULATION_INDEX: c_int = 15;
pub const ERROR_INVALID_RESULT_DATA_SIZE: c_int = 16;
pub const ERROR_INVALID_PD_NUMBER: c_int = 17;
pub const ERROR_INVALID_PD_CHANNEL: c_int = 18;
pub const ERROR_INVALID_CAMERA_NUMBER: c_int = 19;
pub const ERROR_INVALID_TRIGGER_FREQUENCY: c_int = 20;
pub const ERROR_NO_MEASUREMENT_RUN: c_int = 21;
pub const ERROR_INITIALISING_SINGLE_DEVICE: c_int = 22;
pub const ERROR_INVALID_SINGLE_DEVICE_TYPE: c_int = 23;
pub const ERROR_INVALID_SYNC_OUT_MODE: c_int = 24;
pub const ERROR_INVALID_INTEGRATION_MODE: c_int = 25;
pub const ERROR_CLOCK_SPEED_UNSUPPORTED: c_int = 26;
pub const ERROR_INVALID_AUX_OUT_MODE: c_int = 27;
pub const ERROR_CYCLE_COUNT_UNSUPPORTED: c_int = 28;
pub const ERROR_INVALID_CYCLE_COUNT: c_int = 29;
pub const ERROR_INVALID_TEST_MODE: c_int = 30;
pub const ERROR_OUT_POLARITY_NOT_SUPPORTED: c_int = 31;
pub const ERROR_INVALID_OUT_POLARITY: c_int = 32;
pub const ERROR_RESOLUTION_OUT_OF_RANGE: c_int = 33;
pub const ERROR_RESOLUTION_NOT_SUPPORTED: c_int = 34;
pub const ERROR_RUNNING_USB_COMMS_TEST: c_int = 35;
pub const ERROR_MEASUREMENT_STREAM: c_int = 36;
pub const ERROR_AUX_STATES_NOT_SUPPORTED: c_int = 37;
pub const ERROR_INTEGRATION_TIME_NOT_SUPPORTED: c_int = 38;
pub const ERROR_INVALID_ADC_GAIN: c_int = 39;
pub const ERROR_AUX_CYCLE_COUNT_INVALID: c_int = 40;

// Single-device types
pub const GLAZ_LINESCAN_I_PULSESYNC_S10453_SINGLE_DEVICE_TYPE: c_int = 1;
pub const GLAZ_LINESCAN_I_PULSESYNC_S11639_SINGLE_DEVICE_TYPE: c_int = 2;
pub const GLAZ_LINESCAN_I_TIMEFILL_S11639_SINGLE_DEVICE_TYPE: c_int = 3;
pub const GLAZ_LINESCAN_I_SPECTROCAM_S11639_SINGLE_DEVICE_TYPE: c_int = 4;
pub const GLAZ_LINESCAN_II_SINGLE_DEVICE_TYPE: c_int = 5;
pub const GLAZ_LINESCAN_II_V2_SINGLE_DEVICE_TYPE: c_int = 6;
pub const GLAZ_LINESCAN_LS_SINGLE_DEVICE_TYPE: c_int = 7;
pub const GLAZ_LINESCAN_EC_SINGLE_DEVICE_TYPE: c_int = 8;

// Hardware averaging (index, factor = 2^index)
pub const AVERAGING_X1: c_int = 0;
pub const AVERAGING_X2: c_int = 1;
pub const AVERAGING_X4: c_int = 2;
pub const AVERAGING_X8: c_int = 3;
pub const AVERAGING_X16: c_int = 4;
pub const AVERAGING_X32: c_int = 5;
pub const AVERAGING_X64: c_int = 6;
pub const AVERAGING_X128: c_int = 7;
pub const AVERAGING_X256: c_int = 8;
pub const AVERAGING_X512: c_int = 9;
pub const AVERAGING_X1024: c_int = 10;
pub const AVERAGING_X2048: c_int = 11;
pub const AVERAGING_X4096: c_int = 12;

// ADC resolution
pub const RESOLUTION_10BIT: c_int = 0;
pub const RESOLUTION_12BIT: c_int = 1;
pub const RESOLUTION_14BIT: c_int = 2;
pub const RESOLUTION_16BIT: c_int = 3;

// Trigger modes
pub const TRIGGER_EXTERNAL: c_int = 0;
pub const TRIGGER_INTERNAL: c_int = 1;
pub const TRIGGER_BURST: c_int = 2;

// Integration modes
pub const INT_MODE_PULSESYNC: c_int = 0;
pub const INT_MODE_TIMEFILL: c_int = 1;

// Sync/aux output modes
pub const OUT_INT_WINDOW: c_int = 0;
pub const OUT_TRIGGER: c_int = 1;
pub const OUT_BUSY: c_int = 2;
pub const OUT_TRIGGER_CYCLE_START: c_int = 3;
pub const OUT_TRIGGER_CYCLE_RUNNING: c_int = 4;
pub const OUT_OFF: c_int = 5;

// Output polarities
pub const OUT_POLARITY_ACTIVE_LO: c_int = 0;
pub const OUT_POLARITY_ACTIVE_HI: c_int = 1;

// Scan clock speeds
pub const SCAN_CLOCK_FULL_SPEED: c_int = 0;
pub const SCAN_CLOCK_HALF_SPEED: c_int = 1;

// Test modes
pub const TEST_OFF: c_int = 0;
pub const TEST_DAC_ALTERNATING: c_int = 1;
pub const TEST_DAC_ALL_ONES: c_int = 2;
pub const TEST_DAC_ALL_ZEROS: c_int = 3;

// ADC gain
pub const ADC_GAIN_X1: c_int = 0;
pub const ADC_GAIN_X2: c_int = 1;
pub const ADC_GAIN_X4: c_int = 2;

/// Size of the buffer callers should pass to `getLastErrorMessage`.
pub const ERROR_MESSAGE_BUFFER_LEN: usize = 1024;

extern "C" {
    // Library information
    pub fn getVersion(major: *mut c_int, minor: *mut c_int);
    pub fn getLastErrorMessage(buffer: *mut c_char) -> c_int;

    // USB transport
    pub fn getUSBParameters(timeout: *mut c_int, bulk_size: *mut c_int, queue_size: *mut c_int);
    pub fn setUSBParameters(timeout: c_int, bulk_size: c_int, queue_size: c_int);
    pub fn enableDataStreamLog(enable: bool);

    // Session lifecycle
    pub fn initialiseSession(config_path: *const c_char) -> c_int;
    pub fn initialiseSingleDeviceSession(
        device_type: c_int,
        use_defaults: bool,
        allow_demo: bool,
    ) -> c_int;
    pub fn closeSession() -> c_int;
    pub fn resetAllDevices();
    pub fn resetAllPorts();

    // Settings
    pub fn setTestMode(mode: c_int) -> c_int;
    pub fn setWavelengths(min_wavelength: c_double, max_wavelength: c_double) -> c_int;
    pub fn setHardwareAveraging(averaging: c_int) -> c_int;
    pub fn setResolution(resolution: c_int) -> c_int;
    pub fn setScanCount(count: c_int) -> c_int;
    pub fn setScanClockSpeed(speed: c_int) -> c_int;
    pub fn setADCGain(gain: c_int) -> c_int;
    pub fn setTriggerDelay(delay: c_int) -> c_int;
    pub fn setTriggerMode(mode: c_int) -> c_int;
    pub fn setInternalTriggerFrequency(frequency: c_double) -> c_int;
    pub fn setIntegrationMode(mode: c_int) -> c_int;
    pub fn setIntegrationTime(time: c_int) -> c_int;
    pub fn setSyncOutMode(mode: c_int) -> c_int;
    pub fn setSyncOutPolarity(polarity: c_int) -> c_int;
    pub fn setAuxOutMode(mode: c_int) -> c_int;
    pub fn setAuxOutPolarity(polarity: c_int) -> c_int;
    pub fn setOutCycleCount(count: c_int) -> c_int;
    pub fn setTimeout(timeout: c_int) -> c_int;

    // Acquisition
    pub fn captureBackground(count: c_int) -> c_int;
    pub fn runMeasurement() -> c_int;
    pub fn startMeasurement() -> c_int;
    pub fn isMeasurementDone(done: *mut bool) -> c_int;

    // Results
    pub fn getResult(index: c_int, size: *mut c_int, data: *mut c_double) -> c_int;
    pub fn getComplexResult(
        index: c_int,
        size: *mut c_int,
        real: *mut c_double,
        imag: *mut c_double,
    ) -> c_int;
    pub fn getTimeStamp(index: c_int, scan_index: c_int, value: *mut c_double) -> c_int;
    pub fn getScan(index: c_int, scan_index: c_int, size: *mut c_int, data: *mut c_double) -> c_int;
    pub fn getComplexScan(
        index: c_int,
        scan_index: c_int,
        size: *mut c_int,
        real: *mut c_double,
        imag: *mut c_double,
    ) -> c_int;
    pub fn getAllScansSizes(index: c_int, num_scans: *mut c_int, pixels_per_scan: *mut c_int) -> c_int;
    pub fn getAllScans(index: c_int, data: *mut u16) -> c_int;
    pub fn writeAllScansToFile(index: c_int, filename: *const c_char, include_header: bool) -> c_int;
    pub fn getPDValues(index: c_int, channel: c_int, size: *mut c_int, values: *mut c_double) -> c_int;
    pub fn getPDReference(index: c_int, channel: c_int, value: *mut c_double) -> c_int;
    pub fn getAUXStates(index: c_int, size: *mut c_int, states: *mut bool) -> c_int;
    pub fn getAUXCycleCounts(
        index: c_int,
        channel: c_int,
        size: *mut c_int,
        counts: *mut c_int,
    ) -> c_int;

    // Diagnostics
    pub fn runUSBCommsTest() -> c_int;
}
