//! Error types for Glaz sessions.
//!
//! `GlazError` is the single error type returned by every session operation.
//! Each variant corresponds to one stage of the session lifecycle:
//!
//! - **`DeviceOpen`**: no hardware matching the requested device type and demo
//!   mode disallowed, or the native initialiser failed.
//! - **`Configuration`**: a setting was rejected, either by local validation
//!   before the native call or by the native library itself. The rejected
//!   setting is named.
//! - **`Acquisition`**: background capture, trigger, or measurement failure,
//!   including hardware-reported timeouts.
//! - **`Result`**: no measurement available, or the result index/size was
//!   rejected.
//! - **`UseAfterClose`**: any call on a session whose handle has been released.
//! - **`Busy`**: a call arrived while another call on the same session was in
//!   flight.
//!
//! Native failures carry the vendor status code verbatim in a
//! [`NativeFailure`], together with the library's last error message.

use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the session error type.
pub type GlazResult<T> = std::result::Result<T, GlazError>;

/// A failed native call: the raw status code and the library's message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFailure {
    /// Status code exactly as returned by the native library.
    pub code: i32,
    /// Message from `getLastErrorMessage`, or a local description when the
    /// failure was detected before crossing into native code.
    pub message: String,
}

impl NativeFailure {
    /// Create a failure from a raw status code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Decode the raw status code, if it is one the library documents.
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_raw(self.code)
    }
}

impl fmt::Display for NativeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_code() {
            Some(code) => write!(f, "error {} ({}) - {}", self.code, code.name(), self.message),
            None => write!(f, "error {} - {}", self.code, self.message),
        }
    }
}

/// The setting a configuration error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    /// Wavelength window.
    Wavelengths,
    /// Trigger source.
    TriggerMode,
    /// Integration time.
    IntegrationTime,
    /// On-device averaging.
    HardwareAveraging,
    /// ADC resolution.
    Resolution,
    /// Raw scans per measurement.
    ScanCount,
    /// Readout clock.
    ScanClockSpeed,
    /// ADC gain.
    AdcGain,
    /// Delay after trigger.
    TriggerDelay,
    /// Internal trigger rate.
    InternalTriggerFrequency,
    /// Integration timing mode.
    IntegrationMode,
    /// Sync output signal.
    SyncOutMode,
    /// Sync output level.
    SyncOutPolarity,
    /// Auxiliary output signal.
    AuxOutMode,
    /// Auxiliary output level.
    AuxOutPolarity,
    /// Output trigger cycles.
    OutCycleCount,
    /// Acquisition timeout.
    Timeout,
    /// DAC test pattern.
    TestMode,
    /// USB transfer parameters.
    UsbParameters,
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Setting::Wavelengths => "wavelength range",
            Setting::TriggerMode => "trigger mode",
            Setting::IntegrationTime => "integration time",
            Setting::HardwareAveraging => "hardware averaging",
            Setting::Resolution => "resolution",
            Setting::ScanCount => "scan count",
            Setting::ScanClockSpeed => "scan clock speed",
            Setting::AdcGain => "ADC gain",
            Setting::TriggerDelay => "trigger delay",
            Setting::InternalTriggerFrequency => "internal trigger frequency",
            Setting::IntegrationMode => "integration mode",
            Setting::SyncOutMode => "sync output mode",
            Setting::SyncOutPolarity => "sync output polarity",
            Setting::AuxOutMode => "auxiliary output mode",
            Setting::AuxOutPolarity => "auxiliary output polarity",
            Setting::OutCycleCount => "output cycle count",
            Setting::Timeout => "timeout",
            Setting::TestMode => "test mode",
            Setting::UsbParameters => "USB parameters",
        };
        f.write_str(name)
    }
}

/// Session error type. See the module docs for when each variant occurs.
#[derive(Error, Debug)]
pub enum GlazError {
    /// The session could not be opened.
    #[error("Failed to open device: {0}")]
    DeviceOpen(NativeFailure),

    /// A setting was rejected.
    #[error("Failed to set {setting}: {failure}")]
    Configuration {
        /// The rejected setting.
        setting: Setting,
        /// Why it was rejected.
        failure: NativeFailure,
    },

    /// Background capture or measurement failed.
    #[error("Acquisition failed: {0}")]
    Acquisition(NativeFailure),

    /// No result could be read.
    #[error("Result unavailable: {0}")]
    Result(NativeFailure),

    /// The session was already closed.
    #[error("Session used after close ({operation})")]
    UseAfterClose {
        /// The rejected operation.
        operation: &'static str,
    },

    /// Another call on the session was in flight.
    #[error("Session busy: '{operation}' rejected while another call is in flight")]
    Busy {
        /// The rejected operation.
        operation: &'static str,
    },

    /// Settings sources could not be parsed.
    #[error("Configuration load error: {0}")]
    Settings(#[from] figment::Error),

    /// Settings parsed but are inconsistent.
    #[error("Configuration validation error: {0}")]
    SettingsValidation(String),

    /// A vendor configuration file was not found.
    #[error("Could not find configuration file: {0}")]
    ConfigFileNotFound(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GlazError {
    /// The native status code behind this error, if there is one.
    pub fn code(&self) -> Option<i32> {
        self.native_failure().map(|failure| failure.code)
    }

    /// The native failure behind this error, if there is one.
    pub fn native_failure(&self) -> Option<&NativeFailure> {
        match self {
            GlazError::DeviceOpen(failure)
            | GlazError::Acquisition(failure)
            | GlazError::Result(failure)
            | GlazError::Configuration { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

macro_rules! error_codes {
    ($($variant:ident = $value:literal => $name:literal,)*) => {
        /// Status codes documented by the native library.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum ErrorCode {
            $(
                #[doc = $name]
                $variant = $value,
            )*
        }

        impl ErrorCode {
            /// Decode a raw status. `0` (success) and unknown values yield `None`.
            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($value => Some(ErrorCode::$variant),)*
                    _ => None,
                }
            }

            /// The vendor's symbolic name for this code.
            pub fn name(self) -> &'static str {
                match self {
                    $(ErrorCode::$variant => $name,)*
                }
            }
        }
    };
}

error_codes! {
    NotInitialised = 1 => "ERROR_NOT_INITIALISED",
    Script = 2 => "ERROR_SCRIPT",
    ConnectingToCameras = 3 => "ERROR_CONNECTING_TO_CAMERAS",
    DownloadingCalibrations = 4 => "ERROR_DOWNLOADING_CALIBRATIONS",
    InvalidWavelengths = 5 => "ERROR_INVALID_WAVELENGTHS",
    InvalidAveraging = 6 => "ERROR_INVALID_AVERAGING",
    InvalidScanCount = 7 => "ERROR_INVALID_SCAN_COUNT",
    InvalidTriggerMode = 8 => "ERROR_INVALID_TRIGGER_MODE",
    InvalidTriggerDelay = 9 => "ERROR_INVALID_TRIGGER_DELAY",
    InvalidIntegrationTime = 10 => "ERROR_INVALID_INTEGRATION_TIME",
    InvalidScanClockSpeed = 11 => "ERROR_INVALID_SCAN_CLOCK_SPEED",
    InvalidSettings = 12 => "ERROR_INVALID_SETTINGS",
    CapturingBackgrounds = 13 => "ERROR_CAPTURING_BACKGROUNDS",
    RunningMeasurement = 14 => "ERROR_RUNNING_MEASUREMENT",
    InvalidCalculationIndex = 15 => "ERROR_INVALID_CALCULATION_INDEX",
    InvalidResultDataSize = 16 => "ERROR_INVALID_RESULT_DATA_SIZE",
    InvalidPdNumber = 17 => "ERROR_INVALID_PD_NUMBER",
    InvalidPdChannel = 18 => "ERROR_INVALID_PD_CHANNEL",
    InvalidCameraNumber = 19 => "ERROR_INVALID_CAMERA_NUMBER",
    InvalidTriggerFrequency = 20 => "ERROR_INVALID_TRIGGER_FREQUENCY",
    NoMeasurementRun = 21 => "ERROR_NO_MEASUREMENT_RUN",
    InitialisingSingleDevice = 22 => "ERROR_INITIALISING_SINGLE_DEVICE",
    InvalidSingleDeviceType = 23 => "ERROR_INVALID_SINGLE_DEVICE_TYPE",
    InvalidSyncOutMode = 24 => "ERROR_INVALID_SYNC_OUT_MODE",
    InvalidIntegrationMode = 25 => "ERROR_INVALID_INTEGRATION_MODE",
    ClockSpeedUnsupported = 26 => "ERROR_CLOCK_SPEED_UNSUPPORTED",
    InvalidAuxOutMode = 27 => "ERROR_INVALID_AUX_OUT_MODE",
    CycleCountUnsupported = 28 => "ERROR_CYCLE_COUNT_UNSUPPORTED",
    InvalidCycleCount = 29 => "ERROR_INVALID_CYCLE_COUNT",
    InvalidTestMode = 30 => "ERROR_INVALID_TEST_MODE",
    OutPolarityNotSupported = 31 => "ERROR_OUT_POLARITY_NOT_SUPPORTED",
    InvalidOutPolarity = 32 => "ERROR_INVALID_OUT_POLARITY",
    ResolutionOutOfRange = 33 => "ERROR_RESOLUTION_OUT_OF_RANGE",
    ResolutionNotSupported = 34 => "ERROR_RESOLUTION_NOT_SUPPORTED",
    RunningUsbCommsTest = 35 => "ERROR_RUNNING_USB_COMMS_TEST",
    MeasurementStream = 36 => "ERROR_MEASUREMENT_STREAM",
    AuxStatesNotSupported = 37 => "ERROR_AUX_STATES_NOT_SUPPORTED",
    IntegrationTimeNotSupported = 38 => "ERROR_INTEGRATION_TIME_NOT_SUPPORTED",
    InvalidAdcGain = 39 => "ERROR_INVALID_ADC_GAIN",
    AuxCycleCountInvalid = 40 => "ERROR_AUX_CYCLE_COUNT_INVALID",
}

impl ErrorCode {
    /// The raw status value.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GlazError::Configuration {
            setting: Setting::IntegrationTime,
            failure: NativeFailure::new(10, "must be positive"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to set integration time: error 10 (ERROR_INVALID_INTEGRATION_TIME) - must be positive"
        );
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let err = GlazError::Acquisition(NativeFailure::new(97, "vendor extension"));
        assert_eq!(err.code(), Some(97));
        assert_eq!(err.to_string(), "Acquisition failed: error 97 - vendor extension");
    }

    #[test]
    fn test_error_code_table() {
        assert_eq!(ErrorCode::from_raw(0), None);
        assert_eq!(ErrorCode::from_raw(21), Some(ErrorCode::NoMeasurementRun));
        assert_eq!(ErrorCode::from_raw(40), Some(ErrorCode::AuxCycleCountInvalid));
        assert_eq!(ErrorCode::from_raw(41), None);
        assert_eq!(ErrorCode::InvalidAdcGain.as_raw(), 39);
        assert_eq!(ErrorCode::NotInitialised.name(), "ERROR_NOT_INITIALISED");
    }

    #[test]
    fn test_lifecycle_errors_have_no_code() {
        let err = GlazError::UseAfterClose { operation: "run_measurement" };
        assert_eq!(err.code(), None);
        assert!(err.to_string().contains("run_measurement"));
    }
}
