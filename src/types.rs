//! Typed values exchanged with the native library.
//!
//! The vendor exposes its settings as loose integer constants. Each group is
//! an enum here, converted to the native integer only at the call boundary
//! with [`as_raw`](TriggerMode::as_raw).

use crate::error::{ErrorCode, NativeFailure, Setting};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! native_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal,)* }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[doc = concat!("Native value `", stringify!($value), "`.")]
                $variant,
            )*
        }

        impl $name {
            /// Every variant, in native-value order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            /// The integer the native library expects.
            pub fn as_raw(self) -> i32 {
                match self {
                    $($name::$variant => $value,)*
                }
            }

            /// Decode a native integer.
            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($value => Some($name::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

native_enum! {
    /// Spectrometer model passed to the single-device initialiser.
    DeviceType {
        #[serde(rename = "linescan_i_pulsesync_s10453")]
        LinescanIPulsesyncS10453 = 1,
        #[serde(rename = "linescan_i_pulsesync_s11639")]
        LinescanIPulsesyncS11639 = 2,
        #[serde(rename = "linescan_i_timefill_s11639")]
        LinescanITimefillS11639 = 3,
        #[serde(rename = "linescan_i_spectrocam_s11639")]
        LinescanISpectrocamS11639 = 4,
        #[serde(rename = "linescan_ii")]
        LinescanII = 5,
        #[serde(rename = "linescan_ii_v2")]
        LinescanIIV2 = 6,
        #[serde(rename = "linescan_ls")]
        LinescanLs = 7,
        #[serde(rename = "linescan_ec")]
        LinescanEc = 8,
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::LinescanIIV2
    }
}

native_enum! {
    /// What starts an acquisition.
    TriggerMode {
        /// Wait for an external trigger signal.
        External = 0,
        /// Free-run on the internal trigger clock.
        Internal = 1,
        /// Burst of scans per external trigger.
        Burst = 2,
    }
}

native_enum! {
    /// Device-side averaging factor. The native value is the power of two.
    HardwareAveraging {
        X1 = 0,
        X2 = 1,
        X4 = 2,
        X8 = 3,
        X16 = 4,
        X32 = 5,
        X64 = 6,
        X128 = 7,
        X256 = 8,
        X512 = 9,
        X1024 = 10,
        X2048 = 11,
        X4096 = 12,
    }
}

impl HardwareAveraging {
    /// Number of raw acquisitions accumulated per result.
    pub fn factor(self) -> u32 {
        1 << self.as_raw()
    }

    /// Map an averaging factor (1, 2, 4, ..., 4096) to its setting.
    pub fn from_factor(factor: u32) -> Option<Self> {
        if !factor.is_power_of_two() {
            return None;
        }
        Self::from_raw(factor.trailing_zeros() as i32)
    }
}

native_enum! {
    /// ADC resolution.
    Resolution {
        Bits10 = 0,
        Bits12 = 1,
        Bits14 = 2,
        Bits16 = 3,
    }
}

native_enum! {
    /// How the integration window is timed.
    IntegrationMode {
        PulseSync = 0,
        TimeFill = 1,
    }
}

native_enum! {
    /// Signal driven on the sync or auxiliary output.
    OutputMode {
        IntegrationWindow = 0,
        Trigger = 1,
        Busy = 2,
        TriggerCycleStart = 3,
        TriggerCycleRunning = 4,
        Off = 5,
    }
}

native_enum! {
    /// Active level of an output line.
    OutputPolarity {
        ActiveLow = 0,
        ActiveHigh = 1,
    }
}

native_enum! {
    /// Sensor readout clock.
    ScanClockSpeed {
        Full = 0,
        Half = 1,
    }
}

native_enum! {
    /// Built-in DAC test patterns.
    TestMode {
        Off = 0,
        DacAlternating = 1,
        DacAllOnes = 2,
        DacAllZeros = 3,
    }
}

native_enum! {
    /// ADC pre-amplifier gain.
    AdcGain {
        X1 = 0,
        X2 = 1,
        X4 = 2,
    }
}

/// Wavelength window in nanometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavelengthRange {
    /// Lower bound, exclusive of zero.
    pub min_nm: f64,
    /// Upper bound; must exceed `min_nm`.
    pub max_nm: f64,
}

impl WavelengthRange {
    /// Window from `min_nm` to `max_nm`. Checked by [`validate`](Self::validate).
    pub fn new(min_nm: f64, max_nm: f64) -> Self {
        Self { min_nm, max_nm }
    }

    /// Reject windows the native library can never accept.
    pub fn validate(&self) -> Result<(), NativeFailure> {
        if !self.min_nm.is_finite() || !self.max_nm.is_finite() {
            return Err(invalid(
                ErrorCode::InvalidWavelengths,
                format!("wavelengths must be finite, got ({}, {})", self.min_nm, self.max_nm),
            ));
        }
        if self.min_nm <= 0.0 || self.min_nm >= self.max_nm {
            return Err(invalid(
                ErrorCode::InvalidWavelengths,
                format!(
                    "expected 0 < min < max, got ({}, {})",
                    self.min_nm, self.max_nm
                ),
            ));
        }
        Ok(())
    }
}

/// Integration time accepted by the native library, in microseconds.
pub fn validate_integration_time(integration_time_us: i32) -> Result<(), NativeFailure> {
    if integration_time_us <= 0 {
        return Err(invalid(
            ErrorCode::InvalidIntegrationTime,
            format!("integration time must be positive, got {integration_time_us} µs"),
        ));
    }
    Ok(())
}

fn invalid(code: ErrorCode, message: String) -> NativeFailure {
    NativeFailure::new(code.as_raw(), message)
}

/// The settings applied before a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    /// Wavelength window.
    pub wavelength_range: WavelengthRange,
    /// Trigger source.
    pub trigger_mode: TriggerMode,
    /// Integration time in microseconds.
    pub integration_time_us: i32,
    /// On-device averaging.
    pub hardware_averaging: HardwareAveraging,
}

impl DeviceConfiguration {
    /// Validate every field without touching the device.
    ///
    /// The enum fields are valid by construction; the numeric ones are
    /// checked against the bounds the native library documents.
    pub fn validate(&self) -> Result<(), (Setting, NativeFailure)> {
        self.wavelength_range
            .validate()
            .map_err(|failure| (Setting::Wavelengths, failure))?;
        validate_integration_time(self.integration_time_us)
            .map_err(|failure| (Setting::IntegrationTime, failure))?;
        Ok(())
    }
}

/// Settings applied to the device so far.
///
/// Fields are `None` until the corresponding setter succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AppliedConfiguration {
    /// Last applied wavelength window.
    pub wavelength_range: Option<WavelengthRange>,
    /// Last applied trigger source.
    pub trigger_mode: Option<TriggerMode>,
    /// Last applied integration time, in microseconds.
    pub integration_time_us: Option<i32>,
    /// Last applied averaging.
    pub hardware_averaging: Option<HardwareAveraging>,
}

impl AppliedConfiguration {
    /// The complete configuration, once all four core settings are known.
    pub fn complete(&self) -> Option<DeviceConfiguration> {
        Some(DeviceConfiguration {
            wavelength_range: self.wavelength_range?,
            trigger_mode: self.trigger_mode?,
            integration_time_us: self.integration_time_us?,
            hardware_averaging: self.hardware_averaging?,
        })
    }
}

impl From<DeviceConfiguration> for AppliedConfiguration {
    fn from(config: DeviceConfiguration) -> Self {
        Self {
            wavelength_range: Some(config.wavelength_range),
            trigger_mode: Some(config.trigger_mode),
            integration_time_us: Some(config.integration_time_us),
            hardware_averaging: Some(config.hardware_averaging),
        }
    }
}

/// One processed spectrum, copied out of the native buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResult {
    /// Calculation index the result was read from.
    pub index: i32,
    /// Processed samples, one per pixel in the wavelength window.
    pub samples: Vec<f64>,
    /// Sample count reported by the native library.
    pub length: usize,
    /// When the measurement completed.
    pub acquired_at: DateTime<Utc>,
}

impl MeasurementResult {
    /// True when the library returned no samples.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Split into `(samples, length)`.
    pub fn into_parts(self) -> (Vec<f64>, usize) {
        (self.samples, self.length)
    }
}

/// A result or scan with real and imaginary parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexResult {
    /// Real part.
    pub real: Vec<f64>,
    /// Imaginary part, same length as `real`.
    pub imag: Vec<f64>,
    /// Element count reported by the native library.
    pub length: usize,
}

/// A single raw scan of the last measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanData {
    /// Position of the scan within the measurement.
    pub scan_index: i32,
    /// Raw pixel values.
    pub samples: Vec<f64>,
    /// Pixel count reported by the native library.
    pub length: usize,
}

/// Every raw scan of a measurement, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanBlock {
    /// Row count.
    pub num_scans: usize,
    /// Column count.
    pub pixels_per_scan: usize,
    /// `num_scans * pixels_per_scan` raw ADC counts.
    pub data: Vec<u16>,
}

impl ScanBlock {
    /// Pixels of one scan, if `scan` is in range.
    pub fn row(&self, scan: usize) -> Option<&[u16]> {
        if scan >= self.num_scans {
            return None;
        }
        let start = scan * self.pixels_per_scan;
        self.data.get(start..start + self.pixels_per_scan)
    }

    /// Every scan in order.
    pub fn rows(&self) -> impl Iterator<Item = &[u16]> {
        self.data.chunks(self.pixels_per_scan.max(1))
    }
}

/// USB transfer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbParameters {
    /// Transfer timeout in milliseconds.
    pub timeout_ms: i32,
    /// Bulk transfer size in bytes.
    pub bulk_size: i32,
    /// Number of queued transfers.
    pub queue_size: i32,
}

impl UsbParameters {
    /// All three values must be positive.
    pub fn validate(&self) -> Result<(), NativeFailure> {
        if self.timeout_ms <= 0 || self.bulk_size <= 0 || self.queue_size <= 0 {
            return Err(invalid(
                ErrorCode::InvalidSettings,
                format!("USB parameters must be positive, got {self:?}"),
            ));
        }
        Ok(())
    }
}

/// Native library version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LibraryVersion {
    /// Major version.
    pub major: i32,
    /// Minor version.
    pub minor: i32,
}

impl std::fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_averaging_factor_mapping() {
        assert_eq!(HardwareAveraging::from_factor(16), Some(HardwareAveraging::X16));
        assert_eq!(HardwareAveraging::X16.as_raw(), 4);
        assert_eq!(HardwareAveraging::X4096.factor(), 4096);
        assert_eq!(HardwareAveraging::from_factor(0), None);
        assert_eq!(HardwareAveraging::from_factor(12), None);
        assert_eq!(HardwareAveraging::from_factor(8192), None);
    }

    #[test]
    fn test_native_values_match_vendor_constants() {
        assert_eq!(DeviceType::LinescanIIV2.as_raw(), 6);
        assert_eq!(TriggerMode::Internal.as_raw(), 1);
        assert_eq!(Resolution::Bits16.as_raw(), 3);
        assert_eq!(OutputMode::Off.as_raw(), 5);
        assert_eq!(DeviceType::from_raw(9), None);
        assert_eq!(DeviceType::ALL.len(), 8);
    }

    #[test]
    fn test_wavelength_validation() {
        assert!(WavelengthRange::new(400.0, 800.0).validate().is_ok());

        let reversed = WavelengthRange::new(800.0, 400.0).validate().unwrap_err();
        assert_eq!(reversed.error_code(), Some(ErrorCode::InvalidWavelengths));

        assert!(WavelengthRange::new(f64::NAN, 800.0).validate().is_err());
        assert!(WavelengthRange::new(-5.0, 800.0).validate().is_err());
    }

    #[test]
    fn test_configuration_validation_names_setting() {
        let config = DeviceConfiguration {
            wavelength_range: WavelengthRange::new(400.0, 800.0),
            trigger_mode: TriggerMode::Internal,
            integration_time_us: -1,
            hardware_averaging: HardwareAveraging::X1,
        };
        let (setting, failure) = config.validate().unwrap_err();
        assert_eq!(setting, Setting::IntegrationTime);
        assert_eq!(failure.code, 10);
    }

    #[test]
    fn test_applied_configuration_completion() {
        let mut applied = AppliedConfiguration::default();
        assert!(applied.complete().is_none());

        applied.wavelength_range = Some(WavelengthRange::new(400.0, 800.0));
        applied.trigger_mode = Some(TriggerMode::External);
        applied.integration_time_us = Some(100);
        assert!(applied.complete().is_none());

        applied.hardware_averaging = Some(HardwareAveraging::X2);
        let config = applied.complete().unwrap();
        assert_eq!(AppliedConfiguration::from(config), applied);
    }

    #[test]
    fn test_scan_block_rows() {
        let block = ScanBlock {
            num_scans: 2,
            pixels_per_scan: 3,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(block.row(1), Some(&[4, 5, 6][..]));
        assert_eq!(block.row(2), None);
        assert_eq!(block.rows().count(), 2);
    }
}
