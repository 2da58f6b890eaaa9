//! Session settings using Figment
//!
//! Settings are loaded from:
//! 1. `config/glaz.toml` (or any file passed to [`GlazSettings::load_from`])
//! 2. Environment variables prefixed with `GLAZ_`, `__` separating sections
//!
//! ```text
//! GLAZ_DEVICE__DEVICE_TYPE=linescan_ii
//! GLAZ_DEVICE__ALLOW_DEMO=false
//! GLAZ_BACKGROUND_SCANS=10
//! ```
//!
//! # Example file
//!
//! ```toml
//! background_scans = 5
//!
//! [device]
//! device_type = "linescan_ii_v2"
//! allow_demo = true
//!
//! [measurement]
//! trigger_mode = "internal"
//! integration_time_us = 100
//! hardware_averaging = "x16"
//! wavelength_range = { min_nm = 400.0, max_nm = 800.0 }
//! ```

use crate::discovery::{default_search_dirs, find_config_file};
use crate::error::{GlazError, GlazResult};
use crate::session::OpenOptions;
use crate::types::{DeviceConfiguration, DeviceType, UsbParameters};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level settings for opening and preparing a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlazSettings {
    /// Library initialisation.
    #[serde(default)]
    pub device: DeviceSettings,
    /// USB transfer parameters applied after open.
    #[serde(default)]
    pub usb: Option<UsbParameters>,
    /// Measurement configuration applied after open.
    #[serde(default)]
    pub measurement: Option<DeviceConfiguration>,
    /// Dark scans captured after configuration; 0 skips the capture.
    #[serde(default)]
    pub background_scans: u32,
}

/// How the native library is initialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Device to open when no vendor configuration file is used.
    #[serde(default)]
    pub device_type: DeviceType,
    /// Fall back to demo mode when no matching device is connected.
    #[serde(default = "default_true")]
    pub allow_demo: bool,
    /// Start from the device's factory settings.
    #[serde(default = "default_true")]
    pub use_defaults: bool,
    /// Vendor XML configuration. A bare name is looked up in `search_dirs`.
    #[serde(default)]
    pub config_file: Option<PathBuf>,
    /// Look for one of the default vendor configurations in `search_dirs`,
    /// opening `device_type` alone when none is present.
    #[serde(default)]
    pub discover_config: bool,
    /// Directories searched for vendor configuration files, in order.
    #[serde(default = "default_search_dirs")]
    pub search_dirs: Vec<PathBuf>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device_type: DeviceType::default(),
            allow_demo: true,
            use_defaults: true,
            config_file: None,
            discover_config: false,
            search_dirs: default_search_dirs(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl GlazSettings {
    /// Load `config/glaz.toml` merged with `GLAZ_` environment variables.
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load() -> GlazResult<Self> {
        Self::load_from("config/glaz.toml")
    }

    /// Load from a specific file, environment variables taking precedence.
    ///
    /// # Errors
    ///
    /// `GlazError::Settings` if the sources cannot be parsed,
    /// `GlazError::SettingsValidation` if the result is inconsistent.
    pub fn load_from<P: AsRef<Path>>(path: P) -> GlazResult<Self> {
        let settings: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GLAZ_").split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings without touching a device.
    pub fn validate(&self) -> GlazResult<()> {
        if let Some(measurement) = &self.measurement {
            measurement.validate().map_err(|(setting, failure)| {
                GlazError::SettingsValidation(format!(
                    "Invalid measurement {setting}: {}",
                    failure.message
                ))
            })?;
        }

        if let Some(usb) = &self.usb {
            usb.validate().map_err(|failure| {
                GlazError::SettingsValidation(format!("Invalid usb section: {}", failure.message))
            })?;
        }

        if self.device.config_file.is_some() && self.device.discover_config {
            return Err(GlazError::SettingsValidation(
                "config_file and discover_config are mutually exclusive".to_string(),
            ));
        }

        if self.device.discover_config && self.device.search_dirs.is_empty() {
            return Err(GlazError::SettingsValidation(
                "discover_config needs at least one search directory".to_string(),
            ));
        }

        if i32::try_from(self.background_scans).is_err() {
            return Err(GlazError::SettingsValidation(format!(
                "Invalid background_scans {}. Must be at most {}",
                self.background_scans,
                i32::MAX
            )));
        }

        Ok(())
    }

    /// Initialiser options, resolving the vendor configuration file if one
    /// is named or discovery is enabled.
    ///
    /// A named file must exist. Discovery that finds no default file falls
    /// back to a single device of `device_type`.
    pub fn open_options(&self) -> GlazResult<OpenOptions> {
        let device = &self.device;
        let single = OpenOptions::Device {
            device_type: device.device_type,
            use_defaults: device.use_defaults,
            allow_demo: device.allow_demo,
        };
        if let Some(config_file) = &device.config_file {
            if config_file.is_file() {
                return Ok(OpenOptions::ConfigFile(config_file.clone()));
            }
            let name = config_file.to_string_lossy();
            return find_config_file(Some(&*name), &device.search_dirs).map(OpenOptions::ConfigFile);
        }
        if device.discover_config {
            return match find_config_file(None, &device.search_dirs) {
                Ok(path) => Ok(OpenOptions::ConfigFile(path)),
                Err(GlazError::ConfigFileNotFound(searched)) => {
                    tracing::debug!(
                        device_type = ?device.device_type,
                        "No default vendor configuration ({searched}), opening single device"
                    );
                    Ok(single)
                }
                Err(err) => Err(err),
            };
        }
        Ok(single)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HardwareAveraging, TriggerMode, WavelengthRange};

    fn measurement() -> DeviceConfiguration {
        DeviceConfiguration {
            wavelength_range: WavelengthRange::new(400.0, 800.0),
            trigger_mode: TriggerMode::Internal,
            integration_time_us: 100,
            hardware_averaging: HardwareAveraging::X16,
        }
    }

    #[test]
    fn test_defaults_validate() {
        let settings = GlazSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(
            settings.open_options().expect("options"),
            OpenOptions::device(DeviceType::LinescanIIV2, true)
        );
    }

    #[test]
    fn test_invalid_measurement() {
        let mut bad = measurement();
        bad.integration_time_us = -5;
        let settings = GlazSettings {
            measurement: Some(bad),
            ..Default::default()
        };

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("integration time"));
    }

    #[test]
    fn test_invalid_usb_parameters() {
        let settings = GlazSettings {
            usb: Some(UsbParameters {
                timeout_ms: 0,
                bulk_size: 512,
                queue_size: 4,
            }),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_config_file_conflicts_with_discovery() {
        let settings = GlazSettings {
            device: DeviceSettings {
                config_file: Some(PathBuf::from("lab.xml")),
                discover_config: true,
                ..Default::default()
            },
            ..Default::default()
        };

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_background_scans_must_fit_native_int() {
        let settings = GlazSettings {
            background_scans: u32::MAX,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_measurement_section_parses() {
        let settings: GlazSettings = Figment::new()
            .merge(Toml::string(
                r#"
                background_scans = 5

                [device]
                device_type = "linescan_ii"
                allow_demo = false

                [measurement]
                trigger_mode = "internal"
                integration_time_us = 100
                hardware_averaging = "x16"
                wavelength_range = { min_nm = 400.0, max_nm = 800.0 }
                "#,
            ))
            .extract()
            .expect("parse");

        assert_eq!(settings.device.device_type, DeviceType::LinescanII);
        assert!(!settings.device.allow_demo);
        assert!(settings.device.use_defaults);
        assert_eq!(settings.measurement, Some(measurement()));
        assert_eq!(settings.background_scans, 5);
    }
}
