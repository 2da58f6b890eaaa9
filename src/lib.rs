//! Safe session management for the Glaz line-scan spectrometer library.
//!
//! The vendor's `GlazLib` keeps a single global session and reports failures
//! as integer status codes. This crate wraps it in a [`Session`] that owns the
//! open handle, enforces the open → configure → measure → close lifecycle,
//! translates status codes into [`GlazError`], and releases the handle exactly
//! once, including on panic.
//!
//! Without the `glaz_hardware` feature only the simulated backend
//! ([`api::SimulatedGlaz`]) is compiled, which behaves like the vendor's demo
//! mode.
//!
//! ```
//! use glaz::api::SimulatedGlaz;
//! use glaz::{DeviceConfiguration, DeviceType, HardwareAveraging, Session, TriggerMode, WavelengthRange};
//!
//! let session = Session::open(SimulatedGlaz::new(), DeviceType::LinescanIIV2, true)?;
//! session.configure(&DeviceConfiguration {
//!     wavelength_range: WavelengthRange::new(400.0, 800.0),
//!     trigger_mode: TriggerMode::Internal,
//!     integration_time_us: 100,
//!     hardware_averaging: HardwareAveraging::X16,
//! })?;
//! session.capture_background(5)?;
//! session.run_measurement()?;
//!
//! let result = session.get_result()?;
//! assert_eq!(result.samples.len(), result.length);
//! # Ok::<(), glaz::GlazError>(())
//! ```

pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod session;
pub mod types;

pub use config::{DeviceSettings, GlazSettings};
pub use error::{ErrorCode, GlazError, GlazResult, NativeFailure, Setting};
pub use session::{DeviceHandle, OpenOptions, Session, SessionState};
pub use types::{
    AdcGain, AppliedConfiguration, ComplexResult, DeviceConfiguration, DeviceType,
    HardwareAveraging, IntegrationMode, LibraryVersion, MeasurementResult, OutputMode,
    OutputPolarity, Resolution, ScanBlock, ScanClockSpeed, ScanData, TestMode, TriggerMode,
    UsbParameters, WavelengthRange,
};
