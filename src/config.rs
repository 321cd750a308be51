//! Session configuration.
//!
//! Loaded with the `config` crate: built-in defaults, an optional TOML
//! file, then `PUMP_FLEET_*` environment overrides, e.g.
//!
//! ```text
//! PUMP_FLEET_BUS__PORT=/dev/ttyUSB1
//! PUMP_FLEET_BUS__BAUD_RATE=19200
//! ```
//!
//! Nothing here is persisted back; configuration is read once at session
//! start.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

/// Shared serial bus parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Serial device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Line speed; New Era pumps ship at 19200.
    pub baud_rate: u32,
    /// Bound on each physical read attempt, milliseconds.
    pub read_timeout_ms: u64,
    /// Discovery probes addresses `0..scan_limit`.
    pub scan_limit: u8,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            read_timeout_ms: 100,
            scan_limit: 10,
        }
    }
}

/// Habituation sequence parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HabituationSettings {
    /// Length of each phase (dispense, then withdraw), seconds.
    pub phase_secs: u64,
}

impl Default for HabituationSettings {
    fn default() -> Self {
        Self { phase_secs: 100 }
    }
}

/// Top-level settings for one coordinator session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bus: BusSettings,
    pub habituation: HabituationSettings,
}

impl Settings {
    /// Load settings from an optional TOML file plus environment
    /// overrides, falling back to defaults for anything unset.
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("PUMP_FLEET")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.bus.baud_rate == 0 {
            return Err(FleetError::Configuration(
                "bus.baud_rate must be non-zero".to_string(),
            ));
        }
        if self.bus.scan_limit == 0 {
            return Err(FleetError::Configuration(
                "bus.scan_limit must probe at least address 0".to_string(),
            ));
        }
        if self.bus.read_timeout_ms == 0 {
            return Err(FleetError::Configuration(
                "bus.read_timeout_ms of 0 would never complete a read".to_string(),
            ));
        }
        Ok(())
    }
}
