//! Custom error types for the pump fleet coordinator.
//!
//! This module defines the primary error type, `FleetError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure classes the coordinator
//! distinguishes:
//!
//! - **`IllegalState`**: an operation was requested in a fleet mode that
//!   forbids it (priming or changing a syringe while running). These are
//!   rejected before any bus command is issued and are recovered locally by
//!   the facade, which reports them through the presentation layer.
//! - **`Protocol`**: a primitive driver call returned without the expected
//!   data (garbled frame, address mismatch, device alarm). Aborts the
//!   remainder of the in-flight command sequence; fleet state is left as it
//!   was before the sequence began.
//! - **`BusUnavailable`**: the shared serial channel could not be opened or
//!   maintained. Fatal to the session; there is no recovery strategy other
//!   than tearing the session down.
//! - **`Io`** wraps `std::io::Error` from the transport; it is treated the
//!   same way as `Protocol` by the sequencer.
//!
//! Malformed operator input is *not* an error: the validation layer
//! substitutes a per-operation default and normalizes the visible field
//! instead (see [`crate::validate`]).

use thiserror::Error;

use crate::driver::PumpId;
use crate::state::Mode;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Can't {op} while {mode}")]
    IllegalState { op: &'static str, mode: Mode },

    #[error("Pump {0} is not part of this fleet")]
    UnknownPump(PumpId),

    #[error("Unknown syringe '{0}'")]
    UnknownSyringe(String),

    #[error("Protocol error on '{call}': {detail}")]
    Protocol {
        call: &'static str,
        detail: String,
    },

    #[error("Pump {pump} reported alarm '{code}' during '{call}'")]
    DeviceAlarm {
        pump: PumpId,
        call: &'static str,
        code: char,
    },

    #[error("Bus unavailable: {0}")]
    BusUnavailable(String),

    #[error("No pumps responded to the address scan")]
    NoPumpsFound,

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,
}

impl FleetError {
    /// Whether the failure is fatal to the bus session as a whole, as
    /// opposed to aborting only the sequence that triggered it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FleetError::BusUnavailable(_))
    }
}
