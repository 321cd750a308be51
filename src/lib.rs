//! Coordinator for a fleet of New Era syringe pumps sharing one
//! half-duplex serial bus.
//!
//! The crate turns high-level operator intents (run at rate X, deliver
//! volume V, prime pump P, habituate pump P) into ordered, validated
//! command sequences on the shared bus, and keeps the authoritative view
//! of fleet state so conflicting operations are rejected before any byte
//! is sent.
//!
//! Entry point is [`coordinator::PumpCoordinator`], built over any
//! [`driver::PumpDriver`]; the `instrument_serial` feature provides the
//! real [`driver::new_era::NewEraDriver`] transport.

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod frontend;
pub mod registry;
pub mod sequencer;
pub mod state;
pub mod validate;

pub use coordinator::PumpCoordinator;
pub use error::{FleetError, Result};
pub use state::Mode;
