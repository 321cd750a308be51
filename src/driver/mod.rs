//! Bus driver abstraction.
//!
//! The coordinator core never touches wire bytes: it speaks to the pumps
//! through the [`PumpDriver`] primitive operation set, one blocking call
//! per addressed command. The concrete implementation for New Era
//! NE-500-family pumps lives in [`new_era`]; tests use the scripted
//! [`mock::MockDriver`].
//!
//! Every call is synchronous and bounded by the transport's read timeout.
//! A call that returns without the expected data is an error, never a
//! retry loop; the sequencer decides what to abort.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::Result;

pub mod mock;
pub mod new_era;

/// Device address of one pump on the shared bus.
pub type PumpId = u8;

/// Pumping direction for the direction command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Dispense out of the syringe.
    Infuse,
    /// Draw back into the syringe.
    Withdraw,
}

/// The primitive operation set the coordination core consumes.
///
/// Implementations own the byte-level protocol and the raw serial
/// read/write. The bus is half-duplex and addressed: calls must not be
/// issued concurrently, which the coordinator guarantees by holding the
/// driver behind one lock for the duration of each command sequence.
pub trait PumpDriver: Send {
    /// Scan the bus and return the addresses that answered, in address
    /// order.
    fn discover_pumps(&mut self) -> Result<Vec<PumpId>>;

    /// Stop every pump on the bus.
    fn stop_all(&mut self) -> Result<()>;

    /// Stop a single addressed pump.
    fn stop_pump(&mut self, pump: PumpId) -> Result<()>;

    /// Program each pump's flow rate. Rate commands are device-format
    /// strings already validated by the caller.
    fn set_rates(&mut self, rates: &BTreeMap<PumpId, String>) -> Result<()>;

    /// Query the actual flow rate of each listed pump.
    fn get_rates(&mut self, pumps: &[PumpId]) -> Result<BTreeMap<PumpId, String>>;

    /// Start every pump at its programmed rate.
    fn run_all(&mut self) -> Result<()>;

    /// Start a single addressed pump.
    fn run_pump(&mut self, pump: PumpId) -> Result<()>;

    /// Program the syringe bore diameter (device-format string, mm).
    fn set_diameter(&mut self, pump: PumpId, diameter: &str) -> Result<()>;

    /// Read back the programmed diameter.
    fn get_diameter(&mut self, pump: PumpId) -> Result<String>;

    /// Run the pump continuously to purge air and fill tubing.
    fn prime(&mut self, pump: PumpId) -> Result<()>;

    /// Program the volume to deliver on the next run.
    fn set_volume(&mut self, pump: PumpId, volume: f64) -> Result<()>;

    /// Set the pumping direction.
    fn set_direction(&mut self, pump: PumpId, direction: Direction) -> Result<()>;

    /// Run the pump for a fixed duration, then stop it. Blocks until the
    /// phase completes.
    fn run_for_duration(&mut self, pump: PumpId, duration: Duration) -> Result<()>;
}
