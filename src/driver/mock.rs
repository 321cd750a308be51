//! Scripted in-memory driver for tests.
//!
//! Records every primitive call in order so tests can assert the exact
//! sequence the coordinator put on the bus, echoes programmed rates and
//! diameters back on the query calls, and can inject a failure at a named
//! call to exercise the abort-and-keep-state policy.
//!
//! The call log is a shared handle ([`CallLog`]) so a test can keep
//! inspecting the recorded traffic after the driver has been boxed and
//! handed to the coordinator.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{Direction, PumpDriver, PumpId};
use crate::error::{FleetError, Result};

/// One recorded primitive call with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    DiscoverPumps,
    StopAll,
    StopPump(PumpId),
    SetRates(BTreeMap<PumpId, String>),
    GetRates(Vec<PumpId>),
    RunAll,
    RunPump(PumpId),
    SetDiameter(PumpId, String),
    GetDiameter(PumpId),
    Prime(PumpId),
    SetVolume(PumpId, f64),
    SetDirection(PumpId, Direction),
    RunForDuration(PumpId, Duration),
}

/// Shared, cloneable view of the calls a [`MockDriver`] has seen.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// All recorded calls, in order.
    pub fn snapshot(&self) -> Vec<Call> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget the recorded history.
    pub fn clear(&self) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deterministic test double for the bus driver.
pub struct MockDriver {
    pumps: Vec<PumpId>,
    log: CallLog,
    rates: BTreeMap<PumpId, String>,
    diameters: BTreeMap<PumpId, String>,
    fail_on: Option<&'static str>,
}

impl MockDriver {
    /// A bus with the given pump addresses attached.
    pub fn new(pumps: &[PumpId]) -> Self {
        Self {
            pumps: pumps.to_vec(),
            log: CallLog::default(),
            rates: BTreeMap::new(),
            diameters: BTreeMap::new(),
            fail_on: None,
        }
    }

    /// Make the named primitive call fail with a protocol error.
    pub fn fail_on(mut self, call: &'static str) -> Self {
        self.fail_on = Some(call);
        self
    }

    /// Handle to the call log, valid after the driver is boxed away.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn check(&self, call: &'static str) -> Result<()> {
        if self.fail_on == Some(call) {
            return Err(FleetError::Protocol {
                call,
                detail: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl PumpDriver for MockDriver {
    fn discover_pumps(&mut self) -> Result<Vec<PumpId>> {
        self.log.push(Call::DiscoverPumps);
        self.check("discover_pumps")?;
        if self.pumps.is_empty() {
            return Err(FleetError::NoPumpsFound);
        }
        Ok(self.pumps.clone())
    }

    fn stop_all(&mut self) -> Result<()> {
        self.log.push(Call::StopAll);
        self.check("stop_all")
    }

    fn stop_pump(&mut self, pump: PumpId) -> Result<()> {
        self.log.push(Call::StopPump(pump));
        self.check("stop_pump")
    }

    fn set_rates(&mut self, rates: &BTreeMap<PumpId, String>) -> Result<()> {
        self.log.push(Call::SetRates(rates.clone()));
        self.check("set_rates")?;
        self.rates.extend(rates.iter().map(|(k, v)| (*k, v.clone())));
        Ok(())
    }

    fn get_rates(&mut self, pumps: &[PumpId]) -> Result<BTreeMap<PumpId, String>> {
        self.log.push(Call::GetRates(pumps.to_vec()));
        self.check("get_rates")?;
        Ok(pumps
            .iter()
            .map(|p| (*p, self.rates.get(p).cloned().unwrap_or_else(|| "0".to_string())))
            .collect())
    }

    fn run_all(&mut self) -> Result<()> {
        self.log.push(Call::RunAll);
        self.check("run_all")
    }

    fn run_pump(&mut self, pump: PumpId) -> Result<()> {
        self.log.push(Call::RunPump(pump));
        self.check("run_pump")
    }

    fn set_diameter(&mut self, pump: PumpId, diameter: &str) -> Result<()> {
        self.log.push(Call::SetDiameter(pump, diameter.to_string()));
        self.check("set_diameter")?;
        self.diameters.insert(pump, diameter.to_string());
        Ok(())
    }

    fn get_diameter(&mut self, pump: PumpId) -> Result<String> {
        self.log.push(Call::GetDiameter(pump));
        self.check("get_diameter")?;
        Ok(self
            .diameters
            .get(&pump)
            .cloned()
            .unwrap_or_else(|| "0.0".to_string()))
    }

    fn prime(&mut self, pump: PumpId) -> Result<()> {
        self.log.push(Call::Prime(pump));
        self.check("prime")
    }

    fn set_volume(&mut self, pump: PumpId, volume: f64) -> Result<()> {
        self.log.push(Call::SetVolume(pump, volume));
        self.check("set_volume")
    }

    fn set_direction(&mut self, pump: PumpId, direction: Direction) -> Result<()> {
        self.log.push(Call::SetDirection(pump, direction));
        self.check("set_direction")
    }

    fn run_for_duration(&mut self, pump: PumpId, duration: Duration) -> Result<()> {
        self.log.push(Call::RunForDuration(pump, duration));
        self.check("run_for_duration")
    }
}
