//! Per-pump records for one bus session.
//!
//! The registry is the only owner of pump state: target rate and volume as
//! the operator typed them, the selected syringe, and the last actual rate
//! the device reported. Everything else reads and writes pump fields
//! through this API, keyed by the address the pump answered discovery
//! with. Records are created once per session; pumps do not come or go at
//! runtime.
//!
//! Priming membership deliberately does not live here: it is fleet state
//! (see [`crate::state`]) and any "is this pump priming" display value is
//! derived from that single source.

use std::collections::BTreeMap;

use crate::catalog;
use crate::driver::PumpId;
use crate::error::{FleetError, Result};

/// Rate string reported for a pump that is not moving.
pub const ZERO_ACTUAL_RATE: &str = "0";

/// Mutable record for one discovered pump.
#[derive(Debug, Clone)]
pub struct Pump {
    id: PumpId,
    /// Catalog name of the mounted syringe.
    pub syringe: String,
    /// Raw operator-entered flow rate, normalized on run/update.
    pub target_rate: String,
    /// Raw operator-entered delivery volume.
    pub target_volume: String,
    /// Last rate the device reported, display-only.
    pub last_actual_rate: String,
}

impl Pump {
    fn new(id: PumpId) -> Self {
        Self {
            id,
            syringe: catalog::default_syringe().to_string(),
            target_rate: String::new(),
            target_volume: String::new(),
            last_actual_rate: ZERO_ACTUAL_RATE.to_string(),
        }
    }

    /// Bus address of this pump.
    pub fn id(&self) -> PumpId {
        self.id
    }
}

/// All pump records for one bus session, in address order.
#[derive(Debug, Default)]
pub struct PumpRegistry {
    pumps: BTreeMap<PumpId, Pump>,
}

impl PumpRegistry {
    /// Build one record per discovered address.
    pub fn from_discovered(ids: &[PumpId]) -> Self {
        Self {
            pumps: ids.iter().map(|&id| (id, Pump::new(id))).collect(),
        }
    }

    /// Addresses in bus order.
    pub fn ids(&self) -> Vec<PumpId> {
        self.pumps.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pumps.is_empty()
    }

    pub fn get(&self, id: PumpId) -> Result<&Pump> {
        self.pumps.get(&id).ok_or(FleetError::UnknownPump(id))
    }

    pub fn get_mut(&mut self, id: PumpId) -> Result<&mut Pump> {
        self.pumps.get_mut(&id).ok_or(FleetError::UnknownPump(id))
    }

    /// Iterate records in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Pump> {
        self.pumps.values()
    }

    /// Store a reported actual rate for one pump. Unknown ids in a rate
    /// readback are ignored rather than fatal; the device cannot report a
    /// pump that was never discovered.
    pub fn record_actual_rate(&mut self, id: PumpId, rate: &str) {
        if let Some(pump) = self.pumps.get_mut(&id) {
            pump.last_actual_rate = rate.to_string();
        }
    }

    /// Reset every displayed actual rate to the zero-flow value.
    pub fn zero_actual_rates(&mut self) {
        for pump in self.pumps.values_mut() {
            pump.last_actual_rate = ZERO_ACTUAL_RATE.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_created_per_discovered_id() {
        let registry = PumpRegistry::from_discovered(&[1, 2, 3]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.ids(), vec![1, 2, 3]);
        let pump = registry.get(2).unwrap();
        assert_eq!(pump.syringe, catalog::default_syringe());
        assert_eq!(pump.last_actual_rate, ZERO_ACTUAL_RATE);
    }

    #[test]
    fn test_unknown_pump_is_an_error() {
        let registry = PumpRegistry::from_discovered(&[1]);
        assert!(matches!(registry.get(9), Err(FleetError::UnknownPump(9))));
    }

    #[test]
    fn test_zero_actual_rates() {
        let mut registry = PumpRegistry::from_discovered(&[1, 2]);
        registry.record_actual_rate(1, "150.0");
        registry.zero_actual_rates();
        assert!(registry.iter().all(|p| p.last_actual_rate == ZERO_ACTUAL_RATE));
    }
}
