//! Command sequencing over the shared bus.
//!
//! Each public operation expands to a fixed, ordered list of primitive
//! driver calls. The bus is addressed and half-duplex, so a sequence is
//! atomic with respect to other sequences (the facade serializes them) and
//! the order within a sequence is never reordered or merged.
//!
//! Failure policy: a failed driver call aborts the remaining steps of the
//! sequence. Fleet mode, the priming set and the stored actual rates are
//! committed only after every step has succeeded, so an aborted sequence
//! leaves state exactly as it was when the sequence began. The one
//! exception is rate-field normalization, which happens before any bus
//! traffic: a rejected rate is rewritten to `"0"` at validation time so
//! the display always matches what would have been sent.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info};

use crate::catalog;
use crate::driver::{Direction, PumpDriver, PumpId};
use crate::error::{FleetError, Result};
use crate::registry::PumpRegistry;
use crate::state::{FleetState, Mode, PrimeAction};
use crate::validate;

/// Result of a run/update sequence.
#[derive(Debug)]
pub struct RunOutcome {
    /// True when the fleet was already running and a full
    /// stop-set-run cycle was issued instead of a live rate patch.
    pub restarted: bool,
    /// Pumps whose rate field was rejected and reset to `"0"`.
    pub normalized: Vec<PumpId>,
    /// Actual rates read back after the run, in address order.
    pub actual_rates: BTreeMap<PumpId, String>,
}

/// Result of a syringe change.
#[derive(Debug)]
pub struct SyringeOutcome {
    /// Diameter string the pump confirmed after programming.
    pub confirmed_diameter: String,
}

/// Result of a prime toggle.
#[derive(Debug)]
pub struct PrimeOutcome {
    /// Whether this toggle began or ended priming.
    pub action: PrimeAction,
    /// Refreshed actual rate for the toggled pump.
    pub actual_rate: String,
}

/// Result of a deliver-volume sequence.
#[derive(Debug)]
pub struct DeliverOutcome {
    /// Volume actually programmed.
    pub volume: f64,
    /// True when the entered volume failed to parse and the default was
    /// substituted.
    pub fell_back: bool,
}

/// Stop every pump: one fleet-wide stop, zeroed displays, priming cleared.
pub fn stop_all(
    driver: &mut dyn PumpDriver,
    registry: &mut PumpRegistry,
    state: &mut FleetState,
) -> Result<()> {
    driver.stop_all()?;
    state.commit_stop_all();
    registry.zero_actual_rates();
    info!("Stopped all pumps");
    Ok(())
}

/// Run the fleet at the operator-entered rates, restarting it first if it
/// is already running.
///
/// Order when stopped: `set_rates`, `run_all`, `get_rates`.
/// Order when running: `stop_all`, `set_rates`, `run_all`, `get_rates` —
/// a full cycle, never an in-place rate change.
pub fn run_update(
    driver: &mut dyn PumpDriver,
    registry: &mut PumpRegistry,
    state: &mut FleetState,
) -> Result<RunOutcome> {
    // Normalize every rate field first; fallbacks are written back to the
    // registry immediately so the display matches the command.
    let mut rates = BTreeMap::new();
    let mut normalized = Vec::new();
    for id in registry.ids() {
        let pump = registry.get_mut(id)?;
        let parsed = validate::parse_rate(&pump.target_rate);
        if parsed.fell_back {
            pump.target_rate = parsed.command.clone();
            normalized.push(id);
        }
        debug!("rate of pump {}: {}", id, parsed.command);
        rates.insert(id, parsed.command);
    }

    let restarted = state.mode() == Mode::Running;
    if restarted {
        driver.stop_all()?;
    }
    driver.set_rates(&rates)?;
    driver.run_all()?;
    let actual_rates = driver.get_rates(&registry.ids())?;

    for (&id, rate) in &actual_rates {
        registry.record_actual_rate(id, rate);
    }
    state.commit_running();
    info!(
        "Fleet {} with {} pumps",
        if restarted { "updated" } else { "started" },
        registry.len()
    );
    Ok(RunOutcome {
        restarted,
        normalized,
        actual_rates,
    })
}

/// Program a new syringe diameter for one pump, with a confirmation
/// read-back. Stopped only.
pub fn change_syringe(
    driver: &mut dyn PumpDriver,
    registry: &mut PumpRegistry,
    state: &mut FleetState,
    pump: PumpId,
    syringe: &str,
) -> Result<SyringeOutcome> {
    state.ensure_stopped("change syringe")?;
    registry.get(pump)?;
    let diameter = catalog::diameter_of(syringe)
        .ok_or_else(|| FleetError::UnknownSyringe(syringe.to_string()))?;

    driver.set_diameter(pump, diameter)?;
    let confirmed_diameter = driver.get_diameter(pump)?;

    registry.get_mut(pump)?.syringe = syringe.trim().to_string();
    info!(
        "Pump {} set to {} ({} mm)",
        pump, syringe, confirmed_diameter
    );
    Ok(SyringeOutcome { confirmed_diameter })
}

/// Toggle priming for one pump. Stopped only; begin runs the pump
/// continuously, end stops that pump specifically. Either way the pump's
/// displayed actual rate is refreshed from the bus.
pub fn toggle_prime(
    driver: &mut dyn PumpDriver,
    registry: &mut PumpRegistry,
    state: &mut FleetState,
    pump: PumpId,
) -> Result<PrimeOutcome> {
    state.ensure_stopped("prime pump")?;
    registry.get(pump)?;

    let action = state.prime_action(pump);
    match action {
        PrimeAction::Begin => driver.prime(pump)?,
        PrimeAction::End => driver.stop_pump(pump)?,
    }
    let rates = driver.get_rates(&registry.ids())?;

    state.commit_prime(pump, action);
    let actual_rate = rates.get(&pump).cloned().unwrap_or_else(|| {
        crate::registry::ZERO_ACTUAL_RATE.to_string()
    });
    registry.record_actual_rate(pump, &actual_rate);
    info!(
        "{} pump {}",
        match action {
            PrimeAction::Begin => "Priming",
            PrimeAction::End => "Stopped priming",
        },
        pump
    );
    Ok(PrimeOutcome { action, actual_rate })
}

/// Deliver the pump's configured volume: `set_volume` then `run_pump`,
/// with the transient delivering sub-state resolving once the run call
/// returns. Stopped only; no rate sequencing is involved.
pub fn deliver_volume(
    driver: &mut dyn PumpDriver,
    registry: &mut PumpRegistry,
    state: &mut FleetState,
    pump: PumpId,
) -> Result<DeliverOutcome> {
    state.ensure_stopped("deliver volume")?;
    let parsed = validate::parse_volume(&registry.get(pump)?.target_volume);

    state.begin_delivery(pump);
    let result = driver
        .set_volume(pump, parsed.value)
        .and_then(|()| driver.run_pump(pump));
    // The sub-state resolves on both paths; before the sequence it was
    // vacant and the fleet indicator settles to stopped either way.
    state.resolve_delivery();
    result?;

    info!("Pump {} delivering {} ul", pump, parsed.value);
    Ok(DeliverOutcome {
        volume: parsed.value,
        fell_back: parsed.fell_back,
    })
}

/// Two-phase habituation: dispense for the fixed duration, then withdraw
/// for the same duration. Independent of fleet mode; phase two starts only
/// after phase one's driver call has returned.
pub fn habituate(
    driver: &mut dyn PumpDriver,
    registry: &mut PumpRegistry,
    _state: &mut FleetState,
    pump: PumpId,
    phase: Duration,
) -> Result<()> {
    registry.get(pump)?;

    driver.set_direction(pump, Direction::Infuse)?;
    driver.run_for_duration(pump, phase)?;
    driver.set_direction(pump, Direction::Withdraw)?;
    driver.run_for_duration(pump, phase)?;

    info!("Habituated pump {} ({:?} per phase)", pump, phase);
    Ok(())
}
