//! Coordinator facade: the single entry point for operator events.
//!
//! Wires validation, the fleet state machine, the command sequencer and
//! the pump registry together behind one lock. Every handler acquires the
//! lock for the full duration of its command sequence, so two events can
//! never interleave their bus traffic; the bus is one exclusive resource
//! addressed one pump at a time, even for logically independent pumps.
//!
//! Illegal-state rejections are recovered here: the notice goes out
//! through the [`Frontend`], affected controls are reverted, and the
//! caller sees `Ok`. Driver failures abort the sequence and propagate.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{error, info, warn};

use crate::config::Settings;
use crate::driver::{PumpDriver, PumpId};
use crate::error::{FleetError, Result};
use crate::frontend::Frontend;
use crate::registry::PumpRegistry;
use crate::sequencer;
use crate::state::{FleetState, PrimeAction};

struct Inner {
    driver: Box<dyn PumpDriver>,
    registry: PumpRegistry,
    state: FleetState,
}

/// Facade over one pump-bus session.
pub struct PumpCoordinator<F: Frontend> {
    inner: Mutex<Inner>,
    frontend: F,
    habituation_phase: Duration,
}

impl<F: Frontend> PumpCoordinator<F> {
    /// Open a session: scan the bus and build a record per responding
    /// pump. Fails with [`FleetError::NoPumpsFound`] on an empty bus.
    pub fn new(mut driver: Box<dyn PumpDriver>, settings: &Settings, frontend: F) -> Result<Self> {
        let ids = driver.discover_pumps()?;
        info!("Found pumps: {:?}", ids);
        Ok(Self {
            inner: Mutex::new(Inner {
                driver,
                registry: PumpRegistry::from_discovered(&ids),
                state: FleetState::new(),
            }),
            frontend,
            habituation_phase: Duration::from_secs(settings.habituation.phase_secs),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring the fleet to a known state: a run/update with untouched
    /// fields (normalizing every rate to zero), an immediate stop, and a
    /// diameter sync for each pump's default syringe selection.
    pub fn initialize(&self) -> Result<()> {
        self.on_run_update()?;
        self.on_stop_all()?;
        for id in self.pump_ids() {
            let syringe = self.lock().registry.get(id)?.syringe.clone();
            self.on_change_syringe(id, &syringe)?;
        }
        self.frontend.last_command("");
        Ok(())
    }

    /// Stop the fleet and release the session.
    pub fn shutdown(self) -> Result<()> {
        self.on_stop_all()?;
        info!("Pump session closed");
        Ok(())
    }

    /// Addresses of the managed pumps, in bus order.
    pub fn pump_ids(&self) -> Vec<PumpId> {
        self.lock().registry.ids()
    }

    /// Current status text, derived from fleet state.
    pub fn status_label(&self) -> &'static str {
        self.lock().state.status_label()
    }

    /// Derived prime-control value for one pump.
    pub fn is_priming(&self, pump: PumpId) -> bool {
        self.lock().state.is_priming(pump)
    }

    /// The pump's displayed actual rate, e.g. `"100 ul/hr"`.
    pub fn actual_rate_display(&self, pump: PumpId) -> Result<String> {
        Ok(rate_display(&self.lock().registry.get(pump)?.last_actual_rate))
    }

    /// The pump's normalized rate field as last committed.
    pub fn rate_field(&self, pump: PumpId) -> Result<String> {
        Ok(self.lock().registry.get(pump)?.target_rate.clone())
    }

    /// The pump's current syringe selection.
    pub fn syringe_of(&self, pump: PumpId) -> Result<String> {
        Ok(self.lock().registry.get(pump)?.syringe.clone())
    }

    /// Record an operator edit of a pump's flow-rate field. Validation
    /// happens on run/update, not here.
    pub fn set_rate_input(&self, pump: PumpId, raw: &str) -> Result<()> {
        self.lock().registry.get_mut(pump)?.target_rate = raw.to_string();
        Ok(())
    }

    /// Record an operator edit of a pump's volume field.
    pub fn set_volume_input(&self, pump: PumpId, raw: &str) -> Result<()> {
        self.lock().registry.get_mut(pump)?.target_volume = raw.to_string();
        Ok(())
    }

    /// Run the fleet at the entered rates, or restart it with new rates if
    /// it is already running.
    pub fn on_run_update(&self) -> Result<()> {
        let mut inner = self.lock();
        let Inner {
            driver,
            registry,
            state,
        } = &mut *inner;

        let outcome = sequencer::run_update(driver.as_mut(), registry, state)
            .inspect_err(|e| error!("run/update aborted: {}", e))?;

        for &id in &outcome.normalized {
            self.frontend.rate_field(id, "0");
        }
        for (&id, rate) in &outcome.actual_rates {
            self.frontend.actual_rate(id, &rate_display(rate));
        }
        self.frontend.status(state.status_label());
        let verb = if outcome.restarted { "update" } else { "run" };
        let summary = outcome
            .actual_rates
            .iter()
            .map(|(p, r)| format!("p{}={}", p, r))
            .collect::<Vec<_>>()
            .join(", ");
        self.frontend
            .last_command(&format!("Last command: {} {}", verb, summary));
        Ok(())
    }

    /// Stop every pump and clear all priming.
    pub fn on_stop_all(&self) -> Result<()> {
        let mut inner = self.lock();
        let Inner {
            driver,
            registry,
            state,
        } = &mut *inner;

        sequencer::stop_all(driver.as_mut(), registry, state)
            .inspect_err(|e| error!("stop-all failed: {}", e))?;

        self.frontend.status(state.status_label());
        self.frontend.last_command("Last command: stop all pumps");
        for pump in registry.iter() {
            self.frontend
                .actual_rate(pump.id(), &rate_display(&pump.last_actual_rate));
            self.frontend.priming(pump.id(), false);
        }
        Ok(())
    }

    /// Toggle priming for one pump. Rejected with a notice (and a
    /// reverted control) while the fleet is running.
    pub fn on_toggle_prime(&self, pump: PumpId) -> Result<()> {
        let mut inner = self.lock();
        let Inner {
            driver,
            registry,
            state,
        } = &mut *inner;

        match sequencer::toggle_prime(driver.as_mut(), registry, state, pump) {
            Ok(outcome) => {
                self.frontend.status(state.status_label());
                self.frontend.priming(pump, state.is_priming(pump));
                self.frontend
                    .actual_rate(pump, &rate_display(&outcome.actual_rate));
                let line = match outcome.action {
                    PrimeAction::Begin => format!("Last command: priming pump {}", pump),
                    PrimeAction::End => format!("Last command: stopped pump {}", pump),
                };
                self.frontend.last_command(&line);
                Ok(())
            }
            Err(e @ FleetError::IllegalState { .. }) => {
                warn!("{}", e);
                self.frontend.last_command(&e.to_string());
                self.frontend.priming(pump, state.is_priming(pump));
                Ok(())
            }
            Err(e) => {
                error!("prime toggle aborted: {}", e);
                Err(e)
            }
        }
    }

    /// Change one pump's syringe selection, programming and confirming
    /// the new bore diameter. Rejected with a notice while running.
    pub fn on_change_syringe(&self, pump: PumpId, syringe: &str) -> Result<()> {
        let mut inner = self.lock();
        let Inner {
            driver,
            registry,
            state,
        } = &mut *inner;

        match sequencer::change_syringe(driver.as_mut(), registry, state, pump, syringe) {
            Ok(outcome) => {
                self.frontend.last_command(&format!(
                    "Last command: pump {} set to {} ({} mm)",
                    pump,
                    syringe.trim(),
                    outcome.confirmed_diameter
                ));
                Ok(())
            }
            Err(e @ FleetError::IllegalState { .. }) => {
                warn!("{}", e);
                self.frontend.last_command(&e.to_string());
                Ok(())
            }
            Err(e) => {
                error!("syringe change aborted: {}", e);
                Err(e)
            }
        }
    }

    /// Deliver the pump's configured volume (default 50.0 on a volume
    /// that fails to parse). Rejected with a notice while running.
    pub fn on_deliver_volume(&self, pump: PumpId) -> Result<()> {
        let mut inner = self.lock();
        let Inner {
            driver,
            registry,
            state,
        } = &mut *inner;

        match sequencer::deliver_volume(driver.as_mut(), registry, state, pump) {
            Ok(outcome) => {
                self.frontend.status(state.status_label());
                self.frontend.last_command(&format!(
                    "Last command: pump {} delivering {} ul",
                    pump, outcome.volume
                ));
                Ok(())
            }
            Err(e @ FleetError::IllegalState { .. }) => {
                warn!("{}", e);
                self.frontend.last_command(&e.to_string());
                Ok(())
            }
            Err(e) => {
                error!("volume delivery aborted: {}", e);
                Err(e)
            }
        }
    }

    /// Run the fixed dispense-then-withdraw habituation sequence for one
    /// pump. Independent of fleet mode.
    pub fn on_habituate(&self, pump: PumpId) -> Result<()> {
        let mut inner = self.lock();
        let Inner {
            driver,
            registry,
            state,
        } = &mut *inner;

        sequencer::habituate(
            driver.as_mut(),
            registry,
            state,
            pump,
            self.habituation_phase,
        )
        .inspect_err(|e| error!("habituation aborted: {}", e))?;

        self.frontend
            .last_command(&format!("Last command: habituated pump {}", pump));
        Ok(())
    }
}

fn rate_display(rate: &str) -> String {
    format!("{} ul/hr", rate)
}
