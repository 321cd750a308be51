//! Fleet-wide state machine.
//!
//! Two-state run mode for the whole bus, an orthogonal set of pumps that
//! are currently priming, and a transient delivering-volume sub-state.
//! This is the single authoritative copy: every "is this control toggled"
//! value shown to the operator is derived from here, never stored beside
//! the control.
//!
//! Invariant: the priming set is non-empty only while the fleet is
//! stopped, and it is only ever cleared by an explicit stop-all.

use std::collections::BTreeSet;
use std::fmt;

use crate::driver::PumpId;
use crate::error::{FleetError, Result};

/// Fleet-wide run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Stopped,
    Running,
}

impl Mode {
    /// Status-bar label, e.g. `Status: Stopped`.
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Stopped => "Stopped",
            Mode::Running => "Running",
        }
    }
}

impl fmt::Display for Mode {
    /// Lowercase form for prose ("Can't prime pump while running").
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Stopped => write!(f, "stopped"),
            Mode::Running => write!(f, "running"),
        }
    }
}

/// Direction of a prime toggle, decided by current membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimeAction {
    /// Pump was not priming; begin.
    Begin,
    /// Pump was priming; stop it.
    End,
}

/// Authoritative fleet state for one bus session.
#[derive(Debug)]
pub struct FleetState {
    mode: Mode,
    priming: BTreeSet<PumpId>,
    /// Pump currently being commanded to deliver a volume; set when the
    /// sequence starts and resolved when the device run call returns.
    delivering: Option<PumpId>,
}

impl Default for FleetState {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetState {
    pub fn new() -> Self {
        Self {
            mode: Mode::Stopped,
            priming: BTreeSet::new(),
            delivering: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Derived view value for the operator's prime control.
    pub fn is_priming(&self, pump: PumpId) -> bool {
        self.priming.contains(&pump)
    }

    pub fn priming_pumps(&self) -> impl Iterator<Item = PumpId> + '_ {
        self.priming.iter().copied()
    }

    pub fn any_priming(&self) -> bool {
        !self.priming.is_empty()
    }

    pub fn delivering(&self) -> Option<PumpId> {
        self.delivering
    }

    /// Reject `op` unless the fleet is stopped.
    pub fn ensure_stopped(&self, op: &'static str) -> Result<()> {
        match self.mode {
            Mode::Stopped => Ok(()),
            mode => Err(FleetError::IllegalState { op, mode }),
        }
    }

    /// Commit a successful stop-all: mode stopped, priming cleared.
    pub fn commit_stop_all(&mut self) {
        self.mode = Mode::Stopped;
        self.priming.clear();
        self.delivering = None;
    }

    /// Commit a successful run/update: the fleet is running.
    pub fn commit_running(&mut self) {
        self.mode = Mode::Running;
    }

    /// What toggling the prime control for `pump` would do right now.
    /// Legality (stopped only) is checked by the caller before any bus
    /// command; this is a pure query.
    pub fn prime_action(&self, pump: PumpId) -> PrimeAction {
        if self.priming.contains(&pump) {
            PrimeAction::End
        } else {
            PrimeAction::Begin
        }
    }

    /// Commit a completed prime toggle.
    pub fn commit_prime(&mut self, pump: PumpId, action: PrimeAction) {
        match action {
            PrimeAction::Begin => {
                self.priming.insert(pump);
            }
            PrimeAction::End => {
                self.priming.remove(&pump);
            }
        }
    }

    /// Mark the start of a deliver-volume sequence.
    pub fn begin_delivery(&mut self, pump: PumpId) {
        self.delivering = Some(pump);
    }

    /// Resolve the deliver-volume sub-state; the fleet-level indicator
    /// settles back to stopped with one pump running to volume.
    pub fn resolve_delivery(&mut self) {
        self.delivering = None;
        self.mode = Mode::Stopped;
    }

    /// Status text for the presentation layer. Priming is shown in place
    /// of plain stopped while any pump is purging.
    pub fn status_label(&self) -> &'static str {
        if self.mode == Mode::Stopped && self.any_priming() {
            "Priming"
        } else {
            self.mode.label()
        }
    }
}
