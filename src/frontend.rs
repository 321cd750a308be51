//! Presentation-layer interface.
//!
//! The coordinator never renders anything; after each handled operator
//! event it pushes the derived view values through this trait. All
//! methods have empty default bodies so a frontend only implements what it
//! displays. Implementations decide how (and whether) to draw; the values
//! themselves are always computed from the authoritative fleet state, so
//! a control can never drift out of sync with the model.

use crate::driver::PumpId;

/// Callbacks the coordinator emits after every handled event.
pub trait Frontend: Send {
    /// Fleet status text ("Stopped", "Running", "Priming").
    fn status(&self, label: &str) {
        let _ = label;
    }

    /// Single-line description of the last command, or a rejection notice.
    fn last_command(&self, line: &str) {
        let _ = line;
    }

    /// Updated displayed actual rate for one pump, e.g. `"100 ul/hr"`.
    fn actual_rate(&self, pump: PumpId, display: &str) {
        let _ = (pump, display);
    }

    /// The pump's rate entry field was normalized; the control must show
    /// this value so the display matches what is sent.
    fn rate_field(&self, pump: PumpId, value: &str) {
        let _ = (pump, value);
    }

    /// Derived checked/unchecked value for the pump's prime control. Also
    /// emitted on a rejected toggle so the control reverts.
    fn priming(&self, pump: PumpId, active: bool) {
        let _ = (pump, active);
    }
}

/// Frontend that displays nothing; for headless sessions and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFrontend;

impl Frontend for NullFrontend {}
