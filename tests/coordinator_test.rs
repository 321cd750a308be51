//! End-to-end coordinator scenarios against the scripted mock driver.

use std::sync::{Mutex, PoisonError};

use pump_fleet::config::Settings;
use pump_fleet::driver::mock::{Call, CallLog, MockDriver};
use pump_fleet::driver::{Direction, PumpId};
use pump_fleet::frontend::Frontend;
use pump_fleet::{FleetError, PumpCoordinator};

/// Everything the coordinator pushed at the presentation layer, in order.
#[derive(Debug, Clone, PartialEq)]
enum Event {
    Status(String),
    LastCommand(String),
    ActualRate(PumpId, String),
    RateField(PumpId, String),
    Priming(PumpId, bool),
}

#[derive(Default)]
struct RecordingFrontend {
    events: Mutex<Vec<Event>>,
}

impl RecordingFrontend {
    fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn last_line(&self) -> Option<String> {
        self.events().into_iter().rev().find_map(|e| match e {
            Event::LastCommand(line) => Some(line),
            _ => None,
        })
    }

    fn push(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl Frontend for &RecordingFrontend {
    fn status(&self, label: &str) {
        self.push(Event::Status(label.to_string()));
    }
    fn last_command(&self, line: &str) {
        self.push(Event::LastCommand(line.to_string()));
    }
    fn actual_rate(&self, pump: PumpId, display: &str) {
        self.push(Event::ActualRate(pump, display.to_string()));
    }
    fn rate_field(&self, pump: PumpId, value: &str) {
        self.push(Event::RateField(pump, value.to_string()));
    }
    fn priming(&self, pump: PumpId, active: bool) {
        self.push(Event::Priming(pump, active));
    }
}

fn session<'a>(
    ids: &[PumpId],
    frontend: &'a RecordingFrontend,
) -> (PumpCoordinator<&'a RecordingFrontend>, CallLog) {
    let _ = env_logger::builder().is_test(true).try_init();
    let driver = MockDriver::new(ids);
    let log = driver.log();
    let coordinator =
        PumpCoordinator::new(Box::new(driver), &Settings::default(), frontend).unwrap();
    log.clear();
    (coordinator, log)
}

// Scenario A: three pumps, one valid rate, one fractional rate.
#[test]
fn run_update_sends_validated_rates_and_starts_fleet() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1, 2, 3], &frontend);

    coordinator.set_rate_input(1, "100").unwrap();
    coordinator.set_rate_input(2, "12.5").unwrap();
    coordinator.on_run_update().unwrap();

    let calls = log.snapshot();
    match &calls[0] {
        Call::SetRates(rates) => {
            assert_eq!(rates[&1], "100");
            assert_eq!(rates[&2], "0");
            assert_eq!(rates[&3], "0");
        }
        other => panic!("expected SetRates first, got {:?}", other),
    }
    assert_eq!(calls[1], Call::RunAll);
    assert_eq!(calls[2], Call::GetRates(vec![1, 2, 3]));

    assert_eq!(coordinator.status_label(), "Running");
    assert_eq!(coordinator.rate_field(2).unwrap(), "0");
    assert!(frontend
        .events()
        .contains(&Event::RateField(2, "0".to_string())));
    assert!(frontend
        .events()
        .contains(&Event::ActualRate(1, "100 ul/hr".to_string())));
    assert_eq!(
        frontend.last_line().unwrap(),
        "Last command: run p1=100, p2=0, p3=0"
    );
}

#[test]
fn second_run_update_is_a_full_stop_set_run_cycle() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1], &frontend);

    coordinator.set_rate_input(1, "100").unwrap();
    coordinator.on_run_update().unwrap();
    let first: Vec<_> = log.snapshot();
    log.clear();

    coordinator.on_run_update().unwrap();
    let second = log.snapshot();
    assert_eq!(second[0], Call::StopAll);
    assert_eq!(&second[1..], &first[..]);
    assert!(frontend
        .last_line()
        .unwrap()
        .starts_with("Last command: update "));
}

// Idempotence: same rates, same reported actuals both times.
#[test]
fn run_update_twice_reports_identical_actual_rates() {
    let frontend = RecordingFrontend::default();
    let (coordinator, _log) = session(&[1, 2], &frontend);

    coordinator.set_rate_input(1, "75").unwrap();
    coordinator.set_rate_input(2, "30").unwrap();
    coordinator.on_run_update().unwrap();
    let first = (
        coordinator.actual_rate_display(1).unwrap(),
        coordinator.actual_rate_display(2).unwrap(),
    );

    coordinator.on_run_update().unwrap();
    let second = (
        coordinator.actual_rate_display(1).unwrap(),
        coordinator.actual_rate_display(2).unwrap(),
    );
    assert_eq!(first, second);
    assert_eq!(first.0, "75 ul/hr");
}

#[test]
fn stop_all_clears_priming_and_zeroes_every_display() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1, 2], &frontend);

    coordinator.on_toggle_prime(1).unwrap();
    assert!(coordinator.is_priming(1));
    log.clear();

    coordinator.on_stop_all().unwrap();
    assert_eq!(log.snapshot()[0], Call::StopAll);
    assert_eq!(coordinator.status_label(), "Stopped");
    for id in coordinator.pump_ids() {
        assert!(!coordinator.is_priming(id));
        assert_eq!(coordinator.actual_rate_display(id).unwrap(), "0 ul/hr");
    }
    assert_eq!(
        frontend.last_line().unwrap(),
        "Last command: stop all pumps"
    );
    assert!(frontend.events().contains(&Event::Priming(1, false)));
}

// Scenario B: syringe change round-trips the diameter.
#[test]
fn change_syringe_programs_and_confirms_diameter() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1, 2], &frontend);

    coordinator.on_change_syringe(2, "5 ml BD").unwrap();
    assert_eq!(
        log.snapshot(),
        vec![
            Call::SetDiameter(2, "11.99".to_string()),
            Call::GetDiameter(2)
        ]
    );
    assert_eq!(coordinator.syringe_of(2).unwrap(), "5 ml BD");
    assert_eq!(
        frontend.last_line().unwrap(),
        "Last command: pump 2 set to 5 ml BD (11.99 mm)"
    );
}

#[test]
fn change_syringe_while_running_is_rejected_without_bus_traffic() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1], &frontend);

    coordinator.on_run_update().unwrap();
    log.clear();

    coordinator.on_change_syringe(1, "5 ml BD").unwrap();
    assert!(log.is_empty());
    assert_eq!(
        frontend.last_line().unwrap(),
        "Can't change syringe while running"
    );
    // Selection unchanged.
    assert_eq!(coordinator.syringe_of(1).unwrap(), "1 ml BD");
}

// Scenario C: prime toggle while running.
#[test]
fn prime_while_running_is_rejected_and_control_reverted() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1], &frontend);

    coordinator.on_run_update().unwrap();
    log.clear();

    coordinator.on_toggle_prime(1).unwrap();
    assert!(log.is_empty());
    assert!(!coordinator.is_priming(1));
    assert_eq!(
        frontend.last_line().unwrap(),
        "Can't prime pump while running"
    );
    assert_eq!(
        frontend.events().last(),
        Some(&Event::Priming(1, false))
    );
}

// Prime toggle is an involution on the priming set.
#[test]
fn prime_toggle_twice_returns_to_prior_state() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1, 2], &frontend);

    coordinator.on_toggle_prime(2).unwrap();
    assert!(coordinator.is_priming(2));
    assert_eq!(coordinator.status_label(), "Priming");
    assert_eq!(
        log.snapshot(),
        vec![Call::Prime(2), Call::GetRates(vec![1, 2])]
    );
    assert_eq!(
        frontend.last_line().unwrap(),
        "Last command: priming pump 2"
    );
    log.clear();

    coordinator.on_toggle_prime(2).unwrap();
    assert!(!coordinator.is_priming(2));
    assert_eq!(coordinator.status_label(), "Stopped");
    assert_eq!(
        log.snapshot(),
        vec![Call::StopPump(2), Call::GetRates(vec![1, 2])]
    );
    assert_eq!(
        frontend.last_line().unwrap(),
        "Last command: stopped pump 2"
    );
}

// Scenario D: invalid volume falls back to 50.0.
#[test]
fn deliver_volume_uses_default_on_unparseable_input() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1, 2, 3], &frontend);

    coordinator.set_volume_input(3, "abc").unwrap();
    coordinator.on_deliver_volume(3).unwrap();

    assert_eq!(
        log.snapshot(),
        vec![Call::SetVolume(3, 50.0), Call::RunPump(3)]
    );
    assert_eq!(coordinator.status_label(), "Stopped");
    assert_eq!(
        frontend.last_line().unwrap(),
        "Last command: pump 3 delivering 50 ul"
    );
}

#[test]
fn deliver_volume_honors_entered_decimal() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1], &frontend);

    coordinator.set_volume_input(1, " 12.5 ").unwrap();
    coordinator.on_deliver_volume(1).unwrap();
    assert_eq!(
        log.snapshot(),
        vec![Call::SetVolume(1, 12.5), Call::RunPump(1)]
    );
}

#[test]
fn habituation_runs_dispense_then_withdraw() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1], &frontend);

    coordinator.on_habituate(1).unwrap();
    let calls = log.snapshot();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0], Call::SetDirection(1, Direction::Infuse));
    assert!(matches!(calls[1], Call::RunForDuration(1, _)));
    assert_eq!(calls[2], Call::SetDirection(1, Direction::Withdraw));
    assert!(matches!(calls[3], Call::RunForDuration(1, _)));
    assert_eq!(coordinator.status_label(), "Stopped");
}

// A failed step aborts the sequence and keeps prior state.
#[test]
fn driver_failure_aborts_sequence_and_keeps_state() {
    let frontend = RecordingFrontend::default();
    let driver = MockDriver::new(&[1]).fail_on("run_all");
    let log = driver.log();
    let coordinator =
        PumpCoordinator::new(Box::new(driver), &Settings::default(), &frontend).unwrap();
    log.clear();

    coordinator.set_rate_input(1, "100").unwrap();
    let err = coordinator.on_run_update().unwrap_err();
    assert!(matches!(err, FleetError::Protocol { .. }));
    assert_eq!(coordinator.status_label(), "Stopped");
    assert_eq!(coordinator.actual_rate_display(1).unwrap(), "0 ul/hr");
    // No rate readback after the aborted run.
    assert!(!log
        .snapshot()
        .iter()
        .any(|c| matches!(c, Call::GetRates(_))));
}

#[test]
fn initialize_brings_fleet_to_known_stopped_state() {
    let frontend = RecordingFrontend::default();
    let (coordinator, log) = session(&[1, 2], &frontend);

    coordinator.initialize().unwrap();
    assert_eq!(coordinator.status_label(), "Stopped");
    for id in coordinator.pump_ids() {
        assert_eq!(coordinator.rate_field(id).unwrap(), "0");
        assert_eq!(coordinator.actual_rate_display(id).unwrap(), "0 ul/hr");
        assert_eq!(coordinator.syringe_of(id).unwrap(), "1 ml BD");
    }
    // Default syringes were programmed onto the bus.
    let calls = log.snapshot();
    assert!(calls.contains(&Call::SetDiameter(1, "4.699".to_string())));
    assert!(calls.contains(&Call::SetDiameter(2, "4.699".to_string())));
    // The command line was cleared after bring-up.
    assert_eq!(frontend.last_line().unwrap(), "");
}
