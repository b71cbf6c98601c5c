//! Alarm state machine with hysteresis.
//!
//! An `_UNSAFE` state is only reachable from inside its own level, so a tank
//! hovering around a threshold does not flap between the alarm and NORMAL.

use crate::side_effects::SideEffectCoordinator;
use crate::tank::{Level, Tank, TankState};
use chrono::NaiveDateTime;
use log::{error, info};

/// Alarm thresholds of a tank, in percent. Unset thresholds never match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Thresholds {
    pub overflow_level: Option<u8>,
    pub overflow_safe_level: Option<u8>,
    pub warning_level: Option<u8>,
    pub warning_safe_level: Option<u8>,
    pub critical_level: Option<u8>,
    pub critical_safe_level: Option<u8>,
}

/// Next state for `percentage`, or `None` when there is no percentage.
///
/// Rules are tried in order and the first match wins: overflow, overflow
/// unsafe, critical, critical unsafe, warning, warning unsafe, normal.
pub fn compute_next_state(
    current: Option<TankState>,
    percentage: Option<u8>,
    thresholds: &Thresholds,
) -> Option<TankState> {
    let p = percentage?;
    let level = current.and_then(TankState::level);
    let t = thresholds;

    if t.overflow_level.is_some_and(|l| p >= l) {
        return Some(TankState::Overflow);
    }
    if level == Some(Level::Overflow) {
        if let (Some(level), Some(safe)) = (t.overflow_level, t.overflow_safe_level) {
            if safe <= p && p < level {
                return Some(TankState::OverflowUnsafe);
            }
        }
    }
    if t.critical_level.is_some_and(|l| p <= l) {
        return Some(TankState::Critical);
    }
    if level == Some(Level::Critical) {
        if let (Some(level), Some(safe)) = (t.critical_level, t.critical_safe_level) {
            if level < p && p <= safe {
                return Some(TankState::CriticalUnsafe);
            }
        }
    }
    if t.warning_level.is_some_and(|l| p <= l) {
        return Some(TankState::Warning);
    }
    if level == Some(Level::Warning) {
        if let (Some(level), Some(safe)) = (t.warning_level, t.warning_safe_level) {
            if level < p && p <= safe {
                return Some(TankState::WarningUnsafe);
            }
        }
    }
    Some(TankState::Normal)
}

/// A state change that was applied to a tank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<TankState>,
    pub to: TankState,
}

impl Transition {
    /// The level left entirely by this transition. Moving between a level's
    /// base and unsafe states leaves nothing.
    pub fn exited_level(&self) -> Option<Level> {
        let from = self.from.and_then(TankState::level)?;
        if self.to.level() == Some(from) {
            None
        } else {
            Some(from)
        }
    }

    /// The level whose entry actions run: the target is a base state not
    /// reached from its own unsafe state.
    pub fn entered_level(&self) -> Option<Level> {
        let to = self.to.level()?;
        if self.to.is_base() && self.from != Some(to.unsafe_state()) {
            Some(to)
        } else {
            None
        }
    }
}

/// Move `tank` to `next`, running exit and entry side effects when the tank
/// is enabled, then notify state observers.
///
/// Returns `None` when `next` is `None` or equal to the current state.
pub fn apply_transition(
    tank: &mut Tank,
    next: Option<TankState>,
    coordinator: &SideEffectCoordinator<'_>,
    now: NaiveDateTime,
) -> Option<Transition> {
    let to = next?;
    if tank.state == Some(to) {
        return None;
    }
    let transition = Transition {
        from: tank.state,
        to,
    };

    if tank.enabled {
        if let (Some(from), Some(_)) = (transition.from, transition.exited_level()) {
            if let Err(e) = coordinator.revert_programs(tank, from, now) {
                error!("{}", e);
            }
            if let Err(e) = coordinator.stop_stations_on_event_exit(tank, from, now) {
                error!("{}", e);
            }
        }
        if transition.entered_level().is_some() {
            if let Err(e) = coordinator.activate_programs(tank, to, now) {
                error!("{}", e);
            }
            if let Err(e) = coordinator.activate_stations(tank, to, now) {
                error!("{}", e);
            }
        }
    }

    info!(
        "Water tank {}: {} -> {}",
        tank.id,
        transition.from.map(TankState::name).unwrap_or("NONE"),
        to.name()
    );
    tank.state = Some(to);
    let observers = tank.observers.clone();
    observers.notify_state_changed(tank);
    Some(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::StateChangeObserver;
    use crate::tank::{TankProgram, TankStation};
    use crate::testing::{at, rectangular_tank, FakeScheduler};
    use std::sync::{Arc, Mutex};

    fn thresholds() -> Thresholds {
        Thresholds {
            overflow_level: Some(80),
            overflow_safe_level: Some(70),
            warning_level: Some(30),
            warning_safe_level: Some(40),
            critical_level: Some(10),
            critical_safe_level: Some(20),
        }
    }

    fn run(start: Option<TankState>, readings: &[u8]) -> Vec<Option<TankState>> {
        let t = thresholds();
        let mut state = start;
        readings
            .iter()
            .map(|&p| {
                state = compute_next_state(state, Some(p), &t);
                state
            })
            .collect()
    }

    #[test]
    fn test_overflow_hysteresis() {
        use TankState::*;
        assert_eq!(
            run(Some(Overflow), &[85, 75, 65]),
            vec![Some(Overflow), Some(OverflowUnsafe), Some(Normal)]
        );
    }

    #[test]
    fn test_no_unsafe_state_without_prior_alarm() {
        let t = Thresholds {
            warning_level: Some(30),
            critical_level: Some(10),
            ..thresholds()
        };
        assert_eq!(compute_next_state(None, Some(50), &t), Some(TankState::Normal));
        assert_eq!(
            compute_next_state(Some(TankState::Normal), Some(75), &thresholds()),
            Some(TankState::Normal)
        );
        assert_eq!(
            compute_next_state(Some(TankState::Normal), Some(35), &thresholds()),
            Some(TankState::Normal)
        );
    }

    #[test]
    fn test_draining_through_warning_and_critical() {
        use TankState::*;
        assert_eq!(
            run(Some(Normal), &[30, 35, 15, 10, 18, 25, 41]),
            vec![
                Some(Warning),
                Some(WarningUnsafe),
                Some(Warning),
                Some(Critical),
                Some(CriticalUnsafe),
                Some(Warning),
                Some(Normal)
            ]
        );
    }

    #[test]
    fn test_boundaries() {
        let t = thresholds();
        let from = |s, p| compute_next_state(Some(s), Some(p), &t);
        assert_eq!(from(TankState::OverflowUnsafe, 70), Some(TankState::OverflowUnsafe));
        assert_eq!(from(TankState::OverflowUnsafe, 80), Some(TankState::Overflow));
        assert_eq!(from(TankState::Critical, 20), Some(TankState::CriticalUnsafe));
        assert_eq!(from(TankState::Critical, 21), Some(TankState::Warning));
        assert_eq!(from(TankState::CriticalUnsafe, 45), Some(TankState::Normal));
        assert_eq!(from(TankState::WarningUnsafe, 40), Some(TankState::WarningUnsafe));
    }

    #[test]
    fn test_missing_thresholds_never_match() {
        let t = Thresholds::default();
        assert_eq!(compute_next_state(None, Some(100), &t), Some(TankState::Normal));
        assert_eq!(compute_next_state(None, Some(0), &t), Some(TankState::Normal));
        assert_eq!(compute_next_state(Some(TankState::Warning), None, &t), None);

        let no_safe = Thresholds {
            overflow_level: Some(80),
            ..Default::default()
        };
        assert_eq!(
            compute_next_state(Some(TankState::Overflow), Some(75), &no_safe),
            Some(TankState::Normal)
        );
    }

    #[test]
    fn test_transition_levels() {
        let t = |from, to| Transition { from, to };
        let internal = t(Some(TankState::Overflow), TankState::OverflowUnsafe);
        assert_eq!(internal.exited_level(), None);
        assert_eq!(internal.entered_level(), None);

        let back = t(Some(TankState::OverflowUnsafe), TankState::Overflow);
        assert_eq!(back.exited_level(), None);
        assert_eq!(back.entered_level(), None);

        let first = t(None, TankState::Critical);
        assert_eq!(first.exited_level(), None);
        assert_eq!(first.entered_level(), Some(Level::Critical));

        let switch = t(Some(TankState::WarningUnsafe), TankState::Critical);
        assert_eq!(switch.exited_level(), Some(Level::Warning));
        assert_eq!(switch.entered_level(), Some(Level::Critical));
    }

    struct SeenState(Mutex<Vec<Option<TankState>>>);

    impl StateChangeObserver for SeenState {
        fn state_changed(&self, tank: &Tank) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(tank.state);
            Ok(())
        }
    }

    fn alarm_tank() -> Tank {
        let mut tank = rectangular_tank("t1", 2.0);
        tank.critical_level = Some(10);
        tank.critical_safe_level = Some(20);
        tank.critical_programs.insert(
            0,
            TankProgram {
                run: true,
                ..Default::default()
            },
        );
        tank.critical_stations.insert(
            3,
            TankStation {
                run: true,
                stop_on_exit: true,
                ..Default::default()
            },
        );
        tank
    }

    #[test]
    fn test_apply_transition_runs_entry_and_exit_actions() {
        let scheduler = FakeScheduler::default();
        let coordinator = SideEffectCoordinator::new(&scheduler, 60);
        let seen = Arc::new(SeenState(Mutex::new(Vec::new())));
        let mut tank = alarm_tank();
        tank.state = Some(TankState::Normal);
        tank.observers.register_state_observer(seen.clone());

        let transition = apply_transition(&mut tank, Some(TankState::Critical), &coordinator, at(10, 0, 0));
        assert_eq!(
            transition,
            Some(Transition {
                from: Some(TankState::Normal),
                to: TankState::Critical
            })
        );
        assert_eq!(
            scheduler.calls(),
            vec!["start_program 0", "activate_stations 3:60"]
        );

        scheduler.clear_calls();
        apply_transition(&mut tank, Some(TankState::CriticalUnsafe), &coordinator, at(10, 5, 0));
        assert!(scheduler.calls().is_empty());

        // the scheduler still runs program 0, so only the station is stopped
        apply_transition(&mut tank, Some(TankState::Normal), &coordinator, at(10, 10, 0));
        assert_eq!(scheduler.calls(), vec!["stop_stations 3"]);
        assert!(tank.critical_programs[&0].is_running());
        assert!(!tank.critical_stations[&3].is_running());

        assert_eq!(
            *seen.0.lock().unwrap(),
            vec![
                Some(TankState::Critical),
                Some(TankState::CriticalUnsafe),
                Some(TankState::Normal)
            ]
        );
    }

    #[test]
    fn test_same_or_missing_state_is_a_no_op() {
        let scheduler = FakeScheduler::default();
        let coordinator = SideEffectCoordinator::new(&scheduler, 60);
        let seen = Arc::new(SeenState(Mutex::new(Vec::new())));
        let mut tank = alarm_tank();
        tank.state = Some(TankState::Critical);
        tank.observers.register_state_observer(seen.clone());

        assert_eq!(apply_transition(&mut tank, None, &coordinator, at(10, 0, 0)), None);
        assert_eq!(
            apply_transition(&mut tank, Some(TankState::Critical), &coordinator, at(10, 0, 0)),
            None
        );
        assert!(scheduler.calls().is_empty());
        assert!(seen.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_tank_changes_state_without_side_effects() {
        let scheduler = FakeScheduler::default();
        let coordinator = SideEffectCoordinator::new(&scheduler, 60);
        let seen = Arc::new(SeenState(Mutex::new(Vec::new())));
        let mut tank = alarm_tank();
        tank.enabled = false;
        tank.observers.register_state_observer(seen.clone());

        apply_transition(&mut tank, Some(TankState::Critical), &coordinator, at(10, 0, 0));
        assert!(scheduler.calls().is_empty());
        assert_eq!(tank.state, Some(TankState::Critical));
        assert_eq!(*seen.0.lock().unwrap(), vec![Some(TankState::Critical)]);
    }
}
