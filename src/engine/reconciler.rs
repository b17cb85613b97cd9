//! Motion reconciliation.
//!
//! Pure functions from (shadow, event) to shadow. Events are a local
//! intent, a decoded poll result, or the settle timer running out. Timer
//! side effects are returned as a [`SettleAction`] for the caller to carry
//! out, so nothing in here suspends or fails.

use crate::shadow::{MotionState, Observed, Shadow, Target};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Dead-zone thresholds near the physical end stops.
///
/// A position at or below `low` snaps to 0, at or above `high` to 100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClampPolicy {
    pub low: Option<u8>,
    pub high: Option<u8>,
}

impl ClampPolicy {
    pub fn new(low: Option<u8>, high: Option<u8>) -> Self {
        Self { low, high }
    }

    pub fn apply(&self, position: u8) -> u8 {
        let position = position.min(100);
        match (self.low, self.high) {
            (Some(low), _) if position <= low => 0,
            (_, Some(high)) if position >= high => 100,
            _ => position,
        }
    }
}

/// What the caller must do with the settle timer after a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleAction {
    Keep,
    /// (Re)start the timer; it belongs to the given epoch.
    Start(u64),
    Cancel,
}

fn direction(target: u8, position: u8) -> MotionState {
    match target.cmp(&position) {
        Ordering::Greater => MotionState::Increasing,
        Ordering::Less => MotionState::Decreasing,
        Ordering::Equal => MotionState::Idle,
    }
}

fn start_settle(shadow: &mut Shadow) -> SettleAction {
    shadow.assumed_motion = true;
    shadow.settle_epoch += 1;
    SettleAction::Start(shadow.settle_epoch)
}

fn cancel_settle(shadow: &mut Shadow) -> SettleAction {
    if shadow.assumed_motion {
        shadow.assumed_motion = false;
        shadow.settle_epoch += 1;
        SettleAction::Cancel
    } else {
        SettleAction::Keep
    }
}

fn settle_idle(shadow: &mut Shadow) -> SettleAction {
    shadow.intended_target = None;
    shadow.motion_state = MotionState::Idle;
    shadow.reported_motion = MotionState::Idle;
    cancel_settle(shadow)
}

/// Apply a locally requested target.
pub fn apply_intent(shadow: &mut Shadow, target: Target) -> SettleAction {
    match target {
        Target::Position(t) => match shadow.observed.position {
            Some(position) => {
                let motion = direction(t, position);
                if motion == MotionState::Idle {
                    return settle_idle(shadow);
                }
                shadow.intended_target = Some(target);
                shadow.motion_state = motion;
                shadow.reported_motion = motion;
                start_settle(shadow)
            }
            None => {
                // Never polled: direction unknown, but the motor may already
                // be running once the command lands.
                shadow.intended_target = Some(target);
                shadow.motion_state = MotionState::Idle;
                shadow.reported_motion = MotionState::Idle;
                start_settle(shadow)
            }
        },
        Target::Power(_) => {
            if target.is_satisfied_by(&shadow.observed) {
                shadow.intended_target = None;
            } else {
                shadow.intended_target = Some(target);
            }
            shadow.motion_state = MotionState::Idle;
            shadow.reported_motion = MotionState::Idle;
            SettleAction::Keep
        }
    }
}

/// Apply a successful poll result.
pub fn apply_poll(shadow: &mut Shadow, update: &Observed, clamp: &ClampPolicy) -> SettleAction {
    let previous = shadow.observed.position;
    let mut update = update.clone();
    update.position = update.position.map(|p| clamp.apply(p));
    shadow.observed.merge(&update);

    let Some(position) = shadow.observed.position else {
        // Nothing positional to track; only a pending power intent can converge.
        if let Some(target) = shadow.intended_target
            && target.is_satisfied_by(&shadow.observed)
        {
            return settle_idle(shadow);
        }
        return SettleAction::Keep;
    };

    if update.moving.unwrap_or(false) {
        let motion = match shadow.intended_target {
            Some(Target::Position(t)) => direction(t, position),
            _ => match previous.map(|p| position.cmp(&p)) {
                Some(Ordering::Greater) => MotionState::Increasing,
                Some(Ordering::Less) => MotionState::Decreasing,
                _ => shadow.motion_state,
            },
        };
        if motion == MotionState::Idle && shadow.intended_target.is_some() {
            return settle_idle(shadow);
        }
        shadow.motion_state = motion;
        shadow.reported_motion = motion;
        return cancel_settle(shadow);
    }

    let reached = shadow
        .intended_target
        .is_none_or(|t| t.is_satisfied_by(&shadow.observed));

    if (shadow.assumed_motion || shadow.push_in_flight) && !reached {
        // Stale idle report while the command is still queued or the motor
        // is probably still starting: show idle, keep the target and the
        // engine's direction.
        shadow.reported_motion = MotionState::Idle;
        return SettleAction::Keep;
    }

    settle_idle(shadow)
}

/// The settle timer for `epoch` ran out without a confirming poll.
///
/// Returns false when the timer was stale (a newer intent or a confirming
/// poll already replaced it).
pub fn apply_settle_expired(shadow: &mut Shadow, epoch: u64) -> bool {
    if shadow.settle_epoch != epoch || !shadow.assumed_motion {
        return false;
    }
    shadow.assumed_motion = false;
    true
}

/// A write for `target` was acknowledged by a pollable device.
///
/// The motor only starts once the command lands, so the settle window is
/// restarted from here. Nothing changes if a newer intent replaced the
/// target or a poll already confirmed it.
pub fn apply_write_sent(shadow: &mut Shadow, target: Target) -> SettleAction {
    match shadow.intended_target {
        Some(pending) if pending == target && !target.is_satisfied_by(&shadow.observed) => {
            start_settle(shadow)
        }
        _ => SettleAction::Keep,
    }
}

/// Record the state a write-only device was just commanded into.
pub fn apply_write_echo(shadow: &mut Shadow, target: Target) -> SettleAction {
    let echo = match target {
        Target::Position(p) => Observed {
            position: Some(p),
            moving: Some(false),
            ..Default::default()
        },
        Target::Power(on) => Observed {
            power: Some(on),
            ..Default::default()
        },
    };
    apply_poll(shadow, &echo, &ClampPolicy::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curtain_at(position: u8) -> Shadow {
        Shadow {
            observed: Observed {
                position: Some(position),
                moving: Some(false),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn report(position: u8, moving: bool) -> Observed {
        Observed {
            position: Some(position),
            moving: Some(moving),
            ..Default::default()
        }
    }

    #[test]
    fn test_clamp_thresholds() {
        let clamp = ClampPolicy::new(Some(5), Some(95));
        assert_eq!(clamp.apply(2), 0);
        assert_eq!(clamp.apply(5), 0);
        assert_eq!(clamp.apply(6), 6);
        assert_eq!(clamp.apply(94), 94);
        assert_eq!(clamp.apply(97), 100);
        assert_eq!(ClampPolicy::default().apply(2), 2);
        assert_eq!(ClampPolicy::default().apply(150), 100);
    }

    #[test]
    fn test_intent_sets_direction_and_starts_settle() {
        let mut shadow = curtain_at(20);
        let action = apply_intent(&mut shadow, Target::Position(80));
        assert_eq!(action, SettleAction::Start(1));
        assert_eq!(shadow.motion_state, MotionState::Increasing);
        assert_eq!(shadow.reported_motion, MotionState::Increasing);
        assert!(shadow.assumed_motion);

        let action = apply_intent(&mut shadow, Target::Position(10));
        assert_eq!(action, SettleAction::Start(2));
        assert_eq!(shadow.motion_state, MotionState::Decreasing);
        assert_eq!(shadow.intended_target, Some(Target::Position(10)));
    }

    #[test]
    fn test_intent_equal_to_observed_clears_target() {
        let mut shadow = curtain_at(50);
        apply_intent(&mut shadow, Target::Position(80));
        let action = apply_intent(&mut shadow, Target::Position(50));

        assert_eq!(action, SettleAction::Cancel);
        assert_eq!(shadow.motion_state, MotionState::Idle);
        assert_eq!(shadow.intended_target, None);
        assert!(!shadow.assumed_motion);
    }

    #[test]
    fn test_curtain_open_then_poll_catches_up() {
        let clamp = ClampPolicy::default();
        let mut shadow = curtain_at(20);
        let epoch = match apply_intent(&mut shadow, Target::Position(80)) {
            SettleAction::Start(epoch) => epoch,
            other => panic!("expected settle start, got {:?}", other),
        };

        // t+2s: backend reports motion
        let action = apply_poll(&mut shadow, &report(40, true), &clamp);
        assert_eq!(action, SettleAction::Cancel);
        assert_eq!(shadow.motion_state, MotionState::Increasing);
        assert_eq!(shadow.observed.position, Some(40));
        assert!(!shadow.assumed_motion);

        // t+10s: the cancelled timer would be stale anyway
        assert!(!apply_settle_expired(&mut shadow, epoch));

        // t+12s: motion finished
        apply_poll(&mut shadow, &report(80, false), &clamp);
        assert_eq!(shadow.motion_state, MotionState::Idle);
        assert_eq!(shadow.reported_motion, MotionState::Idle);
        assert_eq!(shadow.observed.position, Some(80));
        assert_eq!(shadow.intended_target, None);
        assert_eq!(shadow.effective_target(), Some(Target::Position(80)));
    }

    #[test]
    fn test_false_idle_during_early_motion() {
        let clamp = ClampPolicy::default();
        let mut shadow = curtain_at(0);
        apply_intent(&mut shadow, Target::Position(60));

        let action = apply_poll(&mut shadow, &report(5, false), &clamp);
        assert_eq!(action, SettleAction::Keep);
        assert_eq!(shadow.motion_state, MotionState::Increasing);
        assert_eq!(shadow.reported_motion, MotionState::Idle);
        assert_eq!(shadow.intended_target, Some(Target::Position(60)));
        assert_eq!(shadow.observed.position, Some(5));
    }

    #[test]
    fn test_settle_expiry_then_idle_poll_settles() {
        let clamp = ClampPolicy::default();
        let mut shadow = curtain_at(0);
        let SettleAction::Start(epoch) = apply_intent(&mut shadow, Target::Position(60)) else {
            panic!("expected settle start");
        };
        apply_poll(&mut shadow, &report(5, false), &clamp);

        assert!(apply_settle_expired(&mut shadow, epoch));
        assert!(!shadow.assumed_motion);
        // Expiry alone leaves the motion state untouched.
        assert_eq!(shadow.motion_state, MotionState::Increasing);

        apply_poll(&mut shadow, &report(5, false), &clamp);
        assert_eq!(shadow.motion_state, MotionState::Idle);
        assert_eq!(shadow.intended_target, None);
        assert_eq!(shadow.effective_target(), Some(Target::Position(5)));
    }

    #[test]
    fn test_stale_settle_epoch_is_ignored() {
        let mut shadow = curtain_at(0);
        let SettleAction::Start(first) = apply_intent(&mut shadow, Target::Position(60)) else {
            panic!("expected settle start");
        };
        apply_intent(&mut shadow, Target::Position(70));

        assert!(!apply_settle_expired(&mut shadow, first));
        assert!(shadow.assumed_motion);
    }

    #[test]
    fn test_converged_report_settles_even_inside_settle_window() {
        let clamp = ClampPolicy::default();
        let mut shadow = curtain_at(0);
        apply_intent(&mut shadow, Target::Position(30));

        let action = apply_poll(&mut shadow, &report(30, false), &clamp);
        assert_eq!(action, SettleAction::Cancel);
        assert_eq!(shadow.motion_state, MotionState::Idle);
        assert_eq!(shadow.intended_target, None);
        assert_eq!(shadow.effective_target(), Some(Target::Position(30)));
    }

    #[test]
    fn test_idle_poll_never_sets_target() {
        let clamp = ClampPolicy::default();
        let mut shadow = curtain_at(10);
        apply_poll(&mut shadow, &report(70, false), &clamp);
        assert_eq!(shadow.intended_target, None);
        assert_eq!(shadow.motion_state, MotionState::Idle);
    }

    #[test]
    fn test_remote_motion_without_intent_uses_previous_position() {
        let clamp = ClampPolicy::default();
        let mut shadow = curtain_at(10);
        apply_poll(&mut shadow, &report(30, true), &clamp);
        assert_eq!(shadow.motion_state, MotionState::Increasing);
        assert_eq!(shadow.intended_target, None);

        apply_poll(&mut shadow, &report(20, true), &clamp);
        assert_eq!(shadow.motion_state, MotionState::Decreasing);
    }

    #[test]
    fn test_moving_report_at_target_settles() {
        let clamp = ClampPolicy::default();
        let mut shadow = curtain_at(10);
        apply_intent(&mut shadow, Target::Position(50));
        apply_poll(&mut shadow, &report(50, true), &clamp);
        assert_eq!(shadow.motion_state, MotionState::Idle);
        assert_eq!(shadow.intended_target, None);
    }

    #[test]
    fn test_clamp_applies_before_state() {
        let clamp = ClampPolicy::new(Some(5), Some(95));
        let mut shadow = curtain_at(50);
        apply_intent(&mut shadow, Target::Position(100));
        apply_poll(&mut shadow, &report(97, false), &clamp);

        assert_eq!(shadow.observed.position, Some(100));
        assert_eq!(shadow.motion_state, MotionState::Idle);
        assert_eq!(shadow.intended_target, None);
    }

    #[test]
    fn test_unknown_position_intent_assumes_motion() {
        let mut shadow = Shadow::default();
        let action = apply_intent(&mut shadow, Target::Position(40));
        assert!(matches!(action, SettleAction::Start(_)));
        assert_eq!(shadow.motion_state, MotionState::Idle);
        assert_eq!(shadow.intended_target, Some(Target::Position(40)));

        // A stale report inside the window keeps the target.
        apply_poll(&mut shadow, &report(0, false), &ClampPolicy::default());
        assert_eq!(shadow.intended_target, Some(Target::Position(40)));
    }

    #[test]
    fn test_idle_poll_keeps_target_while_push_pending() {
        let clamp = ClampPolicy::default();
        let mut shadow = curtain_at(0);
        let SettleAction::Start(epoch) = apply_intent(&mut shadow, Target::Position(60)) else {
            panic!("expected settle start");
        };
        shadow.push_in_flight = true;

        // The settle window ran out before the debounced write went out.
        assert!(apply_settle_expired(&mut shadow, epoch));
        let action = apply_poll(&mut shadow, &report(0, false), &clamp);
        assert_eq!(action, SettleAction::Keep);
        assert_eq!(shadow.intended_target, Some(Target::Position(60)));
        assert_eq!(shadow.motion_state, MotionState::Increasing);
        assert_eq!(shadow.reported_motion, MotionState::Idle);

        // Once nothing is queued, the same report settles.
        shadow.push_in_flight = false;
        apply_poll(&mut shadow, &report(0, false), &clamp);
        assert_eq!(shadow.intended_target, None);
        assert_eq!(shadow.motion_state, MotionState::Idle);
    }

    #[test]
    fn test_write_sent_restarts_settle_window() {
        let mut shadow = curtain_at(0);
        let SettleAction::Start(epoch) = apply_intent(&mut shadow, Target::Position(60)) else {
            panic!("expected settle start");
        };
        assert!(apply_settle_expired(&mut shadow, epoch));

        let action = apply_write_sent(&mut shadow, Target::Position(60));
        assert_eq!(action, SettleAction::Start(epoch + 1));
        assert!(shadow.assumed_motion);

        // A write for a target that has since been replaced changes nothing.
        apply_intent(&mut shadow, Target::Position(20));
        let before = shadow.settle_epoch;
        assert_eq!(
            apply_write_sent(&mut shadow, Target::Position(60)),
            SettleAction::Keep
        );
        assert_eq!(shadow.settle_epoch, before);

        // Nor does one whose target a poll already confirmed.
        let mut shadow = curtain_at(0);
        assert_eq!(
            apply_write_sent(&mut shadow, Target::Position(0)),
            SettleAction::Keep
        );
    }

    #[test]
    fn test_power_intent_and_echo() {
        let mut shadow = Shadow::default();
        assert_eq!(
            apply_intent(&mut shadow, Target::Power(true)),
            SettleAction::Keep
        );
        assert_eq!(shadow.intended_target, Some(Target::Power(true)));

        apply_write_echo(&mut shadow, Target::Power(true));
        assert_eq!(shadow.observed.power, Some(true));
        assert_eq!(shadow.intended_target, None);
        assert_eq!(shadow.motion_state, MotionState::Idle);

        apply_intent(&mut shadow, Target::Power(true));
        assert_eq!(shadow.intended_target, None);
    }
}
