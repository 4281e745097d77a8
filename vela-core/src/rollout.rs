//! Rollout - Deterministic model of one blue/green deployment
//!
//! The deployment orchestrator owns the real rollout. This model replays the
//! contract a deployment group's parameters imply: production weights move
//! along the traffic-shift schedule, the deployment waits for approval after
//! the final shift, and a bound alarm or a stop request sends all traffic
//! back to blue when auto-rollback covers that event.

use std::fmt;
use std::time::Duration;

use log::{debug, info};

use crate::traffic::{ShiftStep, TrafficRouting, Weights};

/// Events that trigger automatic rollback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoRollback {
    pub on_failure: bool,
    pub on_alarm: bool,
    pub on_stop_request: bool,
}

/// Everything the model needs from a deployment group
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentPolicy {
    pub routing: TrafficRouting,
    /// Pause after the final shift before the deployment completes
    pub approval_wait: Duration,
    /// Names of alarms bound to the deployment group
    pub alarms: Vec<String>,
    pub rollback: AutoRollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Ok,
    Alarm,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackReason {
    AlarmFired(String),
    StopRequested,
    DeploymentFailed(String),
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackReason::AlarmFired(name) => write!(f, "alarm '{}' fired", name),
            RollbackReason::StopRequested => write!(f, "stop requested"),
            RollbackReason::DeploymentFailed(message) => write!(f, "deployment failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutStatus {
    Shifting,
    AwaitingApproval,
    Succeeded,
    /// Traffic returned to blue
    RolledBack(RollbackReason),
    /// Halted with weights left where they were
    Stopped(RollbackReason),
}

impl RolloutStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RolloutStatus::Succeeded | RolloutStatus::RolledBack(_) | RolloutStatus::Stopped(_)
        )
    }
}

/// A recorded transition, `at` after the deployment started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutEvent {
    Shifted { at: Duration, weights: Weights },
    AwaitingApproval { at: Duration, until: Duration },
    Approved { at: Duration },
    Succeeded { at: Duration },
    RolledBack { at: Duration, reason: RollbackReason },
    Stopped { at: Duration, reason: RollbackReason },
}

impl RolloutEvent {
    pub fn at(&self) -> Duration {
        match self {
            RolloutEvent::Shifted { at, .. }
            | RolloutEvent::AwaitingApproval { at, .. }
            | RolloutEvent::Approved { at }
            | RolloutEvent::Succeeded { at }
            | RolloutEvent::RolledBack { at, .. }
            | RolloutEvent::Stopped { at, .. } => *at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rollout {
    policy: DeploymentPolicy,
    steps: Vec<ShiftStep>,
    next_step: usize,
    elapsed: Duration,
    approval_deadline: Option<Duration>,
    weights: Weights,
    status: RolloutStatus,
    history: Vec<RolloutEvent>,
}

impl Rollout {
    /// Begin a deployment: production starts all on blue and every step due
    /// at time zero is applied immediately.
    pub fn start(policy: DeploymentPolicy) -> Self {
        let steps = policy.routing.schedule();
        let mut rollout = Self {
            policy,
            steps,
            next_step: 0,
            elapsed: Duration::ZERO,
            approval_deadline: None,
            weights: Weights::all_blue(),
            status: RolloutStatus::Shifting,
            history: Vec::new(),
        };
        info!("Starting rollout: {}", rollout.policy.routing);
        rollout.catch_up();
        rollout
    }

    pub fn weights(&self) -> Weights {
        self.weights
    }

    pub fn status(&self) -> &RolloutStatus {
        &self.status
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn history(&self) -> &[RolloutEvent] {
        &self.history
    }

    pub fn policy(&self) -> &DeploymentPolicy {
        &self.policy
    }

    /// Time until the next scheduled transition, if any
    pub fn next_transition_in(&self) -> Option<Duration> {
        let at = match self.status {
            RolloutStatus::Shifting => self.steps.get(self.next_step).map(|s| s.at),
            RolloutStatus::AwaitingApproval => self.approval_deadline,
            _ => None,
        }?;
        Some(at.saturating_sub(self.elapsed))
    }

    /// Let time pass, applying every transition that comes due
    pub fn advance(&mut self, by: Duration) -> &RolloutStatus {
        if !self.status.is_terminal() {
            self.elapsed = self.elapsed.saturating_add(by);
            self.catch_up();
        }
        &self.status
    }

    /// Advance until the deployment reaches a terminal state
    pub fn run_to_completion(&mut self) -> &RolloutStatus {
        while let Some(wait) = self.next_transition_in() {
            self.advance(wait);
        }
        &self.status
    }

    /// A bound alarm changed state. Unbound alarms are ignored.
    pub fn alarm_changed(&mut self, alarm: &str, state: AlarmState) -> &RolloutStatus {
        if self.status.is_terminal() || state != AlarmState::Alarm {
            return &self.status;
        }
        if !self.policy.alarms.iter().any(|a| a == alarm) {
            debug!("Ignoring alarm '{}': not bound to the deployment group", alarm);
            return &self.status;
        }
        let reason = RollbackReason::AlarmFired(alarm.to_string());
        self.halt(reason, self.policy.rollback.on_alarm);
        &self.status
    }

    /// An explicit stop request
    pub fn stop(&mut self) -> &RolloutStatus {
        if !self.status.is_terminal() {
            self.halt(RollbackReason::StopRequested, self.policy.rollback.on_stop_request);
        }
        &self.status
    }

    /// The deployment failed for a reason outside traffic shifting
    pub fn fail(&mut self, message: impl Into<String>) -> &RolloutStatus {
        if !self.status.is_terminal() {
            self.halt(
                RollbackReason::DeploymentFailed(message.into()),
                self.policy.rollback.on_failure,
            );
        }
        &self.status
    }

    /// Finalize while waiting for approval
    pub fn approve(&mut self) -> &RolloutStatus {
        if self.status == RolloutStatus::AwaitingApproval {
            self.history.push(RolloutEvent::Approved { at: self.elapsed });
            self.succeed();
        }
        &self.status
    }

    fn catch_up(&mut self) {
        while self.status == RolloutStatus::Shifting {
            let Some(step) = self.steps.get(self.next_step).copied() else {
                break;
            };
            if step.at > self.elapsed {
                return;
            }
            self.weights = step.weights;
            self.next_step += 1;
            debug!("Shifted to {} at {:?}", step.weights, step.at);
            self.history.push(RolloutEvent::Shifted {
                at: step.at,
                weights: step.weights,
            });

            if self.next_step == self.steps.len() {
                let until = step.at.saturating_add(self.policy.approval_wait);
                self.status = RolloutStatus::AwaitingApproval;
                self.approval_deadline = Some(until);
                self.history.push(RolloutEvent::AwaitingApproval { at: step.at, until });
            }
        }

        if self.status == RolloutStatus::AwaitingApproval
            && self.approval_deadline.is_some_and(|until| until <= self.elapsed)
        {
            self.succeed();
        }
    }

    fn succeed(&mut self) {
        let at = match self.status {
            RolloutStatus::AwaitingApproval => self
                .approval_deadline
                .filter(|until| *until <= self.elapsed)
                .unwrap_or(self.elapsed),
            _ => self.elapsed,
        };
        self.status = RolloutStatus::Succeeded;
        self.history.push(RolloutEvent::Succeeded { at });
        info!("Rollout succeeded with {}", self.weights);
    }

    fn halt(&mut self, reason: RollbackReason, roll_back: bool) {
        let at = self.elapsed;
        if roll_back {
            self.weights = Weights::all_blue();
            info!("Rolling back ({}): {}", reason, self.weights);
            self.history.push(RolloutEvent::RolledBack {
                at,
                reason: reason.clone(),
            });
            self.status = RolloutStatus::RolledBack(reason);
        } else {
            info!("Stopping ({}) with {}", reason, self.weights);
            self.history.push(RolloutEvent::Stopped {
                at,
                reason: reason.clone(),
            });
            self.status = RolloutStatus::Stopped(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn policy() -> DeploymentPolicy {
        DeploymentPolicy {
            routing: TrafficRouting::TimeBasedLinear {
                interval: MINUTE,
                percentage: 20,
            },
            approval_wait: MINUTE * 10,
            alarms: vec!["my-alarm".to_string()],
            rollback: AutoRollback {
                on_failure: true,
                on_alarm: true,
                on_stop_request: true,
            },
        }
    }

    #[test]
    fn first_step_applies_at_start() {
        let rollout = Rollout::start(policy());
        assert_eq!(rollout.weights(), Weights::new(80, 20).unwrap());
        assert_eq!(rollout.status(), &RolloutStatus::Shifting);
        assert_eq!(rollout.next_transition_in(), Some(MINUTE));
    }

    #[test]
    fn linear_shift_then_approval_wait_then_success() {
        let mut rollout = Rollout::start(policy());

        rollout.advance(MINUTE * 2);
        assert_eq!(rollout.weights().green(), 60);

        rollout.advance(MINUTE * 2);
        assert_eq!(rollout.weights(), Weights::all_green());
        assert_eq!(rollout.status(), &RolloutStatus::AwaitingApproval);

        rollout.advance(MINUTE * 9);
        assert_eq!(rollout.status(), &RolloutStatus::AwaitingApproval);

        rollout.advance(MINUTE);
        assert_eq!(rollout.status(), &RolloutStatus::Succeeded);
        assert_eq!(
            rollout.history().last(),
            Some(&RolloutEvent::Succeeded { at: MINUTE * 14 })
        );
    }

    #[test]
    fn weights_always_sum_to_100() {
        let mut rollout = Rollout::start(policy());
        for _ in 0..20 {
            let w = rollout.weights();
            assert_eq!(w.blue() + w.green(), 100);
            rollout.advance(Duration::from_secs(30));
        }
    }

    #[test]
    fn alarm_during_shift_rolls_back_to_blue() {
        let mut rollout = Rollout::start(policy());
        rollout.advance(MINUTE * 2);
        assert_eq!(rollout.weights().green(), 60);

        let status = rollout
            .alarm_changed("my-alarm", AlarmState::Alarm)
            .clone();
        assert_eq!(
            status,
            RolloutStatus::RolledBack(RollbackReason::AlarmFired("my-alarm".to_string()))
        );
        assert_eq!(rollout.weights(), Weights::all_blue());

        // Terminal: time and further events change nothing
        rollout.advance(MINUTE * 30);
        rollout.approve();
        assert_eq!(rollout.weights(), Weights::all_blue());
        assert!(rollout.status().is_terminal());
        assert_eq!(rollout.next_transition_in(), None);
    }

    #[test]
    fn alarm_during_approval_wait_rolls_back() {
        let mut rollout = Rollout::start(policy());
        rollout.advance(MINUTE * 5);
        assert_eq!(rollout.status(), &RolloutStatus::AwaitingApproval);

        rollout.alarm_changed("my-alarm", AlarmState::Alarm);
        assert!(matches!(rollout.status(), RolloutStatus::RolledBack(_)));
        assert_eq!(rollout.weights(), Weights::all_blue());
    }

    #[test]
    fn unbound_and_non_alarm_states_are_ignored() {
        let mut rollout = Rollout::start(policy());
        rollout.alarm_changed("other-alarm", AlarmState::Alarm);
        rollout.alarm_changed("my-alarm", AlarmState::InsufficientData);
        rollout.alarm_changed("my-alarm", AlarmState::Ok);
        assert_eq!(rollout.status(), &RolloutStatus::Shifting);
    }

    #[test]
    fn stop_request_rolls_back() {
        let mut rollout = Rollout::start(policy());
        rollout.advance(MINUTE);
        rollout.stop();
        assert_eq!(
            rollout.status(),
            &RolloutStatus::RolledBack(RollbackReason::StopRequested)
        );
        assert_eq!(rollout.weights(), Weights::all_blue());
    }

    #[test]
    fn without_auto_rollback_weights_freeze() {
        let mut policy = policy();
        policy.rollback = AutoRollback::default();
        let mut rollout = Rollout::start(policy);
        rollout.advance(MINUTE);
        rollout.alarm_changed("my-alarm", AlarmState::Alarm);

        assert_eq!(
            rollout.status(),
            &RolloutStatus::Stopped(RollbackReason::AlarmFired("my-alarm".to_string()))
        );
        assert_eq!(rollout.weights().green(), 40);
    }

    #[test]
    fn failure_uses_failure_setting() {
        let mut policy = policy();
        policy.rollback.on_failure = false;
        let mut rollout = Rollout::start(policy);
        rollout.fail("task failed health checks");
        assert!(matches!(
            rollout.status(),
            RolloutStatus::Stopped(RollbackReason::DeploymentFailed(_))
        ));
    }

    #[test]
    fn approve_finalizes_early() {
        let mut rollout = Rollout::start(policy());
        rollout.approve();
        assert_eq!(rollout.status(), &RolloutStatus::Shifting);

        rollout.advance(MINUTE * 4);
        rollout.approve();
        assert_eq!(rollout.status(), &RolloutStatus::Succeeded);
        assert!(matches!(
            rollout.history()[rollout.history().len() - 2],
            RolloutEvent::Approved { .. }
        ));
    }

    #[test]
    fn run_to_completion_and_all_at_once() {
        let mut rollout = Rollout::start(policy());
        assert_eq!(rollout.run_to_completion(), &RolloutStatus::Succeeded);
        assert_eq!(rollout.elapsed(), MINUTE * 14);

        let mut policy = policy();
        policy.routing = TrafficRouting::AllAtOnce;
        policy.approval_wait = Duration::ZERO;
        let rollout = Rollout::start(policy);
        assert_eq!(rollout.status(), &RolloutStatus::Succeeded);
        assert_eq!(rollout.weights(), Weights::all_green());
    }

    #[test]
    fn large_advance_records_every_step() {
        let mut rollout = Rollout::start(policy());
        rollout.advance(MINUTE * 60);
        let shifts: Vec<u32> = rollout
            .history()
            .iter()
            .filter_map(|e| match e {
                RolloutEvent::Shifted { weights, .. } => Some(weights.green()),
                _ => None,
            })
            .collect();
        assert_eq!(shifts, vec![20, 40, 60, 80, 100]);
        assert_eq!(rollout.status(), &RolloutStatus::Succeeded);
    }

    #[test]
    fn huge_waits_saturate_instead_of_overflowing() {
        let mut rollout = Rollout::start(DeploymentPolicy {
            approval_wait: Duration::MAX,
            ..policy()
        });

        rollout.advance(MINUTE * 10);
        assert_eq!(rollout.status(), &RolloutStatus::AwaitingApproval);
        assert_eq!(rollout.weights(), Weights::all_green());

        rollout.advance(Duration::MAX);
        assert_eq!(rollout.elapsed(), Duration::MAX);
        assert_eq!(rollout.status(), &RolloutStatus::Succeeded);
    }
}
