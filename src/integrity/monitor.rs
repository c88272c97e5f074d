// src/integrity/monitor.rs

//! The integrity state machine.
//!
//! `Inactive -> Monitoring -> GracePeriod -> Terminated`. Every operation takes
//! the current instant and returns the events it produced, so the machine has
//! no timers of its own: the driver owns the clock and calls [`IntegrityMonitor::tick`].
//!
//! The fullscreen exit counter is never reset when fullscreen is recovered.
//! A second exit in the same session abandons it outright.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    config::MonitorConfig,
    error::{ExamError, ExamResult},
    integrity::{
        environment::{EnvironmentSignal, LockedEnvironment},
        policy::{self, BlockedAction, InterceptKind},
    },
    models::{
        session::ExamSession,
        violation::{Violation, ViolationType},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Hearts exhausted.
    Disqualified,
    /// Grace window exceeded, or a second fullscreen exit.
    Abandoned,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Disqualified => "disqualified",
            TerminationReason::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disqualified" => Some(TerminationReason::Disqualified),
            "abandoned" => Some(TerminationReason::Abandoned),
            _ => None,
        }
    }
}

/// Observable state of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MonitorState {
    Inactive,
    Monitoring,
    GracePeriod { exit_count: u32 },
    Terminated { reason: TerminationReason },
}

/// Everything the monitor reports back to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A heart was charged.
    Violation(Violation),
    /// Fullscreen was lost; it must be restored within `window_ms`.
    GraceStarted { window_ms: u64 },
    /// Fullscreen was restored inside the grace window.
    Recovered,
    /// An input was suppressed at no cost.
    InputBlocked { action: BlockedAction },
    /// A lock request failed; the monitor keeps running.
    LockUnavailable { reason: String },
    Disqualified,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Inactive,
    Monitoring,
    Grace { deadline: Instant },
    Terminated(TerminationReason),
}

pub struct IntegrityMonitor<E: LockedEnvironment> {
    config: MonitorConfig,
    env: E,
    phase: Phase,
    session_id: i64,
    hearts: u32,
    fullscreen_exits: u32,
    locked: bool,
    hidden: bool,
    next_enforcement: Option<Instant>,
    events: Vec<MonitorEvent>,
}

impl<E: LockedEnvironment> IntegrityMonitor<E> {
    pub fn new(env: E, config: MonitorConfig) -> Self {
        Self {
            config,
            env,
            phase: Phase::Inactive,
            session_id: 0,
            hearts: 0,
            fullscreen_exits: 0,
            locked: false,
            hidden: false,
            next_enforcement: None,
            events: Vec::new(),
        }
    }

    /// Binds the platform listeners and begins monitoring `session`.
    ///
    /// A no-op while already monitoring. Fails with [`ExamError::Unenforceable`]
    /// when the platform exposes no integrity primitive at all.
    pub fn start(&mut self, session: &ExamSession, now: Instant) -> ExamResult<Vec<MonitorEvent>> {
        match self.phase {
            Phase::Monitoring | Phase::Grace { .. } => return Ok(Vec::new()),
            Phase::Terminated(reason) => {
                tracing::warn!(
                    session_id = self.session_id,
                    "Ignoring start on a monitor terminated as {:?}",
                    reason
                );
                return Ok(Vec::new());
            }
            Phase::Inactive => {}
        }

        if self.env.capabilities().is_empty() {
            tracing::error!(session_id = session.id, "No integrity primitive available, refusing to start");
            return Err(ExamError::Unenforceable);
        }

        self.session_id = session.id;
        self.hearts = session.hearts_remaining.max(0) as u32;
        self.fullscreen_exits = 0;
        self.locked = false;
        self.hidden = false;
        self.events.clear();

        self.env.attach();
        self.phase = Phase::Monitoring;
        self.next_enforcement = Some(now + self.config.enforcement_poll);
        tracing::info!(session_id = self.session_id, hearts = self.hearts, "Integrity monitoring started");

        if self.hearts == 0 {
            self.terminate(TerminationReason::Disqualified);
        } else {
            self.acquire_lock();
        }
        Ok(self.drain())
    }

    /// Releases every listener and lock. Safe to call in any state.
    pub fn stop(&mut self) {
        if self.phase == Phase::Inactive {
            return;
        }
        self.env.release_lock();
        self.env.detach();
        self.phase = Phase::Inactive;
        self.next_enforcement = None;
        self.locked = false;
        self.events.clear();
        tracing::info!(session_id = self.session_id, "Integrity monitoring stopped");
    }

    /// Feeds one platform signal through the policy.
    pub fn handle(&mut self, signal: EnvironmentSignal, now: Instant) -> Vec<MonitorEvent> {
        if !self.is_running() {
            return Vec::new();
        }
        if !self.env.capabilities().supports(&signal) {
            tracing::debug!(session_id = self.session_id, ?signal, "Signal not supported by platform, ignored");
            return Vec::new();
        }

        match signal {
            EnvironmentSignal::FullscreenChange { active: true } => self.on_fullscreen_restored(),
            EnvironmentSignal::FullscreenChange { active: false } => {
                // Only a transition out of fullscreen counts as an exit.
                if self.locked {
                    self.locked = false;
                    self.intercept(ViolationType::FullscreenExit.into(), now);
                }
            }
            EnvironmentSignal::VisibilityChange { hidden: true } => {
                if !self.hidden {
                    self.hidden = true;
                    self.intercept(ViolationType::TabSwitch.into(), now);
                }
            }
            EnvironmentSignal::VisibilityChange { hidden: false } => self.hidden = false,
            EnvironmentSignal::WindowBlur => self.intercept(ViolationType::WindowBlur.into(), now),
            EnvironmentSignal::WindowFocus => {}
            EnvironmentSignal::Copy => self.intercept(ViolationType::Copy.into(), now),
            EnvironmentSignal::Paste => self.intercept(ViolationType::Paste.into(), now),
            EnvironmentSignal::Cut => self.intercept(BlockedAction::Clipboard.into(), now),
            EnvironmentSignal::ContextMenu => self.intercept(BlockedAction::ContextMenu.into(), now),
            EnvironmentSignal::KeyDown { key, ctrl, meta } => {
                if let Some(action) = policy::shortcut_action(&key, ctrl, meta) {
                    self.intercept(action.into(), now);
                }
            }
            EnvironmentSignal::PopState => self.intercept(BlockedAction::BackNavigation.into(), now),
            EnvironmentSignal::BeforeUnload => self.intercept(BlockedAction::Unload.into(), now),
        }
        self.drain()
    }

    /// Advances the clock: expires the grace window and runs the enforcement tick.
    pub fn tick(&mut self, now: Instant) -> Vec<MonitorEvent> {
        if let Phase::Grace { deadline } = self.phase {
            if now >= deadline {
                tracing::warn!(session_id = self.session_id, "Grace window expired without fullscreen");
                self.terminate(TerminationReason::Abandoned);
                return self.drain();
            }
        }

        if let Some(due) = self.next_enforcement {
            if self.is_running() && now >= due {
                self.next_enforcement = Some(now + self.config.enforcement_poll);
                if !self.locked && self.hearts > 0 {
                    self.acquire_lock();
                }
            }
        }
        self.drain()
    }

    pub fn state(&self) -> MonitorState {
        match self.phase {
            Phase::Inactive => MonitorState::Inactive,
            Phase::Monitoring => MonitorState::Monitoring,
            Phase::Grace { .. } => MonitorState::GracePeriod {
                exit_count: self.fullscreen_exits,
            },
            Phase::Terminated(reason) => MonitorState::Terminated { reason },
        }
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn hearts_remaining(&self) -> u32 {
        self.hearts
    }

    pub fn fullscreen_exits(&self) -> u32 {
        self.fullscreen_exits
    }

    /// Pending abandonment deadline, if a grace window is open.
    pub fn grace_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Grace { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Monitoring | Phase::Grace { .. })
    }

    fn intercept(&mut self, kind: InterceptKind, now: Instant) {
        let classification = policy::classify(kind);
        let violation_type = match kind {
            InterceptKind::Blocked(action) => {
                self.events.push(MonitorEvent::InputBlocked { action });
                return;
            }
            InterceptKind::Violation(violation_type) => violation_type,
        };
        if !classification.costs_life || !self.charge_heart(violation_type) {
            return;
        }

        if classification.is_fullscreen_class {
            self.fullscreen_exits += 1;
            if self.fullscreen_exits >= 2 {
                tracing::error!(
                    session_id = self.session_id,
                    exits = self.fullscreen_exits,
                    "Second fullscreen exit"
                );
                self.terminate(TerminationReason::Abandoned);
                return;
            }
        }

        if self.hearts == 0 {
            self.terminate(TerminationReason::Disqualified);
        } else if classification.is_fullscreen_class {
            self.open_grace_window(now);
        }
    }

    fn charge_heart(&mut self, violation_type: ViolationType) -> bool {
        if self.hearts == 0 {
            return false;
        }
        let hearts_before = self.hearts;
        self.hearts -= 1;
        tracing::warn!(
            session_id = self.session_id,
            violation = violation_type.as_str(),
            hearts = self.hearts,
            "Integrity violation"
        );
        self.events.push(MonitorEvent::Violation(Violation {
            session_id: self.session_id,
            violation_type,
            occurred_at: Utc::now(),
            hearts_before: hearts_before as i32,
            hearts_after: self.hearts as i32,
        }));
        true
    }

    fn open_grace_window(&mut self, now: Instant) {
        let window: Duration = self.config.grace_window;
        self.phase = Phase::Grace {
            deadline: now + window,
        };
        self.events.push(MonitorEvent::GraceStarted {
            window_ms: window.as_millis() as u64,
        });
        self.acquire_lock();
    }

    fn on_fullscreen_restored(&mut self) {
        self.locked = true;
        if let Phase::Grace { .. } = self.phase {
            // Replacing the phase drops the deadline, so a stale expiry can never fire.
            self.phase = Phase::Monitoring;
            self.events.push(MonitorEvent::Recovered);
            tracing::info!(session_id = self.session_id, "Fullscreen restored within grace window");
        }
    }

    fn acquire_lock(&mut self) {
        if !self.env.capabilities().fullscreen {
            return;
        }
        if let Err(e) = self.env.request_lock() {
            tracing::warn!(session_id = self.session_id, "Failed to acquire locked environment: {}", e);
            self.events.push(MonitorEvent::LockUnavailable { reason: e.0 });
        }
    }

    fn terminate(&mut self, reason: TerminationReason) {
        self.phase = Phase::Terminated(reason);
        self.next_enforcement = None;
        tracing::error!(session_id = self.session_id, ?reason, "Exam session terminated");
        self.events.push(match reason {
            TerminationReason::Disqualified => MonitorEvent::Disqualified,
            TerminationReason::Abandoned => MonitorEvent::Abandoned,
        });
    }

    fn drain(&mut self) -> Vec<MonitorEvent> {
        std::mem::take(&mut self.events)
    }
}

impl<E: LockedEnvironment> Drop for IntegrityMonitor<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        integrity::environment::{Capabilities, LockError},
        models::session::SessionStatus,
    };

    #[derive(Default)]
    struct FakeEnvironment {
        capabilities: Capabilities,
        attached: bool,
        attach_calls: u32,
        lock_requests: u32,
        releases: u32,
        fail_lock: bool,
    }

    impl FakeEnvironment {
        fn full() -> Self {
            Self {
                capabilities: Capabilities::all(),
                ..Self::default()
            }
        }
    }

    impl LockedEnvironment for FakeEnvironment {
        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        fn attach(&mut self) {
            self.attached = true;
            self.attach_calls += 1;
        }

        fn detach(&mut self) {
            self.attached = false;
        }

        fn request_lock(&mut self) -> Result<(), LockError> {
            self.lock_requests += 1;
            if self.fail_lock {
                Err(LockError("denied".to_string()))
            } else {
                Ok(())
            }
        }

        fn release_lock(&mut self) {
            self.releases += 1;
        }
    }

    fn session(hearts: i32) -> ExamSession {
        ExamSession {
            id: 42,
            user_id: 7,
            language: "python".to_string(),
            question_count: 3,
            exam_instance_id: None,
            status: SessionStatus::Active,
            started_at: Utc::now(),
            completed_at: None,
            time_spent_seconds: None,
            hearts_remaining: hearts,
            total_violations: 0,
            terminated_reason: None,
            auto_submitted: false,
            passed: false,
        }
    }

    fn started(env: FakeEnvironment) -> (IntegrityMonitor<FakeEnvironment>, Instant) {
        let t0 = Instant::now();
        let mut monitor = IntegrityMonitor::new(env, MonitorConfig::default());
        monitor.start(&session(3), t0).unwrap();
        monitor.handle(EnvironmentSignal::FullscreenChange { active: true }, t0);
        (monitor, t0)
    }

    fn ms(t0: Instant, offset: u64) -> Instant {
        t0 + Duration::from_millis(offset)
    }

    fn violations(events: &[MonitorEvent]) -> Vec<ViolationType> {
        events
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::Violation(v) => Some(v.violation_type),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut monitor, t0) = started(FakeEnvironment::full());
        assert_eq!(monitor.state(), MonitorState::Monitoring);

        let events = monitor.start(&session(3), ms(t0, 10)).unwrap();
        assert!(events.is_empty());
        assert_eq!(monitor.environment().attach_calls, 1);
        assert_eq!(monitor.environment().lock_requests, 1);
    }

    #[test]
    fn test_start_refuses_without_primitives() {
        let mut monitor = IntegrityMonitor::new(FakeEnvironment::default(), MonitorConfig::default());
        let err = monitor.start(&session(3), Instant::now()).unwrap_err();
        assert!(matches!(err, ExamError::Unenforceable));
        assert_eq!(monitor.state(), MonitorState::Inactive);
        assert!(!monitor.environment().attached);
    }

    #[test]
    fn test_instant_violations_stay_monitoring() {
        let (mut monitor, t0) = started(FakeEnvironment::full());

        let events = monitor.handle(EnvironmentSignal::VisibilityChange { hidden: true }, t0);
        assert_eq!(violations(&events), vec![ViolationType::TabSwitch]);
        monitor.handle(EnvironmentSignal::VisibilityChange { hidden: false }, t0);

        let events = monitor.handle(EnvironmentSignal::WindowBlur, t0);
        assert_eq!(violations(&events), vec![ViolationType::WindowBlur]);

        assert_eq!(monitor.hearts_remaining(), 1);
        assert_eq!(monitor.state(), MonitorState::Monitoring);
    }

    #[test]
    fn test_repeated_hidden_signal_costs_one_heart() {
        let (mut monitor, t0) = started(FakeEnvironment::full());
        monitor.handle(EnvironmentSignal::VisibilityChange { hidden: true }, t0);
        let events = monitor.handle(EnvironmentSignal::VisibilityChange { hidden: true }, t0);
        assert!(events.is_empty());
        assert_eq!(monitor.hearts_remaining(), 2);
    }

    #[test]
    fn test_three_violations_disqualify() {
        let (mut monitor, t0) = started(FakeEnvironment::full());

        monitor.handle(EnvironmentSignal::VisibilityChange { hidden: true }, t0);
        monitor.handle(EnvironmentSignal::WindowBlur, t0);
        let events = monitor.handle(EnvironmentSignal::Copy, t0);

        assert_eq!(violations(&events), vec![ViolationType::Copy]);
        assert_eq!(events.last(), Some(&MonitorEvent::Disqualified));
        assert_eq!(monitor.hearts_remaining(), 0);
        assert_eq!(
            monitor.state(),
            MonitorState::Terminated {
                reason: TerminationReason::Disqualified
            }
        );

        // Terminated is absorbing: nothing else is emitted.
        assert!(monitor.handle(EnvironmentSignal::Paste, t0).is_empty());
        assert!(monitor.tick(ms(t0, 10_000)).is_empty());
    }

    #[test]
    fn test_fullscreen_exit_recovered_within_grace() {
        let (mut monitor, t0) = started(FakeEnvironment::full());

        let events = monitor.handle(EnvironmentSignal::FullscreenChange { active: false }, t0);
        assert_eq!(violations(&events), vec![ViolationType::FullscreenExit]);
        assert!(events.contains(&MonitorEvent::GraceStarted { window_ms: 3000 }));
        assert_eq!(monitor.state(), MonitorState::GracePeriod { exit_count: 1 });
        assert_eq!(monitor.hearts_remaining(), 2);

        let events = monitor.handle(EnvironmentSignal::FullscreenChange { active: true }, ms(t0, 1000));
        assert_eq!(events, vec![MonitorEvent::Recovered]);
        assert_eq!(monitor.state(), MonitorState::Monitoring);
        assert_eq!(monitor.grace_deadline(), None);

        // The cancelled deadline must not fire later.
        assert!(monitor.tick(ms(t0, 5000)).is_empty());
        assert_eq!(monitor.state(), MonitorState::Monitoring);
    }

    #[test]
    fn test_grace_window_expiry_abandons() {
        let (mut monitor, t0) = started(FakeEnvironment::full());
        monitor.handle(EnvironmentSignal::FullscreenChange { active: false }, t0);

        assert!(!monitor.tick(ms(t0, 2999)).contains(&MonitorEvent::Abandoned));
        let events = monitor.tick(ms(t0, 3000));
        assert_eq!(events, vec![MonitorEvent::Abandoned]);
        assert_eq!(
            monitor.state(),
            MonitorState::Terminated {
                reason: TerminationReason::Abandoned
            }
        );
        assert_eq!(monitor.hearts_remaining(), 2);
    }

    #[test]
    fn test_second_fullscreen_exit_abandons_despite_recovery() {
        let (mut monitor, t0) = started(FakeEnvironment::full());

        monitor.handle(EnvironmentSignal::FullscreenChange { active: false }, t0);
        monitor.handle(EnvironmentSignal::FullscreenChange { active: true }, ms(t0, 1000));
        assert_eq!(monitor.hearts_remaining(), 2);

        let events = monitor.handle(EnvironmentSignal::FullscreenChange { active: false }, ms(t0, 2000));
        assert_eq!(violations(&events), vec![ViolationType::FullscreenExit]);
        assert_eq!(events.last(), Some(&MonitorEvent::Abandoned));
        assert_eq!(monitor.fullscreen_exits(), 2);
        assert_eq!(monitor.hearts_remaining(), 1);
        assert_eq!(
            monitor.state(),
            MonitorState::Terminated {
                reason: TerminationReason::Abandoned
            }
        );
    }

    #[test]
    fn test_last_heart_on_fullscreen_exit_disqualifies() {
        let (mut monitor, t0) = started(FakeEnvironment::full());
        monitor.handle(EnvironmentSignal::Copy, t0);
        monitor.handle(EnvironmentSignal::Paste, t0);

        let events = monitor.handle(EnvironmentSignal::FullscreenChange { active: false }, t0);
        assert_eq!(events.last(), Some(&MonitorEvent::Disqualified));
        assert_eq!(monitor.grace_deadline(), None);
    }

    #[test]
    fn test_violation_during_grace_keeps_deadline() {
        let (mut monitor, t0) = started(FakeEnvironment::full());
        monitor.handle(EnvironmentSignal::FullscreenChange { active: false }, t0);
        let deadline = monitor.grace_deadline();

        monitor.handle(EnvironmentSignal::WindowBlur, ms(t0, 500));
        assert_eq!(monitor.state(), MonitorState::GracePeriod { exit_count: 1 });
        assert_eq!(monitor.grace_deadline(), deadline);
        assert_eq!(monitor.hearts_remaining(), 1);
    }

    #[test]
    fn test_blocked_inputs_cost_nothing() {
        let (mut monitor, t0) = started(FakeEnvironment::full());

        let events = monitor.handle(EnvironmentSignal::ContextMenu, t0);
        assert_eq!(
            events,
            vec![MonitorEvent::InputBlocked {
                action: BlockedAction::ContextMenu
            }]
        );
        monitor.handle(
            EnvironmentSignal::KeyDown {
                key: "v".to_string(),
                ctrl: true,
                meta: false,
            },
            t0,
        );
        monitor.handle(EnvironmentSignal::PopState, t0);
        monitor.handle(EnvironmentSignal::BeforeUnload, t0);
        monitor.handle(EnvironmentSignal::Cut, t0);
        let events = monitor.handle(
            EnvironmentSignal::KeyDown {
                key: "a".to_string(),
                ctrl: false,
                meta: false,
            },
            t0,
        );

        assert!(events.is_empty());
        assert_eq!(monitor.hearts_remaining(), 3);
        assert_eq!(monitor.state(), MonitorState::Monitoring);
    }

    #[test]
    fn test_unsupported_signal_is_ignored() {
        let env = FakeEnvironment {
            capabilities: Capabilities {
                fullscreen: true,
                ..Capabilities::default()
            },
            ..FakeEnvironment::default()
        };
        let (mut monitor, t0) = started(env);
        assert!(monitor.handle(EnvironmentSignal::Copy, t0).is_empty());
        assert!(monitor.handle(EnvironmentSignal::WindowBlur, t0).is_empty());
        assert_eq!(monitor.hearts_remaining(), 3);
    }

    #[test]
    fn test_enforcement_tick_rerequests_lock() {
        let t0 = Instant::now();
        let mut monitor = IntegrityMonitor::new(FakeEnvironment::full(), MonitorConfig::default());
        monitor.start(&session(3), t0).unwrap();
        assert_eq!(monitor.environment().lock_requests, 1);

        monitor.tick(ms(t0, 499));
        assert_eq!(monitor.environment().lock_requests, 1);
        monitor.tick(ms(t0, 500));
        assert_eq!(monitor.environment().lock_requests, 2);

        monitor.handle(EnvironmentSignal::FullscreenChange { active: true }, ms(t0, 600));
        monitor.tick(ms(t0, 1000));
        assert_eq!(monitor.environment().lock_requests, 2);
    }

    #[test]
    fn test_lock_failure_is_a_warning() {
        let env = FakeEnvironment {
            fail_lock: true,
            ..FakeEnvironment::full()
        };
        let t0 = Instant::now();
        let mut monitor = IntegrityMonitor::new(env, MonitorConfig::default());
        let events = monitor.start(&session(3), t0).unwrap();
        assert_eq!(
            events,
            vec![MonitorEvent::LockUnavailable {
                reason: "denied".to_string()
            }]
        );
        assert_eq!(monitor.state(), MonitorState::Monitoring);
    }

    #[test]
    fn test_start_with_no_hearts_disqualifies() {
        let mut monitor = IntegrityMonitor::new(FakeEnvironment::full(), MonitorConfig::default());
        let events = monitor.start(&session(0), Instant::now()).unwrap();
        assert_eq!(events, vec![MonitorEvent::Disqualified]);
    }

    #[test]
    fn test_stop_releases_everything_and_restart_is_fresh() {
        let (mut monitor, t0) = started(FakeEnvironment::full());
        monitor.handle(EnvironmentSignal::FullscreenChange { active: false }, t0);

        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Inactive);
        assert_eq!(monitor.grace_deadline(), None);
        assert!(!monitor.environment().attached);
        assert_eq!(monitor.environment().releases, 1);
        assert!(monitor.tick(ms(t0, 10_000)).is_empty());

        monitor.start(&session(3), ms(t0, 20_000)).unwrap();
        assert_eq!(monitor.fullscreen_exits(), 0);
        assert_eq!(monitor.hearts_remaining(), 3);
        assert_eq!(monitor.state(), MonitorState::Monitoring);
    }

    #[test]
    fn test_hearts_never_increase_while_active() {
        let (mut monitor, t0) = started(FakeEnvironment::full());
        let signals = [
            EnvironmentSignal::WindowBlur,
            EnvironmentSignal::ContextMenu,
            EnvironmentSignal::FullscreenChange { active: true },
            EnvironmentSignal::Paste,
        ];
        let mut previous = monitor.hearts_remaining();
        for signal in signals {
            monitor.handle(signal, t0);
            assert!(monitor.hearts_remaining() <= previous);
            previous = monitor.hearts_remaining();
        }
        assert_eq!(monitor.state(), MonitorState::Monitoring);
    }
}
