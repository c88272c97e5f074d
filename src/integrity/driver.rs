// src/integrity/driver.rs

//! Runs one [`IntegrityMonitor`] per session on its own tokio task.
//!
//! The task is the session's event loop: platform signals, the enforcement
//! tick, the grace deadline and the exam time-up are all handled there, one
//! at a time, each to completion.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, MissedTickBehavior},
};

use crate::{
    config::MonitorConfig,
    error::ExamResult,
    integrity::{
        environment::{Capabilities, Directive, DirectiveOutbox, EnvironmentSignal, RemoteEnvironment},
        monitor::{IntegrityMonitor, MonitorEvent, MonitorState, TerminationReason},
    },
    models::{session::ExamSession, violation::Violation},
};

const COMMAND_BUFFER: usize = 32;

/// Receives the consequences of monitor events.
#[async_trait]
pub trait MonitorSink: Send + Sync {
    async fn on_violation(&self, violation: &Violation);

    async fn on_terminated(&self, session_id: i64, reason: TerminationReason);

    async fn on_time_up(&self, session_id: i64);
}

/// What a single signal did, returned to the platform that sent it.
#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub events: Vec<MonitorEvent>,
    pub state: MonitorState,
    pub hearts_remaining: u32,
    pub directives: Vec<Directive>,
}

enum Command {
    Signal {
        signal: EnvironmentSignal,
        reply: oneshot::Sender<SignalReport>,
    },
}

type SharedMonitor = Arc<Mutex<IntegrityMonitor<RemoteEnvironment>>>;

struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    outbox: DirectiveOutbox,
    monitor: SharedMonitor,
}

#[derive(Default)]
struct Slots {
    live: HashMap<i64, MonitorHandle>,
    /// Outboxes of stopped monitors, kept until the client drains the release directive.
    released: HashMap<i64, DirectiveOutbox>,
}

/// Session id to running monitor. Dropping an entry stops its monitor.
#[derive(Clone, Default)]
pub struct MonitorRegistry {
    slots: Arc<Mutex<Slots>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts monitoring `session`. Idempotent per session.
    pub fn spawn(
        &self,
        session: &ExamSession,
        capabilities: Capabilities,
        config: MonitorConfig,
        time_left: Duration,
        sink: Arc<dyn MonitorSink>,
    ) -> ExamResult<DirectiveOutbox> {
        let mut slots = self.lock();
        slots.released.retain(|_, outbox| !outbox.is_empty());
        if let Some(existing) = slots.live.get(&session.id) {
            if !existing.commands.is_closed() {
                return Ok(existing.outbox.clone());
            }
        }

        let environment = RemoteEnvironment::new(capabilities);
        let outbox = environment.outbox();
        let mut monitor = IntegrityMonitor::new(environment, config);
        let initial = monitor.start(session, Instant::now().into_std())?;
        let monitor = Arc::new(Mutex::new(monitor));

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let time_up = Instant::now() + time_left;
        tokio::spawn(run(monitor.clone(), rx, sink, config, time_up, initial, outbox.clone()));

        slots.released.remove(&session.id);
        slots.live.insert(
            session.id,
            MonitorHandle {
                commands: tx,
                outbox: outbox.clone(),
                monitor,
            },
        );
        Ok(outbox)
    }

    /// Forwards a signal to the session's monitor.
    /// `None` when no monitor is running for the session.
    pub async fn signal(&self, session_id: i64, signal: EnvironmentSignal) -> Option<SignalReport> {
        let commands = self.lock().live.get(&session_id)?.commands.clone();
        let (reply, response) = oneshot::channel();
        commands.send(Command::Signal { signal, reply }).await.ok()?;
        response.await.ok()
    }

    /// Drains pending directives, including the release left by a stopped monitor.
    pub fn directives(&self, session_id: i64) -> Option<Vec<Directive>> {
        let mut slots = self.lock();
        if let Some(handle) = slots.live.get(&session_id) {
            return Some(handle.outbox.drain());
        }
        slots.released.remove(&session_id).map(|outbox| outbox.drain())
    }

    pub fn is_running(&self, session_id: i64) -> bool {
        self.lock()
            .live
            .get(&session_id)
            .is_some_and(|handle| !handle.commands.is_closed())
    }

    /// Stops the session's monitor and releases its environment lock.
    ///
    /// Never waits on the monitor task, so it is safe to call from a sink
    /// running on that task. The release directive stays available through
    /// [`MonitorRegistry::directives`].
    pub fn stop(&self, session_id: i64) -> bool {
        let mut slots = self.lock();
        let Some(handle) = slots.live.remove(&session_id) else {
            return false;
        };
        lock_monitor(&handle.monitor).stop();
        slots.released.insert(session_id, handle.outbox);
        true
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn lock_monitor(monitor: &SharedMonitor) -> MutexGuard<'_, IntegrityMonitor<RemoteEnvironment>> {
    monitor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// The monitor lock is only ever held for synchronous calls, never across an
// await, so a sink may stop the monitor from inside this task.
async fn run(
    monitor: SharedMonitor,
    mut commands: mpsc::Receiver<Command>,
    sink: Arc<dyn MonitorSink>,
    config: MonitorConfig,
    time_up: Instant,
    initial: Vec<MonitorEvent>,
    outbox: DirectiveOutbox,
) {
    let session_id = lock_monitor(&monitor).session_id();
    let mut terminated = dispatch(sink.as_ref(), session_id, &initial).await;

    let mut enforcement = tokio::time::interval(config.enforcement_poll);
    enforcement.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !terminated {
        let grace = lock_monitor(&monitor).grace_deadline().map(Instant::from_std);

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Signal { signal, reply }) => {
                    let (events, state, hearts_remaining) = {
                        let mut monitor = lock_monitor(&monitor);
                        let events = monitor.handle(signal, Instant::now().into_std());
                        (events, monitor.state(), monitor.hearts_remaining())
                    };
                    terminated = dispatch(sink.as_ref(), session_id, &events).await;
                    let report = SignalReport {
                        events,
                        state,
                        hearts_remaining,
                        directives: outbox.drain(),
                    };
                    let _ = reply.send(report);
                }
                None => break,
            },
            _ = enforcement.tick() => {
                let events = lock_monitor(&monitor).tick(Instant::now().into_std());
                terminated = dispatch(sink.as_ref(), session_id, &events).await;
            }
            _ = sleep_until(grace) => {
                let events = lock_monitor(&monitor).tick(Instant::now().into_std());
                terminated = dispatch(sink.as_ref(), session_id, &events).await;
            }
            _ = tokio::time::sleep_until(time_up) => {
                tracing::info!(session_id, "Exam time is up, auto-submitting");
                sink.on_time_up(session_id).await;
                break;
            }
        }
    }

    lock_monitor(&monitor).stop();
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Forwards events to the sink. Returns true once the session has terminated.
async fn dispatch(sink: &dyn MonitorSink, session_id: i64, events: &[MonitorEvent]) -> bool {
    let mut terminated = false;
    for event in events {
        match event {
            MonitorEvent::Violation(violation) => sink.on_violation(violation).await,
            MonitorEvent::Disqualified => {
                sink.on_terminated(session_id, TerminationReason::Disqualified).await;
                terminated = true;
            }
            MonitorEvent::Abandoned => {
                sink.on_terminated(session_id, TerminationReason::Abandoned).await;
                terminated = true;
            }
            MonitorEvent::GraceStarted { .. }
            | MonitorEvent::Recovered
            | MonitorEvent::InputBlocked { .. }
            | MonitorEvent::LockUnavailable { .. } => {}
        }
    }
    terminated
}
