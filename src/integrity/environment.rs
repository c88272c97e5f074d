// src/integrity/environment.rs

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Integrity primitives a platform can expose.
/// A missing primitive degrades the monitor to a no-op for that signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub fullscreen: bool,
    pub visibility: bool,
    pub focus: bool,
    pub clipboard: bool,
    pub context_menu: bool,
    pub keyboard: bool,
    pub history: bool,
    pub before_unload: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            fullscreen: true,
            visibility: true,
            focus: true,
            clipboard: true,
            context_menu: true,
            keyboard: true,
            history: true,
            before_unload: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn supports(&self, signal: &EnvironmentSignal) -> bool {
        match signal {
            EnvironmentSignal::FullscreenChange { .. } => self.fullscreen,
            EnvironmentSignal::VisibilityChange { .. } => self.visibility,
            EnvironmentSignal::WindowBlur | EnvironmentSignal::WindowFocus => self.focus,
            EnvironmentSignal::Copy | EnvironmentSignal::Paste | EnvironmentSignal::Cut => {
                self.clipboard
            }
            EnvironmentSignal::ContextMenu => self.context_menu,
            EnvironmentSignal::KeyDown { .. } => self.keyboard,
            EnvironmentSignal::PopState => self.history,
            EnvironmentSignal::BeforeUnload => self.before_unload,
        }
    }
}

/// A raw event observed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvironmentSignal {
    FullscreenChange {
        active: bool,
    },
    VisibilityChange {
        hidden: bool,
    },
    WindowBlur,
    WindowFocus,
    Copy,
    Paste,
    Cut,
    ContextMenu,
    KeyDown {
        key: String,
        #[serde(default)]
        ctrl: bool,
        #[serde(default)]
        meta: bool,
    },
    PopState,
    BeforeUnload,
}

/// Instructions the platform must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    EnterFullscreen,
    ExitFullscreen,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("locked environment unavailable: {0}")]
pub struct LockError(pub String);

/// The platform side of the monitor.
///
/// `attach` binds every listener, `detach` releases them. The monitor calls
/// both exactly once per `start`/`stop` pair.
pub trait LockedEnvironment: Send {
    fn capabilities(&self) -> Capabilities;

    fn attach(&mut self);

    fn detach(&mut self);

    /// Asks the platform to (re-)enter the locked environment.
    fn request_lock(&mut self) -> Result<(), LockError>;

    fn release_lock(&mut self);
}

/// Pending directives for a remote platform, drained by the client.
#[derive(Debug, Clone, Default)]
pub struct DirectiveOutbox {
    queue: Arc<Mutex<VecDeque<Directive>>>,
}

impl DirectiveOutbox {
    pub fn drain(&self) -> Vec<Directive> {
        self.with_queue(|queue| queue.drain(..).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.with_queue(|queue| queue.is_empty())
    }

    fn push(&self, directive: Directive) {
        // Enter and exit supersede each other; only the latest intent is kept.
        self.with_queue(|queue| {
            queue.clear();
            queue.push_back(directive);
        })
    }

    fn with_queue<T>(&self, f: impl FnOnce(&mut VecDeque<Directive>) -> T) -> T {
        let mut queue = self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut queue)
    }
}

/// A browser reached over HTTP: lock requests become queued directives.
#[derive(Debug)]
pub struct RemoteEnvironment {
    capabilities: Capabilities,
    outbox: DirectiveOutbox,
    attached: bool,
}

impl RemoteEnvironment {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            outbox: DirectiveOutbox::default(),
            attached: false,
        }
    }

    pub fn outbox(&self) -> DirectiveOutbox {
        self.outbox.clone()
    }
}

impl LockedEnvironment for RemoteEnvironment {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn attach(&mut self) {
        self.attached = true;
    }

    fn detach(&mut self) {
        self.attached = false;
    }

    fn request_lock(&mut self) -> Result<(), LockError> {
        if !self.capabilities.fullscreen {
            return Err(LockError("fullscreen is not supported".to_string()));
        }
        if !self.attached {
            return Err(LockError("environment is detached".to_string()));
        }
        self.outbox.push(Directive::EnterFullscreen);
        Ok(())
    }

    fn release_lock(&mut self) {
        if self.capabilities.fullscreen {
            self.outbox.push(Directive::ExitFullscreen);
        }
    }
}
