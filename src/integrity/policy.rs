// src/integrity/policy.rs

//! Classification of everything the monitor intercepts.
//!
//! Violations cost a heart. Blocked actions are suppressed at the input
//! level and cost nothing. Fullscreen exits are the only fullscreen-class
//! violation and are the only ones that open a grace window.

use serde::{Deserialize, Serialize};

use crate::models::violation::ViolationType;

/// Inputs that are suppressed outright and never logged as violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedAction {
    ContextMenu,
    /// Ctrl/Cmd + C, V or X, and the cut event.
    Clipboard,
    /// Ctrl/Cmd + R and F5.
    Refresh,
    BackNavigation,
    Unload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptKind {
    Violation(ViolationType),
    Blocked(BlockedAction),
}

impl From<ViolationType> for InterceptKind {
    fn from(kind: ViolationType) -> Self {
        InterceptKind::Violation(kind)
    }
}

impl From<BlockedAction> for InterceptKind {
    fn from(action: BlockedAction) -> Self {
        InterceptKind::Blocked(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub costs_life: bool,
    pub is_fullscreen_class: bool,
}

pub fn classify(kind: impl Into<InterceptKind>) -> Classification {
    match kind.into() {
        InterceptKind::Violation(ViolationType::FullscreenExit) => Classification {
            costs_life: true,
            is_fullscreen_class: true,
        },
        InterceptKind::Violation(
            ViolationType::TabSwitch
            | ViolationType::WindowBlur
            | ViolationType::Copy
            | ViolationType::Paste,
        ) => Classification {
            costs_life: true,
            is_fullscreen_class: false,
        },
        InterceptKind::Blocked(_) => Classification {
            costs_life: false,
            is_fullscreen_class: false,
        },
    }
}

/// Maps a key-down to the action it would trigger, if that action is blocked.
pub fn shortcut_action(key: &str, ctrl: bool, meta: bool) -> Option<BlockedAction> {
    if key == "F5" {
        return Some(BlockedAction::Refresh);
    }
    if !(ctrl || meta) {
        return None;
    }
    match key.to_ascii_lowercase().as_str() {
        "c" | "v" | "x" => Some(BlockedAction::Clipboard),
        "r" => Some(BlockedAction::Refresh),
        _ => None,
    }
}
