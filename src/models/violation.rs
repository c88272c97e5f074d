// src/models/violation.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Environment violations that cost a heart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    FullscreenExit,
    TabSwitch,
    WindowBlur,
    Copy,
    Paste,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::FullscreenExit => "fullscreen_exit",
            ViolationType::TabSwitch => "tab_switch",
            ViolationType::WindowBlur => "window_blur",
            ViolationType::Copy => "copy",
            ViolationType::Paste => "paste",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fullscreen_exit" => Some(ViolationType::FullscreenExit),
            "tab_switch" => Some(ViolationType::TabSwitch),
            "window_blur" => Some(ViolationType::WindowBlur),
            "copy" => Some(ViolationType::Copy),
            "paste" => Some(ViolationType::Paste),
            _ => None,
        }
    }
}

/// Represents the append-only 'exam_violations' ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub session_id: i64,
    pub violation_type: ViolationType,
    pub occurred_at: DateTime<Utc>,
    pub hearts_before: i32,
    pub hearts_after: i32,
}
