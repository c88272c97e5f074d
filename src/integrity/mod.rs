// src/integrity/mod.rs

//! Exam integrity: the input policy, the platform seam, the per-session
//! monitor state machine and the task that drives it.

pub mod driver;
pub mod environment;
pub mod monitor;
pub mod policy;
