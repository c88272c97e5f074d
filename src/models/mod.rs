// src/models/mod.rs

pub mod answer;
pub mod eligibility;
pub mod result;
pub mod session;
pub mod violation;
