// src/handlers/mod.rs

pub mod eligibility;
pub mod exam;
