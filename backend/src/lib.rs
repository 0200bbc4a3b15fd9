//! # Lesion Triage Backend
//!
//! Risk assessment, case lifecycle and review queues for skin-lesion triage.
//!
//! The server binary wires these modules together in `main.rs`; integration
//! tests use them directly.

pub mod cases;
pub mod classifier;
pub mod config;
pub mod db;
pub mod notify;
pub mod queue;
pub mod risk;
pub mod routes;
