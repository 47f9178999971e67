//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep routing layers decoupled from storage details.

pub mod results_service;
pub mod tally_service;
pub mod voter_service;
