//! services/api/src/lib.rs
//!
//! The HTTP service around `study_companion_core`: adapters, configuration and routes.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
