//! Insurance batch and rate engine.
//!
//! Dependency order, leaves first:
//!   trigger -> scheduler
//!   store -> rate_resolver -> premium
//!   lifecycle_batch, premium_batch, report_batch -> service

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod lifecycle_batch;
pub mod premium;
pub mod premium_batch;
pub mod rate_resolver;
pub mod report_batch;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod trigger;
pub mod types;
