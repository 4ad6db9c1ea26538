//! Vigil is a fleet uptime monitor: it schedules recurring checks against
//! HTTP, HTTPS and TLS-certificate endpoints, tracks service status with
//! debounced transitions, records status events, pushes live updates to
//! subscribers and dispatches email/SMS notifications on real changes.

pub mod broadcast;
pub mod checks;
pub mod config;
pub mod engine;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod status;
pub mod store;
