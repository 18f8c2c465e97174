//! # Enrollment Server
//!
//! Configuration loading and production wiring for the enrollment engine:
//! `PostgreSQL` storage, Stripe payments, SMTP (or console) notifications,
//! the background scheduler and the HTTP API.

/// Application wiring and lifecycle
pub mod app;

/// Environment-driven configuration
pub mod config;

pub use app::Application;
pub use config::{Config, ConfigError};
