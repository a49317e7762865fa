//! Sonata - Audio split & transcode service
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (jobs, segment planning, outcome aggregation)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Generic services
//! - config: Environment configuration
//!
//! # Features
//! - `redis` (default): Redis-backed queue and state store for multi-process deployment

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;

pub use config::AppConfig;
