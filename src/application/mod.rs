//! Application layer - Generic services that use ports.

pub mod executor;
pub mod orchestrator;
pub mod submission;
pub mod worker;
