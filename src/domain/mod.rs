//! Domain layer - Pure business logic.

pub mod jobs;
pub mod plan;
pub mod probe;
pub mod profile;
pub mod segments;
