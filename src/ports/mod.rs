//! Ports - Trait definitions for everything the pipeline talks to.

pub mod media;
pub mod notifier;
pub mod queue;
pub mod repository;
pub mod storage;
