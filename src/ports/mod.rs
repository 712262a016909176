//! Ports - Trait definitions for the pipeline's collaborators.

pub mod repository;
pub mod speech;
pub mod storage;
pub mod tokens;
