//! Crooner - Text to live HLS audio
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (hls, chunker, session, av)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Generic services
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use config::StreamConfig;
pub use domain::hls;
pub use error::{Result, StreamError};
