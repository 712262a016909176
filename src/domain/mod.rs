//! Domain layer - Pure business logic.

pub mod av;
pub mod chunk_log;
pub mod chunker;
pub mod hls;
pub mod session;
