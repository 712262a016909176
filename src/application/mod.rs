//! Application layer - Generic services that use ports.

pub mod bootstrap;
pub mod pipeline;
pub mod retention;
pub mod session;

pub use pipeline::AudioPipeline;
pub use session::{SessionHandle, SessionService, StartRequest};
