//! Adapters - Concrete implementations of ports.

pub mod llm;
pub mod local;
pub mod tts;
