//! Transcoder process management.

pub mod cmd;
pub mod process;
pub mod supervisor;

pub use cmd::{FfmpegHlsCommand, TranscodeCommand, TranscoderSettings};
pub use supervisor::{TranscoderSupervisor, WriteOutcome};
