//! Local adapters for single-host deployment.

pub mod forwarder;
pub mod http;
pub mod memory;
pub mod segment_store;
pub mod text;

pub use memory::MemoryRepository;
pub use segment_store::SegmentStore;
pub use text::StaticText;
