//! Language model token sources.

pub mod openai;
pub mod words;

pub use openai::OpenAiTokenSource;
pub use words::WordAssembler;
