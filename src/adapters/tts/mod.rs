//! Speech synthesizers.

pub mod google;

pub use google::GoogleTts;
