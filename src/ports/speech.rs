use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Text to encoded audio, in the container the transcoder expects on stdin.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, lang: &str) -> Result<Bytes>;
}
