use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazily produced words. An `Err` item ends the stream.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// A language model, or anything else that produces text incrementally.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;
}
