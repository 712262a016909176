//! Token source over text that already exists.

use crate::error::{Result, StreamError};
use crate::ports::tokens::{TokenSource, TokenStream};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

/// Streams whitespace-delimited words, either of a fixed text or of the
/// prompt itself.
#[derive(Debug, Clone, Default)]
pub struct StaticText {
    text: Option<String>,
    fail_after: Option<usize>,
}

impl StaticText {
    /// Read the prompt back as the generated text.
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            fail_after: None,
        }
    }

    /// End the stream with an error after `words` words.
    pub fn fail_after(mut self, words: usize) -> Self {
        self.fail_after = Some(words);
        self
    }
}

#[async_trait]
impl TokenSource for StaticText {
    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let text = self.text.as_deref().unwrap_or(prompt);
        let mut words: Vec<Result<String>> = text.split_whitespace().map(|w| Ok(w.to_string())).collect();
        if let Some(limit) = self.fail_after {
            words.truncate(limit);
            words.push(Err(StreamError::TokenSource(format!(
                "text source stopped after {limit} words"
            ))));
        }
        Ok(stream::iter(words).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(source: &StaticText, prompt: &str) -> Vec<Result<String>> {
        source.stream(prompt).await.unwrap().collect().await
    }

    #[tokio::test]
    async fn test_echo_splits_prompt() {
        let words = collect(&StaticText::echo(), "  Once upon\na time. ").await;
        let words: Vec<String> = words.into_iter().map(|w| w.unwrap()).collect();
        assert_eq!(words, vec!["Once", "upon", "a", "time."]);
    }

    #[tokio::test]
    async fn test_fixed_text_ignores_prompt() {
        let words = collect(&StaticText::fixed("one two"), "ignored").await;
        assert_eq!(words.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let words = collect(&StaticText::fixed("a b c d").fail_after(2), "").await;
        assert_eq!(words.len(), 3);
        assert!(words[1].is_ok());
        assert!(matches!(words[2], Err(StreamError::TokenSource(_))));
    }
}
