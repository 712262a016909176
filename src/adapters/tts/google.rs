//! Google Translate speech endpoint. Returns MP3.

use crate::error::{Result, StreamError};
use crate::ports::speech::SpeechSynthesizer;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://translate.google.com/translate_tts";

/// The endpoint rejects longer requests.
pub const MAX_REQUEST_CHARS: usize = 100;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

pub struct GoogleTts {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTts {
    pub fn new(endpoint: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        })
    }

    async fn fetch(&self, part: &str, lang: &str, idx: usize, total: usize) -> Result<Bytes> {
        let total_str = total.to_string();
        let idx_str = idx.to_string();
        let textlen = part.chars().count().to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("q", part),
                ("tl", lang),
                ("client", "tw-ob"),
                ("total", total_str.as_str()),
                ("idx", idx_str.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StreamError::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Synthesis(format!(
                "speech request {}/{} failed with {}",
                idx + 1,
                total,
                status
            )));
        }
        response
            .bytes()
            .await
            .map_err(|e| StreamError::Synthesis(e.to_string()))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str, lang: &str) -> Result<Bytes> {
        let parts = split_text(text, MAX_REQUEST_CHARS);
        if parts.is_empty() {
            return Err(StreamError::Synthesis("nothing to synthesize".into()));
        }

        let mut audio = BytesMut::new();
        for (idx, part) in parts.iter().enumerate() {
            let bytes = self.fetch(part, lang, idx, parts.len()).await?;
            audio.extend_from_slice(&bytes);
        }
        tracing::debug!(parts = parts.len(), bytes = audio.len(), "Synthesized chunk");
        Ok(audio.freeze())
    }
}

/// Pack words into pieces of at most `max_chars` characters. A single word
/// longer than that is cut.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                parts.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;

    #[test]
    fn test_short_text_is_one_request() {
        assert_eq!(split_text("Hello world.", 100), vec!["Hello world."]);
        assert!(split_text("   ", 100).is_empty());
    }

    #[test]
    fn test_split_respects_limit_at_word_boundaries() {
        let text = "word ".repeat(50);
        let parts = split_text(&text, 100);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.chars().count() <= 100));
        assert_eq!(parts.join(" "), text.trim());
    }

    #[test]
    fn test_overlong_word_is_cut() {
        let parts = split_text(&format!("a {} b", "x".repeat(12)), 5);
        assert_eq!(parts, vec!["a", "xxxxx", "xxxxx", "xx", "b"]);
    }

    #[tokio::test]
    async fn test_synthesize_concatenates_parts() {
        let router = Router::new().route(
            "/translate_tts",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("client").map(String::as_str), Some("tw-ob"));
                assert_eq!(params.get("tl").map(String::as_str), Some("en"));
                format!("[{}]", params.get("idx").cloned().unwrap_or_default())
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let tts = GoogleTts::new(Some(format!("http://{}/translate_tts", addr))).unwrap();
        let text = "word ".repeat(50);
        let audio = tts.synthesize(&text, "en").await.unwrap();
        assert_eq!(&audio[..], b"[0][1][2]");
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let tts = GoogleTts::new(Some("http://127.0.0.1:9/unused".into())).unwrap();
        let err = tts.synthesize("  ", "en").await.unwrap_err();
        assert!(matches!(err, StreamError::Synthesis(_)));
    }
}
