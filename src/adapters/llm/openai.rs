//! Streaming chat completions from any OpenAI-compatible endpoint.

use super::words::WordAssembler;
use crate::config::LlmConfig;
use crate::error::{Result, StreamError};
use crate::ports::tokens::{TokenSource, TokenStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// One server-sent event payload, decoded.
#[derive(Debug, PartialEq)]
enum Delta {
    Text(String),
    Empty,
    Done,
}

fn parse_event(payload: &str) -> Result<Delta> {
    if payload == "[DONE]" {
        return Ok(Delta::Done);
    }
    let chunk: ChatChunk = serde_json::from_str(payload)?;
    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|t| !t.is_empty());
    Ok(text.map_or(Delta::Empty, Delta::Text))
}

/// Splits a byte stream into `data:` payloads.
#[derive(Default)]
struct SseLines {
    buf: Vec<u8>,
}

impl SseLines {
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buf);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim().strip_prefix("data:")?.trim();
    (!payload.is_empty()).then(|| payload.to_string())
}

struct WordStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    sse: SseLines,
    words: WordAssembler,
    pending: VecDeque<Result<String>>,
    done: bool,
}

impl WordStream {
    fn handle(&mut self, payload: &str) {
        if self.done {
            return;
        }
        match parse_event(payload) {
            Ok(Delta::Text(text)) => self.pending.extend(self.words.push(&text).into_iter().map(Ok)),
            Ok(Delta::Empty) => {}
            Ok(Delta::Done) => self.close(),
            Err(e) => {
                tracing::warn!("Skipping undecodable completion chunk: {}", e);
            }
        }
    }

    fn close(&mut self) {
        if let Some(rest) = self.words.finish() {
            self.pending.push_back(Ok(rest));
        }
        self.done = true;
    }

    async fn next_word(mut self) -> Option<(Result<String>, Self)> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some((item, self));
            }
            if self.done {
                return None;
            }
            match self.body.next().await {
                Some(Ok(bytes)) => {
                    for payload in self.sse.feed(&bytes) {
                        self.handle(&payload);
                    }
                }
                Some(Err(e)) => {
                    self.close();
                    self.pending
                        .push_back(Err(StreamError::TokenSource(e.to_string())));
                }
                None => {
                    if let Some(payload) = self.sse.finish() {
                        self.handle(&payload);
                    }
                    self.close();
                }
            }
        }
    }
}

pub struct OpenAiTokenSource {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiTokenSource {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TokenSource for OpenAiTokenSource {
    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
            max_tokens: self.config.max_tokens,
        };

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(model = %self.config.model, "Requesting completion stream");
        let response = request
            .send()
            .await
            .map_err(|e| StreamError::TokenSource(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StreamError::TokenSource(format!(
                "completion request failed with {}: {}",
                status,
                detail.trim()
            )));
        }

        let words = WordStream {
            body: response.bytes_stream().boxed(),
            sse: SseLines::default(),
            words: WordAssembler::new(),
            pending: VecDeque::new(),
            done: false,
        };
        Ok(stream::unfold(words, WordStream::next_word).boxed())
    }
}
