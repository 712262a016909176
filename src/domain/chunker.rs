//! Groups a stream of words into text chunks for synthesis.
//!
//! A chunk is flushed when a word ends a sentence, when the very first chunk
//! reaches the (small) first-chunk threshold, or when any chunk reaches the
//! general word ceiling. The smaller first chunk gets audio playing sooner.

const SENTENCE_TERMINALS: &[char] = &['.', '!', '?', '。', '！', '？', '…'];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkingPolicy {
    pub first_chunk_words: usize,
    pub chunk_words: usize,
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self {
            first_chunk_words: 10,
            chunk_words: 40,
        }
    }
}

impl ChunkingPolicy {
    pub fn new(first_chunk_words: usize, chunk_words: usize) -> Self {
        Self {
            first_chunk_words: first_chunk_words.max(1),
            chunk_words: chunk_words.max(1),
        }
    }

    fn limit(&self, first: bool) -> usize {
        if first {
            self.first_chunk_words.min(self.chunk_words)
        } else {
            self.chunk_words
        }
    }
}

/// Why a chunk was flushed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushReason {
    Punctuation,
    FirstChunk,
    WordLimit,
    EndOfStream,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChunk {
    /// 1-based position of the chunk in the session
    pub seq: usize,
    pub text: String,
    pub words: usize,
    pub reason: FlushReason,
}

impl TextChunk {
    pub fn is_final(&self) -> bool {
        self.reason == FlushReason::EndOfStream
    }
}

#[derive(Debug)]
pub struct Chunker {
    policy: ChunkingPolicy,
    buf: Vec<String>,
    flushed: usize,
}

impl Chunker {
    pub fn new(policy: ChunkingPolicy) -> Self {
        Self {
            policy,
            buf: Vec::new(),
            flushed: 0,
        }
    }

    /// Number of chunks emitted so far.
    pub fn flushed(&self) -> usize {
        self.flushed
    }

    pub fn buffered_words(&self) -> usize {
        self.buf.len()
    }

    /// Add one word; returns a chunk when a flush triggers.
    pub fn push(&mut self, token: &str) -> Option<TextChunk> {
        let word = token.trim();
        if word.is_empty() {
            return None;
        }
        self.buf.push(word.to_string());

        let first = self.flushed == 0;
        let reason = if word.ends_with(SENTENCE_TERMINALS) {
            FlushReason::Punctuation
        } else if self.buf.len() >= self.policy.limit(first) {
            if first && self.policy.first_chunk_words < self.policy.chunk_words {
                FlushReason::FirstChunk
            } else {
                FlushReason::WordLimit
            }
        } else {
            return None;
        };
        Some(self.take(reason))
    }

    /// Flush whatever is left once the word stream has ended.
    pub fn finish(&mut self) -> Option<TextChunk> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.take(FlushReason::EndOfStream))
        }
    }

    fn take(&mut self, reason: FlushReason) -> TextChunk {
        self.flushed += 1;
        let words = self.buf.len();
        let text = self.buf.join(" ");
        self.buf.clear();
        TextChunk {
            seq: self.flushed,
            text,
            words,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(policy: ChunkingPolicy, tokens: &[&str]) -> Vec<TextChunk> {
        let mut chunker = Chunker::new(policy);
        let mut out: Vec<TextChunk> = tokens.iter().filter_map(|t| chunker.push(t)).collect();
        out.extend(chunker.finish());
        out
    }

    fn words(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{}", i)).collect()
    }

    #[test]
    fn test_hello_world_is_one_chunk() {
        let chunks = run(ChunkingPolicy::new(10, 2), &["Hello", "world."]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world.");
        assert_eq!(chunks[0].reason, FlushReason::Punctuation);
    }

    #[test]
    fn test_fifteen_words_without_punctuation() {
        let tokens = words(15);
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let chunks = run(ChunkingPolicy::new(10, 10), &refs);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].words, 10);
        assert_eq!(chunks[1].words, 5);
        assert!(chunks[1].is_final());
    }

    #[test]
    fn test_first_chunk_uses_small_threshold() {
        let tokens = words(60);
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let chunks = run(ChunkingPolicy::new(10, 40), &refs);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.words).collect();
        assert_eq!(sizes, vec![10, 40, 10]);
        assert_eq!(chunks[0].reason, FlushReason::FirstChunk);
        assert_eq!(chunks[1].reason, FlushReason::WordLimit);
    }

    #[test]
    fn test_first_chunk_never_exceeds_general_limit() {
        let tokens = words(7);
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let chunks = run(ChunkingPolicy::new(10, 3), &refs);
        assert_eq!(chunks[0].words, 3);
    }

    #[test]
    fn test_every_token_is_flushed() {
        let inputs: [&[&str]; 4] = [
            &["One", "two", "three"],
            &["Stop.", "Go", "on!", "And", "then"],
            &["Why?"],
            &[],
        ];
        for tokens in inputs {
            let chunks = run(ChunkingPolicy::new(2, 4), tokens);
            let rebuilt: Vec<&str> = chunks.iter().flat_map(|c| c.text.split(' ')).collect();
            assert_eq!(rebuilt, tokens.to_vec());
        }
    }

    #[test]
    fn test_whitespace_tokens_are_ignored() {
        let chunks = run(ChunkingPolicy::default(), &[" ", "Hi", "\n", " there! "]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hi there!");
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let chunks = run(ChunkingPolicy::default(), &["A.", "B!", "C?", "D"]);
        let seqs: Vec<usize> = chunks.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }
}
