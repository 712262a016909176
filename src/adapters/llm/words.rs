//! Regroups model deltas into whitespace-delimited words.

/// Buffers sub-word fragments until a word boundary shows up.
#[derive(Debug, Default)]
pub struct WordAssembler {
    partial: String,
}

impl WordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment and return every word it completed.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.partial.push_str(fragment);

        let mut words = Vec::new();
        while let Some(idx) = self.partial.find(char::is_whitespace) {
            let ch_len = self.partial[idx..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
            let word = self.partial[..idx].to_string();
            if !word.is_empty() {
                words.push(word);
            }
            self.partial.drain(..idx + ch_len);
        }
        words
    }

    /// Whatever is left once the model stops.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_become_words() {
        let mut words = WordAssembler::new();
        assert!(words.push("Hel").is_empty());
        assert_eq!(words.push("lo wor"), vec!["Hello"]);
        assert_eq!(words.push("ld. "), vec!["world."]);
        assert_eq!(words.push("The"), Vec::<String>::new());
        assert_eq!(words.finish().as_deref(), Some("The"));
        assert_eq!(words.finish(), None);
    }

    #[test]
    fn test_multiple_spaces_and_newlines() {
        let mut words = WordAssembler::new();
        assert_eq!(words.push("  one\n\ntwo\tthree "), vec!["one", "two", "three"]);
        assert_eq!(words.finish(), None);
    }

    #[test]
    fn test_non_ascii_boundaries() {
        let mut words = WordAssembler::new();
        assert_eq!(words.push("¡Hola!\u{3000}señor"), vec!["¡Hola!"]);
        assert_eq!(words.finish().as_deref(), Some("señor"));
    }
}
