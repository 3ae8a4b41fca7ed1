//! Recursive character text splitter.
//!
//! Splits text by trying progressively smaller separators until pieces fit
//! within the chunk size, then merges neighbouring pieces back together with
//! a configurable overlap.

use ragchat_core::{ChunkConfig, ChunkData, Chunker, ContentType, RagError, Result};
use tracing::warn;

/// Separators tried in order: paragraphs, lines, words, characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Recursive chunker that splits text by multiple separators.
///
/// Separators are kept at the start of the piece that follows them, so
/// joining a run of pieces reproduces the original text.
pub struct RecursiveChunker {
    /// Separators in priority order. An empty separator splits characters.
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new recursive chunker with the default separators.
    pub fn new() -> Self {
        Self {
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Length in Unicode scalar values.
    fn length(&self, text: &str) -> usize {
        text.chars().count()
    }

    /// Split text, keeping each separator at the start of the next piece.
    fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
        if separator.is_empty() {
            return text
                .char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect();
        }

        let mut pieces = Vec::new();
        let mut last = 0;
        for (idx, _) in text.match_indices(separator) {
            if idx > last {
                pieces.push(&text[last..idx]);
            }
            last = idx;
        }
        pieces.push(&text[last..]);

        pieces.into_iter().filter(|s| !s.is_empty()).collect()
    }

    /// Recursively split text into pieces no longer than the chunk size.
    fn split_recursive(&self, text: &str, separators: &[String], config: &ChunkConfig) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // The first separator present in the text wins; "" always matches.
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (idx, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[idx + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();
        for piece in Self::split_keep_separator(text, separator) {
            if self.length(piece) < config.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits, "", config));
                good_splits.clear();
            }

            if remaining.is_empty() {
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining, config));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits, "", config));
        }

        final_chunks
    }

    /// Merge small pieces into chunks, carrying `chunk_overlap` of trailing
    /// context into the next chunk.
    fn merge_splits(&self, splits: &[&str], separator: &str, config: &ChunkConfig) -> Vec<String> {
        let separator_len = self.length(separator);
        let mut docs = Vec::new();
        let mut current: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = self.length(piece);
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if total + len + joiner > config.chunk_size {
                if total > config.chunk_size {
                    warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, config.chunk_size
                    );
                }

                if !current.is_empty() {
                    if let Some(doc) = Self::join_docs(&current, separator) {
                        docs.push(doc);
                    }

                    // Drop from the front until only the overlap remains and
                    // the next piece fits.
                    while total > config.chunk_overlap
                        || (total > 0
                            && total
                                + len
                                + if current.is_empty() { 0 } else { separator_len }
                                > config.chunk_size)
                    {
                        let Some(front) = current.pop_front() else {
                            break;
                        };
                        let front_len =
                            self.length(front) + if current.is_empty() { 0 } else { separator_len };
                        total = total.saturating_sub(front_len);
                    }
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { separator_len } else { 0 };
        }

        if let Some(doc) = Self::join_docs(&current, separator) {
            docs.push(doc);
        }

        docs
    }

    fn join_docs(pieces: &std::collections::VecDeque<&str>, separator: &str) -> Option<String> {
        let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Locate each chunk in the source text to record its character offset.
    fn locate(&self, text: &str, chunks: Vec<String>, config: &ChunkConfig) -> Vec<ChunkData> {
        let mut cursor = CharCursor::new(text);
        let mut index = 0usize;
        let mut previous_len = 0usize;

        chunks
            .into_iter()
            .map(|content| {
                let char_count = content.chars().count();
                let search_from = (index + previous_len).saturating_sub(config.chunk_overlap);
                let from_byte = cursor.char_to_byte(search_from);

                index = match text[from_byte..].find(content.as_str()) {
                    Some(found) => cursor.byte_to_char(from_byte + found),
                    None => match text.find(content.as_str()) {
                        Some(found) => cursor.byte_to_char(found),
                        None => index,
                    },
                };
                previous_len = char_count;

                ChunkData {
                    content,
                    char_count,
                    start_char: index,
                }
            })
            .collect()
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(
        &self,
        content: &str,
        _content_type: ContentType,
        config: &ChunkConfig,
    ) -> Result<Vec<ChunkData>> {
        if config.chunk_size == 0 {
            return Err(RagError::chunking("chunk_size must be greater than zero"));
        }
        if config.chunk_overlap > config.chunk_size {
            return Err(RagError::chunking(format!(
                "Got a larger chunk overlap ({}) than chunk size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let pieces = self.split_recursive(content, &self.separators, config);
        Ok(self.locate(content, pieces, config))
    }
}

/// Converts between byte and character offsets while scanning forward.
struct CharCursor<'a> {
    text: &'a str,
    byte: usize,
    chr: usize,
}

impl<'a> CharCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            chr: 0,
        }
    }

    fn char_to_byte(&mut self, target: usize) -> usize {
        if target < self.chr {
            self.byte = 0;
            self.chr = 0;
        }
        for c in self.text[self.byte..].chars() {
            if self.chr == target {
                break;
            }
            self.byte += c.len_utf8();
            self.chr += 1;
        }
        self.byte
    }

    fn byte_to_char(&mut self, target: usize) -> usize {
        if target < self.byte {
            self.byte = 0;
            self.chr = 0;
        }
        for c in self.text[self.byte..].chars() {
            if self.byte >= target {
                break;
            }
            self.byte += c.len_utf8();
            self.chr += 1;
        }
        self.chr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    fn contents(chunks: &[ChunkData]) -> Vec<&str> {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    #[test]
    fn test_simple_chunk() {
        let chunker = RecursiveChunker::new();
        let text = "Hello world. This is a test.";
        let chunks = chunker.chunk(text, ContentType::PlainText, &config(100, 20)).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].char_count, text.len());
    }

    #[test]
    fn test_paragraph_split() {
        let chunker = RecursiveChunker::new();
        let text = "aaaa\n\nbbbb\n\ncccc";
        let chunks = chunker.chunk(text, ContentType::PlainText, &config(10, 0)).unwrap();

        assert_eq!(contents(&chunks), vec!["aaaa\n\nbbbb", "cccc"]);
        assert_eq!(chunks[1].start_char, 12);
    }

    #[test]
    fn test_word_overlap() {
        let chunker = RecursiveChunker::new();
        let text = "one two three four five six";
        let chunks = chunker.chunk(text, ContentType::PlainText, &config(10, 5)).unwrap();

        assert_eq!(
            contents(&chunks),
            vec!["one two", "two three", "four five", "five six"]
        );
        let starts: Vec<usize> = chunks.iter().map(|c| c.start_char).collect();
        assert_eq!(starts, vec![0, 4, 14, 19]);
    }

    #[test]
    fn test_character_fallback() {
        let chunker = RecursiveChunker::new();
        let chunks = chunker
            .chunk("abcdefghijklmnop", ContentType::PlainText, &config(5, 0))
            .unwrap();

        assert_eq!(contents(&chunks), vec!["abcde", "fghij", "klmno", "p"]);
    }

    #[test]
    fn test_multibyte_text_respects_size() {
        let chunker = RecursiveChunker::new();
        let text = "ééééé ééééé ñññ";
        let chunks = chunker.chunk(text, ContentType::PlainText, &config(5, 0)).unwrap();

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.char_count <= 5, "chunk too long: {:?}", chunk.content);
            assert!(text.contains(chunk.content.as_str()));
        }
    }

    #[test]
    fn test_chunks_never_exceed_size_on_prose() {
        let chunker = RecursiveChunker::new();
        let paragraph = "Retrieval augmented generation combines search with a language model. ";
        let text = format!("{}\n\n{}\n{}", paragraph.repeat(20), paragraph.repeat(5), paragraph);
        let chunks = chunker.chunk(&text, ContentType::Markdown, &config(200, 40)).unwrap();

        assert!(chunks.len() > 5);
        for chunk in &chunks {
            assert!(chunk.char_count <= 200);
        }
    }

    #[test]
    fn test_whitespace_only_is_dropped() {
        let chunker = RecursiveChunker::new();
        let chunks = chunker
            .chunk("   \n\n   \n", ContentType::PlainText, &config(10, 0))
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_empty_content() {
        let chunker = RecursiveChunker::new();
        let chunks = chunker
            .chunk("", ContentType::PlainText, &ChunkConfig::default())
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_overlap_larger_than_size_is_error() {
        let chunker = RecursiveChunker::new();
        let err = chunker
            .chunk("text", ContentType::PlainText, &config(10, 20))
            .unwrap_err();
        assert_eq!(err.error_code(), "CHUNKING_ERROR");
    }

    #[test]
    fn test_split_keep_separator() {
        let pieces = RecursiveChunker::split_keep_separator("a\n\n\n\nb", "\n\n");
        assert_eq!(pieces, vec!["a", "\n\n", "\n\nb"]);

        let pieces = RecursiveChunker::split_keep_separator("\n\nb", "\n\n");
        assert_eq!(pieces, vec!["\n\nb"]);
    }
}
