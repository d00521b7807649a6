//! Recursive text chunking.
//!
//! Splits on the coarsest separator first (paragraph, then line, sentence,
//! word) and only falls back to finer separators for pieces that are still
//! too large. Adjacent chunks share up to `chunk_overlap` characters of
//! trailing context.

/// Chunk size for prose documents.
pub const DEFAULT_CHUNK_SIZE: usize = 600;
/// Default overlap between chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 120;

/// Documents shorter than this are stored as a single chunk.
pub const MIN_CHUNKED_LENGTH: usize = 1000;

/// A flat text chunk with position metadata.
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// Recursive chunker that respects document structure.
pub struct RecursiveChunker {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    separators: Vec<&'static str>,
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl RecursiveChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size / 2),
            separators: vec!["\n\n", "\n", ". ", " "],
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let raw_chunks: Vec<String> = self
            .split_text(text, &self.separators)
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        let total = raw_chunks.len();

        raw_chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| TextChunk {
                text,
                chunk_index,
                total_chunks: total,
            })
            .collect()
    }

    fn split_text(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some((&separator, remaining)) = separators.split_first() else {
            return self.split_chars(text);
        };

        let mut chunks = Vec::new();
        let mut current_parts: Vec<&str> = Vec::new();
        let mut current_size = 0usize;
        let sep_len = char_len(separator);

        for split in text.split(separator) {
            let split_size = char_len(split);

            if split_size > self.chunk_size {
                if !current_parts.is_empty() {
                    chunks.push(current_parts.join(separator));
                    current_parts.clear();
                    current_size = 0;
                }
                chunks.extend(self.split_text(split, remaining));
            } else if current_size + split_size + sep_len > self.chunk_size
                && !current_parts.is_empty()
            {
                chunks.push(current_parts.join(separator));
                // Carry trailing parts forward as overlap
                while !current_parts.is_empty()
                    && (current_size > self.chunk_overlap
                        || current_size + split_size + sep_len > self.chunk_size)
                {
                    let dropped = current_parts.remove(0);
                    current_size = current_size.saturating_sub(char_len(dropped) + sep_len);
                }
                current_parts.push(split);
                current_size += split_size + sep_len;
            } else {
                current_parts.push(split);
                current_size += split_size + sep_len;
            }
        }

        if !current_parts.is_empty() {
            chunks.push(current_parts.join(separator));
        }

        chunks
    }

    /// Last resort for text without separators: fixed-width character windows.
    fn split_chars(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.chunk_size)
            .map(|window| window.iter().collect())
            .collect()
    }
}

/// Whether a document is large enough to be split.
pub fn should_chunk(text: &str) -> bool {
    char_len(text) >= MIN_CHUNKED_LENGTH
}
