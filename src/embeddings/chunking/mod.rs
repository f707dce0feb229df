
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for content chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Number of trailing characters repeated at the start of the next chunk
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Split document text into overlapping chunks sized for embedding.
///
/// Chunks are at most `chunk_size` characters long. The split point is chosen
/// at the latest natural boundary inside the window, preferring paragraph
/// breaks, then line breaks, then word boundaries, and falling back to a hard
/// character cut when no boundary lies in the second half of the window.
/// Consecutive chunks share `chunk_overlap` trailing characters.
///
/// The output is fully determined by the input: identical text always yields
/// identical chunks. Empty input yields no chunks, and input no longer than
/// `chunk_size` yields a single chunk equal to the whole input.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let chunk_size = config.chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();

    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let min_span = chunk_size / 2;
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        if chars.len() - start <= chunk_size {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let window_end = start + chunk_size;
        let cut = find_cut(&chars, start + min_span, window_end);
        chunks.push(chars[start..cut].iter().collect::<String>());

        let next = cut.saturating_sub(config.chunk_overlap);
        start = if next > start { next } else { cut };
    }

    debug!(
        "Split {} chars into {} chunks (chunk_size {}, overlap {})",
        chars.len(),
        chunks.len(),
        chunk_size,
        config.chunk_overlap
    );

    chunks
}

/// Find the split position in `(floor, window_end]`, scanning backwards for
/// the best boundary. The returned position keeps the separator at the end of
/// the preceding chunk.
fn find_cut(chars: &[char], floor: usize, window_end: usize) -> usize {
    // Paragraph break
    for i in ((floor + 2)..=window_end).rev() {
        if chars[i - 1] == '\n' && chars[i - 2] == '\n' {
            return i;
        }
    }

    // Line break
    for i in ((floor + 1)..=window_end).rev() {
        if chars[i - 1] == '\n' {
            return i;
        }
    }

    // Word boundary
    for i in ((floor + 1)..=window_end).rev() {
        if chars[i - 1] == ' ' {
            return i;
        }
    }

    // Hard cut
    window_end
}
