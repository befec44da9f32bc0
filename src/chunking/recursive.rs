//! Size-bounded recursive windowing

use super::ChunkingError;
use std::collections::VecDeque;

/// Boundaries tried in order: paragraph, line, word, character
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits text into windows of at most `chunk_size` characters.
///
/// The coarsest boundary present in the text is tried first. Pieces that are
/// still too long are split again on the next finer boundary. Adjacent small
/// pieces are packed back together, and each new window starts with up to
/// `chunk_overlap` characters carried over from the end of the previous one.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into trimmed, non-empty windows in source order
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep));

        let (separator, remaining): (&str, &[&str]) = match position {
            Some(i) => (separators[i], &separators[i + 1..]),
            None => ("", &[]),
        };

        let pieces: Vec<&str> = if separator.is_empty() {
            text.split_inclusive(|_: char| true).collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut windows = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                windows.extend(self.merge(&fitting, separator));
                fitting.clear();
            }

            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    windows.push(trimmed.to_string());
                }
            } else {
                windows.extend(self.split_recursive(piece, remaining));
            }
        }

        if !fitting.is_empty() {
            windows.extend(self.merge(&fitting, separator));
        }

        windows
    }

    /// Pack pieces into windows, carrying a tail of at most `chunk_overlap`
    /// characters into the next window
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };

            if !current.is_empty() && total + len + joiner > self.chunk_size {
                if let Some(window) = join(&current, separator) {
                    windows.push(window);
                }

                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if current.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    let removed = char_len(first) + if current.is_empty() { 0 } else { sep_len };
                    total = total.saturating_sub(removed);
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        if let Some(window) = join(&current, separator) {
            windows.push(window);
        }

        windows
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join(pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
