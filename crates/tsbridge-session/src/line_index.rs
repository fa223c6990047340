//! Byte ↔ UTF-16 coordinate index for one document
//!
//! LSP positions count UTF-16 code units; Rust strings are UTF-8 bytes.
//! The index stores per-line byte and UTF-16 starts so both directions,
//! plus the flat UTF-16 offsets the inlay hint and semantic token commands
//! use, stay O(log n + line width).

use tower_lsp::lsp_types::Position;

/// Line table for a document snapshot. Rebuilt on every applied edit;
/// invalidated whenever the text it was built from changes.
#[derive(Debug, Clone, PartialEq)]
pub struct LineIndex {
    /// Byte offset of each line start; index 0 is always 0.
    line_starts: Vec<usize>,
    /// UTF-16 offset of each line start.
    utf16_starts: Vec<u32>,
    text_len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        let mut utf16_starts = vec![0u32];
        let mut utf16 = 0u32;
        for (offset, ch) in text.char_indices() {
            utf16 += ch.len_utf16() as u32;
            if ch == '\n' {
                line_starts.push(offset + 1);
                utf16_starts.push(utf16);
            }
        }
        Self {
            line_starts,
            utf16_starts,
            text_len: text.len(),
        }
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// Byte offset for an LSP position, clamped to the document.
    pub fn offset_of(&self, text: &str, position: Position) -> usize {
        let line = (position.line as usize).min(self.line_starts.len() - 1);
        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.text_len);
        let line_text = &text[line_start..line_end];

        let mut utf16_remaining = position.character;
        for (offset, ch) in line_text.char_indices() {
            if ch == '\n' || ch == '\r' {
                return line_start + offset;
            }
            let width = ch.len_utf16() as u32;
            if utf16_remaining < width {
                return line_start + offset;
            }
            utf16_remaining -= width;
        }
        line_end
    }

    /// LSP position for a byte offset, clamped to the document.
    pub fn position_of(&self, text: &str, offset: usize) -> Position {
        let offset = offset.min(self.text_len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(insertion) => insertion - 1,
        };
        let line_start = self.line_starts[line];
        let character: u32 = text[line_start..offset]
            .chars()
            .map(|ch| ch.len_utf16() as u32)
            .sum();
        Position::new(line as u32, character)
    }

    /// Flat UTF-16 offset (what tsserver calls a file position).
    pub fn utf16_offset_of(&self, text: &str, position: Position) -> u32 {
        let line = (position.line as usize).min(self.utf16_starts.len() - 1);
        let line_start_utf16 = self.utf16_starts[line];
        // Clamp character to the line's actual UTF-16 width.
        let byte = self.offset_of(text, position);
        let line_start_byte = self.line_starts[line];
        let width: u32 = text[line_start_byte..byte]
            .chars()
            .map(|ch| ch.len_utf16() as u32)
            .sum();
        line_start_utf16 + width
    }

    /// Position for a flat UTF-16 offset, clamped to the document.
    pub fn position_of_utf16(&self, text: &str, offset: u32) -> Position {
        let line = match self.utf16_starts.binary_search(&offset) {
            Ok(line) => return Position::new(line as u32, 0),
            Err(insertion) => insertion - 1,
        };
        let line_start_byte = self.line_starts[line];
        let line_end_byte = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.text_len);
        let mut remaining = offset - self.utf16_starts[line];
        let mut character = 0u32;
        for ch in text[line_start_byte..line_end_byte].chars() {
            let width = ch.len_utf16() as u32;
            if remaining < width {
                break;
            }
            remaining -= width;
            character += width;
        }
        Position::new(line as u32, character)
    }

    pub fn utf16_len(&self, text: &str) -> u32 {
        let last_start = *self.line_starts.last().unwrap_or(&0);
        self.utf16_starts.last().copied().unwrap_or(0)
            + text[last_start..]
                .chars()
                .map(|ch| ch.len_utf16() as u32)
                .sum::<u32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_round_trip() {
        let text = "const x = 1;\nconst y = 2;\n";
        let index = LineIndex::new(text);
        assert_eq!(index.line_count(), 3);

        let position = Position::new(1, 6);
        let offset = index.offset_of(text, position);
        assert_eq!(&text[offset..offset + 1], "y");
        assert_eq!(index.position_of(text, offset), position);
    }

    #[test]
    fn test_utf16_surrogate_pairs() {
        // '𐐀' is one char, two UTF-16 units, four UTF-8 bytes.
        let text = "let a = \"𐐀x\";\n";
        let index = LineIndex::new(text);

        // Character after the astral char: 9 (prefix) + 2 (surrogate pair).
        let position = Position::new(0, 11);
        let offset = index.offset_of(text, position);
        assert_eq!(&text[offset..offset + 1], "x");
        assert_eq!(index.position_of(text, offset), position);
    }

    #[test]
    fn test_offset_clamps_past_line_end() {
        let text = "ab\ncd";
        let index = LineIndex::new(text);
        assert_eq!(index.offset_of(text, Position::new(0, 99)), 2);
        assert_eq!(index.offset_of(text, Position::new(9, 0)), 5);
    }

    #[test]
    fn test_flat_utf16_offsets() {
        let text = "ab\ncd\n";
        let index = LineIndex::new(text);
        assert_eq!(index.utf16_offset_of(text, Position::new(0, 0)), 0);
        assert_eq!(index.utf16_offset_of(text, Position::new(1, 1)), 4);
        assert_eq!(index.utf16_len(text), 6);
        assert_eq!(index.position_of_utf16(text, 4), Position::new(1, 1));
        assert_eq!(index.position_of_utf16(text, 3), Position::new(1, 0));
    }

    #[test]
    fn test_empty_document() {
        let text = "";
        let index = LineIndex::new(text);
        assert_eq!(index.line_count(), 1);
        assert_eq!(index.offset_of(text, Position::new(0, 0)), 0);
        assert_eq!(index.position_of(text, 0), Position::new(0, 0));
    }
}
