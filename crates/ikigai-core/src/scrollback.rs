// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// Physical layout of one logical line at a given terminal width, cached so
/// `ensure_layout` only recomputes lines whose width changed (§4.1).
#[derive(Debug, Clone)]
struct Layout {
    cols: u16,
    /// Display-column width of each `\n`-delimited segment within the line.
    segment_widths: Vec<usize>,
    /// Physical rows each segment occupies at `cols`.
    segment_rows: Vec<usize>,
    /// Byte offset in the line where each segment starts.
    segment_starts: Vec<usize>,
}

impl Layout {
    fn total_rows(&self) -> usize {
        self.segment_rows.iter().sum()
    }
}

struct Line {
    bytes: Vec<u8>,
    layout: Option<Layout>,
}

/// The agent's visible history as logical lines with a per-line layout cache
/// (§4.1). A logical line may embed `\n`; each embedded segment wraps
/// independently at the current terminal width.
#[derive(Default)]
pub struct Scrollback {
    lines: Vec<Line>,
}

impl Scrollback {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    pub fn append_line(&mut self, bytes: impl Into<Vec<u8>>) {
        self.lines.push(Line { bytes: bytes.into(), layout: None });
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Recompute layouts stale for `cols`. A line without embedded `\n` is a
    /// single segment.
    pub fn ensure_layout(&mut self, cols: u16) {
        let cols = cols.max(1);
        for line in &mut self.lines {
            if line.layout.as_ref().is_some_and(|l| l.cols == cols) {
                continue;
            }
            line.layout = Some(compute_layout(&line.bytes, cols));
        }
    }

    pub fn get_line_text(&self, i: usize) -> Option<(&[u8], usize)> {
        self.lines.get(i).map(|l| (l.bytes.as_slice(), l.bytes.len()))
    }

    pub fn line_rows(&self, i: usize) -> usize {
        self.lines.get(i).and_then(|l| l.layout.as_ref()).map(Layout::total_rows).unwrap_or(1)
    }

    /// Byte range covering `row_count` physical rows of `line` starting at
    /// `start_row_offset`, at width `cols`. Returns `(start_byte, end_byte,
    /// is_line_end)`. Caller must have called `ensure_layout(cols)` first;
    /// this recomputes on the fly otherwise. Out-of-range offsets clamp to
    /// the line's total rows.
    pub fn byte_range_for_rows(
        &self,
        line: usize,
        cols: u16,
        start_row_offset: usize,
        row_count: usize,
    ) -> (usize, usize, bool) {
        let Some(l) = self.lines.get(line) else {
            return (0, 0, true);
        };
        let layout = match &l.layout {
            Some(layout) if layout.cols == cols.max(1) => layout.clone(),
            _ => compute_layout(&l.bytes, cols),
        };
        let total = layout.total_rows().max(1);
        let start_row = start_row_offset.min(total.saturating_sub(1));
        let end_row = (start_row + row_count).min(total);
        let is_line_end = end_row >= total;

        if layout.segment_rows.is_empty() {
            return (0, l.bytes.len(), true);
        }

        let cols = cols.max(1) as usize;
        let start_byte = row_to_byte(&layout, start_row, &l.bytes, cols);
        let end_byte = row_to_byte(&layout, end_row, &l.bytes, cols);
        (start_byte, end_byte.max(start_byte), is_line_end)
    }
}

/// Map a cumulative row index back to a byte offset into `bytes`: the offset
/// where physical row `row` begins, at `cols` display columns per row. A
/// `row` index past the line's last row returns `bytes.len()`, so that
/// adjacent calls (`row_to_byte(r)`, `row_to_byte(r+1)`) bound exactly the
/// bytes rendered on row `r`.
fn row_to_byte(layout: &Layout, row: usize, bytes: &[u8], cols: usize) -> usize {
    let text = String::from_utf8_lossy(bytes);
    let segments: Vec<&str> = text.split('\n').collect();
    let mut consumed = 0usize;
    for (i, &rows) in layout.segment_rows.iter().enumerate() {
        if row < consumed + rows {
            let row_in_segment = row - consumed;
            let segment = segments.get(i).copied().unwrap_or("");
            return layout.segment_starts[i] + column_to_byte(segment, row_in_segment * cols);
        }
        consumed += rows;
    }
    bytes.len()
}

/// Byte offset within `segment` of display column `target_col`, treating CSI
/// sequences as zero-width the same way `display_width` does. A CSI run
/// immediately preceding the target column's character is attributed to
/// that character (it styles what follows). `target_col == 0` always
/// returns `0`, and a `target_col` at or past the segment's display width
/// returns `segment.len()`.
fn column_to_byte(segment: &str, target_col: usize) -> usize {
    if target_col == 0 {
        return 0;
    }
    let mut col = 0usize;
    let mut pending_csi_start: Option<usize> = None;
    let mut chars = segment.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '\u{1b}' && chars.peek().map(|&(_, c2)| c2) == Some('[') {
            if pending_csi_start.is_none() {
                pending_csi_start = Some(idx);
            }
            chars.next();
            for (_, c2) in chars.by_ref() {
                if c2.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        if col == target_col {
            return pending_csi_start.unwrap_or(idx);
        }
        pending_csi_start = None;
        col += 1;
    }
    segment.len()
}

/// Decompose `bytes` at `\n` into segments, measure each segment's display
/// width (CSI sequences zero-width, everything else one column — see
/// module docs), and compute physical row counts.
fn compute_layout(bytes: &[u8], cols: u16) -> Layout {
    let cols = cols.max(1) as usize;
    let text = String::from_utf8_lossy(bytes);
    let mut segment_widths = Vec::new();
    let mut segment_rows = Vec::new();
    let mut segment_starts = Vec::new();
    let mut offset = 0usize;

    for segment in split_keep_offsets(&text, bytes) {
        segment_starts.push(offset);
        let width = display_width(segment);
        let rows = if width == 0 { 1 } else { width.div_ceil(cols) };
        segment_widths.push(width);
        segment_rows.push(rows.max(1));
        offset += segment.len() + 1; // +1 for the consumed '\n', harmless on the last segment
    }

    if segment_rows.is_empty() {
        segment_widths.push(0);
        segment_rows.push(1);
        segment_starts.push(0);
    }

    Layout { cols: cols as u16, segment_widths, segment_rows, segment_starts }
}

fn split_keep_offsets<'a>(text: &'a str, _bytes: &[u8]) -> Vec<&'a str> {
    text.split('\n').collect()
}

/// Display-column width: ANSI CSI sequences (`ESC [ ... final-byte`) are
/// zero-width; every other byte is one column. East-Asian wide-char support
/// is explicitly out of scope (§4.1 Layout contract).
fn display_width(segment: &str) -> usize {
    let mut width = 0;
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' && chars.peek() == Some(&'[') {
            chars.next();
            for c2 in chars.by_ref() {
                if c2.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        width += 1;
    }
    width
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── append / clear ────────────────────────────────────────────────────────

    #[test]
    fn append_line_increases_len() {
        let mut sb = Scrollback::new();
        sb.append_line("hello");
        assert_eq!(sb.len(), 1);
    }

    #[test]
    fn clear_drops_all_lines() {
        let mut sb = Scrollback::new();
        sb.append_line("a");
        sb.append_line("b");
        sb.clear();
        assert!(sb.is_empty());
    }

    // ── layout ────────────────────────────────────────────────────────────────

    #[test]
    fn single_row_when_line_fits_width() {
        let mut sb = Scrollback::new();
        sb.append_line("short");
        sb.ensure_layout(80);
        assert_eq!(sb.line_rows(0), 1);
    }

    #[test]
    fn wraps_into_multiple_rows() {
        let mut sb = Scrollback::new();
        sb.append_line("a".repeat(25));
        sb.ensure_layout(10);
        assert_eq!(sb.line_rows(0), 3);
    }

    #[test]
    fn embedded_newline_creates_independent_segments() {
        let mut sb = Scrollback::new();
        sb.append_line("aaaaaaaaaa\nbb");
        sb.ensure_layout(10);
        // segment 1: 10 cols -> 1 row; segment 2: 2 cols -> 1 row
        assert_eq!(sb.line_rows(0), 2);
    }

    #[test]
    fn empty_segment_counts_as_one_row() {
        let mut sb = Scrollback::new();
        sb.append_line("\n");
        sb.ensure_layout(80);
        assert_eq!(sb.line_rows(0), 2);
    }

    #[test]
    fn csi_sequence_is_zero_width() {
        let mut sb = Scrollback::new();
        sb.append_line("\x1b[31mred\x1b[0m");
        sb.ensure_layout(80);
        assert_eq!(sb.line_rows(0), 1);
        let (start, end, _) = sb.byte_range_for_rows(0, 80, 0, 1);
        assert_eq!(end - start, "\x1b[31mred\x1b[0m".len());
    }

    // ── byte ranges ───────────────────────────────────────────────────────────

    #[test]
    fn byte_range_covers_whole_short_line() {
        let mut sb = Scrollback::new();
        sb.append_line("hello");
        sb.ensure_layout(80);
        let (start, end, is_end) = sb.byte_range_for_rows(0, 80, 0, 1);
        assert_eq!(&sb.get_line_text(0).unwrap().0[start..end], b"hello");
        assert!(is_end);
    }

    #[test]
    fn out_of_range_row_clamps_and_marks_line_end() {
        let mut sb = Scrollback::new();
        sb.append_line("hi");
        sb.ensure_layout(80);
        let (_, _, is_end) = sb.byte_range_for_rows(0, 80, 50, 1);
        assert!(is_end);
    }

    #[test]
    fn utf8_multibyte_range_never_splits_codepoint() {
        let mut sb = Scrollback::new();
        sb.append_line("héllo"); // é is 2 bytes
        sb.ensure_layout(80);
        let (start, end, _) = sb.byte_range_for_rows(0, 80, 0, 1);
        let slice = &sb.get_line_text(0).unwrap().0[start..end];
        assert!(std::str::from_utf8(slice).is_ok());
    }

    #[test]
    fn missing_line_returns_line_end_true() {
        let sb = Scrollback::new();
        let (_, _, is_end) = sb.byte_range_for_rows(0, 80, 0, 1);
        assert!(is_end);
    }

    #[test]
    fn wrapped_line_byte_ranges_land_on_row_boundaries() {
        let mut sb = Scrollback::new();
        sb.append_line("abcdefghij");
        sb.ensure_layout(4);
        assert_eq!(sb.line_rows(0), 3);

        let first_row = sb.byte_range_for_rows(0, 4, 0, 1);
        assert_eq!(first_row, (0, 4, false));

        let last_row = sb.byte_range_for_rows(0, 4, 2, 1);
        assert_eq!(last_row, (8, 10, true));
    }

    #[test]
    fn csi_run_before_a_wrap_boundary_stays_with_the_text_it_styles() {
        assert_eq!(column_to_byte("abc\x1b[31mdef", 3), 3);
        assert_eq!(column_to_byte("abc\x1b[31mdef", 0), 0);
        assert_eq!(column_to_byte("abc\x1b[31mdef", 6), "abc\x1b[31mdef".len());
    }
}
