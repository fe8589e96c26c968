//! Lossless text splitting.
//!
//! Both splitters work on Unicode code points and never drop or reorder text:
//! concatenating the returned chunks reproduces the input exactly.
//!
//! - [`split_for_analysis`] sizes chunks for the analysis backend's context,
//!   preferring paragraph, then line, then sentence boundaries.
//! - [`split_for_synthesis`] sizes chunks for the synthesizer's input limit,
//!   preferring full-width sentence terminators, then full-width commas.

use crate::defaults::ANALYSIS_MAX_LOOKBACK;

/// Full-width terminators that end a sentence when followed by a space.
const SENTENCE_TERMINATORS: [char; 3] = ['。', '！', '？'];

/// Full-width delimiters preferred as synthesis split points.
const CLAUSE_TERMINATORS: [char; 4] = ['。', '！', '？', '；'];

/// Full-width comma, the fallback synthesis split point.
const FULL_WIDTH_COMMA: char = '，';

/// Split `text` into chunks for the analysis backend.
///
/// Returns `[text]` when it is at most `limit` code points. Otherwise each cut
/// is placed at the last boundary inside the lookback window
/// (`min(1000, limit / 2)` code points before the cutoff), in priority order:
/// a double line break, a single line break, a full-width sentence terminator
/// followed by a space. Without a boundary the cut is a hard one.
///
/// Every chunk but the last is strictly shorter than `limit` (for `limit == 1`
/// chunks are single code points). A `limit` of zero is treated as one.
pub fn split_for_analysis(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let limit = limit.max(1);
    if chars.len() <= limit {
        return vec![text.to_string()];
    }

    let lookback = (limit / 2).min(ANALYSIS_MAX_LOOKBACK);
    let max_chunk = if limit > 1 { limit - 1 } else { 1 };

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        if chars.len() - start <= limit {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let hard_end = start + max_chunk;
        let window_start = (start + limit).saturating_sub(lookback).max(start + 1);

        let last_split = |accept: &dyn Fn(usize) -> bool| {
            (window_start..=hard_end).rev().find(|&split| accept(split))
        };

        let split = last_split(&|split| {
            split >= start + 2 && chars[split - 1] == '\n' && chars[split - 2] == '\n'
        })
        .or_else(|| last_split(&|split| chars[split - 1] == '\n'))
        .or_else(|| {
            last_split(&|split| {
                SENTENCE_TERMINATORS.contains(&chars[split - 1]) && chars.get(split) == Some(&' ')
            })
        })
        .unwrap_or(hard_end);

        chunks.push(chars[start..split].iter().collect());
        start = split;
    }

    chunks
}

/// Split `text` into chunks for the speech synthesizer.
///
/// Returns `[text]` when it is at most `max_chars` code points. Otherwise each
/// window ending at `start + max_chars` is scanned backward for a full-width
/// sentence terminator (。！？；), then a full-width comma (，); the cut goes
/// after the delimiter so punctuation stays with the preceding chunk. Without
/// a delimiter the cut is a hard one at the limit. Every chunk holds at least
/// one code point. A `max_chars` of zero is treated as one.
pub fn split_for_synthesis(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let max_chars = max_chars.max(1);
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        if chars.len() - start <= max_chars {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let target_end = start + max_chars;
        let split_after = |delimiters: &[char]| {
            (start + 1..target_end)
                .rev()
                .find(|&i| delimiters.contains(&chars[i]))
                .map(|i| i + 1)
        };

        let split = split_after(&CLAUSE_TERMINATORS)
            .or_else(|| split_after(&[FULL_WIDTH_COMMA]))
            .unwrap_or(target_end);

        chunks.push(chars[start..split].iter().collect());
        start = split;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn analysis_small_text_is_returned_unchanged() {
        assert_eq!(split_for_analysis("Hello world", 100), vec!["Hello world"]);
    }

    #[test]
    fn analysis_exact_limit_is_one_chunk() {
        assert_eq!(split_for_analysis("1234567890", 10), vec!["1234567890"]);
    }

    #[test]
    fn analysis_just_over_limit_splits_in_two() {
        let chunks = split_for_analysis("12345678901", 10);
        assert_eq!(chunks.len(), 2);
        assert!(char_len(&chunks[0]) < 10);
        assert_eq!(chunks.concat(), "12345678901");
    }

    #[test]
    fn analysis_prefers_paragraph_breaks() {
        let text = "Line 1\n\nLine 2\n\nLine 3";
        let chunks = split_for_analysis(text, 10);
        assert_eq!(chunks, vec!["Line 1\n\n", "Line 2\n\n", "Line 3"]);
    }

    #[test]
    fn analysis_prefers_double_over_single_newline() {
        // A single newline sits closer to the cutoff than the double one.
        let text = "aaaa\n\nbb\ncccccccccccc";
        let chunks = split_for_analysis(text, 12);
        assert_eq!(chunks[0], "aaaa\n\n");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn analysis_falls_back_to_single_newline() {
        let text = "abcdef\nghijklmnopqrstu";
        let chunks = split_for_analysis(text, 12);
        assert_eq!(chunks[0], "abcdef\n");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn analysis_splits_after_full_width_terminator_followed_by_space() {
        let text = "他说了一句话。 然后他又说了一句话";
        let chunks = split_for_analysis(text, 12);
        assert_eq!(chunks[0], "他说了一句话。");
        assert!(chunks[1].starts_with(' '));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn analysis_ignores_terminator_without_space() {
        let text = "他说了一句话。然后他又说了一句话";
        let chunks = split_for_analysis(text, 12);
        assert_eq!(char_len(&chunks[0]), 11);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn analysis_ignores_boundary_outside_lookback_window() {
        // Newline at position 1 is far outside the window of limit / 2.
        let text = "a\nbcdefghijklmnopqrstuvwxyz";
        let chunks = split_for_analysis(text, 10);
        assert_eq!(chunks[0], "a\nbcdefgh");
    }

    #[test]
    fn analysis_limit_one_yields_single_code_points() {
        let chunks = split_for_analysis("12345", 1);
        assert_eq!(chunks, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn analysis_zero_limit_does_not_loop() {
        let chunks = split_for_analysis("abc", 0);
        assert_eq!(chunks.concat(), "abc");
    }

    #[test]
    fn analysis_empty_text() {
        assert_eq!(split_for_analysis("", 10), vec![""]);
    }

    #[test]
    fn synthesis_small_text_is_returned_unchanged() {
        assert_eq!(split_for_synthesis("你好。", 20), vec!["你好。"]);
    }

    #[test]
    fn synthesis_keeps_terminator_with_preceding_chunk() {
        let text = "第一句话。第二句话很长很长很长";
        let chunks = split_for_synthesis(text, 8);
        assert_eq!(chunks[0], "第一句话。");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn synthesis_uses_last_terminator_in_window() {
        let text = "一。二！三？四；五六七八九十";
        let chunks = split_for_synthesis(text, 9);
        assert_eq!(chunks[0], "一。二！三？四；");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn synthesis_prefers_terminator_over_later_comma() {
        let text = "一二。三四，五六七八九十";
        let chunks = split_for_synthesis(text, 7);
        assert_eq!(chunks[0], "一二。");
    }

    #[test]
    fn synthesis_falls_back_to_full_width_comma() {
        let text = "一二三，四五六七八九十";
        let chunks = split_for_synthesis(text, 6);
        assert_eq!(chunks[0], "一二三，");
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn synthesis_hard_cuts_without_punctuation() {
        let text = "abcdefghij";
        let chunks = split_for_synthesis(text, 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn synthesis_ignores_delimiter_at_chunk_start() {
        // A delimiter at the window start would produce an empty-bodied chunk.
        let text = "。abcdefgh";
        let chunks = split_for_synthesis(text, 4);
        assert_eq!(chunks[0], "。abc");
    }

    #[test]
    fn synthesis_counts_code_points_not_bytes() {
        let text = "日本語のテキスト";
        let chunks = split_for_synthesis(text, 8);
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn synthesis_zero_limit_makes_progress() {
        let chunks = split_for_synthesis("abc", 0);
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }
}
