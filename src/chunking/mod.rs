//! Transcript segmentation.
//!
//! Splits raw transcript text into length-bounded chunks and spreads an
//! episode's duration evenly across them.

use serde::{Deserialize, Serialize};

/// Default maximum segment length in characters.
pub const DEFAULT_MAX_SEGMENT_LENGTH: usize = 500;

/// Half-open `[start_time, end_time)` range in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_time: u32,
    pub end_time: u32,
}

/// A chunk of transcript text with its approximate position in the episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    /// Text content, words joined by single spaces.
    pub text: String,
    /// Approximate start time in seconds.
    pub start_time: u32,
    /// Approximate end time in seconds.
    pub end_time: u32,
    /// Position of this chunk in the episode.
    pub order: usize,
}

/// Configuration for chunking.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters, separators included.
    pub max_length: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_SEGMENT_LENGTH,
        }
    }
}

/// Split `text` into chunks of at most `max_length` characters.
///
/// Words are accumulated greedily; each word counts its own length plus one
/// for the joining space. A word longer than `max_length` is emitted alone,
/// untruncated. Whitespace-only input produces no chunks.
pub fn split_transcript(text: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_length = 0usize;

    for word in text.split_whitespace() {
        let word_length = word.chars().count() + 1;

        if current_length + word_length > max_length && !current.is_empty() {
            chunks.push(current.join(" "));
            current.clear();
            current_length = 0;
        }

        current.push(word);
        current_length += word_length;
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Divide `total_duration` seconds evenly across `count` chunks.
///
/// Boundaries are floored, so ranges are contiguous, start at zero, and the
/// last one may end slightly before `total_duration`. A zero duration
/// collapses every range to `(0, 0)`.
pub fn assign_time_ranges(count: usize, total_duration: u32) -> Vec<TimeRange> {
    if count == 0 {
        return Vec::new();
    }

    let segment_duration = total_duration as f64 / count as f64;
    (0..count)
        .map(|i| TimeRange {
            start_time: (i as f64 * segment_duration).floor() as u32,
            end_time: ((i + 1) as f64 * segment_duration).floor() as u32,
        })
        .collect()
}

/// Split a transcript and attach time ranges in one pass.
pub fn chunk_transcript(text: &str, total_duration: u32, config: &ChunkingConfig) -> Vec<TranscriptChunk> {
    let texts = split_transcript(text, config.max_length);
    let ranges = assign_time_ranges(texts.len(), total_duration);

    texts
        .into_iter()
        .zip(ranges)
        .enumerate()
        .map(|(order, (text, range))| TranscriptChunk {
            text,
            start_time: range.start_time,
            end_time: range.end_time,
            order,
        })
        .collect()
}

/// Format seconds as `MM:SS` or `HH:MM:SS`.
pub fn format_timestamp(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_follows_greedy_accounting() {
        // "hello " already costs 6, so "world " (6 more) overflows 11.
        let chunks = split_transcript("hello world this is a test", 11);
        assert_eq!(chunks, vec!["hello", "world this", "is a test"]);

        let chunks = split_transcript("hello world this is a test", 12);
        assert_eq!(chunks, vec!["hello world", "this is a", "test"]);
    }

    #[test]
    fn test_split_empty_and_whitespace() {
        assert!(split_transcript("", 10).is_empty());
        assert!(split_transcript("   \n\t  ", 10).is_empty());
    }

    #[test]
    fn test_oversized_word_is_emitted_alone() {
        let chunks = split_transcript("a supercalifragilistic b", 5);
        assert_eq!(chunks, vec!["a", "supercalifragilistic", "b"]);
    }

    #[test]
    fn test_split_normalizes_whitespace() {
        let chunks = split_transcript("  one\n\ntwo\tthree  ", 100);
        assert_eq!(chunks, vec!["one two three"]);
    }

    #[test]
    fn test_time_ranges_even_division() {
        let ranges = assign_time_ranges(4, 100);
        let pairs: Vec<(u32, u32)> = ranges.iter().map(|r| (r.start_time, r.end_time)).collect();
        assert_eq!(pairs, vec![(0, 25), (25, 50), (50, 75), (75, 100)]);
    }

    #[test]
    fn test_time_ranges_zero_duration() {
        let ranges = assign_time_ranges(3, 0);
        assert!(ranges.iter().all(|r| r.start_time == 0 && r.end_time == 0));
        assert_eq!(ranges.len(), 3);
    }

    #[test]
    fn test_time_ranges_floor_truncation() {
        let ranges = assign_time_ranges(3, 10);
        let pairs: Vec<(u32, u32)> = ranges.iter().map(|r| (r.start_time, r.end_time)).collect();
        assert_eq!(pairs, vec![(0, 3), (3, 6), (6, 10)]);
    }

    #[test]
    fn test_chunk_transcript_attaches_ranges() {
        let config = ChunkingConfig { max_length: 12 };
        let chunks = chunk_transcript("hello world this is a test", 90, &config);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!((chunks[0].start_time, chunks[0].end_time), (0, 30));
        assert_eq!((chunks[2].start_time, chunks[2].end_time), (60, 90));
        assert_eq!(chunks[2].order, 2);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(125), "02:05");
        assert_eq!(format_timestamp(3725), "01:02:05");
    }

    proptest! {
        #[test]
        fn prop_chunks_respect_max_length(text in "[a-z ]{0,300}", max_length in 1usize..60) {
            for chunk in split_transcript(&text, max_length) {
                let len = chunk.chars().count();
                prop_assert!(len <= max_length || !chunk.contains(' '));
            }
        }

        #[test]
        fn prop_chunks_preserve_word_sequence(text in "[a-zA-Z0-9 \n\t]{0,300}", max_length in 1usize..60) {
            let original: Vec<&str> = text.split_whitespace().collect();
            let chunks = split_transcript(&text, max_length);
            let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
            prop_assert_eq!(original, rejoined);
        }

        #[test]
        fn prop_time_ranges_are_contiguous(count in 1usize..200, total in 0u32..100_000) {
            let ranges = assign_time_ranges(count, total);
            prop_assert_eq!(ranges[0].start_time, 0);
            prop_assert!(ranges[count - 1].end_time <= total);
            for pair in ranges.windows(2) {
                prop_assert_eq!(pair[0].end_time, pair[1].start_time);
            }
        }
    }
}
