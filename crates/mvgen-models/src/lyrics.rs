//! Lyric line filtering.
//!
//! The filtered sequence decides how many clip jobs a request fans out to:
//! one per surviving line, in the original order.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Section tags and stage directions such as `[Verse 2]` or `[Chorus x2]`.
static BRACKETED_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("bracketed tag pattern"));

/// Dropped rather than spaced out, so contractions stay one word.
const APOSTROPHES: [char; 3] = ['\'', '\u{2019}', '\u{02BC}'];

/// A lyric line that survived filtering, tagged with its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LyricLine {
    /// Position in the filtered sequence
    pub ordinal: u32,
    /// Cleaned line text
    pub text: String,
}

/// Filter translated lyric lines down to the ones that drive clip generation.
///
/// Strips bracketed tags, then punctuation and symbols, collapses whitespace and
/// drops lines that end up empty. Identical lines are kept.
pub fn filter_lyric_lines<S: AsRef<str>>(lines: &[S]) -> Vec<LyricLine> {
    lines
        .iter()
        .filter_map(|line| clean_line(line.as_ref()))
        .enumerate()
        .map(|(ordinal, text)| LyricLine {
            ordinal: ordinal as u32,
            text,
        })
        .collect()
}

fn clean_line(line: &str) -> Option<String> {
    let untagged = BRACKETED_TAG.replace_all(line, " ");
    let letters: String = untagged
        .chars()
        .filter(|c| !APOSTROPHES.contains(c))
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let text = letters.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Split free-form lyrics into lines, keeping blank lines out.
pub fn split_lines(lyrics: &str) -> Vec<String> {
    lyrics
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[LyricLine]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn test_strips_tags_and_punctuation() {
        let input = vec![
            "[Verse]",
            "Hello, world!",
            "[Chorus] We sing -- loud...",
            "",
            "   ",
            "?!",
        ];
        let filtered = filter_lyric_lines(&input);
        assert_eq!(texts(&filtered), vec!["Hello world", "We sing loud"]);
        assert_eq!(filtered[0].ordinal, 0);
        assert_eq!(filtered[1].ordinal, 1);
    }

    #[test]
    fn test_keeps_duplicates_and_order() {
        let input = vec!["la la", "[Bridge]", "la la", "end"];
        let filtered = filter_lyric_lines(&input);
        assert_eq!(texts(&filtered), vec!["la la", "la la", "end"]);
        let ordinals: Vec<u32> = filtered.iter().map(|l| l.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn test_keeps_non_latin_letters() {
        let input = vec!["[Verse 2] 사랑해, 너를!", "¿Dónde estás?"];
        let filtered = filter_lyric_lines(&input);
        assert_eq!(texts(&filtered), vec!["사랑해 너를", "Dónde estás"]);
    }

    #[test]
    fn test_contractions_stay_whole() {
        let input = vec!["Don't stop, we\u{2019}re rock'n'roll", "' '"];
        let filtered = filter_lyric_lines(&input);
        assert_eq!(texts(&filtered), vec!["Dont stop were rocknroll"]);
    }

    #[test]
    fn test_all_lines_filtered_out() {
        let input = vec!["[Intro]", "...", "[Outro]"];
        assert!(filter_lyric_lines(&input).is_empty());
    }

    #[test]
    fn test_split_lines() {
        let lines = split_lines("[Verse]\nfirst\n\n  second  \n");
        assert_eq!(lines, vec!["[Verse]", "first", "second"]);
    }
}
