//! Continuation phrase detection.
//!
//! A continuation signal is a cue in the command text that the speaker is
//! extending the previous exchange ("also ...", "while you're at it ...")
//! rather than starting a new topic. Phrases are matched case-insensitively
//! on word boundaries, never as raw substrings.

use std::sync::OnceLock;

use regex::Regex;

/// Bumped whenever a phrase is added, removed or changed, since that shifts
/// routing scores.
pub const CONTINUATION_LIBRARY_VERSION: u32 = 2;

/// Phrase patterns, each matched with `(?i)\b...\b`.
const CONTINUATION_PHRASES: &[&str] = &[
    r"also",
    r"and\s+also",
    r"continue",
    r"one\s+more\s+thing",
    r"going\s+back\s+to",
    r"while\s+you(?:['’]re|\s+are|re)\s+at\s+it",
    r"same\s+thing",
    r"actually",
    r"wait",
    r"oh,?\s+and",
    r"as\s+well",
    r"in\s+addition",
    r"on\s+top\s+of\s+that",
    r"follow(?:\s+|-)?up",
];

/// Compiled continuation phrase library.
pub struct ContinuationDetector {
    patterns: Vec<Regex>,
}

impl Default for ContinuationDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuationDetector {
    /// Compile the phrase library.
    pub fn new() -> Self {
        let patterns = CONTINUATION_PHRASES
            .iter()
            .map(|phrase| {
                Regex::new(&format!(r"(?i)\b{phrase}\b")).expect("Invalid continuation regex")
            })
            .collect();
        Self { patterns }
    }

    /// Shared instance, compiled on first use.
    pub fn shared() -> &'static ContinuationDetector {
        static DETECTOR: OnceLock<ContinuationDetector> = OnceLock::new();
        DETECTOR.get_or_init(ContinuationDetector::new)
    }

    /// Whether the command carries any continuation cue.
    pub fn is_continuation(&self, command: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(command))
    }

    /// The first matched phrase, as it appears in the command.
    pub fn matched_phrase<'a>(&self, command: &'a str) -> Option<&'a str> {
        self.patterns
            .iter()
            .find_map(|re| re.find(command))
            .map(|m| m.as_str())
    }
}
