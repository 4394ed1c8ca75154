//! Hallucination filter — rejects known-bad backend output before it can
//! reach the stabilizer.
//!
//! Speech models reliably hallucinate on silence, music, and background
//! noise: stock sign-off phrases ("thank you for watching"), short filler
//! words, and decoding loops that repeat one phrase over and over.  The
//! filter turns all of these into an **empty string** — an explicit
//! rejection, distinguishable in logs from "the model produced nothing",
//! but identical downstream: nothing reaches the viewer.
//!
//! Checks applied, in order:
//!
//! 1. error-tagged results and sub-2-character text
//! 2. backend-reported no-speech probability vs. threshold
//! 3. case-insensitive phrase containment (configured list)
//! 4. case-insensitive anchored regex match (configured list)
//! 5. internal repetition — a clause or word sequence repeated ≥ 2 times
//!    collapses to nothing, not to one copy: repetition from this class of
//!    model is evidence of decoding failure, not of repeated speech

use regex::{Regex, RegexSet};

use crate::config::FilterConfig;
use crate::stt::RawResult;

/// Clause separators used for repetition detection.
const CLAUSE_DELIMITERS: &[char] = &[',', '.', '!', '?', ';', '、', '。'];

/// Clauses shorter than this are too generic to count as repetition.
const MIN_REPEATED_CLAUSE_CHARS: usize = 5;

// ---------------------------------------------------------------------------
// HallucinationFilter
// ---------------------------------------------------------------------------

/// Compiled hallucination filter.
///
/// Construction compiles the configured regex patterns once; rebuild the
/// filter (cheap) whenever the configuration is hot-reloaded.
///
/// # Example
///
/// ```rust
/// use livesub::config::FilterConfig;
/// use livesub::filter::HallucinationFilter;
///
/// let filter = HallucinationFilter::from_config(&FilterConfig::default());
/// assert!(filter.is_hallucination("Thank you for watching!"));
/// assert!(!filter.is_hallucination("The train leaves at nine."));
/// ```
pub struct HallucinationFilter {
    phrases: Vec<String>,
    patterns: RegexSet,
    no_speech_threshold: f32,
}

impl HallucinationFilter {
    /// Compile a filter from configuration.
    ///
    /// Invalid regex patterns are skipped with a warning rather than
    /// failing the whole filter — a bad pattern in a hot-reloaded config
    /// must not take the pipeline down.
    pub fn from_config(config: &FilterConfig) -> Self {
        let mut valid = Vec::with_capacity(config.patterns.len());
        for pattern in &config.patterns {
            let case_insensitive = format!("(?i){pattern}");
            match Regex::new(&case_insensitive) {
                Ok(_) => valid.push(case_insensitive),
                Err(e) => log::warn!("skipping invalid hallucination pattern '{pattern}': {e}"),
            }
        }

        let patterns = RegexSet::new(&valid).unwrap_or_else(|e| {
            log::warn!("hallucination pattern set failed to compile: {e}");
            RegexSet::empty()
        });

        Self {
            phrases: config.phrases.iter().map(|p| p.to_lowercase()).collect(),
            patterns,
            no_speech_threshold: config.no_speech_threshold,
        }
    }

    /// Filter one backend result.
    ///
    /// Returns the trimmed text on pass, or an empty string when the result
    /// is rejected.  Empty output is an explicit decision, not an error.
    pub fn apply(&self, result: &RawResult) -> String {
        if result.is_error() {
            return String::new();
        }

        let text = result.text.trim();
        if text.chars().count() < 2 {
            return String::new();
        }

        if let Some(prob) = result.no_speech_prob {
            if prob > self.no_speech_threshold {
                log::debug!("filtered no-speech window (p={prob:.2}): '{text}'");
                return String::new();
            }
        }

        if self.is_hallucination(text) {
            log::debug!("filtered hallucination: '{text}'");
            return String::new();
        }

        text.to_string()
    }

    /// Whether `text` matches a known hallucination shape.
    pub fn is_hallucination(&self, text: &str) -> bool {
        let lower = text.trim().to_lowercase();

        if self.phrases.iter().any(|p| lower.contains(p.as_str())) {
            return true;
        }

        if self.patterns.is_match(&lower) {
            return true;
        }

        has_repeated_clause(&lower) || is_tiled_phrase(&lower)
    }
}

/// Detects a clause of ≥ 5 characters appearing at least twice, e.g.
/// `"I'm so hot today, I'm so hot today"`.
fn has_repeated_clause(lower: &str) -> bool {
    if !lower.contains(CLAUSE_DELIMITERS) {
        return false;
    }

    let clauses: Vec<&str> = lower
        .split(CLAUSE_DELIMITERS)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();

    if clauses.len() < 2 {
        return false;
    }

    clauses.iter().any(|clause| {
        clause.chars().count() >= MIN_REPEATED_CLAUSE_CHARS
            && clauses.iter().filter(|c| c == &clause).count() >= 2
    })
}

/// Detects text that is exactly one word sequence repeated ≥ 2 times with
/// no delimiters, e.g. `"i don't care i don't care"`.
fn is_tiled_phrase(lower: &str) -> bool {
    let words: Vec<&str> = lower.split_whitespace().collect();
    let n = words.len();
    if n < 2 {
        return false;
    }

    for period in 1..=n / 2 {
        if n % period != 0 {
            continue;
        }
        if words.iter().enumerate().all(|(i, w)| *w == words[i % period]) {
            return true;
        }
    }

    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
