//! Validation and compilation of caller-supplied section patterns.
//!
//! Patterns arrive from API callers, so they are screened before they reach
//! the regex engine. Screening is deliberately conservative: three syntactic
//! shapes associated with catastrophic backtracking are rejected outright,
//! even where a particular instance would be harmless. Patterns are also
//! persisted alongside documents and may be replayed by other consumers,
//! so the screen does not rely on this crate's linear-time engine.
//!
//! The screens themselves use explicit bounded repetition (at most
//! `SCAN_SPAN` characters) so a hostile pattern cannot make the validator
//! slow.

use crate::config::ParserConfig;
use crate::error::ParseError;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Compiled-program ceiling for accepted patterns.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Longest span a screen will look across inside a group.
const SCAN_SPAN: usize = 50;

// `(x+)+`, `(a+b)*`, `(\w+\s)+`, `((a+))+`, `(x+){2}`: a quantifier, then a
// run with no `(` ending in a quantified `)`. Every `)` in that run closes a
// group opened before the quantifier, so the quantified group contains it.
// The leading `[^(]` keeps `(?:` and `(?i)` from counting as quantifiers.
static RE_NESTED_QUANTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"[^(][+*?}}][^(]{{0,{SCAN_SPAN}}}\)[+*?{{]")).unwrap()
});

// `a++`, `a+*`, `a*?`
static RE_ADJACENT_QUANTIFIERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[+*?]{2}").unwrap());

// `(a|b)+`
static RE_QUANTIFIED_ALTERNATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\([^)]{{0,{SCAN_SPAN}}}\|[^)]{{0,{SCAN_SPAN}}}\)[+*?{{]"
    ))
    .unwrap()
});

/// Limits applied by [`compile_patterns`].
#[derive(Debug, Clone, Copy)]
pub struct PatternLimits {
    pub max_len: usize,
    pub max_count: usize,
}

impl Default for PatternLimits {
    fn default() -> Self {
        Self {
            max_len: 1000,
            max_count: 100,
        }
    }
}

impl From<&ParserConfig> for PatternLimits {
    fn from(config: &ParserConfig) -> Self {
        Self {
            max_len: config.max_pattern_len,
            max_count: config.max_patterns,
        }
    }
}

/// Validate and compile a list of section patterns.
///
/// # Errors
/// [`ParseError::InvalidPattern`] when the list is empty or too long, or any
/// entry is blank, too long, matches a dangerous shape, or does not compile.
pub fn compile_patterns(
    patterns: &[String],
    limits: PatternLimits,
) -> Result<Vec<Regex>, ParseError> {
    if patterns.is_empty() {
        return Err(ParseError::InvalidPattern(
            "pattern list is empty; omit it to use the default patterns".into(),
        ));
    }
    if patterns.len() > limits.max_count {
        return Err(ParseError::InvalidPattern(format!(
            "{} patterns supplied, at most {} allowed",
            patterns.len(),
            limits.max_count
        )));
    }

    let mut compiled = Vec::with_capacity(patterns.len());
    for (i, pattern) in patterns.iter().enumerate() {
        if pattern.trim().is_empty() {
            return Err(ParseError::InvalidPattern(format!(
                "pattern {i} is empty"
            )));
        }
        let len = pattern.chars().count();
        if len > limits.max_len {
            return Err(ParseError::InvalidPattern(format!(
                "pattern {i} is {len} characters long, at most {} allowed",
                limits.max_len
            )));
        }
        if let Some(reason) = dangerous_construct(pattern) {
            return Err(ParseError::InvalidPattern(format!(
                "pattern {i} rejected: {reason}"
            )));
        }
        let regex = RegexBuilder::new(pattern)
            .size_limit(REGEX_SIZE_LIMIT)
            .dfa_size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| ParseError::InvalidPattern(format!("pattern {i} does not compile: {e}")))?;
        compiled.push(regex);
    }

    debug!("Compiled {} custom section patterns", compiled.len());
    Ok(compiled)
}

/// Describe the first backtracking-prone shape found in `pattern`, if any.
pub fn dangerous_construct(pattern: &str) -> Option<&'static str> {
    if RE_NESTED_QUANTIFIER.is_match(pattern) {
        return Some("nested quantifier");
    }
    if RE_ADJACENT_QUANTIFIERS.is_match(pattern) {
        return Some("adjacent quantifiers");
    }
    if RE_QUANTIFIED_ALTERNATION.is_match(pattern) {
        return Some("quantified alternation group");
    }
    None
}
