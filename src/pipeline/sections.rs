//! Section detection: label each page with the heading it falls under.
//!
//! ## Rules
//!
//! Patterns are tried in priority order against each page's text; the first
//! pattern with any match wins. A detected section carries forward across
//! later pages until another heading replaces it, so a page with no heading
//! of its own inherits the previous one.
//!
//! Built-in patterns, in priority order:
//! 1. Numbered headings: `1 Scope`, `2.3. Test Methods`
//! 2. All-caps headings on their own line, 6–50 characters
//! 3. A heading underlined by a line of five or more `=` or `-`
//!
//! Caller-supplied patterns replace the built-ins entirely. They are matched
//! exactly as compiled, with no added flags.

use crate::output::ParsedPage;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_NUMBERED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(\d+(?:\.\d+)*\.?[ \t]+[A-Za-z][^\n]{0,100})").unwrap()
});

static RE_UPPERCASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*([A-Z][A-Z0-9 ,&/'-]{4,48}[A-Z0-9])[ \t]*$").unwrap()
});

static RE_UNDERLINED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*([^\n]*[^\s=-][^\n]*)\n[ \t]*(?:={5,}|-{5,})[ \t]*$").unwrap()
});

/// Assigns section labels to pages.
#[derive(Debug, Clone)]
pub struct SectionDetector {
    patterns: Vec<Regex>,
}

impl Default for SectionDetector {
    fn default() -> Self {
        Self {
            patterns: vec![
                RE_NUMBERED.clone(),
                RE_UPPERCASE.clone(),
                RE_UNDERLINED.clone(),
            ],
        }
    }
}

impl SectionDetector {
    /// Use validated caller patterns instead of the built-in set.
    ///
    /// Compile them with [`crate::pipeline::patterns::compile_patterns`].
    pub fn with_patterns(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// Label every page in place, carrying sections forward.
    pub fn detect(&self, pages: &mut [ParsedPage]) {
        let mut current: Option<String> = None;
        for page in pages.iter_mut() {
            if let Some(label) = self.first_heading(&page.text) {
                current = Some(label);
            }
            page.section = current.clone();
        }
    }

    /// The label of the highest-priority heading on a page.
    pub fn first_heading(&self, text: &str) -> Option<String> {
        let normalised = text.replace("\r\n", "\n").replace('\r', "\n");
        self.patterns.iter().find_map(|re| {
            let caps = re.captures(&normalised)?;
            let matched = caps.get(1).or_else(|| caps.get(0))?;
            let label = clean_label(matched.as_str());
            (!label.is_empty()).then_some(label)
        })
    }
}

fn clean_label(raw: &str) -> String {
    raw.trim_end_matches(['.', ':', '-', ' ', '\t'])
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::patterns::{compile_patterns, PatternLimits};

    fn detect(texts: &[&str]) -> Vec<Option<String>> {
        let mut pages: Vec<ParsedPage> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| ParsedPage::new(i + 1, *t))
            .collect();
        SectionDetector::default().detect(&mut pages);
        pages.into_iter().map(|p| p.section).collect()
    }

    #[test]
    fn sections_persist_across_pages() {
        let got = detect(&[
            "1. Intro\nThis document describes...",
            "more body text without headings",
            "2. Methods\nWe measured...",
        ]);
        assert_eq!(
            got,
            vec![
                Some("1. Intro".to_string()),
                Some("1. Intro".to_string()),
                Some("2. Methods".to_string()),
            ]
        );
    }

    #[test]
    fn unset_until_first_heading() {
        let got = detect(&["cover page", "3.2 Results", "tail"]);
        assert_eq!(got[0], None);
        assert_eq!(got[1].as_deref(), Some("3.2 Results"));
        assert_eq!(got[2].as_deref(), Some("3.2 Results"));
    }

    #[test]
    fn uppercase_heading() {
        let got = detect(&["some intro\nRISK ASSESSMENT\nbody text"]);
        assert_eq!(got[0].as_deref(), Some("RISK ASSESSMENT"));
    }

    #[test]
    fn short_uppercase_line_is_ignored() {
        assert_eq!(detect(&["NOTE\nbody"])[0], None);
    }

    #[test]
    fn underlined_heading() {
        let got = detect(&["Background\n==========\nbody", "Scope\r\n-----\r\nmore"]);
        assert_eq!(got[0].as_deref(), Some("Background"));
        assert_eq!(got[1].as_deref(), Some("Scope"));
    }

    #[test]
    fn numbered_beats_uppercase() {
        let got = detect(&["OVERVIEW SECTION\n4 Findings\n"]);
        assert_eq!(got[0].as_deref(), Some("4 Findings"));
    }

    #[test]
    fn trailing_punctuation_is_stripped() {
        let got = detect(&["5.1. Data Sources:  \nbody"]);
        assert_eq!(got[0].as_deref(), Some("5.1. Data Sources"));
    }

    #[test]
    fn custom_patterns_replace_defaults() {
        let compiled = compile_patterns(
            &[r"Article [IVX]+".to_string()],
            PatternLimits::default(),
        )
        .unwrap();
        let detector = SectionDetector::with_patterns(compiled);
        let mut pages = vec![
            ParsedPage::new(1, "1. Intro\nArticle IV applies"),
            ParsedPage::new(2, "2. Methods"),
        ];
        detector.detect(&mut pages);
        assert_eq!(pages[0].section.as_deref(), Some("Article IV"));
        // The built-in numbered pattern is not consulted.
        assert_eq!(pages[1].section.as_deref(), Some("Article IV"));
    }

    #[test]
    fn page_text_is_left_untouched() {
        let mut pages = vec![ParsedPage::new(1, "Heading\r\n=====\r\n")];
        SectionDetector::default().detect(&mut pages);
        assert_eq!(pages[0].text, "Heading\r\n=====\r\n");
    }
}
