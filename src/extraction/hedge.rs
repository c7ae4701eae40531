use std::ops::Range;

use regex::Regex;

/// Language that turns a movement claim into speculation.
pub const SPECULATIVE_TERMS: &[&str] = &[
    "could",
    "might",
    "may",
    "expected to",
    "if",
    "analysts predict",
    "forecast",
    "according to some",
    "potential",
    "possibly",
];

/// Language that dates a claim to an earlier session or a target rather than
/// a move happening now.
pub const RETROSPECTIVE_TERMS: &[&str] = &[
    "projected to",
    "forecasted to",
    "price target",
    "yesterday",
    "last week",
    "last month",
    "last quarter",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionKind {
    Speculative,
    Retrospective,
}

impl ExclusionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionKind::Speculative => "speculative",
            ExclusionKind::Retrospective => "retrospective",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HedgeVerdict {
    Accept,
    Reject { kind: ExclusionKind, term: String },
}

impl HedgeVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, HedgeVerdict::Accept)
    }
}

/// Case-insensitive whole-word term filter. One hit rejects.
#[derive(Debug, Clone)]
pub struct HedgeFilter {
    speculative: Regex,
    retrospective: Option<Regex>,
}

impl Default for HedgeFilter {
    fn default() -> Self {
        Self::new(&[], true)
    }
}

impl HedgeFilter {
    pub fn new(extra_terms: &[String], exclude_retrospective: bool) -> Self {
        let speculative = SPECULATIVE_TERMS
            .iter()
            .map(|s| s.to_string())
            .chain(extra_terms.iter().map(|s| s.trim().to_lowercase()))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        let retrospective = exclude_retrospective.then(|| {
            term_regex(RETROSPECTIVE_TERMS.iter().map(|s| s.to_string()).collect())
        });
        Self {
            speculative: term_regex(speculative),
            retrospective,
        }
    }

    pub fn check(&self, window: &str) -> HedgeVerdict {
        if let Some(m) = self.speculative.find(window) {
            return HedgeVerdict::Reject {
                kind: ExclusionKind::Speculative,
                term: m.as_str().to_lowercase(),
            };
        }
        if let Some(m) = self.retrospective.as_ref().and_then(|re| re.find(window)) {
            return HedgeVerdict::Reject {
                kind: ExclusionKind::Retrospective,
                term: m.as_str().to_lowercase(),
            };
        }
        HedgeVerdict::Accept
    }
}

fn term_regex(mut terms: Vec<String>) -> Regex {
    // longest first so "expected to" reports over a shorter overlapping term
    terms.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    terms.dedup();
    let alternation = terms
        .iter()
        .map(|t| {
            t.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).unwrap()
}

/// Words whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "inc", "corp", "co", "ltd", "plc", "u.s", "u.k", "mr", "mrs", "ms", "dr", "jr", "sr", "st",
    "vs",
];

/// Whether the word ending just before byte `dot` is a known abbreviation.
fn ends_abbreviation(bytes: &[u8], dot: usize) -> bool {
    let start = bytes[..dot]
        .iter()
        .rposition(|b| !(b.is_ascii_alphabetic() || *b == b'.'))
        .map(|i| i + 1)
        .unwrap_or(0);
    let word = &bytes[start..dot];
    ABBREVIATIONS
        .iter()
        .any(|a| a.as_bytes().eq_ignore_ascii_case(word))
}

/// The sentence of `text` that contains `range`.
///
/// Sentences end at a line break or at `.`, `!`, `?`, `;` followed by
/// whitespace, so "3.5%" and "$1.2B" do not split. Neither do "Inc." or
/// "U.S.".
pub fn sentence_window(text: &str, range: Range<usize>) -> &str {
    let bytes = text.as_bytes();
    let is_terminal = |i: usize| -> bool {
        match bytes[i] {
            b'\n' => true,
            b'.' if ends_abbreviation(bytes, i) => false,
            b'.' | b'!' | b'?' | b';' => bytes.get(i + 1).is_none_or(|c| c.is_ascii_whitespace()),
            _ => false,
        }
    };

    let start = (0..range.start.min(bytes.len()))
        .rev()
        .find(|&i| is_terminal(i))
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = (range.end.min(bytes.len())..bytes.len())
        .find(|&i| is_terminal(i))
        .map(|i| if bytes[i] == b'\n' { i } else { i + 1 })
        .unwrap_or(bytes.len());

    text[start..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn window_of(text: &str, needle: &str) -> String {
        let start = text.find(needle).unwrap();
        sentence_window(text, start..start + needle.len()).to_string()
    }

    #[test]
    fn test_speculative_terms_reject() {
        let f = HedgeFilter::default();
        assert_eq!(
            f.check("XYZ could surge 50% on approval"),
            HedgeVerdict::Reject {
                kind: ExclusionKind::Speculative,
                term: "could".into()
            }
        );
        assert!(!f.check("Analysts Predict NVDA jumps 40%").is_accept());
        assert!(!f.check("XYZ is expected  to climb 30%").is_accept());
    }

    #[test]
    fn test_whole_word_only() {
        let f = HedgeFilter::default();
        // "Mayflower", "iffy", "forecasting"
        assert!(f.check("MAYF jumps 30% after Mayflower deal").is_accept());
        assert!(f.check("ABC soars 25% despite iffy quarter").is_accept());
        assert!(f.check("XYZ jumps 25% as forecasting unit sold").is_accept());
    }

    #[test]
    fn test_retrospective_terms_toggle() {
        let on = HedgeFilter::new(&[], true);
        let off = HedgeFilter::new(&[], false);
        let text = "GME jumped 40% last week";
        assert_eq!(
            on.check(text),
            HedgeVerdict::Reject {
                kind: ExclusionKind::Retrospective,
                term: "last week".into()
            }
        );
        assert!(off.check(text).is_accept());
    }

    #[test]
    fn test_extra_terms() {
        let f = HedgeFilter::new(&["Rumored".to_string()], true);
        assert!(!f.check("ACME soars 30% on rumored buyout").is_accept());
    }

    #[test]
    fn test_window_is_containing_sentence() {
        let text = "NVDA jumps 45% after earnings. Rivals could follow.";
        assert_eq!(window_of(text, "NVDA jumps 45%"), "NVDA jumps 45% after earnings.");
        assert!(HedgeFilter::default()
            .check(&window_of(text, "NVDA jumps 45%"))
            .is_accept());
    }

    #[test]
    fn test_window_headline_and_body_are_separate() {
        let text = "Could this be the top?\nXYZ plunges 30% on guidance cut";
        assert_eq!(
            window_of(text, "XYZ plunges 30%"),
            "XYZ plunges 30% on guidance cut"
        );
    }

    #[test]
    fn test_window_does_not_split_on_decimal_point() {
        let text = "Shares rose. ACME surges 32.5% to $1.2B valuation. Done";
        assert_eq!(
            window_of(text, "ACME surges 32.5%"),
            "ACME surges 32.5% to $1.2B valuation."
        );
    }

    #[test]
    fn test_window_spans_company_abbreviations() {
        let text = "Acme Inc. could rally. MEME Corp. soars 40% as U.S. traders pile in.";
        assert_eq!(
            window_of(text, "MEME Corp. soars 40%"),
            "MEME Corp. soars 40% as U.S. traders pile in."
        );

        let hedged = "Shares of Acme Inc. may rise as ACME jumps 30% today.";
        assert_eq!(window_of(hedged, "ACME jumps 30%"), hedged);
        assert!(!HedgeFilter::default().check(&window_of(hedged, "ACME jumps 30%")).is_accept());
    }

    proptest! {
        #[test]
        fn prop_check_is_deterministic(s in "[a-zA-Z0-9 .%$]{0,80}") {
            let f = HedgeFilter::default();
            prop_assert_eq!(f.check(&s), f.check(&s));
        }

        #[test]
        fn prop_speculative_term_always_rejects(
            prefix in "[A-Z]{2,4} [a-z]{3,8}",
            idx in 0usize..SPECULATIVE_TERMS.len(),
        ) {
            let f = HedgeFilter::default();
            let text = format!("{} {} 30%", prefix, SPECULATIVE_TERMS[idx]);
            prop_assert!(!f.check(&text).is_accept());
        }
    }
}
