//! Lexical pattern matcher.
//!
//! Scans text for `TICKER ... X%` movement claims using an ordered,
//! declarative list of templates. Each template is a (shape, polarity) pair:
//! the shape fixes the word order, the polarity selects which half of the
//! movement vocabulary fills the verb slot.
//!
//! Templates are tried in order and a span claimed by an earlier template is
//! never reported again by a later one.

use std::collections::HashSet;
use std::ops::Range;

use lazy_static::lazy_static;
use regex::{CaptureMatches, Captures, Regex};

use crate::core::types::Direction;

pub const UP_VERBS: &[&str] = &[
    "surge", "surges", "surged", "surging", "jump", "jumps", "jumped", "jumping", "soar",
    "soars", "soared", "soaring", "gain", "gains", "gained", "gaining", "rally", "rallies",
    "rallied", "rallying", "climb", "climbs", "climbed", "climbing", "rise", "rises", "rose",
    "rising", "spike", "spikes", "spiked", "spiking", "skyrocket", "skyrockets",
    "skyrocketed", "skyrocketing", "rocket", "rockets", "rocketed", "leap", "leaps", "leaped",
    "leapt",
];

pub const DOWN_VERBS: &[&str] = &[
    "plunge", "plunges", "plunged", "plunging", "crash", "crashes", "crashed", "crashing",
    "drop", "drops", "dropped", "dropping", "tumble", "tumbles", "tumbled", "tumbling",
    "sink", "sinks", "sank", "sunk", "sinking", "fall", "falls", "fell", "falling", "decline",
    "declines", "declined", "declining", "slide", "slides", "slid", "sliding", "slump",
    "slumps", "slumped", "slumping", "plummet", "plummets", "plummeted", "plummeting",
    "dive", "dives", "dived", "dove", "diving", "tank", "tanks", "tanked",
];

/// Nouns for "a 30% surge in AMD" phrasing.
pub const UP_NOUNS: &[&str] = &["surge", "jump", "gain", "rally", "climb", "rise", "spike", "leap"];
pub const DOWN_NOUNS: &[&str] = &[
    "plunge", "crash", "drop", "tumble", "fall", "decline", "slide", "slump", "plummet", "dive",
    "selloff", "sell-off",
];

/// Adverbs for "AMD shares up 25%" phrasing.
pub const UP_ADVERBS: &[&str] = &["up", "higher"];
pub const DOWN_ADVERBS: &[&str] = &["down", "lower"];

/// All-caps words that look like tickers but almost never are in headlines.
pub const TICKER_STOPLIST: &[&str] = &[
    "A", "I", "AI", "ALL", "AN", "AND", "ARE", "AS", "AT", "BE", "BEST", "BIG", "BY", "CAN",
    "CEO", "CFO", "CPI", "DOW", "EPS", "ETF", "EU", "EV", "FED", "FOR", "FROM", "GDP", "GO",
    "HAS", "HOT", "HOW", "IF", "IN", "IPO", "IS", "IT", "JUST", "ME", "MORE", "MOST", "MY",
    "NEW", "NO", "NOW", "OF", "ON", "ONE", "OR", "OUT", "OVER", "SEC", "SO", "THAT", "THE",
    "THIS", "TO", "TOP", "TWO", "UK", "UP", "US", "USA", "WALL", "WE", "WHAT", "WHY", "WITH",
];

/// Magnitude qualifiers between the verb and the number. "up to 40%" is
/// read as a claim of 40%.
const QUALIFIERS: &str = r"(?:(?i:by|up\s+to|as\s+much\s+as|over|more\s+than|nearly|almost|about|around|roughly|some|another)\s+)*";
const PERCENT: &str = r"[+-]?(?P<pct>\d{1,4}(?:\.\d+)?)\s*(?:%|(?i:per\s?cent)\b)";
const SUBJECT: &str = r"(?:\s+(?i:stock|stocks|shares))?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// `NVDA stock jumps 45%`, `Tesla (TSLA) plunges by 30%`
    TickerVerb,
    /// `$GME soars 60%`, `$GME up 60%`
    Cashtag,
    /// `AMD shares up 25%`
    TickerAdverb,
    /// `a 30% surge in AMD`, `25% drop for shares of INTC`
    PercentNoun,
}

impl Shape {
    fn name(&self) -> &'static str {
        match self {
            Shape::TickerVerb => "ticker-verb",
            Shape::Cashtag => "cashtag",
            Shape::TickerAdverb => "ticker-adverb",
            Shape::PercentNoun => "percent-noun",
        }
    }

    fn vocabulary(&self, polarity: Direction) -> Vec<&'static str> {
        let (verbs, adverbs, nouns) = match polarity {
            Direction::Up => (UP_VERBS, UP_ADVERBS, UP_NOUNS),
            Direction::Down => (DOWN_VERBS, DOWN_ADVERBS, DOWN_NOUNS),
        };
        match self {
            Shape::TickerVerb => verbs.to_vec(),
            Shape::Cashtag => verbs.iter().chain(adverbs).copied().collect(),
            Shape::TickerAdverb => adverbs.to_vec(),
            Shape::PercentNoun => nouns.to_vec(),
        }
    }

    fn pattern(&self, polarity: Direction) -> String {
        let mut words = self.vocabulary(polarity);
        // longest first so "surges" is preferred over "surge"
        words.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        let alternation = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        let verb = format!(r"(?P<verb>(?i:{alternation}))\b");

        match self {
            Shape::TickerVerb => format!(
                r"\b(?P<ticker>[A-Z]{{1,5}})\b\)?{SUBJECT}\s+(?:(?i:has|have|had)\s+)?{verb}\s+{QUALIFIERS}{PERCENT}"
            ),
            Shape::Cashtag => format!(
                r"\$(?P<ticker>[A-Z]{{1,5}})\b{SUBJECT}\s+{verb}\s+{QUALIFIERS}{PERCENT}"
            ),
            Shape::TickerAdverb => format!(
                r"\b(?P<ticker>[A-Z]{{1,5}})\b\)?{SUBJECT}\s+{verb}\s+{QUALIFIERS}{PERCENT}"
            ),
            Shape::PercentNoun => format!(
                r"{PERCENT}\s+{verb}\s+(?i:in|for|at|of)\s+(?:(?i:shares|stock)\s+(?i:of|in)\s+)?\$?(?P<ticker>[A-Z]{{1,5}})\b"
            ),
        }
    }
}

const SHAPE_ORDER: [Shape; 4] = [
    Shape::TickerVerb,
    Shape::Cashtag,
    Shape::TickerAdverb,
    Shape::PercentNoun,
];

/// One surface template: a compiled shape bound to a polarity.
#[derive(Debug)]
pub struct Template {
    pub name: &'static str,
    pub polarity: Direction,
    pub regex: Regex,
}

fn build_templates() -> Vec<Template> {
    let mut out = Vec::with_capacity(SHAPE_ORDER.len() * 2);
    for shape in SHAPE_ORDER {
        for polarity in [Direction::Up, Direction::Down] {
            out.push(Template {
                name: shape.name(),
                polarity,
                regex: Regex::new(&shape.pattern(polarity)).unwrap(),
            });
        }
    }
    out
}

lazy_static! {
    static ref DEFAULT_TEMPLATES: Vec<Template> = build_templates();
}

/// A ticker/percentage/direction triple found in text, before any filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatch {
    pub span: String,
    pub range: Range<usize>,
    pub ticker: String,
    pub percentage: f64,
    pub direction: Direction,
    pub template: &'static str,
}

pub struct PatternMatcher {
    templates: &'static [Template],
    stoplist: HashSet<String>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl PatternMatcher {
    pub fn new(extra_stopwords: &[String]) -> Self {
        let stoplist = TICKER_STOPLIST
            .iter()
            .map(|s| s.to_string())
            .chain(extra_stopwords.iter().map(|s| s.trim().to_uppercase()))
            .collect();
        Self {
            templates: DEFAULT_TEMPLATES.as_slice(),
            stoplist,
        }
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stoplist.contains(token)
    }

    /// Lazily yields matches for `text`. The sequence is finite and cannot be
    /// restarted; call again for a new pass.
    pub fn matches<'m, 't>(&'m self, text: &'t str) -> Matches<'m, 't> {
        Matches {
            matcher: self,
            text,
            next_template: 0,
            current: None,
            consumed: Vec::new(),
        }
    }
}

pub struct Matches<'m, 't> {
    matcher: &'m PatternMatcher,
    text: &'t str,
    next_template: usize,
    current: Option<(&'m Template, CaptureMatches<'m, 't>)>,
    consumed: Vec<Range<usize>>,
}

impl<'m, 't> Matches<'m, 't> {
    fn accept(&mut self, template: &'m Template, caps: &Captures<'t>) -> Option<RawMatch> {
        let whole = caps.get(0)?;
        let range = whole.range();
        if self
            .consumed
            .iter()
            .any(|r| r.start < range.end && range.start < r.end)
        {
            return None;
        }

        let ticker = caps.name("ticker")?.as_str();
        if self.matcher.is_stopword(ticker) {
            return None;
        }

        let pct = caps.name("pct")?;
        // "1,200%" must not read as 200%
        if preceded_by_number(self.text, pct.start()) {
            return None;
        }
        let percentage: f64 = pct.as_str().parse().ok()?;
        if !percentage.is_finite() || percentage <= 0.0 {
            return None;
        }

        self.consumed.push(range.clone());
        Some(RawMatch {
            span: whole.as_str().to_string(),
            range,
            ticker: ticker.to_string(),
            percentage,
            direction: template.polarity,
            template: template.name,
        })
    }
}

impl<'m, 't> Iterator for Matches<'m, 't> {
    type Item = RawMatch;

    fn next(&mut self) -> Option<RawMatch> {
        loop {
            if self.current.is_none() {
                let template = self.matcher.templates.get(self.next_template)?;
                self.next_template += 1;
                self.current = Some((template, template.regex.captures_iter(self.text)));
            }

            let (template, caps) = match self.current.as_mut() {
                Some((template, iter)) => (*template, iter.next()),
                None => continue,
            };
            match caps {
                Some(caps) => {
                    if let Some(m) = self.accept(template, &caps) {
                        return Some(m);
                    }
                }
                None => self.current = None,
            }
        }
    }
}

fn preceded_by_number(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_digit() || c == ',' || c == '.')
}
