use deunicode::deunicode;
use regex::Regex;

/// Prepares article text for pattern matching.
///
/// Case is preserved (tickers are recognised by being all-caps) and line
/// breaks are kept because they separate headline from body.
pub fn normalize_for_matching(text: &str) -> String {
    lazy_static::lazy_static! {
        static ref URL_RE: Regex = Regex::new(r"https?://\S+").unwrap();
    }

    // curly quotes, non-breaking spaces, accents -> ascii
    let ascii = deunicode(text);
    let no_url = URL_RE.replace_all(&ascii, "");

    no_url
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Key used to recognise the same article collected twice.
pub fn canonical_url(url: &str) -> String {
    let trimmed = url.trim();
    let no_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    no_fragment.trim_end_matches('/').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_keeps_case_and_lines() {
        let raw = "NVDA\u{00a0}stock  jumps 45%\n\n  After   earnings https://t.co/abc beat ";
        assert_eq!(
            normalize_for_matching(raw),
            "NVDA stock jumps 45%\nAfter earnings beat"
        );
    }

    #[test]
    fn test_normalize_folds_unicode_punctuation() {
        let raw = "AMD\u{2019}s rally: AMD soars 30%";
        let out = normalize_for_matching(raw);
        assert_eq!(out, "AMD's rally: AMD soars 30%");
    }

    #[test]
    fn test_canonical_url() {
        assert_eq!(
            canonical_url(" https://Example.com/a/b/#frag "),
            "https://example.com/a/b"
        );
        assert_eq!(canonical_url("https://x.com/n?id=1"), "https://x.com/n?id=1");
    }
}
