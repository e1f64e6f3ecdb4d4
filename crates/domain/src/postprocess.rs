//! Cleanup of raw model output before validation

const LEAD_INS: [&str; 6] = [
    "here's a post:",
    "here’s a post:",
    "here is a post:",
    "here's my post:",
    "generated post:",
    "post:",
];

/// Strip wrapping quotes, lead-in phrases and redundant whitespace that
/// models add around the post itself
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    loop {
        let before = text.len();

        for lead_in in LEAD_INS {
            if text
                .get(..lead_in.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(lead_in))
            {
                text = text[lead_in.len()..].trim_start().to_string();
            }
        }

        for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
            if text.len() > 1 && text.starts_with(open) && text.ends_with(close) {
                text = text[open.len_utf8()..text.len() - close.len_utf8()]
                    .trim()
                    .to_string();
            }
        }

        if text.len() == before {
            return text;
        }
    }
}

/// Shorten `text` to at most `limit` characters, preferring to cut after a
/// sentence (past 70% of the limit) or between words (past 80%)
pub fn fit_to_limit(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let cut: String = text.chars().take(limit).collect();
    let chars: Vec<char> = cut.chars().collect();

    let last_period = chars.iter().rposition(|c| matches!(c, '.' | '!' | '?'));
    let last_space = chars.iter().rposition(|c| c.is_whitespace());

    let keep = match (last_period, last_space) {
        (Some(p), _) if p as f64 > limit as f64 * 0.7 => p + 1,
        (_, Some(s)) if s as f64 > limit as f64 * 0.8 => s,
        _ => chars.len(),
    };

    chars[..keep].iter().collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_quotes_and_lead_ins() {
        assert_eq!(
            sanitize("Here's a post: \"Coffee first, then everything else.\""),
            "Coffee first, then everything else."
        );
        assert_eq!(sanitize("  'single quoted'  "), "single quoted");
        assert_eq!(sanitize("“curly quoted”"), "curly quoted");
    }

    #[test]
    fn test_sanitize_leaves_plain_text() {
        assert_eq!(
            sanitize("Rain again.\n\nGood day for reading."),
            "Rain again. Good day for reading."
        );
        assert_eq!(sanitize("\"Quote\" she said"), "\"Quote\" she said");
    }

    #[test]
    fn test_fit_to_limit_under_limit_is_untouched() {
        assert_eq!(fit_to_limit("short enough", 280), "short enough");
    }

    #[test]
    fn test_fit_to_limit_prefers_sentence_boundary() {
        let text = "First sentence is here. Second sentence runs on and on.";
        let fitted = fit_to_limit(text, 30);
        assert_eq!(fitted, "First sentence is here.");
    }

    #[test]
    fn test_fit_to_limit_falls_back_to_word_boundary() {
        let text = "one two three four five six seven eight nine ten";
        let fitted = fit_to_limit(text, 20);
        assert_eq!(fitted, "one two three four");
        assert!(fitted.chars().count() <= 20);
    }

    #[test]
    fn test_fit_to_limit_hard_cut() {
        let text = "a".repeat(50);
        assert_eq!(fit_to_limit(&text, 10).len(), 10);
    }
}
