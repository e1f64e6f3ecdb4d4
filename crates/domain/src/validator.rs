//! Quality and safety checks for generated posts
//!
//! Every rule runs on every candidate; the verdict lists all violated rules so
//! operators can see why a post was dropped and tune thresholds.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use crate::model::{RejectionReason, Verdict};

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("Valid regex"));

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://\S+$").expect("Valid regex"));

const MONEY_EMOJI: [char; 5] = ['💰', '💵', '💴', '💶', '💷'];

/// Validator thresholds and keyword lists
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Minimum length of a trimmed post, in characters
    pub min_length: usize,
    pub max_exclamations: usize,
    pub max_questions: usize,
    /// Highest tolerated share of punctuation among non-space characters
    pub max_punctuation_ratio: f64,
    pub max_urls: usize,
    /// Posts longer than this are checked for shouting
    pub all_caps_min_length: usize,
    /// Highest tolerated share of a single token or character
    pub max_dominance: f64,
    /// How often one 3-word phrase may appear
    pub max_phrase_repeats: usize,
    pub placeholders: Vec<String>,
    pub spam_keywords: Vec<String>,
    pub harmful_keywords: Vec<String>,
    pub error_markers: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_exclamations: 3,
            max_questions: 3,
            max_punctuation_ratio: 0.2,
            max_urls: 2,
            all_caps_min_length: 20,
            max_dominance: 0.5,
            max_phrase_repeats: 2,
            placeholders: strings(&[
                "lorem ipsum",
                "[placeholder]",
                "todo",
                "xxx",
                "test test",
                "sample text",
                "example post",
                "generated text",
                "{{",
                "[insert",
                "as an ai",
            ]),
            spam_keywords: strings(&[
                "click here",
                "follow me",
                "check out",
                "dm me",
                "buy now",
                "bit.ly",
                "crypto",
                "nft",
                "airdrop",
            ]),
            harmful_keywords: strings(&[
                "kill",
                "die",
                "suicide",
                "harm yourself",
                "hate",
                "racist",
                "bigot",
            ]),
            error_markers: strings(&[
                "error:",
                "exception:",
                "traceback",
                "stack trace",
                "failed to generate",
            ]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Precomputed views of one candidate shared by all rules
struct Candidate<'a> {
    trimmed: &'a str,
    lower: String,
    char_count: usize,
    char_limit: usize,
}

type Check = fn(&ContentValidator, &Candidate<'_>) -> bool;

/// Ordered rule table; evaluated in full for every candidate
const RULES: &[(RejectionReason, Check)] = &[
    (RejectionReason::Empty, ContentValidator::is_empty),
    (RejectionReason::TooShort, ContentValidator::is_too_short),
    (RejectionReason::TooLong, ContentValidator::is_too_long),
    (RejectionReason::Repetitive, ContentValidator::is_repetitive),
    (RejectionReason::Placeholder, ContentValidator::has_placeholder),
    (
        RejectionReason::ExcessivePunctuation,
        ContentValidator::has_excessive_punctuation,
    ),
    (RejectionReason::AllCaps, ContentValidator::is_all_caps),
    (RejectionReason::TooManyUrls, ContentValidator::has_too_many_urls),
    (RejectionReason::BareUrl, ContentValidator::is_bare_url),
    (RejectionReason::Spam, ContentValidator::is_spam),
    (RejectionReason::Harmful, ContentValidator::is_harmful),
    (RejectionReason::ErrorMessage, ContentValidator::looks_like_error),
];

/// Content validator for generated posts
pub struct ContentValidator {
    config: ValidatorConfig,
    placeholders: Vec<Regex>,
    spam: Vec<Regex>,
    harmful: Vec<Regex>,
    error_markers: Vec<Regex>,
}

impl ContentValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            placeholders: compile_markers(&config.placeholders),
            spam: compile_markers(&config.spam_keywords),
            harmful: compile_markers(&config.harmful_keywords),
            error_markers: compile_markers(&config.error_markers),
            config,
        }
    }

    /// Run every rule against `text` and collect the violated ones
    pub fn validate(&self, text: &str, char_limit: usize) -> Verdict {
        let trimmed = text.trim();
        let candidate = Candidate {
            trimmed,
            lower: trimmed.to_lowercase(),
            char_count: trimmed.chars().count(),
            char_limit,
        };

        let reasons: BTreeSet<RejectionReason> = RULES
            .iter()
            .filter(|(_, check)| check(self, &candidate))
            .map(|(reason, _)| *reason)
            .collect();

        Verdict::from_reasons(reasons)
    }

    fn is_empty(&self, c: &Candidate<'_>) -> bool {
        c.trimmed.is_empty()
    }

    fn is_too_short(&self, c: &Candidate<'_>) -> bool {
        !c.trimmed.is_empty() && c.char_count < self.config.min_length
    }

    fn is_too_long(&self, c: &Candidate<'_>) -> bool {
        c.char_count > c.char_limit
    }

    fn is_repetitive(&self, c: &Candidate<'_>) -> bool {
        if c.trimmed.is_empty() {
            return false;
        }

        let words: Vec<&str> = c
            .lower
            .split_whitespace()
            .map(|w| w.trim_matches(|ch: char| !ch.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .collect();

        if words.len() > 5 {
            let mut phrases: HashMap<[&str; 3], usize> = HashMap::new();
            for window in words.windows(3) {
                let count = phrases.entry([window[0], window[1], window[2]]).or_default();
                *count += 1;
                if *count > self.config.max_phrase_repeats {
                    return true;
                }
            }
        }

        if words.len() >= 4 && dominant_share(words.iter().copied()) > self.config.max_dominance
        {
            return true;
        }

        let alnum: Vec<char> = c.lower.chars().filter(|ch| ch.is_alphanumeric()).collect();
        if alnum.is_empty() {
            return true;
        }
        alnum.len() >= self.config.min_length
            && dominant_share(alnum.iter().copied()) > self.config.max_dominance
    }

    fn has_placeholder(&self, c: &Candidate<'_>) -> bool {
        any_match(&self.placeholders, &c.lower)
    }

    fn has_excessive_punctuation(&self, c: &Candidate<'_>) -> bool {
        let exclamations = c.trimmed.matches('!').count();
        let questions = c.trimmed.matches('?').count();
        if exclamations > self.config.max_exclamations || questions > self.config.max_questions
        {
            return true;
        }

        // URLs are mostly punctuation; leave them to the URL rules
        let without_urls = URL.replace_all(c.trimmed, "");
        let visible: Vec<char> = without_urls.chars().filter(|ch| !ch.is_whitespace()).collect();
        if visible.is_empty() {
            return false;
        }
        let punctuation = visible.iter().filter(|ch| is_punctuation(**ch)).count();
        punctuation as f64 / visible.len() as f64 > self.config.max_punctuation_ratio
    }

    fn is_all_caps(&self, c: &Candidate<'_>) -> bool {
        if c.char_count <= self.config.all_caps_min_length {
            return false;
        }
        let mut letters = c.trimmed.chars().filter(|ch| ch.is_alphabetic()).peekable();
        letters.peek().is_some() && letters.all(|ch| ch.is_uppercase())
    }

    fn has_too_many_urls(&self, c: &Candidate<'_>) -> bool {
        URL.find_iter(c.trimmed).count() > self.config.max_urls
    }

    fn is_bare_url(&self, c: &Candidate<'_>) -> bool {
        BARE_URL.is_match(c.trimmed)
    }

    fn is_spam(&self, c: &Candidate<'_>) -> bool {
        any_match(&self.spam, &c.lower) || c.trimmed.chars().any(|ch| MONEY_EMOJI.contains(&ch))
    }

    fn is_harmful(&self, c: &Candidate<'_>) -> bool {
        any_match(&self.harmful, &c.lower)
    }

    fn looks_like_error(&self, c: &Candidate<'_>) -> bool {
        any_match(&self.error_markers, &c.lower)
    }
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

/// Case-insensitive literal matchers, anchored on word boundaries where the
/// marker itself starts or ends with a word character ("todo" must not match
/// "mastodon").
fn compile_markers(markers: &[String]) -> Vec<Regex> {
    markers
        .iter()
        .filter(|m| !m.trim().is_empty())
        .filter_map(|marker| {
            let marker = marker.trim().to_lowercase();
            let starts_word = marker.chars().next().is_some_and(is_word_char);
            let ends_word = marker.chars().last().is_some_and(is_word_char);
            let pattern = format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(&marker),
                if ends_word { r"\b" } else { "" },
            );
            match Regex::new(&pattern) {
                Ok(regex) => Some(regex),
                Err(error) => {
                    tracing::warn!(marker = %marker, error = %error, "Invalid validator marker");
                    None
                }
            }
        })
        .collect()
}

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_punctuation(c: char) -> bool {
    (c.is_ascii_punctuation() && c != '\'') || matches!(c, '…' | '‼' | '⁉')
}

/// Share of the most frequent item
fn dominant_share<T: std::hash::Hash + Eq>(items: impl Iterator<Item = T>) -> f64 {
    let mut counts: HashMap<T, usize> = HashMap::new();
    let mut total = 0usize;
    for item in items {
        *counts.entry(item).or_default() += 1;
        total += 1;
    }
    match counts.values().max() {
        Some(max) if total > 0 => *max as f64 / total as f64,
        _ => 0.0,
    }
}
