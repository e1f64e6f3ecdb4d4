//! Source text cleanup before it is used as generation input

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::model::SourcePost;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]*>").expect("Valid regex"));

static HTML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("Valid regex")
});

// `\B` keeps the `@` of e-mail addresses, which follows a word character.
static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\B@\w+(?:[.\-]\w+)*").expect("Valid regex"));

static SHORTCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":[a-zA-Z][a-zA-Z0-9_+\-]*:").expect("Valid regex"));

/// Clean raw post text: HTML, mentions, emoji, control characters and
/// redundant whitespace are removed. May return an empty string.
pub fn clean(raw: &str) -> String {
    let decoded = decode_entities(raw);
    let without_html = strip_html(&decoded);
    let without_mentions = MENTION.replace_all(&without_html, "");
    let without_shortcodes = SHORTCODE.replace_all(&without_mentions, "");

    let printable: String = without_shortcodes
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control() && !is_emoji(*c))
        .collect();

    let cleaned = printable.split_whitespace().collect::<Vec<_>>().join(" ");

    tracing::trace!(original = %raw, cleaned = %cleaned, "Cleaned source text");

    cleaned
}

/// Clean every post and keep at most `max_samples` non-empty texts
pub fn clean_all(posts: &[SourcePost], max_samples: usize) -> Vec<String> {
    posts
        .iter()
        .map(|post| clean(&post.text))
        .filter(|text| !text.is_empty())
        .take(max_samples)
        .collect()
}

fn strip_html(text: &str) -> String {
    // Removing one tag can join the halves of another (`<<b>b>`), so repeat
    // until nothing matches.
    let mut current = text.to_string();
    loop {
        let next = HTML_TAG.replace_all(&current, " ");
        if next == current {
            return current;
        }
        current = next.into_owned();
    }
}

fn decode_entities(text: &str) -> String {
    HTML_ENTITY
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        _ => return None,
    };
    Some(c)
}

/// Pictographic symbols plus the joiners and modifiers that build emoji sequences
pub(crate) fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF      // mahjong..symbols & pictographs extended-a
            | 0x2600..=0x27BF  // misc symbols, dingbats
            | 0x2300..=0x23FF  // misc technical (⌚, ⏰)
            | 0x2B00..=0x2BFF  // arrows, stars (⭐)
            | 0x2190..=0x21FF  // arrows
            | 0x00A9 | 0x00AE  // ©, ®
            | 0x2122 | 0x2139  // ™, ℹ
            | 0x3030 | 0x303D | 0x3297 | 0x3299
            | 0x200D           // zero width joiner
            | 0x20E3           // combining keycap
            | 0xFE00..=0xFE0F  // variation selectors
            | 0xE0020..=0xE007F // tag characters
    )
}
