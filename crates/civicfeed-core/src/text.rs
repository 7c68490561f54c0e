//! Text sanitization for user- and feed-supplied strings.
//!
//! Feed descriptions routinely carry HTML fragments, entity-escaped markup and
//! runs of blank lines. Everything stored in an event record goes through
//! these helpers first.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Title used when an entry has no usable title.
pub const DEFAULT_TITLE: &str = "Civic Event";

/// Maximum stored description length, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Script and style blocks, contents included.
static SCRIPT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("Invalid script regex")
});

static STYLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("Invalid style regex")
});

/// Any remaining tag, including comments and doctype.
static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"));

static ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});")
        .expect("Invalid entity regex")
});

/// Removes markup from `s`.
///
/// Script/style blocks are dropped with their contents, tags are replaced by
/// a space and HTML entities are decoded. Tags are stripped again after
/// decoding so entity-escaped markup does not survive.
pub fn strip_markup(s: &str) -> String {
    let without_blocks = SCRIPT_REGEX.replace_all(s, " ");
    let without_blocks = STYLE_REGEX.replace_all(&without_blocks, " ");
    let without_tags = TAG_REGEX.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    TAG_REGEX.replace_all(&decoded, " ").into_owned()
}

fn decode_entities(s: &str) -> String {
    ENTITY_REGEX
        .replace_all(s, |caps: &Captures<'_>| {
            let name = &caps[1];
            decode_entity(name).map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = name.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        "hellip" => Some('\u{2026}'),
        _ => None,
    }
}

/// Collapses every whitespace run (newlines included) into a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates `s` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Produces a display title, falling back to [`DEFAULT_TITLE`].
pub fn sanitize_title(raw: Option<&str>) -> String {
    let title = raw.map(|t| collapse_whitespace(&strip_markup(t))).unwrap_or_default();
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

/// Produces a stored description, or `None` if nothing is left.
pub fn sanitize_description(raw: &str) -> Option<String> {
    let text = collapse_whitespace(&strip_markup(raw));
    let text = truncate_chars(&text, MAX_DESCRIPTION_CHARS);
    let text = text.trim_end();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Returns the first denylisted term contained in `text`, case-insensitively.
pub fn find_denied_term<'a, S: AsRef<str>>(text: &str, terms: &'a [S]) -> Option<&'a str> {
    let haystack = text.to_lowercase();
    terms
        .iter()
        .map(AsRef::as_ref)
        .find(|term| !term.is_empty() && haystack.contains(&term.to_lowercase()))
}
