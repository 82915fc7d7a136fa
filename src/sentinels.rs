use once_cell::sync::Lazy;
use regex::Regex;

pub const TAG_ID_MAX_LEN: usize = 64;

/// Inline tag placeholder: `<<TAG:id>>`.
pub static TAG_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<TAG:([A-Za-z0-9_.:\-]{1,64})>>").expect("tag token regex"));

// Anything that looks like a tag token, including malformed ids. Used by cleanup to find
// broken placeholders left over by manual edits.
pub static ANY_TAG_LIKE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<TAG:[^<>]{0,80}>>").expect("tag-like regex"));

pub fn tag_token(id: &str) -> String {
    format!("<<TAG:{id}>>")
}

pub fn is_valid_tag_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= TAG_ID_MAX_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
}

/// Tag ids in order of appearance (duplicates kept).
pub fn tag_ids_from_text(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }
    TAG_TOKEN_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagOccurrence {
    pub id: String,
    /// Byte range of the whole token.
    pub start: usize,
    pub end: usize,
}

pub fn tag_occurrences(text: &str) -> Vec<TagOccurrence> {
    TAG_TOKEN_RE
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let id = c.get(1)?;
            Some(TagOccurrence {
                id: id.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

#[inline]
pub fn is_tag_token(s: &str) -> bool {
    TAG_TOKEN_RE
        .find(s)
        .map(|m| m.start() == 0 && m.end() == s.len())
        .unwrap_or(false)
}
