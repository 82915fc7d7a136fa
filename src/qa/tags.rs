use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{codes, Findings, UnitView};
use crate::ir::{Severity, TranslationSegment};
use crate::sentinels::{tag_occurrences, TagOccurrence};
use crate::settings::TagSettings;

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9A-Fa-f]+|#[0-9]+|[A-Za-z][A-Za-z0-9]*)(;?)").expect("entity regex")
});

const KNOWN_ENTITIES: &[&str] = &[
    "amp", "lt", "gt", "quot", "apos", "nbsp", "copy", "reg", "trade", "hellip", "mdash", "ndash",
    "laquo", "raquo", "lsquo", "rsquo", "ldquo", "rdquo", "euro", "deg", "shy",
];

fn report_undefined(segment: &TranslationSegment, source_side: bool, out: &mut Findings<'_>) {
    let undefined = segment.undefined_tag_ids();
    if undefined.is_empty() {
        return;
    }
    for occ in tag_occurrences(&segment.text) {
        if !undefined.contains(&occ.id) {
            continue;
        }
        let range = [(occ.start, occ.end)];
        let (src, tgt): (&[(usize, usize)], &[(usize, usize)]) = if source_side {
            (&range, &[])
        } else {
            (&[], &range)
        };
        out.push(
            codes::TAG_UNDEFINED,
            Severity::Error,
            format!("Tag {} has no definition", occ.id),
            src,
            tgt,
        );
    }
}

/// Undefined tag references are reported whatever the tag settings say.
pub(super) fn check_undefined(view: &UnitView<'_>, out: &mut Findings<'_>) {
    report_undefined(&view.unit.source, true, out);
    report_undefined(&view.unit.target, false, out);
}

/// Whitespace directly before/after the token, looking through adjacent tokens.
fn spacing_around(text: &str, occ: &TagOccurrence, all: &[TagOccurrence]) -> (bool, bool) {
    let mut start = occ.start;
    while let Some(prev) = all.iter().find(|o| o.end == start) {
        start = prev.start;
    }
    let mut end = occ.end;
    while let Some(next) = all.iter().find(|o| o.start == end) {
        end = next.end;
    }
    let before = text[..start].chars().next_back().map(char::is_whitespace).unwrap_or(false);
    let after = text[end..].chars().next().map(char::is_whitespace).unwrap_or(false);
    (before, after)
}

pub(super) fn check(view: &UnitView<'_>, s: &TagSettings, out: &mut Findings<'_>) {
    let src_text = &view.unit.source.text;
    let tgt_text = &view.unit.target.text;
    let src = tag_occurrences(src_text);
    let tgt = tag_occurrences(tgt_text);

    if s.check_count {
        let mut left: HashMap<&str, usize> = HashMap::new();
        for o in &tgt {
            *left.entry(o.id.as_str()).or_insert(0) += 1;
        }
        for o in &src {
            match left.get_mut(o.id.as_str()) {
                Some(n) if *n > 0 => *n -= 1,
                _ => out.push(
                    codes::TAG_MISSING,
                    Severity::Error,
                    format!("Tag {} missing from target", o.id),
                    &[(o.start, o.end)],
                    &[],
                ),
            }
        }
        let mut left: HashMap<&str, usize> = HashMap::new();
        for o in &src {
            *left.entry(o.id.as_str()).or_insert(0) += 1;
        }
        for o in &tgt {
            match left.get_mut(o.id.as_str()) {
                Some(n) if *n > 0 => *n -= 1,
                _ => out.push(
                    codes::TAG_EXTRA,
                    Severity::Error,
                    format!("Tag {} not present in source", o.id),
                    &[],
                    &[(o.start, o.end)],
                ),
            }
        }
    }

    if s.check_order {
        // Compare only the ids both sides share, so a missing tag is not also an order error.
        let shared: Vec<&str> = src
            .iter()
            .map(|o| o.id.as_str())
            .filter(|id| tgt.iter().any(|t| t.id == *id))
            .collect();
        let tgt_shared: Vec<&TagOccurrence> = tgt
            .iter()
            .filter(|t| src.iter().any(|o| o.id == t.id))
            .collect();
        let tgt_ids: Vec<&str> = tgt_shared.iter().map(|o| o.id.as_str()).collect();
        if shared.len() == tgt_ids.len() && shared != tgt_ids {
            let ranges: Vec<_> = tgt_shared.iter().map(|o| (o.start, o.end)).collect();
            out.push(
                codes::TAG_ORDER,
                Severity::Warning,
                "Tags are in a different order than in source",
                &[],
                &ranges,
            );
        }
    }

    if s.check_spacing {
        for o in &tgt {
            let (before, after) = spacing_around(tgt_text, o, &tgt);
            if !(before && after) {
                continue;
            }
            let same_in_source = src
                .iter()
                .find(|x| x.id == o.id)
                .map(|x| spacing_around(src_text, x, &src) == (true, true))
                .unwrap_or(false);
            if !same_in_source {
                out.push(
                    codes::TAG_SPACING,
                    Severity::Warning,
                    format!("Whitespace on both sides of tag {}", o.id),
                    &[],
                    &[(o.start, o.end)],
                );
            }
        }
    }

    if s.check_spacing_parity {
        for o in &tgt {
            let Some(x) = src.iter().find(|x| x.id == o.id) else {
                continue;
            };
            let (sb, sa) = spacing_around(src_text, x, &src);
            let (tb, ta) = spacing_around(tgt_text, o, &tgt);
            if (sb, sa) != (tb, ta) {
                out.push(
                    codes::TAG_SPACING_PARITY,
                    Severity::Info,
                    format!("Spacing around tag {} differs from source", o.id),
                    &[(x.start, x.end)],
                    &[(o.start, o.end)],
                );
            }
        }
    }

    if s.check_entities {
        for c in ENTITY_RE.captures_iter(tgt_text) {
            let (Some(whole), Some(name)) = (c.get(0), c.get(1)) else {
                continue;
            };
            if src_text.contains(whole.as_str()) {
                continue;
            }
            let closed = c.get(2).map(|g| !g.as_str().is_empty()).unwrap_or(false);
            let name = name.as_str();
            let numeric = name.starts_with('#');
            let known = KNOWN_ENTITIES.contains(&name);
            let malformed = if closed { !numeric && !known } else { numeric || known };
            if malformed {
                out.push(
                    codes::MALFORMED_ENTITY,
                    Severity::Warning,
                    format!("Malformed entity: {}", whole.as_str()),
                    &[],
                    &[(whole.start(), whole.end())],
                );
            }
        }
    }
}
