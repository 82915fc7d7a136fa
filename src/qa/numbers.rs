use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::{codes, Findings, UnitView};
use crate::ir::Severity;
use crate::settings::{MeasurementSettings, NumberSettings, QaSettings, SpacingMode};
use crate::textutil::{MappedText, MatchOptions, TermMatcher};

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+(?:[.,'\u{00A0}\u{202F}]\d+)*").expect("number regex")
});
static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.,'\u{00A0}\u{202F}]").expect("separator regex"));
static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d([ \u{00A0}\u{202F}]*)([-–—])([ \u{00A0}\u{202F}]*)\d").expect("range regex")
});

#[derive(Clone, Debug)]
struct NumberToken {
    raw: String,
    /// Digit characters only; "1,000.5" and "1 000,5" share a key. Digits of other scripts
    /// are kept as they are, so "١٢" never matches "34".
    key: String,
    range: (usize, usize),
}

fn number_tokens(text: &MappedText) -> Vec<NumberToken> {
    NUMBER_RE
        .find_iter(&text.text)
        .map(|m| NumberToken {
            raw: m.as_str().to_string(),
            key: m.as_str().chars().filter(|c| c.is_numeric()).collect(),
            range: text.origin(m.start(), m.end()),
        })
        .collect()
}

fn gap_ok(mode: SpacingMode, gap: &str) -> bool {
    match mode {
        SpacingMode::Ignore => true,
        SpacingMode::NoSpace => gap.is_empty(),
        SpacingMode::Space => gap == " ",
        SpacingMode::Nbsp => gap == "\u{00A0}" || gap == "\u{202F}",
    }
}

pub(super) struct CompiledNumbers {
    measurement_re: Option<Regex>,
    number_words: Vec<(String, TermMatcher)>,
}

impl CompiledNumbers {
    pub fn new(m: &MeasurementSettings, n: &NumberSettings) -> Self {
        let mut units: Vec<&String> = m.units.iter().filter(|u| !u.trim().is_empty()).collect();
        units.sort_by(|a, b| b.len().cmp(&a.len()));
        let measurement_re = if units.is_empty() {
            None
        } else {
            let alts: Vec<String> = units.iter().map(|u| regex::escape(u)).collect();
            let pattern = format!(r"\d([ \t\u{{00A0}}\u{{202F}}]*)({})", alts.join("|"));
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    warn!(error = %err, "skipping measurement units");
                    None
                }
            }
        };
        let opts = MatchOptions {
            whole_word: true,
            ..MatchOptions::default()
        };
        let number_words = n
            .number_words
            .iter()
            .filter_map(|w| {
                let digits: String = w.digits.chars().filter(char::is_ascii_digit).collect();
                match TermMatcher::new(&w.word, opts) {
                    Ok(m) if !digits.is_empty() => Some((digits, m)),
                    Ok(_) => None,
                    Err(err) => {
                        warn!(word = %w.word, error = %err, "skipping number word");
                        None
                    }
                }
            })
            .collect();
        Self {
            measurement_re,
            number_words,
        }
    }

    pub fn check(&self, view: &UnitView<'_>, s: &QaSettings, out: &mut Findings<'_>) {
        if s.measurements.enabled {
            self.check_measurements(view, &s.measurements, out);
        }
        if s.numbers.enabled {
            self.check_numbers(view, &s.numbers, out);
        }
    }

    /// `(unit, gap, byte range of number end..unit end)` for measurements in `text`.
    fn measurements(&self, text: &str) -> Vec<(String, String, (usize, usize))> {
        let Some(re) = &self.measurement_re else {
            return vec![];
        };
        re.captures_iter(text)
            .filter_map(|c| {
                let whole = c.get(0)?;
                let unit = c.get(2)?;
                let next = text[whole.end()..].chars().next();
                if next.map(char::is_alphanumeric).unwrap_or(false) {
                    return None;
                }
                Some((
                    unit.as_str().to_string(),
                    c.get(1).map(|g| g.as_str().to_string()).unwrap_or_default(),
                    (whole.start(), whole.end()),
                ))
            })
            .collect()
    }

    fn check_measurements(&self, view: &UnitView<'_>, s: &MeasurementSettings, out: &mut Findings<'_>) {
        let src = self.measurements(&view.src_joined.text);
        let tgt = self.measurements(&view.tgt_joined.text);

        let bad: Vec<_> = tgt
            .iter()
            .filter(|(_, gap, _)| !gap_ok(s.spacing, gap))
            .map(|(_, _, (a, b))| view.tgt_joined.origin(*a, *b))
            .collect();
        if !bad.is_empty() {
            out.push(
                codes::MEASUREMENT_SPACING,
                Severity::Warning,
                "Wrong spacing between number and unit",
                &[],
                &bad,
            );
        }

        if s.check_units_kept {
            let mut available: HashMap<&str, usize> = HashMap::new();
            for (unit, _, _) in &tgt {
                *available.entry(unit.as_str()).or_insert(0) += 1;
            }
            for (unit, _, (a, b)) in &src {
                match available.get_mut(unit.as_str()) {
                    Some(n) if *n > 0 => *n -= 1,
                    _ => out.push(
                        codes::MEASUREMENT_UNIT,
                        Severity::Warning,
                        format!("Unit {unit} missing from target"),
                        &[view.src_joined.origin(*a, *b)],
                        &[],
                    ),
                }
            }
        }
    }

    fn check_numbers(&self, view: &UnitView<'_>, s: &NumberSettings, out: &mut Findings<'_>) {
        let src = number_tokens(&view.src_words);
        let tgt = number_tokens(&view.tgt_words);

        if s.check_values {
            let mut available: HashMap<&str, usize> = HashMap::new();
            for t in &tgt {
                *available.entry(t.key.as_str()).or_insert(0) += 1;
            }
            let mut spelled: HashMap<&str, usize> = HashMap::new();
            for (digits, m) in &self.number_words {
                *spelled.entry(digits.as_str()).or_insert(0) += m.count(&view.tgt_words.text);
            }
            let mut missing = Vec::new();
            for t in &src {
                if let Some(n) = available.get_mut(t.key.as_str()).filter(|n| **n > 0) {
                    *n -= 1;
                } else if let Some(n) = spelled.get_mut(t.key.as_str()).filter(|n| **n > 0) {
                    *n -= 1;
                } else {
                    missing.push(t);
                }
            }
            for t in missing {
                out.push(
                    codes::NUMBER_MISSING,
                    Severity::Error,
                    format!("Number {} missing from target", t.raw),
                    &[t.range],
                    &[],
                );
            }
            let mut left: HashMap<&str, usize> = HashMap::new();
            for t in &src {
                *left.entry(t.key.as_str()).or_insert(0) += 1;
            }
            for t in &tgt {
                match left.get_mut(t.key.as_str()) {
                    Some(n) if *n > 0 => *n -= 1,
                    _ => out.push(
                        codes::NUMBER_EXTRA,
                        Severity::Warning,
                        format!("Number {} not found in source", t.raw),
                        &[],
                        &[t.range],
                    ),
                }
            }
        }

        if s.check_order && src.len() == tgt.len() && src.len() > 1 {
            let mut a: Vec<&str> = src.iter().map(|t| t.key.as_str()).collect();
            let mut b: Vec<&str> = tgt.iter().map(|t| t.key.as_str()).collect();
            if a != b {
                let ranges: Vec<_> = tgt.iter().map(|t| t.range).collect();
                a.sort_unstable();
                b.sort_unstable();
                if a == b {
                    out.push(
                        codes::NUMBER_ORDER,
                        Severity::Info,
                        "Numbers appear in a different order than in source",
                        &[],
                        &ranges,
                    );
                }
            }
        }

        if s.check_format {
            for t in &tgt {
                if src.iter().any(|x| x.raw == t.raw) {
                    continue;
                }
                if !format_ok(&t.raw, s) {
                    out.push(
                        codes::NUMBER_FORMAT,
                        Severity::Warning,
                        format!(
                            "Number {} does not use decimal separator {:?}",
                            t.raw, s.decimal_separator
                        ),
                        &[],
                        &[t.range],
                    );
                }
            }
        }

        if s.check_ranges && RANGE_RE.is_match(&view.src_joined.text) {
            let text = &view.tgt_joined.text;
            for c in RANGE_RE.captures_iter(text) {
                let (Some(whole), Some(dash)) = (c.get(0), c.get(2)) else {
                    continue;
                };
                let before = c.get(1).map(|g| g.as_str()).unwrap_or("");
                let after = c.get(3).map(|g| g.as_str()).unwrap_or("");
                let symbol_ok = s.range_symbol.is_empty() || dash.as_str() == s.range_symbol;
                let spacing_ok = gap_ok(s.range_spacing, before) && gap_ok(s.range_spacing, after);
                if !symbol_ok || !spacing_ok {
                    out.push(
                        codes::RANGE_FORMAT,
                        Severity::Warning,
                        format!("Range should be written with {:?}", s.range_symbol),
                        &[],
                        &[view.tgt_joined.origin(whole.start(), whole.end())],
                    );
                }
            }
        }
    }
}

/// Separators before the last group must be grouping marks; the last one is either decimal or,
/// before exactly three digits, grouping.
fn format_ok(raw: &str, s: &NumberSettings) -> bool {
    let seps: Vec<regex::Match<'_>> = SEPARATOR_RE.find_iter(raw).collect();
    let is_grouping = |sep: &str| s.grouping_separators.iter().any(|g| g == sep);
    for (i, m) in seps.iter().enumerate() {
        let group_end = seps.get(i + 1).map(|n| n.start()).unwrap_or(raw.len());
        let group_len = group_end - m.end();
        let last = i + 1 == seps.len();
        let sep = m.as_str();
        let ok = if !last {
            is_grouping(sep) && group_len == 3
        } else if group_len == 3 {
            is_grouping(sep) || sep == s.decimal_separator
        } else {
            sep == s.decimal_separator
        };
        if !ok {
            return false;
        }
    }
    true
}
