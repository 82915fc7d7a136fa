use super::{codes, Findings, UnitView};
use crate::ir::Severity;
use crate::settings::QuoteSettings;

const QUOTE_GLYPHS: &str = "\"“”„‟«»‹›「」『』‘‚‛'’";

fn is_apostrophe_glyph(c: char) -> bool {
    c == '\'' || c == '’'
}

pub(super) fn check(view: &UnitView<'_>, s: &QuoteSettings, out: &mut Findings<'_>) {
    let tgt = &view.tgt_joined;
    let text = &tgt.text;
    let allowed_quotes: Vec<char> = s.allowed_pairs.iter().flat_map(|p| p.chars()).collect();

    let mut bad_quotes = Vec::new();
    let mut bad_apostrophes = Vec::new();
    let mut seen_quotes = String::new();
    let mut seen_apostrophes = String::new();

    for (at, c) in text.char_indices() {
        if !QUOTE_GLYPHS.contains(c) {
            continue;
        }
        let range = tgt.origin(at, at + c.len_utf8());
        let prev = text[..at].chars().next_back();
        let next = text[at + c.len_utf8()..].chars().next();
        let inner = prev.map(char::is_alphanumeric).unwrap_or(false)
            && next.map(char::is_alphabetic).unwrap_or(false);
        if is_apostrophe_glyph(c) && inner {
            if !s.allowed_apostrophes.contains(c) {
                bad_apostrophes.push(range);
                if !seen_apostrophes.contains(c) {
                    seen_apostrophes.push(c);
                }
            }
        } else if !allowed_quotes.contains(&c) {
            bad_quotes.push(range);
            if !seen_quotes.contains(c) {
                seen_quotes.push(c);
            }
        }
    }

    if !bad_quotes.is_empty() {
        out.push(
            codes::QUOTE_NOT_ALLOWED,
            Severity::Warning,
            format!("Quote marks not allowed for this language: {seen_quotes}"),
            &[],
            &bad_quotes,
        );
    }
    if !bad_apostrophes.is_empty() {
        out.push(
            codes::APOSTROPHE_NOT_ALLOWED,
            Severity::Warning,
            format!("Apostrophe not allowed for this language: {seen_apostrophes}"),
            &[],
            &bad_apostrophes,
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{QaIssue, TranslationUnit};
    use crate::qa::{codes, run_checks};
    use crate::settings::QaSettings;

    fn french() -> QaSettings {
        let mut s = QaSettings::default();
        s.quotes.enabled = true;
        s.quotes.allowed_pairs = vec!["«»".to_string()];
        s.quotes.allowed_apostrophes = "’".to_string();
        s
    }

    fn run(tgt: &str) -> Vec<QaIssue> {
        let unit = TranslationUnit::new("u", 0, "Say \"hi\"", tgt, "en", "fr");
        run_checks(&unit, &french(), &[])
    }

    #[test]
    fn straight_quotes_rejected() {
        let issues = run("Dites \"salut\"");
        let hit = issues.iter().find(|i| i.code == codes::QUOTE_NOT_ALLOWED).expect("quotes");
        assert_eq!(hit.target_highlights.len(), 2);
    }

    #[test]
    fn allowed_marks_pass() {
        let issues = run("Dites «\u{00A0}salut\u{00A0}» l’ami");
        assert!(issues.iter().all(|i| i.code != codes::QUOTE_NOT_ALLOWED
            && i.code != codes::APOSTROPHE_NOT_ALLOWED));
    }

    #[test]
    fn typewriter_apostrophe_rejected() {
        let issues = run("Dites «\u{00A0}salut\u{00A0}» l'ami");
        assert!(issues.iter().any(|i| i.code == codes::APOSTROPHE_NOT_ALLOWED));
    }
}
