use proptest::prelude::*;

use tm_workbench::normalize::{normalize, NormalizeOptions};

fn options() -> impl Strategy<Value = NormalizeOptions> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(tags, case, punct, ws, numbers, plurals)| NormalizeOptions {
            ignore_tags: tags,
            ignore_case: case,
            ignore_punctuation: punct,
            ignore_whitespace: ws,
            ignore_numbers: numbers,
            ignore_plurals: plurals,
        },
    )
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        "\\PC{0,40}",
        "[A-Za-z0-9 ,.!?<>:]{0,40}",
        "(<<TAG:[a-z0-9]{1,3}>>|[A-Za-z]{1,8}s|[0-9]{1,4}| |\\.){0,8}",
        "(<<TAG:[0-9]{60,70}>>|<<TAGs:[0-9]{1,3}>>|[a-z]{1,5}| ){0,4}",
    ]
}

proptest! {
    #[test]
    fn normalize_is_idempotent(text in segment(), opts in options(), lang in prop_oneof![Just("en"), Just("fr")]) {
        let once = normalize(&text, &opts, lang);
        let twice = normalize(&once, &opts, lang);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn exact_options_keep_text(text in "\\PC{0,40}") {
        prop_assert_eq!(normalize(&text, &NormalizeOptions::exact(), "en"), text);
    }
}
