#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use magpie_fuzz_utils::{truncate_utf8, FuzzRunner};
use magpie_interp::TextSpan;

fn init() {}

fn assert_in_bounds(text: &str, span: TextSpan) {
    let start = span.start as usize;
    let end = span.end as usize;
    assert!(start <= end && end <= text.len(), "span {span:?} out of bounds");
    assert!(text.is_char_boundary(start) && text.is_char_boundary(end));
}

fn run_one(_state: &mut (), input: &[u8]) {
    let Some(text) = truncate_utf8(input) else {
        return;
    };

    let parse = magpie_syntax::parse(text);

    // The tree must re-spell the input byte for byte, however mangled it is.
    assert_eq!(parse.syntax().text().to_string(), text);
    for error in &parse.errors {
        assert_in_bounds(text, error.span);
    }

    // Editor queries run over whatever tree came back.
    let folds = magpie_ide::folding_ranges(&parse);
    for fold in &folds {
        assert_in_bounds(text, fold.span);
        assert!(fold.span.start < fold.span.end, "empty {:?} fold", fold.kind);
    }
    for window in folds.windows(2) {
        assert!(window[0].span.start <= window[1].span.start, "folds out of order");
    }

    let items = magpie_ide::structure_items(&parse);
    for item in &items {
        assert_in_bounds(text, item.name_span);
        assert_in_bounds(text, item.span);
        let sliced = &text[item.name_span.start as usize..item.name_span.end as usize];
        assert_eq!(sliced, item.name, "outline name does not slice back");
    }

    // Every outline entry names a definition, so reference search must
    // rediscover at least that definition.
    for item in items.iter().take(8) {
        let refs = magpie_ide::find_rule_references(&parse, &item.name);
        assert!(
            refs.iter().any(|r| r.is_definition && r.span == item.name_span),
            "definition of {} lost",
            item.name,
        );
    }
}

fn runner() -> &'static FuzzRunner<()> {
    static RUNNER: OnceLock<FuzzRunner<()>> = OnceLock::new();
    RUNNER.get_or_init(|| FuzzRunner::new_default("fuzz_grammar_parse", init, run_one))
}

fuzz_target!(|data: &[u8]| {
    runner().run(data);
});
