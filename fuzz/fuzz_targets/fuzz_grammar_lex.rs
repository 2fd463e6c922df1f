#![no_main]

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use magpie_editor::ScannerConfig;
use magpie_fuzz_utils::{truncate_utf8_to, FuzzRunner};
use magpie_interp::LexerInput;
use magpie_syntax::SyntaxKind;

/// Restarting from every sampled boundary rescans the tail, so keep the
/// input well below the shared default to stay inside the time budget.
const MAX_TEXT_BYTES: usize = 8 * 1024;

fn init() {}

fn run_one(_state: &mut (), input: &[u8]) {
    let Some(text) = truncate_utf8_to(input, MAX_TEXT_BYTES) else {
        return;
    };
    let text: Arc<str> = Arc::from(text);

    // Full scan, recording every token together with the continuation that
    // resumes the lexer at its start boundary.
    let mut scanner = magpie_syntax::restartable_lexer(ScannerConfig::highlighting());
    scanner.start(LexerInput::new(Arc::clone(&text)), 0);

    let mut boundaries = Vec::new();
    let mut tokens = Vec::new();
    let mut covered = 0usize;
    while scanner.token_type().is_some() {
        let start = scanner.token_start();
        let end = scanner.token_end();
        assert_eq!(start, covered, "tokens must tile the input");
        assert!(end > start, "empty token at {start}");
        assert!(text.is_char_boundary(start) && text.is_char_boundary(end));
        covered = end;
        let continuation = scanner.state();
        boundaries.push((start, continuation));
        tokens.push(scanner.token());
        scanner.advance();
    }
    assert_eq!(covered, text.len(), "scan left bytes uncovered");

    // Restarting from any recorded boundary must reproduce the rest of the
    // full scan exactly.
    let step = (boundaries.len() / 16).max(1);
    for (i, &(offset, continuation)) in boundaries.iter().enumerate().step_by(step) {
        scanner.start(LexerInput::window(Arc::clone(&text), offset, text.len()), continuation);
        let mut suffix = Vec::new();
        while scanner.token_type().is_some() {
            suffix.push(scanner.token());
            scanner.advance();
        }
        assert_eq!(suffix.as_slice(), &tokens[i..], "restart at {offset} diverged");
    }

    // The flat entry point must agree on termination and keep its
    // diagnostics inside the input.
    let (flat, errors) = magpie_syntax::lex_with_errors(&text);
    assert_eq!(flat.last().map(|t| t.kind), Some(SyntaxKind::Eof));
    for error in &errors {
        let start = error.span.start as usize;
        let end = error.span.end as usize;
        assert!(start <= end && end <= text.len());
        assert!(text.is_char_boundary(start) && text.is_char_boundary(end));
    }
}

fn runner() -> &'static FuzzRunner<()> {
    static RUNNER: OnceLock<FuzzRunner<()>> = OnceLock::new();
    RUNNER.get_or_init(|| {
        FuzzRunner::new("fuzz_grammar_lex", MAX_TEXT_BYTES, Duration::from_secs(2), init, run_one)
    })
}

fuzz_target!(|data: &[u8]| {
    runner().run(data);
});
