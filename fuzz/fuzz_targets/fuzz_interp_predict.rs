#![no_main]

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use magpie_fuzz_utils::{truncate_utf8_to, FuzzRunner};
use magpie_interp::{
    ambiguity_trees, deepest_look_event, literal, lookahead_trees, Atn, AtnBuilder, CharElem,
    Elem, ErrorPolicy, LexerAtn, LexerAtnBuilder, LexerCommand, LexerInput, LexerInterpreter,
    ModalLexer, ModeState, ParseRun, ParserInterpreter, ParserOptions, PredictionEvent,
    TokenBuffer, TokenStream, TokenType, DEFAULT_MODE,
};

/// Ambiguity windows get re-parsed per alternative, so the input stays small.
const MAX_TEXT_BYTES: usize = 4 * 1024;
/// Cap on re-parsed ambiguity windows; counting still covers every event.
const MAX_REPLAYED_AMBIGUITIES: usize = 8;

const ID: u16 = 0;
const NUM: u16 = 1;
const PLUS: u16 = 2;
const STAR: u16 = 3;
const LP: u16 = 4;
const RP: u16 = 5;
const SEMI: u16 = 6;
const WS: u16 = 7;

struct Fixture {
    lexer: Arc<LexerAtn>,
    atn: Arc<Atn>,
}

/// A deliberately ambiguous statement grammar: `ID ;` matches both through
/// `expr` and directly, so ordinary inputs exercise ambiguity reporting,
/// full-context fallback, and multi-token lookahead.
fn init() -> Fixture {
    let mut lexer = LexerAtnBuilder::new();
    lexer.rule(
        DEFAULT_MODE,
        "ID",
        TokenType(ID),
        vec![CharElem::Plus(vec![CharElem::Range('a', 'z')])],
        vec![],
    );
    lexer.rule(
        DEFAULT_MODE,
        "NUM",
        TokenType(NUM),
        vec![CharElem::Plus(vec![CharElem::Range('0', '9')])],
        vec![],
    );
    lexer.rule(DEFAULT_MODE, "PLUS", TokenType(PLUS), literal("+"), vec![]);
    lexer.rule(DEFAULT_MODE, "STAR", TokenType(STAR), literal("*"), vec![]);
    lexer.rule(DEFAULT_MODE, "LP", TokenType(LP), literal("("), vec![]);
    lexer.rule(DEFAULT_MODE, "RP", TokenType(RP), literal(")"), vec![]);
    lexer.rule(DEFAULT_MODE, "SEMI", TokenType(SEMI), literal(";"), vec![]);
    lexer.rule(
        DEFAULT_MODE,
        "WS",
        TokenType(WS),
        vec![CharElem::Plus(vec![CharElem::Set(vec![
            (' ', ' '),
            ('\t', '\t'),
            ('\r', '\r'),
            ('\n', '\n'),
        ])])],
        vec![LexerCommand::Skip],
    );
    let lexer = Arc::new(lexer.build().expect("lexer automaton is well formed"));

    let mut atn = AtnBuilder::new(vec!["ID", "NUM", "PLUS", "STAR", "LP", "RP", "SEMI", "WS"]);
    atn.rule(
        "prog",
        vec![vec![Elem::Star(vec![Elem::Rule("stat".into())]), Elem::Token(TokenType::EOF)]],
    );
    atn.rule(
        "stat",
        vec![
            vec![Elem::Rule("expr".into()), Elem::Token(TokenType(SEMI))],
            vec![Elem::Token(TokenType(ID)), Elem::Token(TokenType(SEMI))],
        ],
    );
    atn.rule(
        "expr",
        vec![vec![
            Elem::Rule("term".into()),
            Elem::Star(vec![
                Elem::Set(vec![TokenType(PLUS), TokenType(STAR)]),
                Elem::Rule("term".into()),
            ]),
        ]],
    );
    atn.rule(
        "term",
        vec![
            vec![Elem::Token(TokenType(ID))],
            vec![Elem::Token(TokenType(NUM))],
            vec![
                Elem::Token(TokenType(LP)),
                Elem::Rule("expr".into()),
                Elem::Token(TokenType(RP)),
            ],
        ],
    );
    let atn = Arc::new(atn.build().expect("parser automaton is well formed"));

    Fixture { lexer, atn }
}

fn tokenize(fixture: &Fixture, text: &Arc<str>) -> TokenBuffer {
    let mut lexer = LexerInterpreter::new(Arc::clone(&fixture.lexer));
    lexer.start(LexerInput::new(Arc::clone(text)), &ModeState::initial());
    let mut buffer = TokenBuffer::new(Arc::clone(text));
    loop {
        let token = lexer.next_token();
        let done = token.is_eof();
        buffer.push(token);
        if done {
            return buffer;
        }
    }
}

fn profiled_parse(fixture: &Fixture, buffer: &TokenBuffer) -> ParseRun {
    let opts = ParserOptions { profile: true, policy: ErrorPolicy::Recover };
    let mut parser = ParserInterpreter::new(Arc::clone(&fixture.atn), opts);
    let mut stream = TokenStream::new(buffer.clone());
    parser.parse(&mut stream, 0).expect("start rule exists")
}

fn run_one(fixture: &mut Fixture, input: &[u8]) {
    let Some(text) = truncate_utf8_to(input, MAX_TEXT_BYTES) else {
        return;
    };
    let text: Arc<str> = Arc::from(text);

    let buffer = tokenize(fixture, &text);
    let run = profiled_parse(fixture, &buffer);

    for error in &run.errors {
        let start = error.span.start as usize;
        let end = error.span.end as usize;
        assert!(start <= end && end <= text.len(), "error span out of bounds");
        assert!(text.is_char_boundary(start) && text.is_char_boundary(end));
    }
    if let Some((lo, hi)) = run.tree.token_interval(run.root) {
        assert!(lo <= hi && (hi as usize) < buffer.len(), "root interval out of buffer");
    }

    // Every ambiguity the profiler counted must also be in the event stream,
    // and its window must re-parse into one tree per competing alternative.
    let info = run.info.as_ref().expect("profiling was requested");
    let mut ambiguity_counts = vec![0u64; fixture.atn.decision_count()];
    let mut replayed = 0usize;
    for event in &run.events {
        let PredictionEvent::Ambiguity { decision, alts, start_index, stop_index, .. } = event
        else {
            continue;
        };
        ambiguity_counts[*decision as usize] += 1;
        assert!(alts.len() >= 2, "ambiguity over fewer than two alternatives");
        assert!(start_index <= stop_index && *stop_index < buffer.len());

        if replayed < MAX_REPLAYED_AMBIGUITIES {
            replayed += 1;
            let trees = ambiguity_trees(
                &fixture.atn,
                &buffer,
                0,
                *decision,
                alts,
                *start_index,
                *stop_index,
            )
            .expect("ambiguous decision exists");
            assert_eq!(trees.len(), alts.len(), "one tree per ambiguous alternative");
            for tree in &trees {
                assert!(!tree.render(&fixture.atn, &buffer).is_empty());
            }
        }
    }
    for decision in &info.decisions {
        assert_eq!(
            decision.ambiguities,
            ambiguity_counts[decision.decision as usize],
            "profiler and event stream disagree on decision {}",
            decision.decision,
        );
        assert!(decision.sll_min_look <= decision.sll_max_look);
        assert!(decision.ll_fallbacks <= decision.invocations);
    }

    if let Some(event) = deepest_look_event(info) {
        let trees = lookahead_trees(
            &fixture.atn,
            &buffer,
            0,
            event.decision,
            event.start_index,
            event.stop_index,
        )
        .expect("recorded decision exists");
        assert_eq!(trees.len(), fixture.atn.decision_alt_count(event.decision));
        for tree in &trees {
            assert!(!tree.render(&fixture.atn, &buffer).is_empty());
        }
    }

    // Same input, fresh parser: diagnostics, events, and tree shape must
    // come back identical.
    let second = profiled_parse(fixture, &buffer);
    assert_eq!(second.errors, run.errors);
    assert_eq!(second.first_error_index, run.first_error_index);
    assert_eq!(second.events, run.events);
    assert_eq!(
        second.tree.render(second.root, &fixture.atn, &buffer),
        run.tree.render(run.root, &fixture.atn, &buffer),
    );
}

fn runner() -> &'static FuzzRunner<Fixture> {
    static RUNNER: OnceLock<FuzzRunner<Fixture>> = OnceLock::new();
    RUNNER.get_or_init(|| {
        FuzzRunner::new(
            "fuzz_interp_predict",
            MAX_TEXT_BYTES,
            Duration::from_secs(2),
            init,
            run_one,
        )
    })
}

fuzz_target!(|data: &[u8]| {
    runner().run(data);
});
