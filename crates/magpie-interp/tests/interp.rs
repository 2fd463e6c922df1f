//! End-to-end runs over a small expression grammar: text through the
//! interpretive lexer, tokens through the interpretive parser, and the
//! results through profiling and lookahead re-parsing.

use std::sync::Arc;

use magpie_interp::{
    deepest_look_event, lookahead_trees, Atn, AtnBuilder, CharElem, Elem, ErrorPolicy, LexerAtn,
    LexerAtnBuilder, LexerCommand, LexerInput, LexerInterpreter, ModalLexer, ModeState,
    ParserInterpreter, ParserOptions, TokenBuffer, TokenStream, TokenType, DEFAULT_MODE,
};
use pretty_assertions::assert_eq;

const ID: u16 = 0;
const DOT: u16 = 1;
const LPAREN: u16 = 2;
const RPAREN: u16 = 3;
const SEMI: u16 = 4;
const WS: u16 = 5;

fn lexer_atn() -> Arc<LexerAtn> {
    let mut b = LexerAtnBuilder::new();
    b.rule(
        DEFAULT_MODE,
        "ID",
        TokenType(ID),
        vec![CharElem::Plus(vec![CharElem::Range('a', 'z')])],
        vec![],
    );
    b.rule(DEFAULT_MODE, "DOT", TokenType(DOT), magpie_interp::literal("."), vec![]);
    b.rule(DEFAULT_MODE, "LPAREN", TokenType(LPAREN), magpie_interp::literal("("), vec![]);
    b.rule(DEFAULT_MODE, "RPAREN", TokenType(RPAREN), magpie_interp::literal(")"), vec![]);
    b.rule(DEFAULT_MODE, "SEMI", TokenType(SEMI), magpie_interp::literal(";"), vec![]);
    b.rule(
        DEFAULT_MODE,
        "WS",
        TokenType(WS),
        vec![CharElem::Plus(vec![CharElem::Set(vec![(' ', ' '), ('\t', '\t'), ('\n', '\n')])])],
        vec![LexerCommand::Skip],
    );
    Arc::new(b.build().unwrap())
}

fn parser_atn() -> Arc<Atn> {
    let mut b = AtnBuilder::new(vec!["ID", "DOT", "LPAREN", "RPAREN", "SEMI", "WS"]);
    b.rule(
        "s",
        vec![vec![Elem::Rule("e".into()), Elem::Token(TokenType(SEMI)), Elem::Token(TokenType::EOF)]],
    );
    b.rule(
        "e",
        vec![
            vec![
                Elem::Token(TokenType(ID)),
                Elem::Token(TokenType(DOT)),
                Elem::Token(TokenType(ID)),
            ],
            vec![
                Elem::Token(TokenType(ID)),
                Elem::Token(TokenType(LPAREN)),
                Elem::Token(TokenType(RPAREN)),
            ],
        ],
    );
    Arc::new(b.build().unwrap())
}

fn scan(text: &str) -> (TokenBuffer, Vec<magpie_interp::SyntaxError>) {
    let mut lexer = LexerInterpreter::new(lexer_atn());
    lexer.start(LexerInput::new(text.into()), &ModeState::initial());
    let buf = lexer.scan_all();
    (buf, lexer.take_diagnostics())
}

#[test]
fn whitespace_rides_the_hidden_channel_through_a_parse() {
    let (buf, diags) = scan("a . b ;");
    assert!(diags.is_empty());
    let types: Vec<u16> = buf.tokens().iter().map(|t| t.ty.0).collect();
    assert_eq!(types, vec![ID, WS, DOT, WS, ID, WS, SEMI, TokenType::EOF.0]);
    let hidden: Vec<bool> = buf.tokens().iter().map(|t| !t.channel.is_default()).collect();
    assert_eq!(hidden, vec![false, true, false, true, false, true, false, false]);

    let atn = parser_atn();
    let mut parser = ParserInterpreter::new(Arc::clone(&atn), ParserOptions::default());
    let mut stream = TokenStream::new(buf);
    let run = parser.parse(&mut stream, 0).unwrap();
    assert!(run.errors.is_empty());
    assert_eq!(run.tree.render(run.root, &atn, stream.buffer()), "(s (e:1 a . b) ; <EOF>)");
}

#[test]
fn profiled_parse_reports_the_deciding_window_in_raw_indices() {
    let (buf, _) = scan("a . b ;");
    let atn = parser_atn();
    let mut parser = ParserInterpreter::new(
        Arc::clone(&atn),
        ParserOptions { profile: true, policy: ErrorPolicy::Recover },
    );
    let mut stream = TokenStream::new(buf);
    let info = parser.parse(&mut stream, 0).unwrap().info.unwrap();
    let ev = deepest_look_event(&info).unwrap();
    // Two symbols consulted: the ID at raw 0 and the DOT at raw 2, with
    // the whitespace token between them skipped but still counted in the
    // raw indices.
    assert_eq!((ev.decision, ev.depth), (0, 2));
    assert_eq!((ev.start_index, ev.stop_index), (0, 2));
    assert_eq!(info.decision(0).sll_max_look, 2);
    assert_eq!(info.input_tokens, 4);
}

#[test]
fn lookahead_trees_show_both_alternatives_of_the_window() {
    let (buf, diags) = scan("a.b;");
    assert!(diags.is_empty());
    let atn = parser_atn();

    // Drive the window from the profiled parse rather than hardcoding it.
    let mut parser = ParserInterpreter::new(
        Arc::clone(&atn),
        ParserOptions { profile: true, policy: ErrorPolicy::Recover },
    );
    let mut stream = TokenStream::new(buf.clone());
    let info = parser.parse(&mut stream, 0).unwrap().info.unwrap();
    let ev = deepest_look_event(&info).unwrap().clone();

    let trees =
        lookahead_trees(&atn, &buf, 0, ev.decision, ev.start_index, ev.stop_index).unwrap();
    let rendered: Vec<String> = trees.iter().map(|t| t.render(&atn, &buf)).collect();
    assert_eq!(rendered, vec!["(e:1 a .)".to_string(), "(e:2 a <error .>)".to_string()]);
}

#[test]
fn unmatched_characters_never_reach_the_parser() {
    let (buf, diags) = scan("a.#%b;");
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].message, "token recognition error at: '#%'");

    let atn = parser_atn();
    let mut parser = ParserInterpreter::new(Arc::clone(&atn), ParserOptions::default());
    let mut stream = TokenStream::new(buf);
    let run = parser.parse(&mut stream, 0).unwrap();
    // The bad run is quarantined on its own channel; the parse is clean.
    assert!(run.errors.is_empty());
    assert_eq!(run.tree.render(run.root, &atn, stream.buffer()), "(s (e:1 a . b) ; <EOF>)");
}

#[test]
fn scanning_a_window_restarts_cleanly_mid_text() {
    let text = "a.b;";
    let mut lexer = LexerInterpreter::new(lexer_atn());
    lexer.start(LexerInput::new(text.into()), &ModeState::initial());
    let full = lexer.scan_all();

    // Re-scan from offset 2 with the state captured before 'b'.
    let mut resumed = LexerInterpreter::new(lexer_atn());
    resumed.start(LexerInput::window(text.into(), 2, text.len()), &ModeState::initial());
    let tail = resumed.scan_all();

    let full_tail: Vec<(u16, u32, u32)> = full
        .tokens()
        .iter()
        .filter(|t| t.span.start >= 2)
        .map(|t| (t.ty.0, t.span.start, t.span.end))
        .collect();
    let resumed_all: Vec<(u16, u32, u32)> =
        tail.tokens().iter().map(|t| (t.ty.0, t.span.start, t.span.end)).collect();
    assert_eq!(full_tail, resumed_all);
}
