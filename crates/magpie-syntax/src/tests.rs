use std::sync::Arc;

use magpie_editor::ScannerConfig;
use magpie_interp::{LexerInput, Token};
use pretty_assertions::assert_eq;

use crate::{
    element_kinds, lex, lex_with_errors, parse, restartable_lexer, AstNode, GrammarSpec,
    LexerRule, SyntaxKind, TextSpan,
};

const DEMO: &str = r#"/** Arithmetic demo grammar. */
grammar Demo;

options {
    tokenVocab = DemoLexer;
    superClass = DemoBase;
}

tokens { BEGIN, END }
channels { COMMENTS }

import Common;

@parser::members {
    int depth = 0;
}

expr[int prec]
    returns [int value]
    : expr '+' term    # add
    | term             # unit
    ;

term
    : NUM
    | '(' expr ')'
    ;

NUM : [0-9]+ ;
WS : [ \t\r\n]+ -> channel(HIDDEN) ;

mode ISLAND;

ISLAND_TEXT : ~[<]+ -> more ;
"#;

fn dump_tokens(input: &str) -> Vec<(SyntaxKind, String)> {
    lex(input)
        .into_iter()
        .map(|t| (t.kind, t.text(input).to_string()))
        .collect()
}

fn dump_non_trivia(input: &str) -> Vec<(SyntaxKind, String)> {
    lex(input)
        .into_iter()
        .filter(|t| !t.kind.is_trivia())
        .map(|t| (t.kind, t.text(input).to_string()))
        .collect()
}

#[test]
fn syntax_kind_raw_roundtrip_is_total_for_valid_range() {
    use rowan::Language;

    for raw in 0..(SyntaxKind::__Last as u16) {
        let kind = <crate::GrammarLanguage as Language>::kind_from_raw(rowan::SyntaxKind(raw));
        assert_eq!(
            <crate::GrammarLanguage as Language>::kind_to_raw(kind).0,
            raw,
            "failed roundtrip for raw={raw}"
        );
    }
}

#[test]
fn syntax_kind_helper_classification_smoke_test() {
    assert!(SyntaxKind::GrammarKw.is_keyword());
    assert!(SyntaxKind::Whitespace.is_trivia());
    assert!(SyntaxKind::DocComment.is_comment());
    assert!(SyntaxKind::TokenRef.is_identifier_like());
    assert!(SyntaxKind::OptionsKw.is_block_intro());
    assert!(SyntaxKind::ParserRule.is_node());
    assert!(!SyntaxKind::OptionsKw.is_keyword());
    assert_eq!(SyntaxKind::from_keyword("fragment"), Some(SyntaxKind::FragmentKw));
    assert_eq!(SyntaxKind::from_keyword("options"), None);
}

#[test]
fn lexes_a_lexer_rule_with_commands() {
    let input = "WS : [ \\t\\r\\n]+ -> channel(HIDDEN);";
    let expected = vec![
        (SyntaxKind::TokenRef, "WS".into()),
        (SyntaxKind::Whitespace, " ".into()),
        (SyntaxKind::Colon, ":".into()),
        (SyntaxKind::Whitespace, " ".into()),
        (SyntaxKind::LexerCharSet, "[ \\t\\r\\n]".into()),
        (SyntaxKind::Plus, "+".into()),
        (SyntaxKind::Whitespace, " ".into()),
        (SyntaxKind::Arrow, "->".into()),
        (SyntaxKind::Whitespace, " ".into()),
        (SyntaxKind::RuleRef, "channel".into()),
        (SyntaxKind::LParen, "(".into()),
        (SyntaxKind::TokenRef, "HIDDEN".into()),
        (SyntaxKind::RParen, ")".into()),
        (SyntaxKind::Semicolon, ";".into()),
        (SyntaxKind::Eof, "".into()),
    ];
    assert_eq!(dump_tokens(input), expected);
}

#[test]
fn block_intro_token_spans_through_the_open_brace() {
    let input = "options { tokenVocab = Lexer; }";
    let expected = vec![
        (SyntaxKind::OptionsKw, "options {".into()),
        (SyntaxKind::Whitespace, " ".into()),
        (SyntaxKind::RuleRef, "tokenVocab".into()),
        (SyntaxKind::Whitespace, " ".into()),
        (SyntaxKind::Eq, "=".into()),
        (SyntaxKind::Whitespace, " ".into()),
        (SyntaxKind::TokenRef, "Lexer".into()),
        (SyntaxKind::Semicolon, ";".into()),
        (SyntaxKind::Whitespace, " ".into()),
        (SyntaxKind::RBrace, "}".into()),
        (SyntaxKind::Eof, "".into()),
    ];
    assert_eq!(dump_tokens(input), expected);
}

#[test]
fn keywords_are_plain_identifiers_inside_option_blocks() {
    // `grammar` is only a keyword at the top level; as an option value the
    // block mode classifies it like any other word.
    let tokens = dump_non_trivia("options { language = grammar; }");
    assert_eq!(
        tokens,
        vec![
            (SyntaxKind::OptionsKw, "options {".into()),
            (SyntaxKind::RuleRef, "language".into()),
            (SyntaxKind::Eq, "=".into()),
            (SyntaxKind::RuleRef, "grammar".into()),
            (SyntaxKind::Semicolon, ";".into()),
            (SyntaxKind::RBrace, "}".into()),
            (SyntaxKind::Eof, "".into()),
        ]
    );
}

#[test]
fn intro_word_without_brace_is_a_plain_identifier() {
    let tokens = dump_non_trivia("expr : options ;");
    assert_eq!(
        tokens,
        vec![
            (SyntaxKind::RuleRef, "expr".into()),
            (SyntaxKind::Colon, ":".into()),
            (SyntaxKind::RuleRef, "options".into()),
            (SyntaxKind::Semicolon, ";".into()),
            (SyntaxKind::Eof, "".into()),
        ]
    );
}

#[test]
fn bracket_dispatch_follows_the_rule_kind() {
    let tokens = dump_non_trivia("expr[int x] : A ;\nNUM : [0-9]+ ;");
    assert_eq!(
        tokens,
        vec![
            (SyntaxKind::RuleRef, "expr".into()),
            (SyntaxKind::ArgAction, "[int x]".into()),
            (SyntaxKind::Colon, ":".into()),
            (SyntaxKind::TokenRef, "A".into()),
            (SyntaxKind::Semicolon, ";".into()),
            (SyntaxKind::TokenRef, "NUM".into()),
            (SyntaxKind::Colon, ":".into()),
            (SyntaxKind::LexerCharSet, "[0-9]".into()),
            (SyntaxKind::Plus, "+".into()),
            (SyntaxKind::Semicolon, ";".into()),
            (SyntaxKind::Eof, "".into()),
        ]
    );
}

#[test]
fn named_action_does_not_disturb_the_rule_kind() {
    // The identifier in `@members` must not count as a rule header, or the
    // following lexer rule would misread its character set as an argument.
    let tokens = dump_non_trivia("@members { int i = 0; }\nX : [ab] ;");
    assert!(tokens.contains(&(SyntaxKind::Action, "{ int i = 0; }".into())));
    assert!(tokens.contains(&(SyntaxKind::LexerCharSet, "[ab]".into())));
}

#[test]
fn unterminated_string_is_reported_and_stays_on_one_line() {
    let (tokens, errors) = lex_with_errors("A : 'abc\nB : 'x' ;");
    assert!(tokens
        .iter()
        .any(|t| t.kind == SyntaxKind::UnterminatedString && t.span == TextSpan::new(4, 8)));
    assert!(tokens.iter().any(|t| t.kind == SyntaxKind::StringLiteral));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "unterminated string literal");
}

#[test]
fn unrecognized_characters_coalesce_into_one_bad_run() {
    let (tokens, errors) = lex_with_errors("a : ^^^ ;");
    let bad: Vec<_> = tokens.iter().filter(|t| t.kind == SyntaxKind::Error).collect();
    assert_eq!(bad.len(), 1);
    assert_eq!(bad[0].span, TextSpan::new(4, 7));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "token recognition error at: '^^^'");
}

#[test]
fn every_byte_is_covered_by_exactly_one_token() {
    let tokens = lex(DEMO);
    let mut offset = 0u32;
    for token in &tokens {
        assert_eq!(token.span.start, offset, "gap or overlap at {offset}");
        offset = token.span.end;
    }
    assert_eq!(offset, DEMO.len() as u32);
}

#[test]
fn restart_from_any_boundary_matches_the_full_scan() {
    let text: Arc<str> = Arc::from(DEMO);
    let mut scanner = restartable_lexer(ScannerConfig::highlighting());
    scanner.start(LexerInput::new(text.clone()), 0);

    let mut boundaries: Vec<(usize, u32)> = Vec::new();
    let mut full: Vec<Token> = Vec::new();
    while scanner.token_type().is_some() {
        boundaries.push((scanner.token_start(), scanner.state()));
        full.push(scanner.token());
        scanner.advance();
    }

    // The source must actually drive the scanner through non-initial
    // states, or this test proves nothing.
    assert!(boundaries.iter().any(|&(_, continuation)| continuation != 0));

    for (i, &(offset, continuation)) in boundaries.iter().enumerate() {
        scanner.start(LexerInput::window(text.clone(), offset, text.len()), continuation);
        let mut suffix: Vec<Token> = Vec::new();
        while scanner.token_type().is_some() {
            suffix.push(scanner.token());
            scanner.advance();
        }
        assert_eq!(
            suffix.as_slice(),
            &full[i..],
            "restart at offset {offset} diverged from the full scan"
        );
    }
}

#[test]
fn parse_demo_grammar_is_clean_and_lossless() {
    let result = parse(DEMO);
    assert_eq!(result.errors, Vec::new());
    assert_eq!(result.syntax().kind(), SyntaxKind::GrammarSpec);
    assert_eq!(result.syntax().text().to_string(), DEMO);
}

#[test]
fn parse_builds_the_expected_top_level_nodes() {
    let result = parse(DEMO);
    let kinds: Vec<_> = result.syntax().descendants().map(|n| n.kind()).collect();
    for expected in [
        SyntaxKind::GrammarDecl,
        SyntaxKind::OptionsSpec,
        SyntaxKind::OptionSpec,
        SyntaxKind::TokensSpec,
        SyntaxKind::ChannelsSpec,
        SyntaxKind::ImportSpec,
        SyntaxKind::NamedAction,
        SyntaxKind::ParserRule,
        SyntaxKind::LexerRule,
        SyntaxKind::AltList,
        SyntaxKind::Alternative,
        SyntaxKind::Block,
        SyntaxKind::LexerCommands,
        SyntaxKind::LexerCommand,
        SyntaxKind::ModeSpec,
    ] {
        assert!(kinds.contains(&expected), "missing {expected:?} in {kinds:?}");
    }
}

#[test]
fn ast_accessors_surface_declaration_names() {
    let result = parse(DEMO);
    let root = GrammarSpec::cast(result.syntax()).unwrap();

    let decl = root.decl().unwrap();
    assert_eq!(decl.name_token().unwrap().text(), "Demo");
    assert!(!decl.is_lexer_grammar());

    let rule_names: Vec<_> = root
        .rules()
        .filter_map(|r| r.name_token())
        .map(|t| t.text().to_string())
        .collect();
    assert_eq!(rule_names, ["expr", "term", "NUM", "WS"]);

    let option_names: Vec<_> = root
        .options()
        .unwrap()
        .options()
        .filter_map(|o| o.name_token())
        .map(|t| t.text().to_string())
        .collect();
    assert_eq!(option_names, ["tokenVocab", "superClass"]);

    let token_names: Vec<_> = root
        .tokens_spec()
        .unwrap()
        .name_tokens()
        .map(|t| t.text().to_string())
        .collect();
    assert_eq!(token_names, ["BEGIN", "END"]);

    let action = root.named_actions().next().unwrap();
    assert_eq!(action.name_token().unwrap().text(), "members");

    let mode = root.modes().next().unwrap();
    assert_eq!(mode.name_token().unwrap().text(), "ISLAND");
    let mode_rules: Vec<_> = mode
        .rules()
        .filter_map(|r| r.name_token())
        .map(|t| t.text().to_string())
        .collect();
    assert_eq!(mode_rules, ["ISLAND_TEXT"]);
}

#[test]
fn alternative_labels_and_commands_are_reachable_from_the_ast() {
    let result = parse(DEMO);
    let root = GrammarSpec::cast(result.syntax()).unwrap();

    let expr = match root.rules().next().unwrap() {
        crate::Rule::ParserRule(rule) => rule,
        other => panic!("expected a parser rule, got {other:?}"),
    };
    let labels: Vec<_> = expr
        .alt_list()
        .unwrap()
        .alternatives()
        .filter_map(|alt| alt.label_token())
        .map(|t| t.text().to_string())
        .collect();
    assert_eq!(labels, ["add", "unit"]);

    let ws = root
        .rules()
        .find_map(|r| match r {
            crate::Rule::LexerRule(rule)
                if rule.name_token().is_some_and(|t| t.text() == "WS") =>
            {
                Some(rule)
            }
            _ => None,
        })
        .unwrap();
    let command = ws
        .alt_list()
        .unwrap()
        .alternatives()
        .next()
        .unwrap()
        .lexer_commands()
        .unwrap()
        .commands()
        .next()
        .unwrap();
    assert_eq!(command.name_token().unwrap().text(), "channel");
    assert_eq!(command.argument_token().unwrap().text(), "HIDDEN");
}

#[test]
fn fragment_rules_are_flagged() {
    let result = parse("lexer grammar L;\nfragment DIGIT : [0-9] ;\nNUM : DIGIT+ ;");
    assert_eq!(result.errors, Vec::new());
    let root = GrammarSpec::cast(result.syntax()).unwrap();
    assert!(root.decl().unwrap().is_lexer_grammar());

    let flags: Vec<_> = root
        .rules()
        .filter_map(|r| match r {
            crate::Rule::LexerRule(rule) => Some(rule.is_fragment()),
            crate::Rule::ParserRule(_) => None,
        })
        .collect();
    assert_eq!(flags, [true, false]);
}

#[test]
fn exception_handlers_attach_to_the_rule() {
    let input = "grammar G;\nr : A ;\ncatch [RecognitionException e] { recover(e); }\nfinally { cleanup(); }\n";
    let result = parse(input);
    assert_eq!(result.errors, Vec::new());

    let root = GrammarSpec::cast(result.syntax()).unwrap();
    let rule = match root.rules().next().unwrap() {
        crate::Rule::ParserRule(rule) => rule,
        other => panic!("expected a parser rule, got {other:?}"),
    };
    let handlers: Vec<_> = rule.exception_handlers().collect();
    assert_eq!(handlers.len(), 2);
    assert!(!handlers[0].is_finally());
    assert!(handlers[1].is_finally());
}

#[test]
fn parser_recovers_after_a_missing_semicolon() {
    let input = "grammar G;\nfirst : A \nsecond : B ;\n";
    let result = parse(input);
    assert!(
        result.errors.iter().any(|e| e.message.contains("expected `;`")),
        "expected a missing-semicolon error, got: {:?}",
        result.errors
    );

    let rule_count = result
        .syntax()
        .descendants()
        .filter(|n| n.kind() == SyntaxKind::ParserRule)
        .count();
    assert_eq!(rule_count, 2);
    assert_eq!(result.syntax().text().to_string(), input);
}

#[test]
fn stray_top_level_tokens_become_error_nodes() {
    let input = "grammar G;\n??? \nr : A ;\n";
    let result = parse(input);
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("expected a rule definition")));

    let kinds: Vec<_> = result.syntax().descendants().map(|n| n.kind()).collect();
    assert!(kinds.contains(&SyntaxKind::Error));
    assert!(kinds.contains(&SyntaxKind::ParserRule));
    assert_eq!(result.syntax().text().to_string(), input);
}

#[test]
fn bad_characters_stay_out_of_the_parse_but_in_the_tree() {
    let input = "grammar G;\nr : A ;\n\u{00a3}\u{20ac}\n";
    let result = parse(input);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].message,
        "token recognition error at: '\u{00a3}\u{20ac}'"
    );
    assert_eq!(result.syntax().text().to_string(), input);

    let rule_count = result
        .syntax()
        .descendants()
        .filter(|n| n.kind() == SyntaxKind::ParserRule)
        .count();
    assert_eq!(rule_count, 1);
}

#[test]
fn unterminated_action_still_produces_a_named_action_node() {
    let input = "grammar G;\n@members { int x";
    let result = parse(input);
    assert!(result
        .errors
        .iter()
        .any(|e| e.message == "unterminated action"));

    let kinds: Vec<_> = result.syntax().descendants().map(|n| n.kind()).collect();
    assert!(kinds.contains(&SyntaxKind::NamedAction));
    assert_eq!(result.syntax().text().to_string(), input);
}

#[test]
fn empty_input_parses_to_an_empty_root_with_one_error() {
    let result = parse("");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message, "expected a grammar declaration");
    assert_eq!(result.syntax().kind(), SyntaxKind::GrammarSpec);
    assert_eq!(result.syntax().text().to_string(), "");
}

#[test]
fn token_at_offset_finds_the_grammar_name() {
    let result = parse("grammar G;");
    let token = result.token_at_offset(8).right_biased().unwrap();
    assert_eq!(token.kind(), SyntaxKind::TokenRef);
    assert_eq!(token.text(), "G");
}

#[test]
fn covering_element_resolves_rule_names() {
    let result = parse(DEMO);
    let root = GrammarSpec::cast(result.syntax()).unwrap();
    let num: LexerRule = root
        .rules()
        .find_map(|r| match r {
            crate::Rule::LexerRule(rule)
                if rule.name_token().is_some_and(|t| t.text() == "NUM") =>
            {
                Some(rule)
            }
            _ => None,
        })
        .unwrap();
    let range = num.name_token().unwrap().text_range();
    let elem = result.covering_element(TextSpan::new(
        u32::from(range.start()),
        u32::from(range.end()),
    ));
    assert_eq!(elem.kind(), SyntaxKind::TokenRef);
}

#[test]
fn element_kind_registration_is_shared_and_named() {
    let first = element_kinds();
    let second = element_kinds();
    assert!(Arc::ptr_eq(&first, &second));

    let kind = first.token(SyntaxKind::LexerCharSet.raw_token());
    let info = magpie_editor::kind_info(kind).unwrap();
    assert_eq!(info.name, "LexerCharSet");
}
