//! Property-style checks over the lexer's token stream.

use stola_lang::lexer::{Lexer, Token, TokenKind};

fn lex_all(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut tokens = vec![];
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}

const SAMPLE: &str = concat!(
    "import math\n",
    "function fib(n)\n",
    "  if n less or equals 1\n",
    "    return n\n",
    "  end\n",
    "  return fib(n - 1) plus fib(n - 2)\n",
    "end\n",
    "loop i from 0 to 10 step 2\n",
    "  print(fib(i))\n",
    "end\n",
    "d = { label: 'fib', \"values\": [1, 1, 2] }\n",
    "match d.label\n",
    "case 'fib'\n",
    "  print(true)\n",
    "default\n",
    "  print(null)\n",
    "end\n",
);

#[test]
fn source_positions_are_non_decreasing() {
    let tokens = lex_all(SAMPLE);
    let mut previous = (0usize, 0usize);
    for token in &tokens {
        let position = (token.line, token.column);
        assert!(
            position >= previous,
            "token {:?} at {position:?} goes backwards from {previous:?}",
            token.kind
        );
        previous = position;
    }
}

#[test]
fn relexing_a_literal_reproduces_its_kind() {
    let tokens = lex_all(SAMPLE);
    for token in tokens {
        // Punctuation and the specials are excluded; their literals are not
        // standalone programs.
        let relexable = matches!(
            token.kind,
            TokenKind::Identifier | TokenKind::Number | TokenKind::If | TokenKind::Function
        ) || matches!(
            token.kind,
            TokenKind::LessOrEquals | TokenKind::Plus | TokenKind::Return | TokenKind::End
        );
        if !relexable || token.literal.is_empty() {
            continue;
        }
        let mut lexer = Lexer::new(&token.literal);
        let again = lexer.next_token();
        assert_eq!(
            again.kind, token.kind,
            "literal '{}' did not round-trip",
            token.literal
        );
    }
}

#[test]
fn every_newline_is_a_token() {
    let newline_count = SAMPLE.matches('\n').count();
    let tokens = lex_all(SAMPLE);
    let newline_tokens = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Newline)
        .count();
    assert_eq!(newline_count, newline_tokens);
}

#[test]
fn lexer_never_aborts_on_garbage() {
    let tokens = lex_all("x = @@@ £µ¶\nok = 1\n");
    assert!(tokens.iter().any(|t| t.kind == TokenKind::Error));
    assert!(tokens.iter().any(|t| t.kind == TokenKind::Eof));
    // Statements after the garbage still lex.
    assert!(tokens
        .iter()
        .any(|t| t.kind == TokenKind::Identifier && t.literal == "ok"));
}
