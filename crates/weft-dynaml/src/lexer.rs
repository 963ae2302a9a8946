//! Lexical analysis for DynaML expressions.
//!
//! Tokenization uses logos. Whitespace is skipped, but DynaML is
//! whitespace-sensitive in a few spots (concatenation is juxtaposition,
//! `merge(` is a call while `merge (` is a directive), so every token is
//! handed to the parser together with its byte span; the parser derives
//! "was there a gap" from span adjacency.

use logos::Logos;

/// DynaML token.
///
/// Keyword tokens double as ordinary reference keys in path position
/// (`x.map.value` is a valid reference); the parser converts them back
/// via [`keyword_key`].
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // === Keywords ===
    /// Keyword `merge`
    #[token("merge")]
    Merge,
    /// Keyword `auto`
    #[token("auto")]
    Auto,
    /// Keyword `lambda`
    #[token("lambda")]
    Lambda,
    /// Keyword `map`
    #[token("map")]
    Map,
    /// Keyword `select`
    #[token("select")]
    Select,
    /// Keyword `sum`
    #[token("sum")]
    Sum,
    /// Keyword `sync`
    #[token("sync")]
    Sync,
    /// Keyword `catch`
    #[token("catch")]
    Catch,
    /// Keyword `prefer`
    #[token("prefer")]
    Prefer,
    /// Boolean literal `true`
    #[token("true")]
    True,
    /// Boolean literal `false`
    #[token("false")]
    False,
    /// Keyword `nil`
    #[token("nil")]
    Nil,
    /// Logical conjunction `-and`
    #[token("-and")]
    LogAnd,
    /// Logical disjunction `-or`
    #[token("-or")]
    LogOr,

    // === Operators ===
    /// Alternative operator `||` (also spelled `//`)
    #[token("||")]
    #[token("//")]
    Alt,
    /// Lambda parameter delimiter `|`
    #[token("|")]
    Pipe,
    /// Lambda arrow `->`
    #[token("->")]
    Arrow,
    /// Operator `==`
    #[token("==")]
    EqEq,
    /// Operator `!=`
    #[token("!=")]
    BangEq,
    /// Operator `<=`
    #[token("<=")]
    LtEq,
    /// Operator `>=`
    #[token(">=")]
    GtEq,
    /// Operator `<`
    #[token("<")]
    Lt,
    /// Operator `>`
    #[token(">")]
    Gt,
    /// Assignment `=` (scopes and map literals)
    #[token("=")]
    Eq,
    /// Operator `+`
    #[token("+")]
    Plus,
    /// Operator `-`
    #[token("-")]
    Minus,
    /// Operator `*` (multiplication, currying, substitution)
    #[token("*")]
    Star,
    /// Operator `/`
    #[token("/")]
    Slash,
    /// Operator `%`
    #[token("%")]
    Percent,
    /// Negation `!`
    #[token("!")]
    Bang,
    /// Conditional `?`
    #[token("?")]
    Question,
    /// Marker introducer `&`
    #[token("&")]
    Amp,
    /// Symbol introducer `$`
    #[token("$")]
    Dollar,
    /// Undefined literal `~~`
    #[token("~~")]
    Undef,
    /// Nil literal `~`
    #[token("~")]
    Tilde,

    // === Delimiters ===
    /// Delimiter `(`
    #[token("(")]
    LParen,
    /// Delimiter `)`
    #[token(")")]
    RParen,
    /// Delimiter `[`
    #[token("[")]
    LBracket,
    /// Delimiter `]`
    #[token("]")]
    RBracket,
    /// Delimiter `{`
    #[token("{")]
    LBrace,
    /// Delimiter `}`
    #[token("}")]
    RBrace,
    /// Delimiter `,`
    #[token(",")]
    Comma,
    /// List expansion `...`
    #[token("...")]
    Ellipsis,
    /// Range operator `..`
    #[token("..")]
    DotDot,
    /// Path separator `.`
    #[token(".")]
    Dot,
    /// Tag separator `::`
    #[token("::")]
    ColonColon,
    /// Key/tag component separator `:`
    #[token(":")]
    Colon,

    // === Literals ===
    /// Integer literal, `_` separators allowed (e.g. `42`, `1_000`, `-7`).
    #[regex(r"-?[0-9][0-9_]*", parse_int)]
    Integer(i64),

    /// Float literal (e.g. `3.14`, `-1.5e-8`, `2e10`).
    #[regex(r"-?[0-9][0-9_]*\.[0-9]+([eE]-?[0-9]+)?", parse_float)]
    #[regex(r"-?[0-9][0-9_]*[eE]-?[0-9]+", parse_float)]
    Float(f64),

    /// String literal. Escapes `\"`, `\\`, `\n`, `\t`; any other escape
    /// is kept verbatim.
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    Str(String),

    /// Identifier / reference key. Dashes are legal inside keys
    /// (`a-key`), so `x-and` is one identifier while `x -and y` is a
    /// conjunction.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_-]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn parse_int(lex: &mut logos::Lexer<Token>) -> Option<i64> {
    lex.slice().replace('_', "").parse::<i64>().ok()
}

fn parse_float(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice().replace('_', "").parse::<f64>().ok()
}

/// Unescape a string literal body.
///
/// Unknown escape sequences keep the backslash, matching the permissive
/// treatment of document scalars.
fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Keyword tokens that may reappear as reference keys.
///
/// Returns the key text for keyword tokens, `None` for everything else.
pub fn keyword_key(token: &Token) -> Option<&'static str> {
    match token {
        Token::Merge => Some("merge"),
        Token::Auto => Some("auto"),
        Token::Lambda => Some("lambda"),
        Token::Map => Some("map"),
        Token::Select => Some("select"),
        Token::Sum => Some("sum"),
        Token::Sync => Some("sync"),
        Token::Catch => Some("catch"),
        Token::Prefer => Some("prefer"),
        Token::True => Some("true"),
        Token::False => Some("false"),
        Token::Nil => Some("nil"),
        _ => None,
    }
}

/// Tokenize a DynaML source string into `(token, byte-span)` pairs.
///
/// Returns `Err` with the byte offset of the first unrecognized input.
pub fn tokenize(src: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, usize> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(src).spanned() {
        match result {
            Ok(tok) => tokens.push((tok, span)),
            Err(()) => return Err(span.start),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("lexing failed")
            .into_iter()
            .map(|(tok, _)| tok)
            .collect()
    }

    fn ident(s: &str) -> Token {
        Token::Ident(s.to_string())
    }

    #[test]
    fn test_keywords() {
        let tokens = lex("merge auto lambda prefer");
        assert_eq!(
            tokens,
            vec![Token::Merge, Token::Auto, Token::Lambda, Token::Prefer]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("42 1_000 3.14 -7 2e10 -1.5e-8");
        assert_eq!(
            tokens,
            vec![
                Token::Integer(42),
                Token::Integer(1000),
                Token::Float(3.14),
                Token::Integer(-7),
                Token::Float(2e10),
                Token::Float(-1.5e-8),
            ]
        );
    }

    #[test]
    fn test_signed_number_vs_subtraction() {
        // `1 - 2` keeps a bare minus, `1 -2` glues the sign to the digit
        assert_eq!(
            lex("1 - 2"),
            vec![Token::Integer(1), Token::Minus, Token::Integer(2)]
        );
        assert_eq!(lex("1 -2"), vec![Token::Integer(1), Token::Integer(-2)]);
    }

    #[test]
    fn test_strings() {
        let tokens = lex(r#""hello" "a\"b" "x\ny""#);
        assert_eq!(
            tokens,
            vec![
                Token::Str("hello".to_string()),
                Token::Str("a\"b".to_string()),
                Token::Str("x\ny".to_string()),
            ]
        );
    }

    #[test]
    fn test_dashed_identifier() {
        assert_eq!(lex("a-key"), vec![ident("a-key")]);
        assert_eq!(
            lex("a -and b"),
            vec![ident("a"), Token::LogAnd, ident("b")]
        );
    }

    #[test]
    fn test_reference_path() {
        let tokens = lex("foo.bar[0]");
        assert_eq!(
            tokens,
            vec![
                ident("foo"),
                Token::Dot,
                ident("bar"),
                Token::LBracket,
                Token::Integer(0),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_tag_prefix() {
        let tokens = lex("doc.0::a.b");
        assert_eq!(
            tokens,
            vec![
                ident("doc"),
                Token::Dot,
                Token::Integer(0),
                Token::ColonColon,
                ident("a"),
                Token::Dot,
                ident("b"),
            ]
        );
    }

    #[test]
    fn test_range_and_expansion() {
        assert_eq!(
            lex("[1..3]"),
            vec![
                Token::LBracket,
                Token::Integer(1),
                Token::DotDot,
                Token::Integer(3),
                Token::RBracket,
            ]
        );
        assert_eq!(lex("args..."), vec![ident("args"), Token::Ellipsis]);
    }

    #[test]
    fn test_alternative_spellings() {
        assert_eq!(lex("a || b"), vec![ident("a"), Token::Alt, ident("b")]);
        assert_eq!(lex("a // b"), vec![ident("a"), Token::Alt, ident("b")]);
    }

    #[test]
    fn test_nil_and_undefined() {
        assert_eq!(lex("~ ~~ nil"), vec![Token::Tilde, Token::Undef, Token::Nil]);
    }

    #[test]
    fn test_lambda_tokens() {
        let tokens = lex("lambda |x,y|->x");
        assert_eq!(
            tokens,
            vec![
                Token::Lambda,
                Token::Pipe,
                ident("x"),
                Token::Comma,
                ident("y"),
                Token::Pipe,
                Token::Arrow,
                ident("x"),
            ]
        );
    }

    #[test]
    fn test_marker_tokens() {
        let tokens = lex("&temporary &tag:*net");
        assert_eq!(
            tokens,
            vec![
                Token::Amp,
                ident("temporary"),
                Token::Amp,
                ident("tag"),
                Token::Colon,
                Token::Star,
                ident("net"),
            ]
        );
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(tokenize("a @ b"), Err(2));
    }
}
