//! # Tokenizer
//!
//! Turns a source fragment into a flat token stream. Whitespace and `#`
//! line comments are skipped; every token records the 1-based line it
//! starts on so runtime faults can point back into the submitted source.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{escaped, is_not, tag, take_while, take_while1},
    character::complete::{char, digit1, not_line_ending, one_of},
    combinator::{map, map_res, opt, recognize, value},
    error::{context, VerboseError},
    multi::many0,
    sequence::{delimited, pair, tuple},
    IResult,
};
use nom_locate::LocatedSpan;
use strum_macros::{AsRefStr, Display, EnumString};

use super::fault::{FaultKind, ScriptFault};

type Span<'a> = LocatedSpan<&'a str>;
type ParserResult<'a, T> = IResult<Span<'a>, T, VerboseError<Span<'a>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    Identifier(String),
    Int(i64),
    Float(f64),
    Str(String),
    Operator(Operator),
    Delimiter(Delimiter),
}

/// One token plus the 1-based source line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Fn,
    Return,
    If,
    Else,
    While,
    Break,
    Continue,
    Import,
    And,
    Or,
    Not,
    True,
    False,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Operator {
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "==")]
    EqualEqual,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "=")]
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Comma,
    Dot,
    Semicolon,
}

// strumでは"}"のような記号の直列化が扱いにくいため手書きする
impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Delimiter::OpenParen => "(",
            Delimiter::CloseParen => ")",
            Delimiter::OpenBrace => "{",
            Delimiter::CloseBrace => "}",
            Delimiter::OpenBracket => "[",
            Delimiter::CloseBracket => "]",
            Delimiter::Comma => ",",
            Delimiter::Dot => ".",
            Delimiter::Semicolon => ";",
        };
        write!(f, "{}", symbol)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Keyword(keyword) => write!(f, "{}", keyword),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Int(value) => write!(f, "{}", value),
            Token::Float(value) => write!(f, "{}", value),
            Token::Str(value) => write!(f, "\"{}\"", value),
            Token::Operator(operator) => write!(f, "{}", operator),
            Token::Delimiter(delimiter) => write!(f, "{}", delimiter),
        }
    }
}

/// Tokenizes a source fragment. Returns a syntax fault pointing at the
/// offending line when no token matches.
#[tracing::instrument(level = "trace", skip(source))]
pub fn tokenize(source: &str) -> Result<Vec<TokenSpan>, ScriptFault> {
    let mut tokens = Vec::new();
    let mut remaining = Span::new(source);

    loop {
        remaining = skip_trivia(remaining);
        if remaining.fragment().is_empty() {
            break;
        }
        let line = remaining.location_line();
        match parse_token(remaining) {
            Ok((rest, token)) => {
                tokens.push(TokenSpan { token, line });
                remaining = rest;
            }
            Err(_) => {
                let found: String = remaining
                    .fragment()
                    .chars()
                    .take_while(|c| !c.is_whitespace())
                    .take(10)
                    .collect();
                return Err(ScriptFault::new(
                    FaultKind::SyntaxError,
                    format!("invalid syntax near '{}' (line {})", found, line),
                ));
            }
        }
    }

    Ok(tokens)
}

fn skip_trivia(input: Span) -> Span {
    let result: ParserResult<()> = value(
        (),
        many0(alt((
            value(
                (),
                take_while1(|c: char| c == ' ' || c == '\t' || c == '\r' || c == '\n'),
            ),
            value((), pair(char('#'), not_line_ending)),
        ))),
    )(input);
    match result {
        Ok((rest, ())) => rest,
        Err(_) => input,
    }
}

fn parse_token(input: Span) -> ParserResult<Token> {
    alt((
        parse_float,
        parse_int,
        parse_string,
        parse_identifier,
        parse_operator,
        parse_delimiter,
    ))(input)
}

fn parse_float(input: Span) -> ParserResult<Token> {
    context(
        "float literal",
        map_res(recognize(tuple((digit1, char('.'), digit1))), |s: Span| {
            s.fragment().parse::<f64>().map(Token::Float)
        }),
    )(input)
}

// 符号は字句ではなく単項演算子として構文側で扱う
fn parse_int(input: Span) -> ParserResult<Token> {
    context(
        "integer literal",
        map_res(digit1, |s: Span| s.fragment().parse::<i64>().map(Token::Int)),
    )(input)
}

#[tracing::instrument(level = "trace", skip(input))]
fn parse_string(input: Span) -> ParserResult<Token> {
    context(
        "string literal",
        map(
            delimited(
                char('"'),
                recognize(opt(escaped(is_not("\\\"\n"), '\\', one_of("\\\"nt")))),
                char('"'),
            ),
            |raw: Span| Token::Str(unescape(raw.fragment())),
        ),
    )(input)
}

fn unescape(raw: &str) -> String {
    let mut unescaped = String::with_capacity(raw.len());
    let mut characters = raw.chars();
    while let Some(c) = characters.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match characters.next() {
            Some('n') => unescaped.push('\n'),
            Some('t') => unescaped.push('\t'),
            Some('\\') => unescaped.push('\\'),
            Some('"') => unescaped.push('"'),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            }
            Option::None => unescaped.push('\\'),
        }
    }
    unescaped
}

#[tracing::instrument(level = "trace", skip(input))]
fn parse_identifier(input: Span) -> ParserResult<Token> {
    let (input, identifier) = context(
        "identifier",
        recognize(pair(
            take_while1(|c: char| c.is_alphabetic() || c == '_'),
            take_while(|c: char| c.is_alphanumeric() || c == '_'),
        )),
    )(input)?;

    let text: &str = identifier.fragment();
    if let Ok(keyword) = Keyword::try_from(text) {
        return Ok((input, Token::Keyword(keyword)));
    }
    Ok((input, Token::Identifier(text.to_string())))
}

fn parse_operator(input: Span) -> ParserResult<Token> {
    context(
        "operator",
        map(
            alt((
                value(Operator::EqualEqual, tag("==")),
                value(Operator::NotEqual, tag("!=")),
                value(Operator::LessEqual, tag("<=")),
                value(Operator::GreaterEqual, tag(">=")),
                value(Operator::Plus, tag("+")),
                value(Operator::Minus, tag("-")),
                value(Operator::Multiply, tag("*")),
                value(Operator::Divide, tag("/")),
                value(Operator::Modulo, tag("%")),
                value(Operator::Less, tag("<")),
                value(Operator::Greater, tag(">")),
                value(Operator::Equal, tag("=")),
            )),
            Token::Operator,
        ),
    )(input)
}

fn parse_delimiter(input: Span) -> ParserResult<Token> {
    context(
        "delimiter",
        map(
            alt((
                value(Delimiter::OpenParen, tag("(")),
                value(Delimiter::CloseParen, tag(")")),
                value(Delimiter::OpenBrace, tag("{")),
                value(Delimiter::CloseBrace, tag("}")),
                value(Delimiter::OpenBracket, tag("[")),
                value(Delimiter::CloseBracket, tag("]")),
                value(Delimiter::Comma, tag(",")),
                value(Delimiter::Dot, tag(".")),
                value(Delimiter::Semicolon, tag(";")),
            )),
            Token::Delimiter,
        ),
    )(input)
}
