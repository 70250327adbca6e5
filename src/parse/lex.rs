//! Tokenizing assembler listings.
//!
//! This module holds the tokens that characterize the code generator's
//! textual output ([`Token`]): instruction mnemonics, label names, and
//! Scheme literal syntax for `push-constant` operands.

use logos::{Lexer, Logos};
use num_bigint::BigInt;

/// A unit of information in an assembler listing.
#[derive(Debug, Logos, PartialEq, Clone)]
#[logos(skip r"[ \t]+", error = LexErr)]
pub enum Token {
    /// An exact integer literal (e.g. `42`, `-1`, `#x45`), any magnitude.
    #[regex(r"-?[0-9]+", lex_dec)]
    #[regex(r"#x[0-9A-Fa-f]+", lex_hex)]
    Int(BigInt),

    /// The true literal, `#t`.
    #[token("#t")]
    True,

    /// The false literal, `#f`.
    #[token("#f")]
    False,

    /// A character literal (e.g. `#\a`, `#\space`).
    #[regex(r"#\\[!-~][A-Za-z0-9]*", lex_char)]
    Char(char),

    /// An opening parenthesis, starting a list literal.
    #[token("(")]
    LParen,

    /// A closing parenthesis.
    #[token(")")]
    RParen,

    /// `#(`, starting a vector literal.
    #[token("#(")]
    VecOpen,

    /// `#u8(`, starting a byte-vector literal.
    #[token("#u8(")]
    BytesOpen,

    /// A quote; listings use it for symbol and list constants.
    #[token("'")]
    Quote,

    /// The dot of a dotted pair.
    #[token(".")]
    Dot,

    /// The colon ending a label definition.
    #[token(":")]
    Colon,

    /// A string literal (e.g. `"hello"`).
    #[token("\"", lex_str_literal)]
    String(std::string::String),

    /// An identifier: an instruction mnemonic, label name, global name,
    /// primitive name, or symbol literal.
    #[regex(r"[A-Za-z_+*/<>=][A-Za-z0-9_?!*/+<>=-]*", |lx| lx.slice().to_string())]
    #[token("-", |lx| lx.slice().to_string())]
    Ident(std::string::String),

    /// A comment, from a semicolon to the end of the line.
    #[regex(r";[^\n]*")]
    Comment,

    /// A new line.
    #[regex(r"\r?\n")]
    NewLine,
}

/// Any errors raised in attempting to tokenize an input stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErr {
    /// A `#\` literal with an unrecognized character name.
    InvalidCharName,
    /// String literal is missing an end quotation mark on its line.
    UnclosedStrLit,
    /// A symbol was used which does not occur in any listing token.
    #[default]
    InvalidSymbol,
}

impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::InvalidCharName => f.write_str("invalid character literal"),
            LexErr::UnclosedStrLit  => f.write_str("unclosed string literal"),
            LexErr::InvalidSymbol   => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::InvalidCharName => Some(r"characters are written #\x, #\space, #\newline, #\tab or #\nul".into()),
            LexErr::UnclosedStrLit  => Some("add a quote before the end of the line".into()),
            LexErr::InvalidSymbol   => Some("this char does not occur in any listing token".into()),
        }
    }
}

fn lex_dec(lx: &Lexer<'_, Token>) -> BigInt {
    lx.slice().parse::<BigInt>()
        .unwrap_or_else(|_| unreachable!("regex only admits digits"))
}

fn lex_hex(lx: &Lexer<'_, Token>) -> BigInt {
    let Some(hex) = lx.slice().strip_prefix("#x") else {
        unreachable!("lexer slice should have started with #x");
    };
    BigInt::parse_bytes(hex.as_bytes(), 16)
        .unwrap_or_else(|| unreachable!("regex only admits hex digits"))
}

fn lex_char(lx: &Lexer<'_, Token>) -> Result<char, LexErr> {
    let name = &lx.slice()[2..];
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => match name {
            "space"   => Ok(' '),
            "newline" => Ok('\n'),
            "tab"     => Ok('\t'),
            "nul"     => Ok('\0'),
            _ => Err(LexErr::InvalidCharName),
        },
    }
}

fn lex_str_literal(lx: &mut Lexer<'_, Token>) -> Result<String, LexErr> {
    // The opening quote is already consumed; scan its line for the close,
    // resolving the simple group of escapes as we go.
    let rem = lx.remainder().lines().next().unwrap_or("");

    let mut buf = String::new();
    let mut chars = rem.char_indices();
    loop {
        let Some((i, c)) = chars.next() else {
            lx.bump(rem.len());
            return Err(LexErr::UnclosedStrLit);
        };
        match c {
            '"' => {
                lx.bump(i + 1);
                return Ok(buf);
            }
            '\\' => {
                let Some((_, esc)) = chars.next() else {
                    lx.bump(rem.len());
                    return Err(LexErr::UnclosedStrLit);
                };
                match esc {
                    'n'  => buf.push('\n'),
                    'r'  => buf.push('\r'),
                    't'  => buf.push('\t'),
                    '\\' => buf.push('\\'),
                    '0'  => buf.push('\0'),
                    '"'  => buf.push('"'),
                    other => {
                        buf.push('\\');
                        buf.push(other);
                    }
                }
            }
            c => buf.push(c),
        }
    }
}

#[cfg(test)]
mod test {
    use logos::Logos;
    use num_bigint::BigInt;

    use super::{LexErr, Token};

    fn lex(src: &str) -> Vec<Result<Token, LexErr>> {
        Token::lexer(src).collect()
    }

    #[test]
    fn instruction_line() {
        let tokens = lex("loop:  push-constant -1 ; spin\n");
        assert_eq!(tokens, [
            Ok(Token::Ident("loop".to_string())),
            Ok(Token::Colon),
            Ok(Token::Ident("push-constant".to_string())),
            Ok(Token::Int(BigInt::from(-1))),
            Ok(Token::Comment),
            Ok(Token::NewLine),
        ]);
    }

    #[test]
    fn scheme_literals() {
        let tokens = lex(r##"#t #f #\a #\space "a\"b" #x45 '(1 . 2) #(1) #u8(255)"##);
        assert_eq!(tokens, [
            Ok(Token::True),
            Ok(Token::False),
            Ok(Token::Char('a')),
            Ok(Token::Char(' ')),
            Ok(Token::String("a\"b".to_string())),
            Ok(Token::Int(BigInt::from(0x45))),
            Ok(Token::Quote),
            Ok(Token::LParen),
            Ok(Token::Int(BigInt::from(1))),
            Ok(Token::Dot),
            Ok(Token::Int(BigInt::from(2))),
            Ok(Token::RParen),
            Ok(Token::VecOpen),
            Ok(Token::Int(BigInt::from(1))),
            Ok(Token::RParen),
            Ok(Token::BytesOpen),
            Ok(Token::Int(BigInt::from(255))),
            Ok(Token::RParen),
        ]);
    }

    #[test]
    fn operator_identifiers() {
        let tokens = lex("prim + prim - prim string->list");
        assert_eq!(tokens, [
            Ok(Token::Ident("prim".to_string())),
            Ok(Token::Ident("+".to_string())),
            Ok(Token::Ident("prim".to_string())),
            Ok(Token::Ident("-".to_string())),
            Ok(Token::Ident("prim".to_string())),
            Ok(Token::Ident("string->list".to_string())),
        ]);
    }

    #[test]
    fn bad_tokens() {
        assert_eq!(lex(r#""open"#), [Err(LexErr::UnclosedStrLit)]);
        assert_eq!(lex(r"#\frobnicate"), [Err(LexErr::InvalidCharName)]);
        assert!(lex("@").contains(&Err(LexErr::InvalidSymbol)));
    }
}
