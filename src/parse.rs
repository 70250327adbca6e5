//! Parsing assembler listings into the instruction stream.
//!
//! The code generator emits its symbolic output as a textual listing: one
//! label definition or instruction per line, with `push-constant` operands
//! in Scheme read syntax. This module turns such a listing into the
//! `Vec<`[`Stmt`]`>` the assembler consumes.
//!
//! The parser module consists of:
//! - [`lex`]: the implementation of the lexer/tokenizer
//! - [`Parser`]: the main logic for the parser

pub mod lex;

use std::borrow::Cow;
use std::collections::HashMap;

use logos::{Logos, Span};
use num_traits::ToPrimitive;

use crate::ast::{Instr, LabelId, Stmt, Value};
use lex::Token;

/// Parses an assembler listing into a `Vec` of statements.
///
/// This is a shortcut over constructing a [`Parser`].
pub fn parse_ast(s: &str) -> Result<Vec<Stmt>, ParseErr> {
    Parser::new(s)?.parse_program()
}

/// Any error that occurs during parsing tokens.
#[derive(Debug)]
pub struct ParseErr {
    msg: Cow<'static, str>,
    span: Span,
}
impl ParseErr {
    fn new<C: Into<Cow<'static, str>>>(msg: C, span: Span) -> Self {
        Self { msg: msg.into(), span }
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.span, self.msg)
    }
}
impl std::error::Error for ParseErr {}
impl crate::err::Error for ParseErr {
    fn span(&self) -> Option<std::ops::Range<usize>> {
        Some(self.span.clone())
    }
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}

/// The main parser struct, which holds the main logic for the parser.
pub struct Parser {
    tokens: Vec<(Token, Span)>,
    index: usize,
    /// Listing label names, interned in order of first appearance.
    labels: HashMap<String, LabelId>,
}

impl Parser {
    /// Creates a new parser from a given string.
    ///
    /// In the instantiation process, this function will attempt to tokenize
    /// the string, raising an error if it fails.
    pub fn new(stream: &str) -> Result<Self, ParseErr> {
        let tokens = Token::lexer(stream).spanned()
            .map(|(m_token, span)| match m_token {
                Ok(token) => Ok((token, span)),
                Err(err)  => Err(ParseErr::new(err.to_string(), span)),
            })
            .filter(|t| !matches!(t, Ok((Token::Comment, _)))) // filter comments
            .collect::<Result<_, _>>()?;

        Ok(Self { tokens, index: 0, labels: HashMap::new() })
    }

    /// Peeks at the next token to read.
    fn peek(&self) -> Option<&(Token, Span)> {
        self.tokens[self.index..].first()
    }

    /// Advances the parser ahead by one token.
    fn advance(&mut self) {
        self.index += 1;
        self.index = self.index.min(self.tokens.len());
    }

    /// Gets the range of the next token to read
    /// (or an EOL range if there are no more tokens to read).
    fn cursor(&self) -> Span {
        match self.peek().or_else(|| self.tokens.last()) {
            Some((_, span)) => span.clone(),
            None => 0..0,
        }
    }

    /// Takes the next token, erroring with `expected` at end of input.
    fn next(&mut self, expected: &'static str) -> Result<(Token, Span), ParseErr> {
        match self.peek() {
            Some(ts) => {
                let ts = ts.clone();
                self.advance();
                Ok(ts)
            }
            None => Err(ParseErr::new(expected, self.cursor())),
        }
    }

    /// Consumes the next token if the predicate accepts it.
    fn eat(&mut self, pred: impl FnOnce(&Token) -> bool) -> bool {
        match self.peek() {
            Some((token, _)) if pred(token) => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    /// Parses the whole listing.
    pub fn parse_program(mut self) -> Result<Vec<Stmt>, ParseErr> {
        let mut stmts = vec![];
        loop {
            while self.eat(|t| matches!(t, Token::NewLine)) {}
            if self.peek().is_none() {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    /// Parses one statement: `name:` or `mnemonic operand*`, through the
    /// end of its line.
    fn parse_stmt(&mut self) -> Result<Stmt, ParseErr> {
        let (token, span) = self.next("expected a statement")?;
        let Token::Ident(word) = token else {
            return Err(ParseErr::new("expected an instruction or label", span));
        };

        if self.eat(|t| matches!(t, Token::Colon)) {
            return Ok(Stmt::Label(self.intern_label(&word)));
        }

        let instr = match word.as_str() {
            "entry" => {
                let nparams = self.parse_u8()?;
                let rest = self.eat(|t| matches!(t, Token::Ident(w) if w == "rest"));
                Instr::Entry { nparams, rest }
            }
            "push-constant" => Instr::PushConstant(self.parse_value()?),
            "push-stack"    => Instr::PushStack(self.parse_u32()?),
            "push-global"   => Instr::PushGlobal(self.parse_name()?),
            "set-global"    => Instr::SetGlobal(self.parse_name()?),
            "call"          => Instr::Call(self.parse_u32()?),
            "jump"          => Instr::Jump(self.parse_u32()?),
            "call-toplevel" => Instr::CallToplevel(self.parse_label_ref()?),
            "jump-toplevel" => Instr::JumpToplevel(self.parse_label_ref()?),
            "goto"          => Instr::Goto(self.parse_label_ref()?),
            "goto-if-false" => Instr::GotoIfFalse(self.parse_label_ref()?),
            "closure"       => Instr::Closure(self.parse_label_ref()?),
            "prim"          => Instr::Prim(self.parse_name()?),
            "return"        => Instr::Return,
            "pop"           => Instr::Pop,
            _ => return Err(ParseErr::new(format!("unknown instruction '{word}'"), span)),
        };

        match self.peek() {
            None => Ok(Stmt::Instr(instr)), // end of input ends the line
            Some((Token::NewLine, _)) => {
                self.advance();
                Ok(Stmt::Instr(instr))
            }
            Some((_, span)) => Err(ParseErr::new("expected end of line", span.clone())),
        }
    }

    fn intern_label(&mut self, name: &str) -> LabelId {
        match self.labels.get(name) {
            Some(&id) => id,
            None => {
                let id = LabelId(self.labels.len() as u32);
                self.labels.insert(name.to_string(), id);
                id
            }
        }
    }

    fn parse_label_ref(&mut self) -> Result<LabelId, ParseErr> {
        match self.next("expected a label")? {
            (Token::Ident(name), _) => Ok(self.intern_label(&name)),
            (_, span) => Err(ParseErr::new("expected a label", span)),
        }
    }

    fn parse_name(&mut self) -> Result<String, ParseErr> {
        match self.next("expected a name")? {
            (Token::Ident(name), _) => Ok(name),
            (_, span) => Err(ParseErr::new("expected a name", span)),
        }
    }

    fn parse_u8(&mut self) -> Result<u8, ParseErr> {
        match self.next("expected a number")? {
            (Token::Int(n), span) => n.to_u8()
                .ok_or_else(|| ParseErr::new("operand does not fit in 8 bits", span)),
            (_, span) => Err(ParseErr::new("expected a number", span)),
        }
    }

    fn parse_u32(&mut self) -> Result<u32, ParseErr> {
        match self.next("expected a number")? {
            (Token::Int(n), span) => n.to_u32()
                .ok_or_else(|| ParseErr::new("operand does not fit in 32 bits", span)),
            (_, span) => Err(ParseErr::new("expected a number", span)),
        }
    }

    /// Parses one literal datum in Scheme read syntax.
    fn parse_value(&mut self) -> Result<Value, ParseErr> {
        match self.next("expected a literal")? {
            (Token::Int(n), _)    => Ok(Value::Int(n)),
            (Token::True, _)      => Ok(Value::True),
            (Token::False, _)     => Ok(Value::False),
            (Token::Char(c), _)   => Ok(Value::Char(c)),
            (Token::String(s), _) => Ok(Value::Str(s)),
            (Token::Ident(s), _)  => Ok(Value::Sym(s)),
            (Token::Quote, _)     => self.parse_value(),
            (Token::LParen, _)    => self.parse_list_tail(),
            (Token::VecOpen, _) => {
                let mut elems = vec![];
                while !self.eat(|t| matches!(t, Token::RParen)) {
                    elems.push(self.parse_value()?);
                }
                Ok(Value::Vector(elems))
            }
            (Token::BytesOpen, _) => {
                let mut bytes = vec![];
                while !self.eat(|t| matches!(t, Token::RParen)) {
                    match self.next("expected a byte")? {
                        (Token::Int(n), span) => bytes.push(n.to_u8().ok_or_else(|| {
                            ParseErr::new("byte-vector elements must be in [0, 255]", span)
                        })?),
                        (_, span) => return Err(ParseErr::new("expected a byte", span)),
                    }
                }
                Ok(Value::Bytes(bytes))
            }
            (_, span) => Err(ParseErr::new("expected a literal", span)),
        }
    }

    /// Parses the remainder of a list literal, after its `(`.
    fn parse_list_tail(&mut self) -> Result<Value, ParseErr> {
        if self.eat(|t| matches!(t, Token::RParen)) {
            return Ok(Value::Nil);
        }
        let head = self.parse_value()?;
        let tail = if self.eat(|t| matches!(t, Token::Dot)) {
            let tail = self.parse_value()?;
            match self.next("expected ')'")? {
                (Token::RParen, _) => tail,
                (_, span) => return Err(ParseErr::new("expected ')'", span)),
            }
        } else {
            self.parse_list_tail()?
        };
        Ok(Value::Pair(Box::new(head), Box::new(tail)))
    }
}

#[cfg(test)]
mod test {
    use super::parse_ast;
    use crate::ast::{Instr::*, LabelId, Stmt, Value};

    #[test]
    fn listing_round_trip() {
        let src = "\
; toplevel
main:
    entry 2 rest
    push-constant \"hi\"
    push-global out
    set-global out
    push-stack 1
    call 2
    goto-if-false main
    prim cons
    return
    pop
";
        let stmts = parse_ast(src).unwrap();
        assert_eq!(stmts, [
            Stmt::Label(LabelId(0)),
            Stmt::Instr(Entry { nparams: 2, rest: true }),
            Stmt::Instr(PushConstant(Value::Str("hi".to_string()))),
            Stmt::Instr(PushGlobal("out".to_string())),
            Stmt::Instr(SetGlobal("out".to_string())),
            Stmt::Instr(PushStack(1)),
            Stmt::Instr(Call(2)),
            Stmt::Instr(GotoIfFalse(LabelId(0))),
            Stmt::Instr(Prim("cons".to_string())),
            Stmt::Instr(Return),
            Stmt::Instr(Pop),
        ]);
    }

    #[test]
    fn labels_intern_in_order_of_first_appearance() {
        let src = "goto end\nstart:\nend:\ngoto start\n";
        let stmts = parse_ast(src).unwrap();
        assert_eq!(stmts, [
            Stmt::Instr(Goto(LabelId(0))),     // end
            Stmt::Label(LabelId(1)),           // start
            Stmt::Label(LabelId(0)),
            Stmt::Instr(Goto(LabelId(1))),
        ]);
    }

    #[test]
    fn literal_syntax() {
        let src = "push-constant (1 2 . 3)\npush-constant '(#t #\\a)\npush-constant #(1 \"s\")\npush-constant #u8(0 255)\npush-constant 'sym\n";
        let stmts = parse_ast(src).unwrap();
        let consts: Vec<&Value> = stmts.iter()
            .map(|s| match s {
                Stmt::Instr(PushConstant(v)) => v,
                _ => panic!("expected push-constant"),
            })
            .collect();
        assert_eq!(consts[0].to_string(), "(1 2 . 3)");
        assert_eq!(consts[1].to_string(), "(#t #\\a)");
        assert_eq!(consts[2].to_string(), "#(1 \"s\")");
        assert_eq!(consts[3].to_string(), "#u8(0 255)");
        assert_eq!(consts[4], &Value::Sym("sym".to_string()));
    }

    #[test]
    fn rejects_unknown_instructions() {
        assert!(parse_ast("frobnicate 1\n").is_err());
    }

    #[test]
    fn rejects_out_of_range_bytes() {
        assert!(parse_ast("push-constant #u8(256)\n").is_err());
    }

    #[test]
    fn rejects_trailing_operands() {
        assert!(parse_ast("return 1\n").is_err());
    }
}
