//! Structs representing the symbolic instruction stream.
//!
//! The code generator hands the assembler an ordered sequence of
//! [`Stmt`] values: label markers and tagged instructions. This module
//! holds those types along with [`Value`], the Scheme literal datum an
//! instruction such as `push-constant` can carry.

use std::fmt::Write as _;

use num_bigint::BigInt;

/// A label identifier in the instruction stream.
///
/// The code generator names branch targets with small integers; the textual
/// front end interns listing label names into these in order of first
/// appearance. The identifier says nothing about position, which the
/// assembler only resolves during its passes.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl std::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A Scheme literal datum.
///
/// This is the operand domain of `push-constant`: every value the ROM
/// constant area can hold. Equality and hashing are structural, which is
/// what the constant pool keys on.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Value {
    /// `#f`
    False,
    /// `#t`
    True,
    /// `()`
    Nil,
    /// An exact integer of any magnitude.
    Int(BigInt),
    /// A character, kept distinct from its code point until encoding.
    Char(char),
    /// A symbol, identified by name only.
    Sym(String),
    /// A pair of two literals.
    Pair(Box<Value>, Box<Value>),
    /// A string of characters.
    Str(String),
    /// A vector of literals.
    Vector(Vec<Value>),
    /// A vector of bytes.
    Bytes(Vec<u8>),
}

impl Value {
    /// Shortcut for building an exact integer value.
    pub fn int(n: impl Into<BigInt>) -> Self {
        Value::Int(n.into())
    }

    /// Builds a proper list out of the provided elements.
    pub fn list<I>(elems: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        elems.into_iter()
            .rfold(Value::Nil, |tail, head| Value::Pair(Box::new(head), Box::new(tail)))
    }
}

impl std::fmt::Display for Value {
    /// Writes the datum in Scheme `write` syntax.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::False  => f.write_str("#f"),
            Value::True   => f.write_str("#t"),
            Value::Nil    => f.write_str("()"),
            Value::Int(n) => n.fmt(f),
            Value::Char(c) => match c {
                ' '    => f.write_str("#\\space"),
                '\n'   => f.write_str("#\\newline"),
                '\t'   => f.write_str("#\\tab"),
                '\0'   => f.write_str("#\\nul"),
                _      => write!(f, "#\\{c}"),
            },
            Value::Sym(s) => f.write_str(s),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Pair(car, cdr) => {
                // Print list runs as (a b . c) rather than (a . (b . c)).
                write!(f, "({car}")?;
                let mut rest = cdr;
                loop {
                    match &**rest {
                        Value::Nil => break,
                        Value::Pair(car, cdr) => {
                            write!(f, " {car}")?;
                            rest = cdr;
                        }
                        other => {
                            write!(f, " . {other}")?;
                            break;
                        }
                    }
                }
                f.write_char(')')
            }
            Value::Vector(elems) => {
                f.write_str("#(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 { f.write_char(' ')?; }
                    e.fmt(f)?;
                }
                f.write_char(')')
            }
            Value::Bytes(bytes) => {
                f.write_str("#u8(")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 { f.write_char(' ')?; }
                    b.fmt(f)?;
                }
                f.write_char(')')
            }
        }
    }
}

/// A tagged instruction from the code generator.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Instr {
    /// Procedure entry marker: parameter count and rest-parameter flag.
    Entry {
        /// Number of fixed parameters.
        nparams: u8,
        /// Whether the procedure takes a rest parameter.
        rest: bool,
    },
    /// Push a literal datum.
    PushConstant(Value),
    /// Push the stack slot `n` entries down.
    PushStack(u32),
    /// Push the named global variable.
    PushGlobal(String),
    /// Store the top of stack into the named global variable.
    SetGlobal(String),
    /// Call the procedure on the stack with `n` arguments.
    Call(u32),
    /// Tail-call the procedure on the stack with `n` arguments.
    Jump(u32),
    /// Call the top-level procedure at the label.
    CallToplevel(LabelId),
    /// Tail-call the top-level procedure at the label.
    JumpToplevel(LabelId),
    /// Unconditional branch.
    Goto(LabelId),
    /// Branch taken when the top of stack is `#f`.
    GotoIfFalse(LabelId),
    /// Build a closure over the code at the label.
    Closure(LabelId),
    /// Invoke a VM primitive by name.
    Prim(String),
    /// Return from the current procedure.
    Return,
    /// Discard the top of stack.
    Pop,
}

impl Instr {
    /// The instruction's tag name, as spelled in listings.
    ///
    /// Also used to key the per-run instruction statistics.
    pub fn name(&self) -> &'static str {
        match self {
            Instr::Entry { .. }      => "entry",
            Instr::PushConstant(_)   => "push-constant",
            Instr::PushStack(_)      => "push-stack",
            Instr::PushGlobal(_)     => "push-global",
            Instr::SetGlobal(_)      => "set-global",
            Instr::Call(_)           => "call",
            Instr::Jump(_)           => "jump",
            Instr::CallToplevel(_)   => "call-toplevel",
            Instr::JumpToplevel(_)   => "jump-toplevel",
            Instr::Goto(_)           => "goto",
            Instr::GotoIfFalse(_)    => "goto-if-false",
            Instr::Closure(_)        => "closure",
            Instr::Prim(_)           => "prim",
            Instr::Return            => "return",
            Instr::Pop               => "pop",
        }
    }
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instr::Entry { nparams, rest: false } => write!(f, "entry {nparams}"),
            Instr::Entry { nparams, rest: true }  => write!(f, "entry {nparams} rest"),
            Instr::PushConstant(v) => write!(f, "push-constant {v}"),
            Instr::PushStack(n)    => write!(f, "push-stack {n}"),
            Instr::PushGlobal(g)   => write!(f, "push-global {g}"),
            Instr::SetGlobal(g)    => write!(f, "set-global {g}"),
            Instr::Call(n)         => write!(f, "call {n}"),
            Instr::Jump(n)         => write!(f, "jump {n}"),
            Instr::CallToplevel(l) => write!(f, "call-toplevel {l}"),
            Instr::JumpToplevel(l) => write!(f, "jump-toplevel {l}"),
            Instr::Goto(l)         => write!(f, "goto {l}"),
            Instr::GotoIfFalse(l)  => write!(f, "goto-if-false {l}"),
            Instr::Closure(l)      => write!(f, "closure {l}"),
            Instr::Prim(p)         => write!(f, "prim {p}"),
            Instr::Return          => f.write_str("return"),
            Instr::Pop             => f.write_str("pop"),
        }
    }
}

/// One element of the instruction stream:
/// a label definition or an instruction.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Stmt {
    /// The label is defined at this point in the stream.
    Label(LabelId),
    /// An instruction to encode.
    Instr(Instr),
}

impl std::fmt::Display for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stmt::Label(l) => write!(f, "{l}:"),
            Stmt::Instr(i) => write!(f, "    {i}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Value;

    #[test]
    fn display_write_syntax() {
        let v = Value::list([
            Value::int(1),
            Value::Pair(Box::new(Value::int(2)), Box::new(Value::int(3))),
            Value::Str("hi".to_string()),
            Value::Char(' '),
        ]);
        assert_eq!(v.to_string(), r#"(1 (2 . 3) "hi" #\space)"#);
        assert_eq!(Value::Vector(vec![Value::True, Value::Nil]).to_string(), "#(#t ())");
        assert_eq!(Value::Bytes(vec![1, 255]).to_string(), "#u8(1 255)");
    }

    #[test]
    fn list_builds_proper_lists() {
        assert_eq!(Value::list([]), Value::Nil);
        assert_eq!(
            Value::list([Value::int(104), Value::int(97)]).to_string(),
            "(104 97)"
        );
    }
}
