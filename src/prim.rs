//! The VM's primitive table.
//!
//! `prim` instructions name primitives symbolically; the VM dispatches them
//! by a 6-bit index baked into the opcode byte. This module holds the
//! mapping. The default table is the primitive set of the stock VM build;
//! front ends targeting a VM with a different primitive ROM can supply
//! their own pairs.

use std::collections::HashMap;

/// Largest primitive index the one-byte `prim` encoding can carry.
pub const MAX_PRIM: u8 = 63;

/// The stock VM's primitives, in dispatch order.
///
/// `pop` and `return` must stay at indices 46 and 47; the assembler lowers
/// the instructions of the same name onto them.
pub const DEFAULT_PRIMITIVES: &[&str] = &[
    "number?",
    "+",
    "-",
    "*",
    "quotient",
    "remainder",
    "neg",
    "=",
    "<",
    ">",
    "ior",
    "isqrt",
    "xor",
    "pair?",
    "cons",
    "car",
    "cdr",
    "set-car!",
    "set-cdr!",
    "null?",
    "eq?",
    "not",
    "get-cont",
    "graft-to-cont",
    "return-to-cont",
    "halt",
    "symbol?",
    "string?",
    "string->list",
    "list->string",
    "make-u8vector",
    "u8vector-ref",
    "u8vector-set!",
    "print",
    "clock",
    "motor",
    "led",
    "led2-color",
    "getchar-wait",
    "putchar",
    "beep",
    "adc",
    "u8vector?",
    "sernum",
    "u8vector-length",
    "boolean?",
    "pop",
    "return",
];

/// Mapping from primitive name to its dispatch index.
#[derive(Debug, Clone)]
pub struct PrimTable {
    indices: HashMap<String, u8>,
}

impl PrimTable {
    /// Builds a table from explicit (name, index) pairs.
    ///
    /// Returns `None` if any index exceeds [`MAX_PRIM`].
    pub fn from_pairs<I, S>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (S, u8)>,
        S: Into<String>,
    {
        let mut indices = HashMap::new();
        for (name, index) in pairs {
            if index > MAX_PRIM {
                return None;
            }
            indices.insert(name.into(), index);
        }
        Some(PrimTable { indices })
    }

    /// Looks up a primitive's dispatch index.
    pub fn get(&self, name: &str) -> Option<u8> {
        self.indices.get(name).copied()
    }
}

impl Default for PrimTable {
    fn default() -> Self {
        let pairs = DEFAULT_PRIMITIVES.iter()
            .enumerate()
            .map(|(i, &name)| (name, i as u8));
        PrimTable::from_pairs(pairs)
            .unwrap_or_else(|| unreachable!("default table fits 6 bits"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_table() {
        let prims = PrimTable::default();
        assert_eq!(prims.get("cons"), Some(14));
        assert_eq!(prims.get("pop"), Some(46));
        assert_eq!(prims.get("return"), Some(47));
        assert_eq!(prims.get("frobnicate"), None);
    }

    #[test]
    fn indices_above_six_bits_are_rejected() {
        assert!(PrimTable::from_pairs([("ok", 63)]).is_some());
        assert!(PrimTable::from_pairs([("nope", 64)]).is_none());
    }
}
