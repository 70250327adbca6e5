//! An assembler for the PicoBit Scheme virtual machine.
//!
//! This crate takes the symbolic instruction stream produced by the PicoBit
//! compiler's code generator and turns it into the ROM image the VM boots
//! from, written out as an Intel HEX file.
//!
//! The crate notably consists of:
//! - [`parse`]: a front end that reads the textual instruction listing
//! - [`asm`]: the assembler passes (constant pooling, global interning,
//!   branch sizing) and the [`assemble`] entry point
//! - [`hex`]: the Intel HEX writer
//!
//! [`assemble`]: asm::assemble

#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod asm;
pub mod hex;
pub mod prim;
pub mod err;
