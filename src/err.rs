//! Error interfaces for this crate.

use std::borrow::Cow;
use std::ops::Range;

pub use crate::asm::AsmErr;
pub use crate::parse::lex::LexErr;
pub use crate::parse::ParseErr;

/// Unified error interface for all errors in this crate.
///
/// The [`Display`] implementation carries the brief message; [`Error::span`]
/// and [`Error::help`] carry whatever extra context the error has for
/// building a diagnostic report.
///
/// [`Display`]: std::fmt::Display
pub trait Error: std::error::Error {
    /// The range in the source listing where this error occurs,
    /// if the error can be traced back to one.
    fn span(&self) -> Option<Range<usize>> {
        None
    }

    /// A clarifying message suggesting how to fix the error,
    /// if there is something useful to add.
    fn help(&self) -> Option<Cow<str>>;
}
