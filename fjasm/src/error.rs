use crate::parser::Rule;
use std::fmt;
use std::num::ParseIntError;
use thiserror::Error;

/// A source position: 1-indexed line number. Columns aren't tracked, same
/// as the reference assembler's own diagnostics.
pub type Pos = u32;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{0}")]
    Grammar(#[from] pest::error::Error<Rule>),
    #[error("line {1}: invalid integer literal: {0}")]
    Int(ParseIntError, Pos),
    #[error("line {0}: macro \"{1}\" defined more than once with the same arity")]
    DuplicateMacro(Pos, String),
    #[error("line {0}: duplicate parameter name \"{1}\"")]
    DuplicateParam(Pos, String),
    #[error("line {0}: label \"{1}\" declared in more than one class")]
    ConflictingLabelClass(Pos, String),
    #[error("line {0}: too many leading dots for the current namespace depth")]
    ExcessiveLeadingDots(Pos),
    #[error("line {0}: constant \"{1}\" redeclared")]
    ConstRedeclared(Pos, String),
    #[error("line {0}: \"{1}\" is a reserved keyword and cannot name a macro")]
    ReservedMacroName(Pos, String),
    #[error("line {0}: string literal is {1} bytes, wider than the 8 a single value can hold")]
    StringLiteralTooWide(Pos, usize),
}

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("line {0}: call to undefined macro \"{1}\" with {2} argument(s)")]
    UndefinedMacro(Pos, String, usize),
    #[error("line {0}: recursive macro expansion of \"{1}\"/{2}")]
    MacroRecursion(Pos, String, usize),
    #[error("line {0}: symbol \"{1}\" is never resolved")]
    UnresolvedSymbol(Pos, String),
    #[error("line {0}: division by zero")]
    DivisionByZero(Pos),
    #[error("line {0}: modulo by zero")]
    ModuloByZero(Pos),
    #[error("segments overlap: [{0}, {1}) and [{2}, {3})")]
    SegmentOverlap(u64, u64, u64, u64),
    #[error("line {0}: label \"{1}\" is declared more than once")]
    DuplicateLabel(Pos, String),
}

/// Every parse error accumulated across one source file, reported together
/// rather than stopping at the first one found.
#[derive(Debug)]
pub struct ParseErrors(pub Vec<ParseError>);

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseErrors),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    FileFormat(#[from] fjbin::FileFormatError),
}

pub type Result<T> = std::result::Result<T, Error>;
