//! Error types

use crate::binary::read::ReadEof;
use crate::machine::MachineStatus;
use crate::tag::DisplayTag;
use std::fmt;

/// Error returned from shaping functions
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ShapingError {
    Parse(ParseError),
    Code(CodeError),
    Machine(MachineStatus),
}

impl From<ParseError> for ShapingError {
    fn from(error: ParseError) -> Self {
        ShapingError::Parse(error)
    }
}

impl From<CodeError> for ShapingError {
    fn from(error: CodeError) -> Self {
        ShapingError::Code(error)
    }
}

impl From<MachineStatus> for ShapingError {
    fn from(status: MachineStatus) -> Self {
        ShapingError::Machine(status)
    }
}

impl fmt::Display for ShapingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapingError::Parse(err) => write!(f, "shaping parse: {}", err),
            ShapingError::Code(err) => write!(f, "shaping code: {}", err),
            ShapingError::Machine(status) => write!(f, "shaping machine: {}", status),
        }
    }
}

impl std::error::Error for ShapingError {}

/// Errors that originate when parsing binary table data
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ParseError {
    BadEof,
    BadValue,
    BadVersion,
    BadOffset,
    BadIndex,
    LimitExceeded,
    MissingValue,
    MissingTable(u32),
    NotImplemented,
}

impl From<ReadEof> for ParseError {
    fn from(_error: ReadEof) -> Self {
        ParseError::BadEof
    }
}

impl From<std::num::TryFromIntError> for ParseError {
    fn from(_error: std::num::TryFromIntError) -> Self {
        ParseError::BadValue
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::BadEof => write!(f, "end of data reached unexpectedly"),
            ParseError::BadValue => write!(f, "invalid value"),
            ParseError::BadVersion => write!(f, "unexpected data version"),
            ParseError::BadOffset => write!(f, "invalid data offset"),
            ParseError::BadIndex => write!(f, "invalid data index"),
            ParseError::LimitExceeded => write!(f, "limit exceeded"),
            ParseError::MissingValue => write!(f, "an expected data value was missing"),
            ParseError::MissingTable(tag) => {
                write!(f, "font is missing '{}' table", DisplayTag(*tag))
            }
            ParseError::NotImplemented => write!(f, "feature not implemented"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors that originate when loading a rule byte-code program.
///
/// All of these are detected before the program is ever executed; a rule
/// whose constraint or action fails to load disables the owning pass.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum CodeError {
    AllocFailed,
    InvalidOpcode,
    UnimplementedOpcodeUsed,
    JumpPastEnd,
    ArgumentsExhausted,
    MissingReturn,
    /// Static analysis showed the operand stack would underflow.
    StackUnderflow,
    /// Static analysis showed the operand stack would exceed its limit.
    StackOverflow,
}

impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeError::AllocFailed => write!(f, "allocation failed"),
            CodeError::InvalidOpcode => write!(f, "invalid opcode"),
            CodeError::UnimplementedOpcodeUsed => write!(f, "unimplemented opcode used"),
            CodeError::JumpPastEnd => write!(f, "jump past end of program"),
            CodeError::ArgumentsExhausted => write!(f, "arguments exhausted"),
            CodeError::MissingReturn => write!(f, "program is missing a return"),
            CodeError::StackUnderflow => write!(f, "program would underflow the stack"),
            CodeError::StackOverflow => write!(f, "program would overflow the stack"),
        }
    }
}

impl std::error::Error for CodeError {}
