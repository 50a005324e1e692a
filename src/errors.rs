//! Error types for the three failure domains: assembling source text,
//! loading persisted bytecode, and running a program.

use std::io;

use thiserror::Error;

use crate::bytecode::Operation;

/// Errors detected while assembling source text. The first error aborts the
/// assembly; no partial program is ever executed.
#[derive(Debug, Error)]
pub enum AssemblyError {
  /// Unrecognized instruction mnemonic.
  #[error("line {line}: invalid instruction: {name}")]
  UnknownInstruction { line: usize, name: String },
  /// The instruction requires an operand and none was given.
  #[error("line {line}: missing operand")]
  MissingOperand { line: usize },
  /// The instruction takes no operand, or too many fields were given.
  #[error("line {line}: unexpected operand")]
  UnexpectedOperand { line: usize },
  /// A `+`/`-` literal was supplied where only unsigned values are legal.
  #[error("line {line}: invalid literal for unsigned instruction")]
  SignedLiteral { line: usize },
  /// The literal could not be parsed in its detected base, or overflows
  /// 64 bits.
  #[error("line {line}: invalid literal: {text}")]
  InvalidLiteral { line: usize, text: String },
  /// The literal does not fit the 25 bit immediate field.
  #[error("line {line}: value out of range: {value}")]
  OperandOutOfRange { line: usize, value: u64 },
  /// A label declaration shared its line with other fields.
  #[error("line {line}: malformed label declaration")]
  MalformedLabel { line: usize },
  #[error("line {line}: duplicate label: {name}")]
  DuplicateLabel { line: usize, name: String },
  /// A jump names a label that is never declared.
  #[error("line {line}: unresolved label: {name}")]
  UnresolvedLabel { line: usize, name: String },
}

/// Errors detected while loading persisted bytecode.
#[derive(Debug, Error)]
pub enum LoadError {
  #[error("error occurred while reading bytecodes: {0}")]
  Io(#[from] io::Error),
  /// The file length is not a multiple of the code word size.
  #[error("bytecode file length {len} is not a multiple of the word size")]
  TruncatedWord { len: usize },
}

/// Errors that abort a `run` and surface to the caller.
#[derive(Debug, Error)]
pub enum RuntimeError {
  /// A pop or peek on an empty stack, for any instruction without an
  /// explicit emptiness guard.
  #[error("stack underflow while executing {0}")]
  StackUnderflow(Operation),
  /// Integer division or modulo with a zero right operand.
  #[error("division by zero while executing {0}")]
  DivisionByZero(Operation),
  #[error("error occurred while writing output: {0}")]
  Print(#[from] io::Error),
}
