/*!
  This module is responsible for the encoding and decoding of binary
  instructions, and for reading and writing persisted bytecode.

  The persisted format is the raw word stream: a headerless sequence of
  32 bit code words, little endian, with no magic number or checksum. The
  only structural check available on load is that the file length is an
  exact multiple of the word size.
*/

use std::convert::TryFrom;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use super::Operation;
use crate::errors::LoadError;

// If you change this you must also change `encode` and `decode`.
pub type Code = u32;
pub type Program = Vec<Code>;

pub const OPCODE_BITS: u32 = 7;
/// Largest value an in-word immediate can hold (25 bits).
pub const MAX_IMMEDIATE: u32 = (1 << (32 - OPCODE_BITS)) - 1;

/// Packs an opcode and its immediate into a code word. The immediate of a
/// nullary instruction is simply zero.
pub fn encode(opcode: Operation, immediate: u32) -> Code {
  debug_assert!(immediate <= MAX_IMMEDIATE);
  (immediate << OPCODE_BITS) + opcode.code() as Code
}

/**
  Unpacks a code word: `opcode = word % 128`, `immediate = word >> 7`.

  An opcode value outside the table decodes as `Doze`, so a program
  containing words this revision does not know about still executes; the
  unknown words are no-ops.
*/
pub fn decode(word: Code) -> (Operation, u32) {
  let opcode = match Operation::try_from((word % 128) as u8) {
    Ok(opcode) => opcode,
    Err(_) => Operation::Doze,
  };
  (opcode, word >> OPCODE_BITS)
}

pub fn write_program<W: Write>(program: &Program, writer: &mut W) -> io::Result<()> {
  for word in program {
    writer.write_all(&word.to_le_bytes())?;
  }
  Ok(())
}

pub fn write_program_file<P: AsRef<Path>>(program: &Program, path: P) -> io::Result<()> {
  let mut file = File::create(path)?;
  write_program(program, &mut file)
}

pub fn read_program<R: Read>(reader: &mut R) -> Result<Program, LoadError> {
  let mut bytes = Vec::new();
  reader.read_to_end(&mut bytes)?;

  if bytes.len() % 4 != 0 {
    return Err(LoadError::TruncatedWord { len: bytes.len() });
  }

  let program =
    bytes
      .chunks_exact(4)
      .map(|chunk| Code::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
      .collect();

  Ok(program)
}

pub fn read_program_file<P: AsRef<Path>>(path: P) -> Result<Program, LoadError> {
  let mut file = File::open(path)?;
  read_program(&mut file)
}
