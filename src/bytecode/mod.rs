/*!

  The VM uses a 32 bit code word. Bits [0,7) hold the opcode, so opcode
  values live in 0..128 and `opcode = word % 128`. Bits [7,32) hold a single
  unsigned immediate operand, zero extended, so `immediate = word >> 7` and
  an in-word immediate is limited to 25 bits. The wire format carries only
  unsigned immediates; signed quantities are built on the stack out of 16 bit
  chunks by the assembler's push macros and re-tagged by an explicit spawn
  instruction, never by reinterpreting the word's bits.

  A program is an ordered sequence of code words addressed by a zero-based
  program counter. It is built once, by the assembler or by loading a
  bytecode file, and is immutable afterwards.

  One design decision that needed to be made is whether to store a decoded
  instruction as an enum with one data-carrying variant per opcode. Every
  instruction here is a single word with at most one operand, so that would
  buy nothing: an enum is only used for the opcode itself, and it inhabits a
  single byte. The opcode's textual mnemonic and its numeric value both
  derive from the same declaration, so the two can never fall out of step.

*/

mod assembly;
mod binary;
mod instruction;

pub use assembly::assemble;
pub use binary::{
  decode, encode, read_program, read_program_file, write_program, write_program_file,
  Code, Program, MAX_IMMEDIATE,
};
pub use instruction::Operation;
