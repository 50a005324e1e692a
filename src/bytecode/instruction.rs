
use strum_macros::{Display as StrumDisplay, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};

/**
  Opcodes of the virtual machine.

  Rust stores enum variants as bytes. As in C, enum values are represented by
  consecutive natural numbers and can be treated as numeric types. The
  immediate-carrying opcodes are grouped together at the start of the table so
  that whether a given opcode carries an in-word operand can be determined
  with a trivial comparison. Consequently, the order the opcodes are listed
  below is significant. Order-dependencies:
      ```
      Operation::has_immediate()
      ```

  The `strum` serializations double as the assembly mnemonics, so the opcode
  table and its textual names are one declaration.
*/
#[derive(
StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[repr(u8)]
pub enum Operation {
  // Immediate-carrying instructions //
  /// Push the immediate, zero extended, tagged UInt.
  #[strum(serialize = "pushhwi")]
  PushHalfWordImm,
  /// Push the immediate shifted left 16 bits, tagged UInt.
  #[strum(serialize = "pushhwisl16")]
  PushHalfWordImmSL16,
  #[strum(serialize = "sli")]
  ShiftLeftImm,
  #[strum(serialize = "lsri")]
  LogicShiftRightImm,
  #[strum(serialize = "asri")]
  ArithShiftRightImm,
  #[strum(serialize = "rli")]
  RotateLeftImm,
  #[strum(serialize = "rri")]
  RotateRightImm,
  /// Push `immediate` additional copies of the stack top.
  #[strum(serialize = "dupn")]
  DupN,
  #[strum(serialize = "jmp")]
  Jump,
  #[strum(serialize = "branch")]
  Branch,
  // Opcode 10

  // Nullary instructions //
  // Signed integer arithmetic
  #[strum(serialize = "add")]
  Add,
  #[strum(serialize = "sub")]
  Sub,
  #[strum(serialize = "mul")]
  Mul,
  #[strum(serialize = "div")]
  Div,
  #[strum(serialize = "mod")]
  Mod,
  // Unsigned integer arithmetic
  #[strum(serialize = "addu")]
  AddU,
  #[strum(serialize = "subu")]
  SubU,
  #[strum(serialize = "mulu")]
  MulU,
  #[strum(serialize = "divu")]
  DivU,
  #[strum(serialize = "modu")]
  ModU,
  // Floating point arithmetic
  #[strum(serialize = "addf")]
  AddF,
  #[strum(serialize = "subf")]
  SubF,
  #[strum(serialize = "mulf")]
  MulF,
  #[strum(serialize = "divf")]
  DivF,
  /// Special add for assembling a 64 bit value: pop two, add as UInt, shift
  /// the sum left 32 bits.
  #[strum(serialize = "addsl32")]
  AddSL32,
  /// Re-tag the stack top as Int. Bits are unchanged.
  #[strum(serialize = "spawnsint")]
  SpawnSignedInt,
  /// Re-tag the stack top as FP. Bits are unchanged.
  #[strum(serialize = "spawnfp")]
  SpawnFP,
  /// Jump to an address popped from the stack; generated when a target does
  /// not fit the 25 bit immediate.
  #[strum(serialize = "farjmp")]
  FarJump,
  /// Pop the target address, then the condition; jump if the condition is
  /// non-zero.
  #[strum(serialize = "farbranch")]
  FarBranch,
  #[strum(serialize = "pop")]
  Pop,
  #[strum(serialize = "swap")]
  SwapTop,
  #[strum(serialize = "dup")]
  Dup,
  #[strum(serialize = "print")]
  PrintStackTop,
  // Shifts with the count popped from the stack
  #[strum(serialize = "sl")]
  ShiftLeft,
  #[strum(serialize = "lsr")]
  LogicShiftRight,
  #[strum(serialize = "asr")]
  ArithShiftRight,
  // Bitwise
  #[strum(serialize = "and")]
  And,
  #[strum(serialize = "or")]
  Or,
  #[strum(serialize = "not")]
  Not,
  #[strum(serialize = "xor")]
  XOr,
  // Logical, C-style: any non-zero value is true
  #[strum(serialize = "land")]
  LogicAnd,
  #[strum(serialize = "lor")]
  LogicOr,
  #[strum(serialize = "lnot")]
  LogicNot,
  // Rotates with the count popped from the stack
  #[strum(serialize = "rl")]
  RotateLeft,
  #[strum(serialize = "rr")]
  RotateRight,
  /// No-op; also the decode fallback for unrecognized opcode values.
  #[strum(serialize = "doze")]
  Doze,
  // Opcode 45
}

pub const MAX_IMMEDIATE_OPCODE: u8 = 10u8;

impl Operation {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// Whether the opcode carries an in-word immediate operand.
  pub fn has_immediate(&self) -> bool {
    self.code() < MAX_IMMEDIATE_OPCODE
  }
}


#[cfg(test)]
mod tests {
  use std::convert::TryFrom;
  use std::str::FromStr;

  use super::*;

  #[test]
  fn mnemonics_round_trip() {
    assert_eq!(Operation::from_str("addu").unwrap(), Operation::AddU);
    assert_eq!(Operation::from_str("pushhwisl16").unwrap(), Operation::PushHalfWordImmSL16);
    assert_eq!(format!("{}", Operation::FarBranch), "farbranch");
    assert_eq!(format!("{}", Operation::Doze), "doze");
    assert!(Operation::from_str("frobnicate").is_err());
  }

  #[test]
  fn immediate_group_is_a_prefix() {
    for code in 0..MAX_IMMEDIATE_OPCODE {
      assert!(Operation::try_from(code).unwrap().has_immediate());
    }
    assert!(!Operation::Add.has_immediate());
    assert!(!Operation::Doze.has_immediate());
    assert!(Operation::Jump.has_immediate());
    assert!(Operation::DupN.has_immediate());
  }
}
