/*!
  The human readable textual form of bytecode is called assembly: one
  instruction per line, fields separated by runs of spaces and tabs, lines
  terminated by `\r` or `\n`, empty lines skipped. A line consisting of an
  alphanumeric name followed by `:` declares a label at the current program
  offset and emits nothing.

  Two families of pseudo-instructions never reach the opcode table:

  * The push macros (`pushimm`, `pushuimm`, `pushfp`) construct an arbitrary
    64 bit value on the stack out of 16 bit immediate loads, because a code
    word's immediate field cannot hold one. A value that fits 16 bits is a
    single `pushhwi`; one that fits 32 bits is `pushhwisl16` + `pushhwi` +
    `addu`; a full 64 bit value builds its high half with the 32 bit recipe,
    shifts it up with `sli 32`, builds the low half the same way, and joins
    the two with a final `addu`. `pushimm` appends one `spawnsint` and
    `pushfp` (which pushes the IEEE 754 bits of its literal) one `spawnfp`.

  * The jump mnemonics (`jmp`, `branch`, `farjmp`, `farbranch`) name a label
    instead of an address. `jmp` and `branch` become a single compact word
    when the resolved offset fits the immediate field, and otherwise build
    the offset on the stack with the push recipe and finish with the far
    opcode, which consumes it. `farjmp` and `farbranch` force the far form.

  Assembly is two passes. The first parses every line into an item and
  records label declarations against item positions. Label offsets are then
  settled by relaxation: every jump starts at its minimal encoding and only
  ever grows, and since a far sequence's length is monotone in its target
  offset the iteration reaches a fixpoint. The second pass emits code words
  with every label offset known, so forward references resolve like any
  other; a label that is never declared anywhere is a hard error.
*/

use std::collections::HashMap;
use std::str::FromStr;

use nom::{
  bytes::complete::is_not,
  character::complete::{alphanumeric1, char as one_char, space0},
  combinator::all_consuming,
  multi::many0,
  sequence::{preceded, terminated},
  IResult,
};
use string_cache::DefaultAtom;

use super::binary::{encode, Program, MAX_IMMEDIATE};
use super::instruction::Operation;
use crate::errors::AssemblyError;

/// One source line, parsed but not yet sized or emitted.
enum Item {
  /// A real instruction with its validated immediate.
  Plain { opcode: Operation, immediate: u32 },
  /// A push macro: the 64 bits to construct and the spawn that re-tags the
  /// result, if any.
  Push { bits: u64, spawn: Option<Operation> },
  /// A jump mnemonic waiting on its label.
  Jump {
    opcode: Operation, // `Jump` or `Branch`; the compact form
    label: DefaultAtom,
    line: usize,
    far: bool,         // far form requested by mnemonic
  },
}

/// Splits a line into whitespace-separated fields. Leading and trailing
/// blank fields are dropped.
fn split_fields(line: &str) -> Vec<&str> {
  let result: IResult<&str, Vec<&str>> =
    many0(preceded(space0, is_not(" \t")))(line);
  match result {
    Ok((_rest, fields)) => fields,
    Err(_) => vec![],
  }
}

/// Recognizes a label declaration field: one or more alphanumeric characters
/// followed by `:`. Returns the bare name.
fn parse_label(field: &str) -> Option<&str> {
  let result: IResult<&str, &str> =
    all_consuming(terminated(alphanumeric1, one_char(':')))(field);
  match result {
    Ok((_rest, name)) => Some(name),
    Err(_) => None,
  }
}

/**
  Determines an integer literal's base by inspection and strips any base
  prefix: a single character is base 10; a `+`/`-` prefix forces base 10; a
  `0x`/`0X` prefix selects base 16; a `0b`/`0B` prefix selects base 2; any
  other leading `0` selects base 8; otherwise base 10.
*/
fn literal_base(text: &str) -> (u32, &str) {
  if text.len() == 1 {
    (10, text)
  } else if text.starts_with('+') || text.starts_with('-') {
    (10, text)
  } else if text.starts_with("0x") || text.starts_with("0X") {
    (16, &text[2..])
  } else if text.starts_with("0b") || text.starts_with("0B") {
    (2, &text[2..])
  } else if text.starts_with('0') {
    (8, text)
  } else {
    (10, text)
  }
}

fn parse_unsigned_literal(text: &str, line: usize) -> Result<u64, AssemblyError> {
  if text.starts_with('+') || text.starts_with('-') {
    return Err(AssemblyError::SignedLiteral { line });
  }
  let (base, digits) = literal_base(text);
  u64::from_str_radix(digits, base)
    .map_err(|_| AssemblyError::InvalidLiteral { line, text: text.to_string() })
}

fn parse_signed_literal(text: &str, line: usize) -> Result<i64, AssemblyError> {
  let (base, digits) = literal_base(text);
  i64::from_str_radix(digits, base)
    .map_err(|_| AssemblyError::InvalidLiteral { line, text: text.to_string() })
}

/// The single operand of a one-operand line.
fn operand<'a>(fields: &[&'a str], line: usize) -> Result<&'a str, AssemblyError> {
  match fields.len() {
    2 => Ok(fields[1]),
    1 => Err(AssemblyError::MissingOperand { line }),
    _ => Err(AssemblyError::UnexpectedOperand { line }),
  }
}

/// Number of code words the push recipe needs for `bits`.
fn construction_words(bits: u64) -> usize {
  if bits <= 0xFFFF {
    1
  } else if bits <= 0xFFFF_FFFF {
    3
  } else {
    construction_words(bits >> 32) + 1 + construction_words(bits & 0xFFFF_FFFF) + 1
  }
}

/// Number of code words a jump to `offset` needs.
fn jump_words(offset: u64, far: bool) -> usize {
  match !far && offset <= MAX_IMMEDIATE as u64 {
    true  => 1,
    false => construction_words(offset) + 1,
  }
}

/// Emits the 16 bit chunk construction of `bits` (see the module docs).
fn emit_construction(program: &mut Program, bits: u64) {
  if bits <= 0xFFFF {
    program.push(encode(Operation::PushHalfWordImm, bits as u32));
  } else if bits <= 0xFFFF_FFFF {
    program.push(encode(Operation::PushHalfWordImmSL16, (bits >> 16) as u32));
    program.push(encode(Operation::PushHalfWordImm, (bits & 0xFFFF) as u32));
    program.push(encode(Operation::AddU, 0));
  } else {
    emit_construction(program, bits >> 32);
    program.push(encode(Operation::ShiftLeftImm, 32));
    emit_construction(program, bits & 0xFFFF_FFFF);
    program.push(encode(Operation::AddU, 0));
  }
}

fn far_form(opcode: Operation) -> Operation {
  match opcode {
    Operation::Jump => Operation::FarJump,
    _               => Operation::FarBranch,
  }
}

/// First pass: source text to items and label positions (indices into the
/// item list).
fn parse_lines(text: &str)
  -> Result<(Vec<Item>, HashMap<DefaultAtom, usize>), AssemblyError>
{
  let mut items: Vec<Item> = vec![];
  let mut labels: HashMap<DefaultAtom, usize> = HashMap::new();

  for (number, raw_line) in text.split(|c| c == '\n' || c == '\r').enumerate() {
    let line = number + 1;
    let fields = split_fields(raw_line);

    if fields.is_empty() {
      continue;
    }

    if let Some(name) = parse_label(fields[0]) {
      if fields.len() > 1 {
        return Err(AssemblyError::MalformedLabel { line });
      }
      if labels.insert(DefaultAtom::from(name), items.len()).is_some() {
        return Err(AssemblyError::DuplicateLabel { line, name: name.to_string() });
      }
      continue;
    }

    // Pseudo-instructions are recognized by mnemonic before the opcode
    // table is consulted.
    match fields[0] {

      "pushimm" => {
        let value = parse_signed_literal(operand(&fields, line)?, line)?;
        items.push(Item::Push {
          bits: value as u64,
          spawn: Some(Operation::SpawnSignedInt),
        });
      }

      "pushuimm" => {
        let value = parse_unsigned_literal(operand(&fields, line)?, line)?;
        items.push(Item::Push { bits: value, spawn: None });
      }

      "pushfp" => {
        let literal = operand(&fields, line)?;
        let value = literal.parse::<f64>()
          .map_err(|_| AssemblyError::InvalidLiteral { line, text: literal.to_string() })?;
        items.push(Item::Push {
          bits: value.to_bits(),
          spawn: Some(Operation::SpawnFP),
        });
      }

      "jmp" | "branch" | "farjmp" | "farbranch" => {
        let label = DefaultAtom::from(operand(&fields, line)?);
        let (opcode, far) = match fields[0] {
          "jmp"    => (Operation::Jump, false),
          "branch" => (Operation::Branch, false),
          "farjmp" => (Operation::Jump, true),
          _        => (Operation::Branch, true),
        };
        items.push(Item::Jump { opcode, label, line, far });
      }

      mnemonic => {
        let opcode = Operation::from_str(mnemonic)
          .map_err(|_| AssemblyError::UnknownInstruction {
            line,
            name: mnemonic.to_string(),
          })?;

        match opcode.has_immediate() {

          true => {
            let value = parse_unsigned_literal(operand(&fields, line)?, line)?;
            if value > MAX_IMMEDIATE as u64 {
              return Err(AssemblyError::OperandOutOfRange { line, value });
            }
            items.push(Item::Plain { opcode, immediate: value as u32 });
          }

          false => {
            if fields.len() > 1 {
              return Err(AssemblyError::UnexpectedOperand { line });
            }
            items.push(Item::Plain { opcode, immediate: 0 });
          }

        }
      }

    } // end match on mnemonic
  } // end for each line

  Ok((items, labels))
}

/**
  Settles every item's size in code words by relaxation. Jump items start at
  their minimal encoding; a pass recomputes each jump's required size from
  its target's current offset and grows it if needed. Offsets never shrink,
  so required sizes never shrink either and the loop terminates. Returns the
  per-item sizes and per-item word offsets (with one extra slot holding the
  total program length).
*/
fn relax(
  items: &[Item],
  labels: &HashMap<DefaultAtom, usize>,
) -> Result<(Vec<usize>, Vec<usize>), AssemblyError> {
  let mut sizes: Vec<usize> =
    items
      .iter()
      .map(|item| match item {
        Item::Plain { .. }                 => 1,
        Item::Push { bits, spawn }         => construction_words(*bits) + spawn.iter().count(),
        Item::Jump { far, .. }             => if *far { 2 } else { 1 },
      })
      .collect();

  loop {
    let mut offsets: Vec<usize> = Vec::with_capacity(items.len() + 1);
    let mut total = 0usize;
    for size in &sizes {
      offsets.push(total);
      total += size;
    }
    offsets.push(total);

    let mut changed = false;
    for (index, item) in items.iter().enumerate() {
      if let Item::Jump { label, line, far, .. } = item {
        let target_item =
          *labels
            .get(label)
            .ok_or_else(|| AssemblyError::UnresolvedLabel {
              line: *line,
              name: label.to_string(),
            })?;
        let needed = jump_words(offsets[target_item] as u64, *far);
        if needed > sizes[index] {
          sizes[index] = needed;
          changed = true;
        }
      }
    }

    if !changed {
      return Ok((sizes, offsets));
    }
  }
}

/// Assembles source text into a program. The first error aborts the
/// assembly; no partial program is returned.
pub fn assemble(text: &str) -> Result<Program, AssemblyError> {
  let (items, labels) = parse_lines(text)?;
  let (sizes, offsets) = relax(&items, &labels)?;

  let mut program = Program::new();
  for (index, item) in items.iter().enumerate() {
    match item {

      Item::Plain { opcode, immediate } => {
        program.push(encode(*opcode, *immediate));
      }

      Item::Push { bits, spawn } => {
        emit_construction(&mut program, *bits);
        if let Some(opcode) = spawn {
          program.push(encode(*opcode, 0));
        }
      }

      Item::Jump { opcode, label, .. } => {
        let target = offsets[labels[label]] as u64;
        match sizes[index] {
          1 => program.push(encode(*opcode, target as u32)),
          _ => {
            emit_construction(&mut program, target);
            program.push(encode(far_form(*opcode), 0));
          }
        }
      }

    }
    debug_assert_eq!(program.len(), offsets[index] + sizes[index]);
  }

  Ok(program)
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::decode;

  #[test]
  fn field_splitting() {
    assert_eq!(split_fields("  pushuimm \t 12  "), vec!["pushuimm", "12"]);
    assert_eq!(split_fields(""), Vec::<&str>::new());
    assert_eq!(split_fields(" \t "), Vec::<&str>::new());
  }

  #[test]
  fn label_grammar() {
    assert_eq!(parse_label("loop:"), Some("loop"));
    assert_eq!(parse_label("l00p:"), Some("l00p"));
    assert_eq!(parse_label("loop"), None);
    assert_eq!(parse_label(":"), None);
    assert_eq!(parse_label("lo op:"), None);
  }

  #[test]
  fn literal_bases() {
    assert_eq!(parse_unsigned_literal("0x10", 1).unwrap(), 16);
    assert_eq!(parse_unsigned_literal("0X10", 1).unwrap(), 16);
    assert_eq!(parse_unsigned_literal("0b101", 1).unwrap(), 5);
    assert_eq!(parse_unsigned_literal("010", 1).unwrap(), 8);
    assert_eq!(parse_unsigned_literal("10", 1).unwrap(), 10);
    // A lone `0` is a single character, hence base 10.
    assert_eq!(parse_unsigned_literal("0", 1).unwrap(), 0);
    assert_eq!(parse_signed_literal("-3", 1).unwrap(), -3);
    assert_eq!(parse_signed_literal("+3", 1).unwrap(), 3);
    assert!(parse_unsigned_literal("0xZZ", 1).is_err());
  }

  #[test]
  fn signed_literal_rejected_for_unsigned_contexts() {
    match parse_unsigned_literal("-3", 7) {
      Err(AssemblyError::SignedLiteral { line: 7 }) => {},
      other => panic!("expected SignedLiteral, got {:?}", other),
    }
  }

  #[test]
  fn push_sixteen_bit_is_one_word() {
    let program = assemble("pushuimm 5").unwrap();
    assert_eq!(program, vec![encode(Operation::PushHalfWordImm, 5)]);
  }

  #[test]
  fn push_thirty_two_bit_recipe() {
    let program = assemble("pushuimm 0x12345678").unwrap();
    assert_eq!(program, vec![
      encode(Operation::PushHalfWordImmSL16, 0x1234),
      encode(Operation::PushHalfWordImm, 0x5678),
      encode(Operation::AddU, 0),
    ]);
  }

  #[test]
  fn push_sixty_four_bit_recipe() {
    let program = assemble("pushuimm 0x123456789ABCDEF0").unwrap();
    assert_eq!(program, vec![
      encode(Operation::PushHalfWordImmSL16, 0x1234),
      encode(Operation::PushHalfWordImm, 0x5678),
      encode(Operation::AddU, 0),
      encode(Operation::ShiftLeftImm, 32),
      encode(Operation::PushHalfWordImmSL16, 0x9ABC),
      encode(Operation::PushHalfWordImm, 0xDEF0),
      encode(Operation::AddU, 0),
      encode(Operation::AddU, 0),
    ]);
  }

  #[test]
  fn pushimm_appends_a_single_spawn() {
    let program = assemble("pushimm 5").unwrap();
    assert_eq!(program, vec![
      encode(Operation::PushHalfWordImm, 5),
      encode(Operation::SpawnSignedInt, 0),
    ]);
  }

  #[test]
  fn pushfp_constructs_ieee_bits() {
    let program = assemble("pushfp 1.5").unwrap();
    let bits = 1.5f64.to_bits();
    let mut expected = Program::new();
    emit_construction(&mut expected, bits);
    expected.push(encode(Operation::SpawnFP, 0));
    assert_eq!(program, expected);
  }

  #[test]
  fn backward_label_resolves_compact() {
    let program = assemble("loop:\npushuimm 0\njmp loop").unwrap();
    assert_eq!(program, vec![
      encode(Operation::PushHalfWordImm, 0),
      encode(Operation::Jump, 0),
    ]);
  }

  #[test]
  fn forward_label_resolves_compact() {
    let program = assemble("jmp end\npushuimm 1\nend:").unwrap();
    assert_eq!(program, vec![
      encode(Operation::Jump, 2),
      encode(Operation::PushHalfWordImm, 1),
    ]);
  }

  #[test]
  fn label_offsets_count_words_not_lines() {
    // The 32 bit push expands to three words, so the label lands at 3.
    let program = assemble("pushuimm 0x12345678\nend:\njmp end").unwrap();
    assert_eq!(program[3], encode(Operation::Jump, 3));
  }

  #[test]
  fn far_mnemonic_forces_stack_constructed_jump() {
    let program = assemble("farjmp end\npushuimm 1\nend:").unwrap();
    assert_eq!(program, vec![
      encode(Operation::PushHalfWordImm, 3),
      encode(Operation::FarJump, 0),
      encode(Operation::PushHalfWordImm, 1),
    ]);
  }

  #[test]
  fn farbranch_consumes_its_label_operand() {
    let program = assemble("pushuimm 1\nfarbranch end\ndoze\nend:").unwrap();
    assert_eq!(program, vec![
      encode(Operation::PushHalfWordImm, 1),
      encode(Operation::PushHalfWordImm, 4),
      encode(Operation::FarBranch, 0),
      encode(Operation::Doze, 0),
    ]);
  }

  #[test]
  fn compactness_threshold() {
    assert_eq!(jump_words(MAX_IMMEDIATE as u64, false), 1);
    assert_eq!(jump_words(MAX_IMMEDIATE as u64 + 1, false), 4);
    assert_eq!(jump_words(0, true), 2);
    assert_eq!(jump_words(u64::max_value(), false), 9);
  }

  #[test]
  fn construction_word_counts() {
    assert_eq!(construction_words(0), 1);
    assert_eq!(construction_words(0xFFFF), 1);
    assert_eq!(construction_words(0x10000), 3);
    assert_eq!(construction_words(0xFFFF_FFFF), 3);
    assert_eq!(construction_words(0x1_0000_0000), 4);
    assert_eq!(construction_words(u64::max_value()), 8);
  }

  #[test]
  fn unresolved_label_is_a_hard_error() {
    match assemble("jmp nowhere") {
      Err(AssemblyError::UnresolvedLabel { line: 1, name }) => {
        assert_eq!(name, "nowhere");
      }
      other => panic!("expected UnresolvedLabel, got {:?}", other.err()),
    }
  }

  #[test]
  fn duplicate_label_is_rejected() {
    match assemble("here:\ndoze\nhere:") {
      Err(AssemblyError::DuplicateLabel { line: 3, name }) => {
        assert_eq!(name, "here");
      }
      other => panic!("expected DuplicateLabel, got {:?}", other.err()),
    }
  }

  #[test]
  fn label_with_trailing_fields_is_malformed() {
    assert!(matches!(
      assemble("here: doze"),
      Err(AssemblyError::MalformedLabel { line: 1 })
    ));
  }

  #[test]
  fn unknown_mnemonic_is_rejected() {
    match assemble("doze\nfrobnicate") {
      Err(AssemblyError::UnknownInstruction { line: 2, name }) => {
        assert_eq!(name, "frobnicate");
      }
      other => panic!("expected UnknownInstruction, got {:?}", other.err()),
    }
  }

  #[test]
  fn immediate_field_width_is_enforced() {
    // 2^25 exceeds the 25 bit immediate field.
    assert!(matches!(
      assemble("pushhwi 0x2000000"),
      Err(AssemblyError::OperandOutOfRange { line: 1, value: 0x200_0000 })
    ));
    assert!(assemble("pushhwi 0x1FFFFFF").is_ok());
  }

  #[test]
  fn operand_arity_is_enforced() {
    assert!(matches!(assemble("dupn"), Err(AssemblyError::MissingOperand { line: 1 })));
    assert!(matches!(assemble("pop 3"), Err(AssemblyError::UnexpectedOperand { line: 1 })));
    assert!(matches!(assemble("dupn 1 2"), Err(AssemblyError::UnexpectedOperand { line: 1 })));
  }

  #[test]
  fn signed_literal_for_plain_opcode_is_rejected() {
    assert!(matches!(
      assemble("pushhwi -1"),
      Err(AssemblyError::SignedLiteral { line: 1 })
    ));
  }

  #[test]
  fn carriage_return_terminates_lines() {
    let program = assemble("pushuimm 1\r\npushuimm 2\rdoze").unwrap();
    assert_eq!(program.len(), 3);
    assert_eq!(decode(program[2]).0, Operation::Doze);
  }
}
