//! Structures and functions for the Canvas virtual machine: the
//! fetch-decode-execute loop over a program, operating on a LIFO value stack
//! and a program counter.

#[cfg(feature = "trace_computation")]
use std::fmt::{Display, Formatter};
use std::io::{self, Write};

#[cfg(feature = "trace_computation")]
use prettytable::{format as TableFormat, Table};

use crate::bytecode::{decode, Operation, Program};
use crate::errors::RuntimeError;
use crate::unit::Unit;

/**
  A machine owns its value stack, its program counter, and the sink that
  `print` writes to. Both stack and counter are reinitialized at the start of
  every `run`, so nothing survives from one run to the next, and `run`
  borrows the machine mutably, so two runs on one machine cannot overlap.
*/
pub struct Machine<W: Write> {
  stack : Vec<Unit>,
  pc    : usize,
  out   : W,
}

impl Machine<io::Stdout> {
  pub fn new() -> Machine<io::Stdout> {
    Machine::with_output(io::stdout())
  }
}

impl<W: Write> Machine<W> {

  // region Low-level utility methods

  pub fn with_output(out: W) -> Machine<W> {
    Machine {
      stack : vec![],
      pc    : 0,
      out,
    }
  }

  /// The value stack as left by the last `run`, top last.
  pub fn stack(&self) -> &[Unit] {
    &self.stack
  }

  /// Consumes the machine and hands back its output sink.
  pub fn into_output(self) -> W {
    self.out
  }

  fn pop(&mut self, opcode: Operation) -> Result<Unit, RuntimeError> {
    self.stack.pop().ok_or(RuntimeError::StackUnderflow(opcode))
  }

  /// Pops the right operand, then the left operand, of a binary instruction.
  fn pop_pair(&mut self, opcode: Operation) -> Result<(Unit, Unit), RuntimeError> {
    let rhs = self.pop(opcode)?;
    let lhs = self.pop(opcode)?;
    Ok((lhs, rhs))
  }

  fn peek(&self, opcode: Operation) -> Result<Unit, RuntimeError> {
    self.stack.last().copied().ok_or(RuntimeError::StackUnderflow(opcode))
  }

  // endregion

  /**
    Executes the program to completion. The program counter starts at zero
    and the stack starts empty; the machine halts when the counter runs off
    the end of the program. Instructions that do not set the counter
    themselves advance it by one, so an out-of-range jump target simply
    halts the machine on the next fetch.

    Shift and rotate counts are taken modulo the 64 bit width, and integer
    arithmetic wraps. Division and modulo by zero, and any pop or peek on an
    empty stack outside the guarded instructions (`pop`, `branch`, `print`),
    abort the run with a typed error.
  */
  pub fn run(&mut self, program: &Program) -> Result<(), RuntimeError> {
    self.pc = 0;
    self.stack.clear();

    while self.pc < program.len() {
      let (opcode, immediate) = decode(program[self.pc]);

      #[cfg(feature = "trace_computation")] self.print_trace(opcode, immediate);

      match opcode {

        // region Immediate construction

        Operation::PushHalfWordImm => {
          self.stack.push(Unit::UInt(immediate as u64));
        }

        Operation::PushHalfWordImmSL16 => {
          self.stack.push(Unit::UInt((immediate as u64) << 16));
        }

        Operation::AddSL32 => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(
            Unit::UInt(lhs.as_uint().wrapping_add(rhs.as_uint()).wrapping_shl(32))
          );
        }

        Operation::SpawnSignedInt => {
          let value = self.pop(opcode)?;
          self.stack.push(value.spawn_int());
        }

        Operation::SpawnFP => {
          let value = self.pop(opcode)?;
          self.stack.push(value.spawn_fp());
        }

        // endregion

        // region Arithmetic

        Operation::Add => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::Int(lhs.as_int().wrapping_add(rhs.as_int())));
        }

        Operation::Sub => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::Int(lhs.as_int().wrapping_sub(rhs.as_int())));
        }

        Operation::Mul => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::Int(lhs.as_int().wrapping_mul(rhs.as_int())));
        }

        Operation::Div => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          if rhs.as_int() == 0 {
            return Err(RuntimeError::DivisionByZero(opcode));
          }
          self.stack.push(Unit::Int(lhs.as_int().wrapping_div(rhs.as_int())));
        }

        Operation::Mod => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          if rhs.as_int() == 0 {
            return Err(RuntimeError::DivisionByZero(opcode));
          }
          self.stack.push(Unit::Int(lhs.as_int().wrapping_rem(rhs.as_int())));
        }

        Operation::AddU => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::UInt(lhs.as_uint().wrapping_add(rhs.as_uint())));
        }

        Operation::SubU => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::UInt(lhs.as_uint().wrapping_sub(rhs.as_uint())));
        }

        Operation::MulU => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::UInt(lhs.as_uint().wrapping_mul(rhs.as_uint())));
        }

        Operation::DivU => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          if rhs.as_uint() == 0 {
            return Err(RuntimeError::DivisionByZero(opcode));
          }
          self.stack.push(Unit::UInt(lhs.as_uint() / rhs.as_uint()));
        }

        Operation::ModU => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          if rhs.as_uint() == 0 {
            return Err(RuntimeError::DivisionByZero(opcode));
          }
          self.stack.push(Unit::UInt(lhs.as_uint() % rhs.as_uint()));
        }

        Operation::AddF => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::Fp(lhs.as_fp() + rhs.as_fp()));
        }

        Operation::SubF => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::Fp(lhs.as_fp() - rhs.as_fp()));
        }

        Operation::MulF => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::Fp(lhs.as_fp() * rhs.as_fp()));
        }

        // IEEE division: a zero divisor gives an infinity or NaN, not an error.
        Operation::DivF => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::Fp(lhs.as_fp() / rhs.as_fp()));
        }

        // endregion

        // region Control flow

        Operation::Jump => {
          self.pc = immediate as usize;
          continue;
        }

        // Jump if the stack top reads non-zero. The condition is not popped;
        // an explicit `pop` must follow if it should be discarded.
        Operation::Branch => {
          if let Some(top) = self.stack.last() {
            if top.as_uint() != 0 {
              self.pc = immediate as usize;
              continue;
            }
          }
        }

        Operation::FarJump => {
          let target = self.pop(opcode)?;
          self.pc = target.as_uint() as usize;
          continue;
        }

        // Target first, then condition; both are consumed either way.
        Operation::FarBranch => {
          let target = self.pop(opcode)?;
          let condition = self.pop(opcode)?;
          if condition.as_uint() != 0 {
            self.pc = target.as_uint() as usize;
            continue;
          }
        }

        // endregion

        // region Stack manipulation

        Operation::Pop => {
          self.stack.pop();
        }

        Operation::SwapTop => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(rhs);
          self.stack.push(lhs);
        }

        Operation::Dup => {
          let top = self.peek(opcode)?;
          self.stack.push(top);
        }

        Operation::DupN => {
          let top = self.peek(opcode)?;
          for _ in 0..immediate {
            self.stack.push(top);
          }
        }

        Operation::PrintStackTop => {
          match self.stack.last() {
            Some(unit) => writeln!(self.out, "{}", unit)?,
            None       => writeln!(self.out, "!Empty stack")?,
          }
        }

        // endregion

        // region Shifts and rotates

        Operation::ShiftLeft => {
          let count = self.pop(opcode)?;
          let value = self.pop(opcode)?;
          self.stack.push(Unit::Int(value.as_int().wrapping_shl(count.as_uint() as u32)));
        }

        Operation::ShiftLeftImm => {
          let value = self.pop(opcode)?;
          self.stack.push(Unit::Int(value.as_int().wrapping_shl(immediate)));
        }

        Operation::LogicShiftRight => {
          let count = self.pop(opcode)?;
          let value = self.pop(opcode)?;
          self.stack.push(Unit::UInt(value.as_uint().wrapping_shr(count.as_uint() as u32)));
        }

        Operation::LogicShiftRightImm => {
          let value = self.pop(opcode)?;
          self.stack.push(Unit::UInt(value.as_uint().wrapping_shr(immediate)));
        }

        Operation::ArithShiftRight => {
          let count = self.pop(opcode)?;
          let value = self.pop(opcode)?;
          self.stack.push(Unit::Int(value.as_int().wrapping_shr(count.as_uint() as u32)));
        }

        Operation::ArithShiftRightImm => {
          let value = self.pop(opcode)?;
          self.stack.push(Unit::Int(value.as_int().wrapping_shr(immediate)));
        }

        Operation::RotateLeft => {
          let count = self.pop(opcode)?;
          let value = self.pop(opcode)?;
          self.stack.push(Unit::UInt(value.as_uint().rotate_left(count.as_uint() as u32)));
        }

        Operation::RotateLeftImm => {
          let value = self.pop(opcode)?;
          self.stack.push(Unit::UInt(value.as_uint().rotate_left(immediate)));
        }

        Operation::RotateRight => {
          let count = self.pop(opcode)?;
          let value = self.pop(opcode)?;
          self.stack.push(Unit::UInt(value.as_uint().rotate_right(count.as_uint() as u32)));
        }

        Operation::RotateRightImm => {
          let value = self.pop(opcode)?;
          self.stack.push(Unit::UInt(value.as_uint().rotate_right(immediate)));
        }

        // endregion

        // region Bitwise and logical

        Operation::And => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::UInt(lhs.as_uint() & rhs.as_uint()));
        }

        Operation::Or => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::UInt(lhs.as_uint() | rhs.as_uint()));
        }

        Operation::XOr => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::UInt(lhs.as_uint() ^ rhs.as_uint()));
        }

        Operation::Not => {
          let value = self.pop(opcode)?;
          self.stack.push(Unit::UInt(!value.as_uint()));
        }

        Operation::LogicAnd => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::UInt((lhs.as_uint() != 0 && rhs.as_uint() != 0) as u64));
        }

        Operation::LogicOr => {
          let (lhs, rhs) = self.pop_pair(opcode)?;
          self.stack.push(Unit::UInt((lhs.as_uint() != 0 || rhs.as_uint() != 0) as u64));
        }

        Operation::LogicNot => {
          let value = self.pop(opcode)?;
          self.stack.push(Unit::UInt((value.as_uint() == 0) as u64));
        }

        // endregion

        Operation::Doze => { /* No-op. */ }

      } // end match on opcode

      self.pc += 1;
    } // end fetch-decode-execute loop

    Ok(())
  }

  #[cfg(feature = "trace_computation")]
  fn print_trace(&self, opcode: Operation, immediate: u32) {
    match opcode.has_immediate() {
      true  => println!("{:4}: {} {}", self.pc, opcode, immediate),
      false => println!("{:4}: {}", self.pc, opcode),
    }
    println!("{}", self);
  }

  #[cfg(feature = "trace_computation")]
  fn make_stack_table(stack: &[Unit]) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Depth", ubl->"Contents"]);

    for (i, unit) in stack.iter().enumerate().rev() {
      table.add_row(row![r->format!("S[{}] =", i), format!("{}", unit)]);
    }
    table
  }

}

#[cfg(feature = "trace_computation")]
lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

#[cfg(feature = "trace_computation")]
impl<W: Write> Display for Machine<W> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let stack_table = Machine::<W>::make_stack_table(&self.stack);
    write!(f, "{}", stack_table)
  }
}
