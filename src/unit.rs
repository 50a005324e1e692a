/*!

  The tagged 64 bit runtime value of the machine, called a `Unit`. A unit has
  exactly one active interpretation at a time: a signed integer, an unsigned
  integer, or an IEEE 754 double. All three interpretations share the same
  64 bits of storage, so re-tagging a value without touching its bits is a
  first class operation ("spawning"), and the arithmetic instructions read
  their operands through whichever interpretation the opcode calls for,
  ignoring the operands' current tags.

  Storing the three interpretations as a union would make every access an
  aliasing hazard, so the storage is a closed sum type and the bit-level view
  is provided by explicit accessors built on `f64::to_bits` and friends.

*/

use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Unit {
  /// 64 bit signed integer
  Int(i64),
  /// 64 bit unsigned integer
  UInt(u64),
  /// 64 bit IEEE 754 double
  Fp(f64),
}

impl Unit {

  /// The raw 64 bit storage of the value, independent of its tag.
  pub fn bits(&self) -> u64 {
    match self {
      Unit::Int(value)  => *value as u64,
      Unit::UInt(value) => *value,
      Unit::Fp(value)   => value.to_bits(),
    }
  }

  /// Reads the stored bits as a signed integer.
  pub fn as_int(&self) -> i64 {
    self.bits() as i64
  }

  /// Reads the stored bits as an unsigned integer.
  pub fn as_uint(&self) -> u64 {
    self.bits()
  }

  /// Reads the stored bits as a double.
  pub fn as_fp(&self) -> f64 {
    f64::from_bits(self.bits())
  }

  /// Re-tags the value as `Int`. The stored bits are unchanged.
  pub fn spawn_int(self) -> Unit {
    Unit::Int(self.bits() as i64)
  }

  /// Re-tags the value as `Fp`. The stored bits are unchanged.
  pub fn spawn_fp(self) -> Unit {
    Unit::Fp(f64::from_bits(self.bits()))
  }

}

impl Display for Unit {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Unit::Int(value) => {
        write!(f, "Int: {}", value)
      },
      Unit::UInt(value) => {
        write!(f, "UInt: {}", value)
      },
      Unit::Fp(value) => {
        write!(f, "FP: {}", value)
      },
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bits_are_shared_storage() {
    assert_eq!(Unit::Int(-1).bits(), u64::max_value());
    assert_eq!(Unit::UInt(42).bits(), 42);
    assert_eq!(Unit::Fp(1.0).bits(), 1.0f64.to_bits());
  }

  #[test]
  fn spawn_preserves_bits() {
    let original = Unit::UInt((-3i64) as u64);
    let spawned = original.spawn_int();
    assert_eq!(spawned, Unit::Int(-3));
    assert_eq!(spawned.bits(), original.bits());

    let fp_bits = Unit::UInt(3.25f64.to_bits());
    assert_eq!(fp_bits.spawn_fp(), Unit::Fp(3.25));
  }

  #[test]
  fn accessors_reinterpret() {
    let unit = Unit::Int(-1);
    assert_eq!(unit.as_uint(), u64::max_value());
    assert_eq!(unit.as_int(), -1);

    let unit = Unit::Fp(2.5);
    assert_eq!(unit.as_uint(), 2.5f64.to_bits());
  }

  #[test]
  fn display_forms() {
    assert_eq!(format!("{}", Unit::UInt(12)), "UInt: 12");
    assert_eq!(format!("{}", Unit::Int(-7)), "Int: -7");
    assert_eq!(format!("{}", Unit::Fp(3.25)), "FP: 3.25");
  }
}
