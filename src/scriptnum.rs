//! Script numeric type
//!
//! Stack values interpreted as numbers use a little-endian sign-magnitude
//! encoding. Arithmetic opcodes accept at most 4-byte operands but may
//! produce 5-byte results; a handful of opcodes override the operand width
//! (5 bytes for lock-time checks, 2 for the Merkle-branch leaf count, 3 for
//! the multisig hint bitfield).

use crate::error::ScriptError;
use thiserror::Error;

pub const DEFAULT_MAX_NUM_SIZE: usize = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptNumError {
    #[error("script number overflow")]
    Overflow,
    #[error("non-minimally encoded script number")]
    NonMinimal,
}

/// An out-of-range or non-minimal operand aborts evaluation the same way a
/// stack underflow does; the interpreter reports it as UnknownError unless a
/// specific opcode overrides the mapping.
impl From<ScriptNumError> for ScriptError {
    fn from(_: ScriptNumError) -> Self {
        ScriptError::UnknownError
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScriptNum(i64);

impl ScriptNum {
    pub fn new(value: i64) -> Self {
        ScriptNum(value)
    }

    /// Decode a stack element, enforcing the size cap and (optionally) the
    /// minimal-encoding rule.
    pub fn from_bytes(
        vch: &[u8],
        require_minimal: bool,
        max_size: usize,
    ) -> Result<Self, ScriptNumError> {
        if vch.len() > max_size {
            return Err(ScriptNumError::Overflow);
        }
        if require_minimal && !vch.is_empty() {
            // The most significant byte must carry payload bits beyond the
            // sign bit, unless it only exists to hold the sign bit for a
            // value whose next byte would otherwise be read as negative.
            if (vch[vch.len() - 1] & 0x7f) == 0
                && (vch.len() <= 1 || (vch[vch.len() - 2] & 0x80) == 0)
            {
                return Err(ScriptNumError::NonMinimal);
            }
        }
        Ok(ScriptNum(Self::decode(vch)))
    }

    fn decode(vch: &[u8]) -> i64 {
        if vch.is_empty() {
            return 0;
        }
        let mut result: i64 = 0;
        for (i, &byte) in vch.iter().enumerate() {
            result |= (byte as i64) << (8 * i);
        }
        // The sign bit lives in the top bit of the final byte.
        if vch[vch.len() - 1] & 0x80 != 0 {
            let mask = !(0x80i64 << (8 * (vch.len() - 1)));
            return -(result & mask);
        }
        result
    }

    /// Minimal little-endian sign-magnitude encoding of this value.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::new();
        if self.0 == 0 {
            return result;
        }
        let negative = self.0 < 0;
        let mut abs = self.0.unsigned_abs();
        while abs > 0 {
            result.push((abs & 0xff) as u8);
            abs >>= 8;
        }
        // If the highest byte already uses the sign bit, an extra byte is
        // needed to carry the sign.
        let last = *result.last().unwrap_or(&0);
        if last & 0x80 != 0 {
            result.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            let idx = result.len() - 1;
            result[idx] |= 0x80;
        }
        result
    }

    /// Clamped conversion to a machine integer, as used by opcodes that
    /// index the stack or count keys.
    pub fn to_int(&self) -> i64 {
        if self.0 > i32::MAX as i64 {
            i32::MAX as i64
        } else if self.0 < i32::MIN as i64 {
            i32::MIN as i64
        } else {
            self.0
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl std::ops::Add for ScriptNum {
    type Output = ScriptNum;
    fn add(self, rhs: ScriptNum) -> ScriptNum {
        ScriptNum(self.0 + rhs.0)
    }
}

impl std::ops::Sub for ScriptNum {
    type Output = ScriptNum;
    fn sub(self, rhs: ScriptNum) -> ScriptNum {
        ScriptNum(self.0 - rhs.0)
    }
}

impl std::ops::Neg for ScriptNum {
    type Output = ScriptNum;
    fn neg(self) -> ScriptNum {
        ScriptNum(-self.0)
    }
}
