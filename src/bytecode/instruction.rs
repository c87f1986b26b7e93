//! Instruction word decoding and encoding
//!
//! ```text
//!  31      23 22     14 13      6 5    0
//! |    B    |    C    |    A    |  op  |   iABC
//! |        Bx         |    A    |  op  |   iABx / iAsBx
//! |              Ax             |  op  |   iAx
//! ```

use std::fmt;

use super::opcodes::OpCode;

pub const SIZE_OP: u32 = 6;
pub const SIZE_A: u32 = 8;
pub const SIZE_B: u32 = 9;
pub const SIZE_C: u32 = 9;
pub const SIZE_BX: u32 = SIZE_B + SIZE_C;
pub const SIZE_AX: u32 = SIZE_A + SIZE_B + SIZE_C;

pub const POS_A: u32 = SIZE_OP;
pub const POS_C: u32 = POS_A + SIZE_A;
pub const POS_B: u32 = POS_C + SIZE_C;
pub const POS_BX: u32 = POS_C;
pub const POS_AX: u32 = POS_A;

pub const MAXARG_BX: u32 = (1 << SIZE_BX) - 1;
/// sBx is stored excess-K
pub const MAXARG_SBX: i32 = (MAXARG_BX >> 1) as i32;

/// RK operands with this bit set index the constant pool
pub const BITRK: u32 = 1 << (SIZE_B - 1);

/// Number of list items accumulated before a SETLIST flush
pub const FIELDS_PER_FLUSH: i32 = 50;

#[inline]
const fn mask(size: u32) -> u32 {
    (1 << size) - 1
}

/// One 32-bit instruction word
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Instruction(pub u32);

impl Instruction {
    #[inline]
    pub fn raw_opcode(self) -> u8 {
        (self.0 & mask(SIZE_OP)) as u8
    }

    #[inline]
    pub fn opcode(self) -> Option<OpCode> {
        OpCode::from_u8(self.raw_opcode())
    }

    #[inline]
    pub fn a(self) -> u32 {
        (self.0 >> POS_A) & mask(SIZE_A)
    }

    #[inline]
    pub fn b(self) -> u32 {
        (self.0 >> POS_B) & mask(SIZE_B)
    }

    #[inline]
    pub fn c(self) -> u32 {
        (self.0 >> POS_C) & mask(SIZE_C)
    }

    #[inline]
    pub fn bx(self) -> u32 {
        (self.0 >> POS_BX) & mask(SIZE_BX)
    }

    #[inline]
    pub fn sbx(self) -> i32 {
        self.bx() as i32 - MAXARG_SBX
    }

    #[inline]
    pub fn ax(self) -> u32 {
        (self.0 >> POS_AX) & mask(SIZE_AX)
    }

    pub fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        Instruction(
            (op.to_u8() as u32)
                | ((a & mask(SIZE_A)) << POS_A)
                | ((b & mask(SIZE_B)) << POS_B)
                | ((c & mask(SIZE_C)) << POS_C),
        )
    }

    pub fn abx(op: OpCode, a: u32, bx: u32) -> Self {
        Instruction(
            (op.to_u8() as u32) | ((a & mask(SIZE_A)) << POS_A) | ((bx & mask(SIZE_BX)) << POS_BX),
        )
    }

    pub fn asbx(op: OpCode, a: u32, sbx: i32) -> Self {
        Self::abx(op, a, (sbx + MAXARG_SBX) as u32)
    }

    pub fn ax_only(op: OpCode, ax: u32) -> Self {
        Instruction((op.to_u8() as u32) | ((ax & mask(SIZE_AX)) << POS_AX))
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Some(op @ (OpCode::LoadK | OpCode::Closure)) => {
                write!(f, "{} {} {}", op, self.a(), self.bx())
            }
            Some(op) if op.is_jump() => write!(f, "{} {} {}", op, self.a(), self.sbx()),
            Some(OpCode::ExtraArg) => write!(f, "EXTRAARG {}", self.ax()),
            Some(op) => write!(f, "{} {} {} {}", op, self.a(), self.b(), self.c()),
            None => write!(f, "<invalid {:#010x}>", self.0),
        }
    }
}

/// Is this RK field a constant reference?
#[inline]
pub fn is_k(rk: u32) -> bool {
    rk & BITRK != 0
}

/// Constant index encoded in an RK field
#[inline]
pub fn index_k(rk: u32) -> u32 {
    rk & !BITRK
}

/// Encode a constant index as an RK field
#[inline]
pub fn rk_as_k(index: u32) -> u32 {
    index | BITRK
}

/// Decode the "floating point byte" used by NEWTABLE sizes: `eeeeexxx`
pub fn fb2int(x: u32) -> u32 {
    if x < 8 {
        x
    } else {
        ((x & 7) + 8) << ((x >> 3) - 1)
    }
}
