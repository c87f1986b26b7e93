//! Register / constant / upvalue operands
//!
//! Instructions name their inputs as registers, constant pool entries (the
//! RK encoding), or upvalues. [`Operand`] gives all three one surface: take
//! the address of the underlying `TValue`, copy into it, or overwrite its
//! tag. Operands are plain indices; addresses are computed on demand from
//! the [`CompileState`], so a register address taken after a call sees the
//! reloaded base.

use cranelift::prelude::Value;

use super::codegen::CompileState;
use super::types::{JitError, JitResult};
use crate::bytecode::{index_k, is_k, Literal, Program};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register(u32),
    Constant(u32),
    Upvalue(u32),
}

/// What is known about an operand before the program runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StaticKind {
    /// Register or upvalue: any type, checked at run time
    Dynamic,
    /// Constant with a known value
    Known(Literal),
}

impl StaticKind {
    /// Can the integer stage see this operand as an integer?
    pub fn may_be_integer(&self) -> bool {
        matches!(self, StaticKind::Dynamic | StaticKind::Known(Literal::Integer(_)))
    }

    /// Can the float stage coerce this operand?
    pub fn may_be_number(&self) -> bool {
        match self {
            StaticKind::Dynamic => true,
            StaticKind::Known(lit) => lit.is_number(),
        }
    }

    pub fn known_integer(&self) -> Option<i64> {
        match self {
            StaticKind::Known(Literal::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, StaticKind::Dynamic)
    }
}

impl Operand {
    /// Decode an RK field: constants have bit 8 set
    #[inline]
    pub fn rk(arg: u32) -> Self {
        if is_k(arg) {
            Operand::Constant(index_k(arg))
        } else {
            Operand::Register(arg)
        }
    }

    pub fn static_kind(self, program: &Program) -> StaticKind {
        match self {
            Operand::Constant(idx) => program
                .constant(idx)
                .map(|lit| StaticKind::Known(*lit))
                .unwrap_or(StaticKind::Dynamic),
            Operand::Register(_) | Operand::Upvalue(_) => StaticKind::Dynamic,
        }
    }

    /// Address of the underlying TValue
    pub fn address(self, cs: &mut CompileState) -> JitResult<Value> {
        match self {
            Operand::Register(idx) => Ok(cs.register_addr(idx)),
            Operand::Constant(idx) => {
                let len = cs.program().constants().len();
                if idx as usize >= len {
                    return Err(JitError::malformed(
                        cs.curr(),
                        format!("constant K{} outside a pool of {}", idx, len),
                    ));
                }
                Ok(cs.constant_addr(idx))
            }
            Operand::Upvalue(idx) => {
                let count = cs.program().num_upvalues();
                if idx as usize >= count {
                    return Err(JitError::malformed(
                        cs.curr(),
                        format!("upvalue {} outside {} upvalues", idx, count),
                    ));
                }
                Ok(cs.upvalue_addr(idx))
            }
        }
    }

    fn writable_address(self, cs: &mut CompileState) -> JitResult<Value> {
        match self {
            Operand::Constant(index) => Err(JitError::ConstantWrite {
                offset: cs.curr(),
                index,
            }),
            _ => self.address(cs),
        }
    }

    /// Copy tag and payload of `src` into this operand
    pub fn assign(self, cs: &mut CompileState, src: Operand) -> JitResult<()> {
        let src = src.address(cs)?;
        let dst = self.writable_address(cs)?;
        cs.copy_value(dst, src);
        Ok(())
    }

    /// Copy from an address already computed by the caller
    pub fn assign_from(self, cs: &mut CompileState, src: Value) -> JitResult<()> {
        let dst = self.writable_address(cs)?;
        cs.copy_value(dst, src);
        Ok(())
    }

    /// Overwrite only the tag (nil initialization)
    pub fn set_tag(self, cs: &mut CompileState, tag: i32) -> JitResult<()> {
        let dst = self.writable_address(cs)?;
        cs.store_tag(dst, tag);
        Ok(())
    }

    /// Store a boolean; `value` is an I32 0 or 1
    pub fn set_boolean(self, cs: &mut CompileState, value: Value) -> JitResult<()> {
        let dst = self.writable_address(cs)?;
        cs.store_bool(dst, value);
        Ok(())
    }
}
