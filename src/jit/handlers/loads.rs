//! Register loads and upvalue access
//!
//! Handles: MOVE, LOADK, LOADKX, LOADBOOL, LOADNIL, GETUPVAL, SETUPVAL

use cranelift::prelude::*;

use crate::jit::codegen::CompileState;
use crate::jit::operand::Operand;
use crate::jit::runtime::RuntimeFn;
use crate::jit::types::{JitResult, TAG_NIL};

use super::extra_arg;

/// R(A) := R(B)
pub fn compile_move(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    Operand::Register(instr.a()).assign(cs, Operand::Register(instr.b()))
}

/// R(A) := K(Bx), or K(extra arg) for LOADKX
pub fn compile_loadk(cs: &mut CompileState, extended: bool) -> JitResult<()> {
    let instr = cs.instr();
    let index = if extended { extra_arg(cs)? } else { instr.bx() };
    Operand::Register(instr.a()).assign(cs, Operand::Constant(index))
}

/// R(A) := (Bool)B; if (C) pc++
pub fn compile_loadbool(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let value = cs.make_int((instr.b() != 0) as i64);
    Operand::Register(instr.a()).set_boolean(cs, value)?;

    if instr.c() != 0 {
        let target = cs.skip_block()?;
        cs.builder.ins().jump(target, &[]);
    }
    Ok(())
}

/// R(A), R(A+1), ..., R(A+B) := nil
pub fn compile_loadnil(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    for reg in instr.a()..=instr.a() + instr.b() {
        Operand::Register(reg).set_tag(cs, TAG_NIL)?;
    }
    Ok(())
}

/// R(A) := UpValue[B]
pub fn compile_getupval(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    Operand::Register(instr.a()).assign(cs, Operand::Upvalue(instr.b()))
}

/// UpValue[B] := R(A), followed by the upvalue write barrier
pub fn compile_setupval(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    Operand::Upvalue(instr.b()).assign(cs, Operand::Register(instr.a()))?;

    let cell = cs.upvalue_cell(instr.b());
    let state = cs.state();
    cs.call(RuntimeFn::UpvalBarrier, &[state, cell]);
    Ok(())
}
