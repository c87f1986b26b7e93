//! Control flow handlers for JIT compilation
//!
//! Handles: JMP, EQ, LT, LE, TEST, TESTSET, FORLOOP, FORPREP, TFORLOOP
//!
//! Conditional instructions in Lua 5.3 either skip the following
//! instruction (always a JMP) or fall into it. Both outcomes are plain block
//! edges: `skip_block()` for `pc++`, `next_block()` for falling into the JMP.

use cranelift::prelude::*;

use crate::bytecode::OpCode;
use crate::jit::codegen::CompileState;
use crate::jit::operand::Operand;
use crate::jit::runtime::RuntimeFn;
use crate::jit::types::{JitError, JitResult, TAG_NIL};

/// pc += sBx; if (A) close upvalues >= R(A - 1)
pub fn compile_jmp(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let target = cs.jump_block(instr.sbx())?;

    if instr.a() != 0 {
        let level = cs.register_addr(instr.a() - 1);
        let state = cs.state();
        cs.call(RuntimeFn::Close, &[state, level]);
    }

    cs.builder.ins().jump(target, &[]);
    Ok(())
}

/// EQ/LT/LE: if ((RK(B) op RK(C)) ~= A) then pc++
pub fn compile_compare(cs: &mut CompileState, op: OpCode) -> JitResult<()> {
    let instr = cs.instr();
    let func = match op {
        OpCode::Eq => RuntimeFn::EqualObj,
        OpCode::Lt => RuntimeFn::LessThan,
        OpCode::Le => RuntimeFn::LessEqual,
        _ => {
            return Err(JitError::malformed(
                cs.curr(),
                format!("{} is not a comparison", op),
            ))
        }
    };

    let skip = cs.skip_block()?;
    let next = cs.next_block()?;

    let lhs = Operand::rk(instr.b()).address(cs)?;
    let rhs = Operand::rk(instr.c()).address(cs)?;
    let state = cs.state();
    let result = cs.call_value(func, &[state, lhs, rhs])?;
    // metamethods may have run
    cs.update_stack();

    let differs = cs
        .builder
        .ins()
        .icmp_imm(IntCC::NotEqual, result, instr.a() as i64);
    cs.builder.ins().brif(differs, skip, &[], next, &[]);
    Ok(())
}

/// if not (R(A) <=> C) then pc++
pub fn compile_test(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let skip = cs.skip_block()?;
    let next = cs.next_block()?;

    let value = Operand::Register(instr.a()).address(cs)?;
    let c = cs.make_int(instr.c() as i64);
    let result = cs.call_value(RuntimeFn::Test, &[c, value])?;
    let cond = cs.to_bool(result);
    cs.builder.ins().brif(cond, skip, &[], next, &[]);
    Ok(())
}

/// if (R(B) <=> C) then R(A) := R(B) else pc++
pub fn compile_testset(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let skip = cs.skip_block()?;
    let next = cs.next_block()?;

    let value = Operand::Register(instr.b()).address(cs)?;
    let c = cs.make_int(instr.c() as i64);
    let result = cs.call_value(RuntimeFn::Test, &[c, value])?;
    let cond = cs.to_bool(result);

    let set = cs.create_sub_block("testset.set");
    cs.builder.ins().brif(cond, skip, &[], set, &[]);

    cs.switch_to(set);
    Operand::Register(instr.a()).assign(cs, Operand::Register(instr.b()))?;
    cs.builder.ins().jump(next, &[]);
    Ok(())
}

/// Numeric for step: the host updates the index and reports whether to loop
pub fn compile_forloop(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let body = cs.jump_block(instr.sbx())?;
    let exit = cs.next_block()?;

    let ra = cs.register_addr(instr.a());
    let again = cs.call_value(RuntimeFn::ForLoop, &[ra])?;
    let cond = cs.to_bool(again);
    cs.builder.ins().brif(cond, body, &[], exit, &[]);
    Ok(())
}

/// R(A) -= R(A+2); pc += sBx
pub fn compile_forprep(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let target = cs.jump_block(instr.sbx())?;

    let ra = cs.register_addr(instr.a());
    let state = cs.state();
    cs.call(RuntimeFn::ForPrep, &[state, ra]);
    cs.builder.ins().jump(target, &[]);
    Ok(())
}

/// if R(A+1) ~= nil then { R(A) := R(A+1); pc += sBx }
pub fn compile_tforloop(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let target = cs.jump_block(instr.sbx())?;
    let exit = cs.next_block()?;

    let control = Operand::Register(instr.a() + 1).address(cs)?;
    let tag = cs.load_tag(control);
    let not_nil = cs.builder.ins().icmp_imm(IntCC::NotEqual, tag, TAG_NIL as i64);

    let cont = cs.create_sub_block("tforloop.continue");
    cs.builder.ins().brif(not_nil, cont, &[], exit, &[]);

    cs.switch_to(cont);
    Operand::Register(instr.a()).assign(cs, Operand::Register(instr.a() + 1))?;
    cs.builder.ins().jump(target, &[]);
    Ok(())
}
