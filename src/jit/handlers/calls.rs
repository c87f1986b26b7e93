//! Calls, returns and closure creation
//!
//! Handles: CALL, TAILCALL, RETURN, TFORCALL, CLOSURE
//!
//! A compiled function returns to its caller with an i32: the number of
//! results sitting just below `L->top`, or the negated size of the callee
//! and argument window for a tail call the host must finish.

use cranelift::prelude::*;

use crate::jit::codegen::CompileState;
use crate::jit::operand::Operand;
use crate::jit::runtime::RuntimeFn;
use crate::jit::types::{JitError, JitResult};

/// R(A), ..., R(A+C-2) := R(A)(R(A+1), ..., R(A+B-1))
pub fn compile_call(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let (a, b, c) = (instr.a(), instr.b(), instr.c());

    // B == 0: arguments run up to a top left by the previous instruction
    if b != 0 {
        cs.set_top(a + b);
    }

    let func = cs.register_addr(a);
    let nresults = cs.make_int(c as i64 - 1);
    let state = cs.state();
    cs.call(RuntimeFn::Call, &[state, func, nresults]);
    cs.update_stack();

    // C == 0 leaves L->top after the last result for the next instruction
    if c != 0 {
        cs.reload_top();
    }
    Ok(())
}

/// return R(A)(R(A+1), ..., R(A+B-1)), handed back to the host
pub fn compile_tailcall(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let (a, b) = (instr.a(), instr.b());

    if cs.program().has_nested_protos() {
        let base = cs.base();
        let state = cs.state();
        cs.call(RuntimeFn::Close, &[state, base]);
    }
    if b != 0 {
        cs.set_top(a + b);
    }

    // callee plus its arguments
    let count = cs.top_diff(a);
    let ret = cs.builder.ins().ineg(count);
    cs.builder.ins().return_(&[ret]);
    Ok(())
}

/// return R(A), ..., R(A+B-2)
pub fn compile_return(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let (a, b) = (instr.a(), instr.b());

    if cs.program().has_nested_protos() {
        let base = cs.base();
        let state = cs.state();
        cs.call(RuntimeFn::Close, &[state, base]);
    }

    let count = match b {
        0 => cs.top_diff(a),
        1 => cs.make_int(0),
        _ => {
            cs.set_top(a + b - 1);
            cs.make_int(b as i64 - 1)
        }
    };
    cs.builder.ins().return_(&[count]);
    Ok(())
}

/// R(A+3), ..., R(A+2+C) := R(A)(R(A+1), R(A+2))
pub fn compile_tforcall(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let (a, c) = (instr.a(), instr.c());
    let cb = a + 3;

    Operand::Register(cb + 2).assign(cs, Operand::Register(a + 2))?;
    Operand::Register(cb + 1).assign(cs, Operand::Register(a + 1))?;
    Operand::Register(cb).assign(cs, Operand::Register(a))?;
    cs.set_top(cb + 3);

    let func = cs.register_addr(cb);
    let nresults = cs.make_int(c as i64);
    let state = cs.state();
    cs.call(RuntimeFn::Call, &[state, func, nresults]);
    cs.update_stack();
    cs.reload_top();
    Ok(())
}

/// R(A) := closure(KPROTO[Bx])
pub fn compile_closure(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let (a, bx) = (instr.a(), instr.bx());

    let count = cs.program().num_protos();
    if bx as usize >= count {
        return Err(JitError::malformed(
            cs.curr(),
            format!("closure prototype {} outside {} nested functions", bx, count),
        ));
    }

    let ra = cs.register_addr(a);
    let base = cs.base();
    let index = cs.make_int(bx as i64);
    let (state, closure) = (cs.state(), cs.closure());
    cs.call(RuntimeFn::Closure, &[state, closure, base, ra, index]);
    cs.check_gc(a + 1);
    Ok(())
}
