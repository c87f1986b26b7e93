//! Unary operators and concatenation
//!
//! Handles: UNM, BNOT, NOT, LEN, CONCAT. All of these go straight to the
//! host; none has a fast path.

use crate::bytecode::OpCode;
use crate::jit::codegen::CompileState;
use crate::jit::operand::Operand;
use crate::jit::runtime::RuntimeFn;
use crate::jit::types::{JitError, JitResult};

/// R(A) := op R(B)
pub fn compile_unary(cs: &mut CompileState, op: OpCode) -> JitResult<()> {
    let instr = cs.instr();
    let func = match op {
        OpCode::Unm => RuntimeFn::Unm,
        OpCode::BNot => RuntimeFn::BNot,
        OpCode::Not => RuntimeFn::Not,
        OpCode::Len => RuntimeFn::ObjLen,
        _ => {
            return Err(JitError::malformed(
                cs.curr(),
                format!("{} is not a unary operator", op),
            ))
        }
    };

    let ra = Operand::Register(instr.a()).address(cs)?;
    let rb = Operand::Register(instr.b()).address(cs)?;
    let state = cs.state();
    cs.call(func, &[state, ra, rb]);
    cs.update_stack();
    Ok(())
}

/// R(A) := R(B).. ... ..R(C)
pub fn compile_concat(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let (a, b, c) = (instr.a(), instr.b(), instr.c());
    if c < b {
        return Err(JitError::malformed(
            cs.curr(),
            format!("concat range R{}..R{} is empty", b, c),
        ));
    }

    cs.set_top(c + 1);
    let total = cs.make_int((c - b + 1) as i64);
    let state = cs.state();
    cs.call(RuntimeFn::Concat, &[state, total]);
    cs.update_stack();

    Operand::Register(a).assign(cs, Operand::Register(b))?;
    cs.check_gc(if a >= b { a + 1 } else { b });
    cs.reload_top();
    Ok(())
}
