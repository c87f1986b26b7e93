//! Opcode handlers for JIT compilation
//!
//! Each module lowers one family of Lua 5.3 opcodes into Cranelift IR using
//! the [`CompileState`] of the function being built. Handlers read their
//! operands from `cs.instr()`. A handler either terminates the current block
//! itself or leaves it open; the driver then falls through to the next
//! instruction's block.

mod arithmetic;
mod calls;
mod control_flow;
mod loads;
mod logical;
mod table;
mod unary;
mod vararg;

pub use arithmetic::Arith;
pub use calls::{compile_call, compile_closure, compile_return, compile_tailcall, compile_tforcall};
pub use control_flow::{
    compile_compare, compile_forloop, compile_forprep, compile_jmp, compile_test,
    compile_testset, compile_tforloop,
};
pub use loads::{
    compile_getupval, compile_loadbool, compile_loadk, compile_loadnil, compile_move,
    compile_setupval,
};
pub use logical::Bitwise;
pub use table::{compile_newtable, compile_self, compile_setlist, TableGet, TableSet};
pub use unary::{compile_concat, compile_unary};
pub use vararg::compile_vararg;

use super::codegen::CompileState;
use super::types::{JitError, JitResult};
use crate::bytecode::OpCode;

/// Argument of the EXTRAARG word following the current instruction
pub(crate) fn extra_arg(cs: &CompileState) -> JitResult<u32> {
    let pc = cs.curr() + 1;
    match cs.program().instruction(pc) {
        Some(next) if next.opcode() == Some(OpCode::ExtraArg) => Ok(next.ax()),
        _ => Err(JitError::malformed(
            cs.curr(),
            format!(
                "{} without a following EXTRAARG",
                cs.instr().opcode().map_or("?", OpCode::mnemonic)
            ),
        )),
    }
}
