//! VARARG: R(A), R(A+1), ..., R(A+B-2) = vararg
//!
//! The extra arguments of a variadic call sit just below the frame base,
//! after the callee slot and the (moved) fixed parameters. Their count is
//! only known at run time, so the copy is a loop:
//!
//! ```text
//! moves = min(required, available)
//! for i in 0..moves     { R(A+i) = base[i - available] }
//! for i in moves..required { R(A+i) = nil }
//! ```

use cranelift::codegen::ir::BlockArg;
use cranelift::prelude::*;

use crate::jit::codegen::CompileState;
use crate::jit::runtime::RuntimeFn;
use crate::jit::types::{JitResult, TAG_NIL};

pub fn compile_vararg(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let (a, b) = (instr.a(), instr.b());
    let num_params = cs.program().num_params() as i64;

    // available = max(0, (base - func) - (numparams + 1))
    let base = cs.base();
    let func = cs.frame_func();
    let bytes = cs.builder.ins().isub(base, func);
    let stride = cs.layout().tvalue.size;
    let slots = cs.builder.ins().sdiv_imm(bytes, stride);
    let slots = widen(cs, slots);
    let extra = cs.builder.ins().iadd_imm(slots, -(num_params + 1));
    let zero = cs.make_i64(0);
    let short = cs.builder.ins().icmp_imm(IntCC::SignedLessThan, extra, 0);
    let available = cs.builder.ins().select(short, zero, extra);

    let required = if b == 0 {
        // all of them: make room, then publish the new top
        let n = cs.builder.ins().ireduce(types::I32, available);
        let state = cs.state();
        cs.call(RuntimeFn::CheckStack, &[state, n]);
        cs.update_stack();
        let ra = cs.register_addr(a);
        let top = cs.slot_addr_dyn(ra, available);
        cs.set_top_addr(top);
        available
    } else {
        cs.make_i64(b as i64 - 1)
    };

    // moves = min(required, available)
    let required_min = cs.create_sub_block("vararg.required");
    let available_min = cs.create_sub_block("vararg.available");
    let merge = cs.create_sub_block("vararg.moves");
    let moves = cs.builder.append_block_param(merge, types::I64);
    let fewer = cs.builder.ins().icmp(IntCC::SignedLessThan, required, available);
    cs.builder.ins().brif(fewer, required_min, &[], available_min, &[]);

    cs.switch_to(required_min);
    cs.builder.ins().jump(merge, &[BlockArg::Value(required)]);
    cs.switch_to(available_min);
    cs.builder.ins().jump(merge, &[BlockArg::Value(available)]);

    let copy_header = cs.create_sub_block("vararg.copy.header");
    let copy_body = cs.create_sub_block("vararg.copy.body");
    let fill_header = cs.create_sub_block("vararg.fill.header");
    let fill_body = cs.create_sub_block("vararg.fill.body");
    let exit = cs.create_sub_block("vararg.exit");
    let i = cs.builder.append_block_param(copy_header, types::I64);
    let j = cs.builder.append_block_param(fill_header, types::I64);

    cs.switch_to(merge);
    let start = cs.make_i64(0);
    cs.builder.ins().jump(copy_header, &[BlockArg::Value(start)]);

    // copy
    cs.switch_to(copy_header);
    let more = cs.builder.ins().icmp(IntCC::SignedLessThan, i, moves);
    cs.builder
        .ins()
        .brif(more, copy_body, &[], fill_header, &[BlockArg::Value(moves)]);

    cs.switch_to(copy_body);
    let base = cs.base();
    let dst_index = cs.builder.ins().iadd_imm(i, a as i64);
    let dst = cs.slot_addr_dyn(base, dst_index);
    let src_index = cs.builder.ins().isub(i, available);
    let src = cs.slot_addr_dyn(base, src_index);
    cs.copy_value(dst, src);
    let next = cs.builder.ins().iadd_imm(i, 1);
    cs.builder.ins().jump(copy_header, &[BlockArg::Value(next)]);

    // fill
    cs.switch_to(fill_header);
    let more = cs.builder.ins().icmp(IntCC::SignedLessThan, j, required);
    cs.builder.ins().brif(more, fill_body, &[], exit, &[]);

    cs.switch_to(fill_body);
    let base = cs.base();
    let dst_index = cs.builder.ins().iadd_imm(j, a as i64);
    let dst = cs.slot_addr_dyn(base, dst_index);
    cs.store_tag(dst, TAG_NIL);
    let next = cs.builder.ins().iadd_imm(j, 1);
    cs.builder.ins().jump(fill_header, &[BlockArg::Value(next)]);

    cs.switch_to(exit);
    Ok(())
}

fn widen(cs: &mut CompileState, v: Value) -> Value {
    if cs.builder.func.dfg.value_type(v) == types::I64 {
        v
    } else {
        cs.builder.ins().sextend(types::I64, v)
    }
}
