//! Table access, construction and list stores
//!
//! Handles: GETTABUP, GETTABLE, SELF, SETTABUP, SETTABLE, NEWTABLE, SETLIST
//!
//! Reads and writes try a raw hash lookup first. The fast path applies when
//! the operand is a table and the key is not a float; a hit on a non-nil
//! slot completes the access without leaving generated code. Everything else
//! (metatables, absent keys, non-table operands) goes through the host's
//! generic `gettable`/`settable`, which may run metamethods and so is
//! followed by a base reload.
//!
//! Both translators form a one-entry, one-exit region: on return the cursor
//! sits in the `done` block, open for whatever the caller emits next.

use cranelift::prelude::*;

use crate::bytecode::{fb2int, Literal, FIELDS_PER_FLUSH};
use crate::jit::codegen::CompileState;
use crate::jit::operand::{Operand, StaticKind};
use crate::jit::runtime::RuntimeFn;
use crate::jit::types::{JitResult, TAG_FLOAT, TAG_NIL, TAG_TABLE};

use super::extra_arg;

/// Whether the raw lookup can ever apply to this operand pair
fn has_fast_path(cs: &CompileState, table: Operand, key: Operand) -> bool {
    let program = cs.program();
    // a constant is never a table; float keys need normalization; t[nil]
    // never hits
    table.static_kind(program).is_dynamic()
        && !matches!(
            key.static_kind(program),
            StaticKind::Known(Literal::Float(_)) | StaticKind::Known(Literal::Nil)
        )
}

/// Terminate the current block with the checks guarding the raw lookup
fn emit_guard(
    cs: &mut CompileState,
    table_addr: Value,
    key: (Operand, Value),
    lookup: Block,
    generic: Block,
    label: &'static str,
) {
    let is_table = cs.tag_is(table_addr, TAG_TABLE);
    if key.0.static_kind(cs.program()).is_dynamic() {
        let key_check = cs.create_sub_block(label);
        cs.builder.ins().brif(is_table, key_check, &[], generic, &[]);
        cs.switch_to(key_check);
        let tag = cs.load_tag(key.1);
        let not_float = cs.builder.ins().icmp_imm(IntCC::NotEqual, tag, TAG_FLOAT as i64);
        cs.builder.ins().brif(not_float, lookup, &[], generic, &[]);
    } else {
        cs.builder.ins().brif(is_table, lookup, &[], generic, &[]);
    }
}

/// `dest := table[key]`
#[derive(Debug, Clone, Copy)]
pub struct TableGet {
    pub table: Operand,
    pub key: Operand,
    pub dest: Operand,
}

impl TableGet {
    pub fn compile(self, cs: &mut CompileState) -> JitResult<()> {
        let table_addr = self.table.address(cs)?;
        let key_addr = self.key.address(cs)?;

        let generic = cs.create_sub_block("gettable.generic");
        let done = cs.create_sub_block("gettable.done");

        if has_fast_path(cs, self.table, self.key) {
            let lookup = cs.create_sub_block("gettable.lookup");
            emit_guard(cs, table_addr, (self.key, key_addr), lookup, generic, "gettable.key");

            cs.switch_to(lookup);
            let t = cs.load_ptr(table_addr);
            let slot = cs.call_value(RuntimeFn::TableGetFast, &[t, key_addr])?;
            let tag = cs.load_tag(slot);
            let present = cs.builder.ins().icmp_imm(IntCC::NotEqual, tag, TAG_NIL as i64);
            let hit = cs.create_sub_block("gettable.hit");
            cs.builder.ins().brif(present, hit, &[], generic, &[]);

            cs.switch_to(hit);
            self.dest.assign_from(cs, slot)?;
            cs.builder.ins().jump(done, &[]);
        } else {
            cs.builder.ins().jump(generic, &[]);
        }

        cs.switch_to(generic);
        let dest_addr = self.dest.address(cs)?;
        let state = cs.state();
        cs.call(RuntimeFn::GetTable, &[state, table_addr, key_addr, dest_addr]);
        cs.update_stack();
        cs.builder.ins().jump(done, &[]);

        cs.switch_to(done);
        Ok(())
    }
}

/// `table[key] := value`
#[derive(Debug, Clone, Copy)]
pub struct TableSet {
    pub table: Operand,
    pub key: Operand,
    pub value: Operand,
}

impl TableSet {
    pub fn compile(self, cs: &mut CompileState) -> JitResult<()> {
        let table_addr = self.table.address(cs)?;
        let key_addr = self.key.address(cs)?;
        let value_addr = self.value.address(cs)?;

        let generic = cs.create_sub_block("settable.generic");
        let done = cs.create_sub_block("settable.done");

        if has_fast_path(cs, self.table, self.key) {
            let lookup = cs.create_sub_block("settable.lookup");
            emit_guard(cs, table_addr, (self.key, key_addr), lookup, generic, "settable.key");

            cs.switch_to(lookup);
            let t = cs.load_ptr(table_addr);
            let slot = cs.call_value(RuntimeFn::TableGetFast, &[t, key_addr])?;
            let tag = cs.load_tag(slot);
            let present = cs.builder.ins().icmp_imm(IntCC::NotEqual, tag, TAG_NIL as i64);
            let hit = cs.create_sub_block("settable.hit");
            cs.builder.ins().brif(present, hit, &[], generic, &[]);

            cs.switch_to(hit);
            cs.copy_value(slot, value_addr);
            let state = cs.state();
            cs.call(RuntimeFn::BarrierBack, &[state, t, value_addr]);
            cs.builder.ins().jump(done, &[]);
        } else {
            cs.builder.ins().jump(generic, &[]);
        }

        cs.switch_to(generic);
        let state = cs.state();
        cs.call(RuntimeFn::SetTable, &[state, table_addr, key_addr, value_addr]);
        cs.update_stack();
        cs.builder.ins().jump(done, &[]);

        cs.switch_to(done);
        Ok(())
    }
}

/// R(A+1) := R(B); R(A) := R(B)[RK(C)]
pub fn compile_self(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let (a, b) = (instr.a(), instr.b());

    Operand::Register(a + 1).assign(cs, Operand::Register(b))?;
    TableGet {
        table: Operand::Register(b),
        key: Operand::rk(instr.c()),
        dest: Operand::Register(a),
    }
    .compile(cs)?;
    cs.check_gc(a + 2);
    Ok(())
}

/// R(A) := {} (size = B,C)
pub fn compile_newtable(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let (a, b, c) = (instr.a(), instr.b(), instr.c());

    let ra = cs.register_addr(a);
    let state = cs.state();
    let table = cs.call_value(RuntimeFn::NewTable, &[state, ra])?;

    if b != 0 || c != 0 {
        let array = cs.make_int(fb2int(b) as i64);
        let hash = cs.make_int(fb2int(c) as i64);
        cs.call(RuntimeFn::Resize, &[state, table, array, hash]);
    }
    cs.check_gc(a + 1);
    Ok(())
}

/// R(A)[(C-1)*FPF+i] := R(A+i), 1 <= i <= B
pub fn compile_setlist(cs: &mut CompileState) -> JitResult<()> {
    let instr = cs.instr();
    let (a, b) = (instr.a(), instr.b());
    let c = match instr.c() {
        0 => extra_arg(cs)?,
        c => c,
    };

    let count = if b != 0 {
        cs.make_int(b as i64)
    } else {
        cs.top_diff(a + 1)
    };
    let ra = cs.register_addr(a);
    let first = cs.make_int((c as i64 - 1) * FIELDS_PER_FLUSH as i64);
    let state = cs.state();
    cs.call(RuntimeFn::SetList, &[state, ra, first, count]);
    cs.reload_top();
    Ok(())
}
