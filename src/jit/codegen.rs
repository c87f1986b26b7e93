//! Per-function compilation context
//!
//! [`CompileState`] wraps the Cranelift `FunctionBuilder` for one program and
//! owns everything the translators share: the block table (one block per
//! pc), the instruction cursor, cached handles for the interpreter state,
//! call record, closure and constant array, and the SSA variables that hold
//! the stack base and coercion scratch values.
//!
//! Host records are only ever touched through [`CompileState::load_field`]
//! and [`CompileState::store_field`]; every offset comes from the
//! [`RuntimeLayout`].

use cranelift::codegen::ir::FuncRef;
use cranelift::prelude::*;
use cranelift_jit::JITModule;
use cranelift_module::Module;

use super::compiler::init::RuntimeFuncIds;
use super::runtime::RuntimeFn;
use super::types::constants::{TAG_BOOLEAN, TAG_FLOAT, TAG_INTEGER};
use super::types::{JitError, JitResult};
use crate::bytecode::{Instruction, Program};
use crate::host::layout::{Field, FieldType, RuntimeLayout};

/// A private block synthesized while translating one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubBlock {
    pub offset: usize,
    pub label: &'static str,
}

/// A runtime call emitted while translating one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeCall {
    pub offset: usize,
    pub func: RuntimeFn,
}

/// What the translators recorded about the function they built
#[derive(Debug, Clone, Default)]
pub struct TranslationLog {
    pub sub_blocks: Vec<SubBlock>,
    pub calls: Vec<RuntimeCall>,
}

impl TranslationLog {
    /// Sub-block labels synthesized for the instruction at `offset`
    pub fn sub_blocks_at(&self, offset: usize) -> Vec<&'static str> {
        self.sub_blocks
            .iter()
            .filter(|s| s.offset == offset)
            .map(|s| s.label)
            .collect()
    }

    /// Runtime calls emitted for the instruction at `offset`, in order
    pub fn calls_at(&self, offset: usize) -> Vec<RuntimeFn> {
        self.calls
            .iter()
            .filter(|c| c.offset == offset)
            .map(|c| c.func)
            .collect()
    }

    pub fn uses(&self, func: RuntimeFn) -> bool {
        self.calls.iter().any(|c| c.func == func)
    }
}

/// Compilation context for one program
pub struct CompileState<'a, 'b> {
    pub builder: &'a mut FunctionBuilder<'b>,
    module: &'a mut JITModule,
    runtime: &'a RuntimeFuncIds,
    program: &'a Program,
    layout: &'a RuntimeLayout,
    ptr_ty: Type,

    /// One block per instruction offset
    blocks: Vec<Block>,
    /// Offset of the instruction being translated
    curr: usize,
    instr: Instruction,

    state: Value,
    closure: Value,
    ci: Value,
    k: Value,

    /// Current `ci->u.l.base`; redefined after every call that may move the stack
    base: Variable,
    /// Coerced operands of the float and bitwise stages
    scratch_float: [Variable; 2],
    scratch_int: [Variable; 2],

    func_refs: Vec<Option<FuncRef>>,
    log: TranslationLog,
}

impl<'a, 'b> CompileState<'a, 'b> {
    /// Create the block table and emit the entry block.
    ///
    /// The function must already carry the `(state, closure) -> i32`
    /// signature.
    pub fn new(
        builder: &'a mut FunctionBuilder<'b>,
        module: &'a mut JITModule,
        runtime: &'a RuntimeFuncIds,
        program: &'a Program,
        layout: &'a RuntimeLayout,
    ) -> JitResult<Self> {
        if program.is_empty() {
            return Err(JitError::malformed(0, "program has no instructions"));
        }

        let ptr_ty = module.target_config().pointer_type();

        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        let blocks: Vec<Block> = (0..program.len()).map(|_| builder.create_block()).collect();

        let base = builder.declare_var(ptr_ty);
        let scratch_float = [builder.declare_var(types::F64), builder.declare_var(types::F64)];
        let scratch_int = [builder.declare_var(types::I64), builder.declare_var(types::I64)];

        builder.switch_to_block(entry);
        builder.seal_block(entry);
        let state = builder.block_params(entry)[0];
        let closure = builder.block_params(entry)[1];

        let mut cs = CompileState {
            builder,
            module,
            runtime,
            program,
            layout,
            ptr_ty,
            blocks,
            curr: 0,
            instr: Instruction(0),
            state,
            closure,
            ci: state,
            k: state,
            base,
            scratch_float,
            scratch_int,
            func_refs: vec![None; RuntimeFn::ALL.len()],
            log: TranslationLog::default(),
        };

        cs.ci = cs.load_field(state, layout.state.ci);
        cs.update_stack();
        let proto = cs.load_field(closure, layout.closure.proto);
        cs.k = cs.load_field(proto, layout.proto.k);
        let first = cs.blocks[0];
        cs.builder.ins().jump(first, &[]);

        Ok(cs)
    }

    // =========================================================================
    // Cursor and blocks
    // =========================================================================

    /// Position the cursor on instruction `pc` and its block
    pub fn begin_instruction(&mut self, pc: usize, instr: Instruction) {
        self.curr = pc;
        self.instr = instr;
        let block = self.blocks[pc];
        self.builder.switch_to_block(block);
    }

    #[inline]
    pub fn curr(&self) -> usize {
        self.curr
    }

    #[inline]
    pub fn instr(&self) -> Instruction {
        self.instr
    }

    #[inline]
    pub fn program(&self) -> &'a Program {
        self.program
    }

    #[inline]
    pub fn layout(&self) -> &'a RuntimeLayout {
        self.layout
    }

    #[inline]
    pub fn ptr_ty(&self) -> Type {
        self.ptr_ty
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Block of instruction `pc`
    pub fn block_at(&self, pc: usize) -> JitResult<Block> {
        self.blocks.get(pc).copied().ok_or_else(|| {
            JitError::malformed(
                self.curr,
                format!("branch to pc {} outside of {} instructions", pc, self.blocks.len()),
            )
        })
    }

    /// Sequential successor
    pub fn next_block(&self) -> JitResult<Block> {
        self.block_at(self.curr + 1)
    }

    /// Successor when the next instruction is skipped (`pc++`)
    pub fn skip_block(&self) -> JitResult<Block> {
        self.block_at(self.curr + 2)
    }

    /// Target of a signed displacement, counted from the next instruction
    pub fn jump_block(&self, sbx: i32) -> JitResult<Block> {
        let target = self.curr as i64 + 1 + sbx as i64;
        usize::try_from(target)
            .map_err(|_| JitError::malformed(self.curr, format!("negative jump target {}", target)))
            .and_then(|pc| self.block_at(pc))
    }

    /// Synthesize a private block for the current instruction.
    ///
    /// Blocks enter the layout when first switched to, so sub-blocks land
    /// after the instruction's own block and before the next one.
    pub fn create_sub_block(&mut self, label: &'static str) -> Block {
        self.log.sub_blocks.push(SubBlock {
            offset: self.curr,
            label,
        });
        self.builder.create_block()
    }

    #[inline]
    pub fn switch_to(&mut self, block: Block) {
        self.builder.switch_to_block(block);
    }

    /// Whether the current block already ends in a terminator
    #[inline]
    pub fn is_terminated(&self) -> bool {
        let Some(block) = self.builder.current_block() else {
            return false;
        };
        let func = &self.builder.func;
        func.layout
            .last_inst(block)
            .is_some_and(|inst| func.dfg.insts[inst].opcode().is_terminator())
    }

    // =========================================================================
    // Constants and conversions
    // =========================================================================

    /// 32-bit integer constant
    #[inline]
    pub fn make_int(&mut self, v: i64) -> Value {
        self.builder.ins().iconst(types::I32, v)
    }

    /// 64-bit integer constant
    #[inline]
    pub fn make_i64(&mut self, v: i64) -> Value {
        self.builder.ins().iconst(types::I64, v)
    }

    /// Nonzero means true
    #[inline]
    pub fn to_bool(&mut self, v: Value) -> Value {
        self.builder.ins().icmp_imm(IntCC::NotEqual, v, 0)
    }

    fn clif_type(&self, ty: FieldType) -> Type {
        match ty {
            FieldType::Ptr => self.ptr_ty,
            FieldType::I32 => types::I32,
            FieldType::I64 => types::I64,
            FieldType::F64 => types::F64,
        }
    }

    // =========================================================================
    // Host record access
    // =========================================================================

    /// Load a typed field of the record at `ptr`
    pub fn load_field(&mut self, ptr: Value, field: Field) -> Value {
        let ty = self.clif_type(field.ty);
        self.builder.ins().load(ty, MemFlags::trusted(), ptr, field.offset)
    }

    /// Store a typed field of the record at `ptr`
    pub fn store_field(&mut self, ptr: Value, field: Field, value: Value) {
        self.builder.ins().store(MemFlags::trusted(), value, ptr, field.offset);
    }

    /// Address of slot `index` of a TValue array
    pub fn slot_addr(&mut self, array: Value, index: i64) -> Value {
        let stride = self.layout.tvalue.size;
        self.builder.ins().iadd_imm(array, index * stride)
    }

    /// Address of a slot whose index is only known at run time (I64)
    pub fn slot_addr_dyn(&mut self, array: Value, index: Value) -> Value {
        let stride = self.layout.tvalue.size;
        let scaled = self.builder.ins().imul_imm(index, stride);
        let scaled = self.coerce_to_ptr(scaled);
        self.builder.ins().iadd(array, scaled)
    }

    fn coerce_to_ptr(&mut self, v: Value) -> Value {
        match self.ptr_ty.bits() {
            64 => v,
            _ => self.builder.ins().ireduce(self.ptr_ty, v),
        }
    }

    // =========================================================================
    // Tagged values
    // =========================================================================

    pub fn load_tag(&mut self, addr: Value) -> Value {
        self.load_field(addr, self.layout.tvalue.tag)
    }

    pub fn load_int(&mut self, addr: Value) -> Value {
        self.load_field(addr, self.layout.tvalue.int_payload())
    }

    pub fn load_float(&mut self, addr: Value) -> Value {
        self.load_field(addr, self.layout.tvalue.float_payload())
    }

    pub fn load_ptr(&mut self, addr: Value) -> Value {
        self.load_field(addr, self.layout.tvalue.ptr_payload())
    }

    pub fn store_tag(&mut self, addr: Value, tag: i32) {
        let tag = self.make_int(tag as i64);
        self.store_field(addr, self.layout.tvalue.tag, tag);
    }

    pub fn store_int(&mut self, addr: Value, v: Value) {
        self.store_field(addr, self.layout.tvalue.int_payload(), v);
        self.store_tag(addr, TAG_INTEGER);
    }

    pub fn store_float(&mut self, addr: Value, v: Value) {
        self.store_field(addr, self.layout.tvalue.float_payload(), v);
        self.store_tag(addr, TAG_FLOAT);
    }

    /// `v` is an I32 holding 0 or 1
    pub fn store_bool(&mut self, addr: Value, v: Value) {
        self.store_field(addr, self.layout.tvalue.bool_payload(), v);
        self.store_tag(addr, TAG_BOOLEAN);
    }

    /// `setobj`: payload and tag, both loaded before either is stored
    pub fn copy_value(&mut self, dst: Value, src: Value) {
        let payload = self.load_int(src);
        let tag = self.load_tag(src);
        self.store_field(dst, self.layout.tvalue.int_payload(), payload);
        self.store_field(dst, self.layout.tvalue.tag, tag);
    }

    /// `tag == expected` as a branch condition
    pub fn tag_is(&mut self, addr: Value, expected: i32) -> Value {
        let tag = self.load_tag(addr);
        self.builder.ins().icmp_imm(IntCC::Equal, tag, expected as i64)
    }

    // =========================================================================
    // Frame
    // =========================================================================

    #[inline]
    pub fn state(&self) -> Value {
        self.state
    }

    #[inline]
    pub fn closure(&self) -> Value {
        self.closure
    }

    #[inline]
    pub fn ci(&self) -> Value {
        self.ci
    }

    /// Current stack base
    pub fn base(&mut self) -> Value {
        self.builder.use_var(self.base)
    }

    /// Reload the base from the call record; required after any call that
    /// can reallocate the stack
    pub fn update_stack(&mut self) {
        let base = self.load_field(self.ci, self.layout.call_info.base);
        self.builder.def_var(self.base, base);
    }

    /// Address of R(index)
    pub fn register_addr(&mut self, index: u32) -> Value {
        let base = self.base();
        self.slot_addr(base, index as i64)
    }

    /// Address of K(index); the constant array never moves
    pub fn constant_addr(&mut self, index: u32) -> Value {
        self.slot_addr(self.k, index as i64)
    }

    /// Address of the value of upvalue `index`, reloaded on every access
    pub fn upvalue_addr(&mut self, index: u32) -> Value {
        let cell = self.upvalue_cell(index);
        self.load_field(cell, self.layout.upval.v)
    }

    /// The `UpVal*` for upvalue `index`
    pub fn upvalue_cell(&mut self, index: u32) -> Value {
        let slot = self.layout.closure.upval(index);
        self.load_field(self.closure, slot)
    }

    /// `L->top = &R(reg)`
    pub fn set_top(&mut self, reg: u32) {
        let top = self.register_addr(reg);
        self.store_field(self.state, self.layout.state.top, top);
    }

    /// `L->top = addr`
    pub fn set_top_addr(&mut self, addr: Value) {
        self.store_field(self.state, self.layout.state.top, addr);
    }

    /// `L->top = ci->top`
    pub fn reload_top(&mut self) {
        let top = self.load_field(self.ci, self.layout.call_info.top);
        self.store_field(self.state, self.layout.state.top, top);
    }

    /// `L->top - &R(reg)` in slots, as I32
    pub fn top_diff(&mut self, reg: u32) -> Value {
        let top = self.load_field(self.state, self.layout.state.top);
        let r = self.register_addr(reg);
        let bytes = self.builder.ins().isub(top, r);
        let slots = self.builder.ins().sdiv_imm(bytes, self.layout.tvalue.size);
        if self.ptr_ty == types::I32 {
            slots
        } else {
            self.builder.ins().ireduce(types::I32, slots)
        }
    }

    /// `ci->func`
    pub fn frame_func(&mut self) -> Value {
        self.load_field(self.ci, self.layout.call_info.func)
    }

    // =========================================================================
    // Scratch variables
    // =========================================================================

    #[inline]
    pub fn scratch_float(&self, which: usize) -> Variable {
        self.scratch_float[which]
    }

    #[inline]
    pub fn scratch_int(&self, which: usize) -> Variable {
        self.scratch_int[which]
    }

    // =========================================================================
    // Runtime calls
    // =========================================================================

    fn func_ref(&mut self, func: RuntimeFn) -> FuncRef {
        if let Some(fref) = self.func_refs[func.index()] {
            return fref;
        }
        let id = self.runtime.get(func);
        let fref = self.module.declare_func_in_func(id, self.builder.func);
        self.func_refs[func.index()] = Some(fref);
        fref
    }

    /// Call a runtime function, returning its result if it has one
    pub fn call(&mut self, func: RuntimeFn, args: &[Value]) -> Option<Value> {
        let fref = self.func_ref(func);
        let inst = self.builder.ins().call(fref, args);
        self.log.calls.push(RuntimeCall {
            offset: self.curr,
            func,
        });
        self.builder.inst_results(inst).first().copied()
    }

    /// Call a runtime function that returns a value
    pub fn call_value(&mut self, func: RuntimeFn, args: &[Value]) -> JitResult<Value> {
        self.call(func, args).ok_or_else(|| {
            JitError::Backend(format!("{} was declared without a result", func))
        })
    }

    /// `checkGC(L, reg)`: give the collector a chance to run with the stack
    /// cut at `reg`, then reload the base since finalizers may have run
    pub fn check_gc(&mut self, reg: u32) {
        let limit = self.register_addr(reg);
        self.check_gc_addr(limit);
    }

    pub fn check_gc_addr(&mut self, limit: Value) {
        let (state, ci) = (self.state, self.ci);
        self.call(RuntimeFn::CheckGc, &[state, ci, limit]);
        self.update_stack();
    }

    /// Finish translation, handing back what was recorded
    pub fn into_log(self) -> TranslationLog {
        self.log
    }
}
