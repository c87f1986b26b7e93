//! Lua bytecode to Cranelift JIT compiler
//!
//! This module translates one Lua 5.3 function prototype into native code.
//! The compilation process:
//!
//! 1. Create one Cranelift block per instruction offset
//! 2. Translate every instruction in order, dispatching on its opcode
//! 3. Fall through to the next offset's block when a translation leaves
//!    its block open
//! 4. Verify the IR, check that every runtime symbol it needs is bound
//! 5. Generate native code via the Cranelift JIT module

pub mod init;

use cranelift::codegen::ir::Function;
use cranelift::codegen::{print_errors, verify_function, Context};
use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use tracing::{debug, trace};

use super::codegen::{CompileState, TranslationLog};
use super::config::JitConfig;
use super::handlers::{self, Arith, Bitwise, TableGet, TableSet};
use super::operand::Operand;
use super::runtime::RuntimeFn;
use super::types::{JitError, JitResult};
use crate::bytecode::{OpCode, Program};
use crate::host::{HostSymbols, LClosure, LuaState};

use init::{RuntimeFuncIds, RuntimeInit};

/// Signature of every compiled function.
///
/// Returns the number of results left below `L->top`, or the negated size
/// of the callee and argument window when the host must complete a tail
/// call.
pub type NativeFn = unsafe extern "C" fn(*mut LuaState, *mut LClosure) -> i32;

/// Entry point of a finalized function
#[derive(Debug, Clone, Copy)]
pub struct CompiledFunction {
    entry: NativeFn,
    instructions: usize,
    fingerprint: u64,
}

impl CompiledFunction {
    #[inline]
    pub fn entry(&self) -> NativeFn {
        self.entry
    }

    /// Instruction count of the source program
    #[inline]
    pub fn instructions(&self) -> usize {
        self.instructions
    }

    #[inline]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Run the function on a live frame.
    ///
    /// # Safety
    /// `state` must be the running thread whose current `CallInfo` is the
    /// frame of `closure`, and `closure` must wrap the prototype this
    /// function was compiled from. The JIT compiler that produced the
    /// function must still be alive.
    #[inline]
    pub unsafe fn call(&self, state: *mut LuaState, closure: *mut LClosure) -> i32 {
        (self.entry)(state, closure)
    }
}

/// A verified function that was never handed to code generation
#[derive(Debug, Clone)]
pub struct Translation {
    func: Function,
    log: TranslationLog,
}

impl Translation {
    pub fn function(&self) -> &Function {
        &self.func
    }

    /// Textual IR
    pub fn ir(&self) -> String {
        self.func.display().to_string()
    }

    pub fn log(&self) -> &TranslationLog {
        &self.log
    }

    pub fn sub_blocks_at(&self, offset: usize) -> Vec<&'static str> {
        self.log.sub_blocks_at(offset)
    }

    pub fn calls_at(&self, offset: usize) -> Vec<RuntimeFn> {
        self.log.calls_at(offset)
    }

    pub fn num_blocks(&self) -> usize {
        self.func.layout.blocks().count()
    }
}

/// JIT compiler for Lua function prototypes
///
/// The compiler owns one Cranelift JIT module. Code it finalizes stays
/// mapped for as long as the compiler lives, so callers must keep it
/// around while any [`CompiledFunction`] may still run.
pub struct JitCompiler {
    module: JITModule,
    config: JitConfig,
    runtime: RuntimeFuncIds,
    symbols: HostSymbols,

    /// Counter for generating unique function names
    func_counter: u64,
}

impl JitCompiler {
    /// Create a compiler binding the given host entry points
    pub fn new(config: JitConfig, symbols: HostSymbols) -> JitResult<Self> {
        config.validate()?;

        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", config.opt_level.as_str())
            .map_err(|e| JitError::backend("Failed to set opt_level", e))?;
        flag_builder
            .set("enable_verifier", if config.verify { "true" } else { "false" })
            .map_err(|e| JitError::backend("Failed to set enable_verifier", e))?;

        let isa_builder = cranelift_native::builder()
            .map_err(|e| JitError::backend("Failed to create ISA builder", e))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| JitError::backend("Failed to create ISA", e))?;

        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        Self::register_runtime_symbols(&mut builder, &symbols);

        let mut module = JITModule::new(builder);
        let runtime = Self::declare_runtime_funcs(&mut module)?;

        Ok(JitCompiler {
            module,
            config,
            runtime,
            symbols,
            func_counter: 0,
        })
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    /// Compile a program to native code
    pub fn compile(&mut self, program: &Program) -> JitResult<CompiledFunction> {
        debug!(
            target: "lowlua::jit::compiler",
            program = program.name(),
            instructions = program.len(),
            "compiling"
        );

        let func_name = format!("lowlua_fn_{}", self.func_counter);
        self.func_counter += 1;

        let sig = self.native_signature();
        let func_id = self
            .module
            .declare_function(&func_name, Linkage::Local, &sig)
            .map_err(|e| JitError::backend("Failed to declare function", e))?;

        let mut ctx = self.module.make_context();
        ctx.func.signature = sig;

        let log = self.build_function(&mut ctx.func, program)?;
        self.check_symbols(&log)?;
        if self.config.verify {
            self.verify(&ctx.func)?;
        }

        let blocks = ctx.func.layout.blocks().count();
        if self.config.dump_ir {
            trace!(target: "lowlua::jit::compiler::ir", ir = %ctx.func.display(), "Generated IR");
        }

        self.define(func_id, &mut ctx)?;
        let code_ptr = self.module.get_finalized_function(func_id);

        debug!(
            target: "lowlua::jit::compiler",
            program = program.name(),
            function = %func_name,
            blocks,
            runtime_calls = log.calls.len(),
            "compiled"
        );

        // SAFETY: the function was declared with the (ptr, ptr) -> i32
        // signature that NativeFn describes, using the host's C ABI.
        let entry = unsafe { std::mem::transmute::<*const u8, NativeFn>(code_ptr) };
        Ok(CompiledFunction {
            entry,
            instructions: program.len(),
            fingerprint: program.fingerprint(),
        })
    }

    /// Translate and verify a program without generating code
    pub fn translate(&mut self, program: &Program) -> JitResult<Translation> {
        let mut func = Function::with_name_signature(Default::default(), self.native_signature());
        let log = self.build_function(&mut func, program)?;
        self.verify(&func)?;
        Ok(Translation { func, log })
    }

    fn native_signature(&self) -> Signature {
        let ptr_ty = self.module.target_config().pointer_type();
        let mut sig = self.module.make_signature();
        sig.params.push(AbiParam::new(ptr_ty)); // lua_State*
        sig.params.push(AbiParam::new(ptr_ty)); // LClosure*
        sig.returns.push(AbiParam::new(types::I32));
        sig
    }

    fn verify(&self, func: &Function) -> JitResult<()> {
        verify_function(func, self.module.isa()).map_err(|errors| {
            JitError::Verification(print_errors::pretty_verifier_error(func, None, errors))
        })
    }

    /// The JIT linker aborts on names it cannot resolve, so refuse first
    fn check_symbols(&self, log: &TranslationLog) -> JitResult<()> {
        if self.config.resolve_from_process {
            return Ok(());
        }
        for call in &log.calls {
            let func = call.func;
            if !func.is_builtin() && self.symbols.get(func).is_none() {
                return Err(JitError::MissingSymbol(func.name()));
            }
        }
        Ok(())
    }

    fn define(&mut self, func_id: FuncId, ctx: &mut Context) -> JitResult<()> {
        let defined = self
            .module
            .define_function(func_id, ctx)
            .map_err(|e| JitError::backend("Failed to define function", e));
        self.module.clear_context(ctx);
        defined?;

        self.module
            .finalize_definitions()
            .map_err(|e| JitError::backend("Failed to finalize definitions", e))
    }

    /// Build the Cranelift IR for a program
    fn build_function(&mut self, func: &mut Function, program: &Program) -> JitResult<TranslationLog> {
        let mut func_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(func, &mut func_ctx);

        let log = {
            let mut cs = CompileState::new(
                &mut builder,
                &mut self.module,
                &self.runtime,
                program,
                &self.config.layout,
            )?;

            for (pc, &instr) in program.code().iter().enumerate() {
                cs.begin_instruction(pc, instr);
                let op = instr.opcode().ok_or(JitError::InvalidOpcode {
                    offset: pc,
                    raw: instr.raw_opcode(),
                })?;

                translate_opcode(&mut cs, op)?;

                if !cs.is_terminated() {
                    let next = cs
                        .next_block()
                        .map_err(|_| JitError::malformed(pc, "control falls off the end of the code"))?;
                    cs.builder.ins().jump(next, &[]);
                }
            }
            // cs is dropped here, releasing the borrow on builder
            cs.into_log()
        };

        builder.seal_all_blocks();
        builder.finalize();
        Ok(log)
    }
}

/// Translate a single instruction at the cursor
fn translate_opcode(cs: &mut CompileState, op: OpCode) -> JitResult<()> {
    let instr = cs.instr();
    match op {
        // =====================================================================
        // Loads and moves
        // =====================================================================
        OpCode::Move => handlers::compile_move(cs),
        OpCode::LoadK => handlers::compile_loadk(cs, false),
        OpCode::LoadKx => handlers::compile_loadk(cs, true),
        OpCode::LoadBool => handlers::compile_loadbool(cs),
        OpCode::LoadNil => handlers::compile_loadnil(cs),
        OpCode::GetUpval => handlers::compile_getupval(cs),
        OpCode::SetUpval => handlers::compile_setupval(cs),

        // =====================================================================
        // Tables
        // =====================================================================
        OpCode::GetTabUp => TableGet {
            table: Operand::Upvalue(instr.b()),
            key: Operand::rk(instr.c()),
            dest: Operand::Register(instr.a()),
        }
        .compile(cs),
        OpCode::GetTable => TableGet {
            table: Operand::Register(instr.b()),
            key: Operand::rk(instr.c()),
            dest: Operand::Register(instr.a()),
        }
        .compile(cs),
        OpCode::SetTabUp => TableSet {
            table: Operand::Upvalue(instr.a()),
            key: Operand::rk(instr.b()),
            value: Operand::rk(instr.c()),
        }
        .compile(cs),
        OpCode::SetTable => TableSet {
            table: Operand::Register(instr.a()),
            key: Operand::rk(instr.b()),
            value: Operand::rk(instr.c()),
        }
        .compile(cs),
        OpCode::SelfOp => handlers::compile_self(cs),
        OpCode::NewTable => handlers::compile_newtable(cs),
        OpCode::SetList => handlers::compile_setlist(cs),

        // =====================================================================
        // Arithmetic and bitwise operators
        // =====================================================================
        OpCode::Add
        | OpCode::Sub
        | OpCode::Mul
        | OpCode::Mod
        | OpCode::Pow
        | OpCode::Div
        | OpCode::IDiv => Arith::new(cs, op)?.compile(cs),
        OpCode::BAnd | OpCode::BOr | OpCode::BXor | OpCode::Shl | OpCode::Shr => {
            Bitwise::new(cs, op)?.compile(cs)
        }
        OpCode::Unm | OpCode::BNot | OpCode::Not | OpCode::Len => handlers::compile_unary(cs, op),
        OpCode::Concat => handlers::compile_concat(cs),

        // =====================================================================
        // Control flow
        // =====================================================================
        OpCode::Jmp => handlers::compile_jmp(cs),
        OpCode::Eq | OpCode::Lt | OpCode::Le => handlers::compile_compare(cs, op),
        OpCode::Test => handlers::compile_test(cs),
        OpCode::TestSet => handlers::compile_testset(cs),
        OpCode::ForLoop => handlers::compile_forloop(cs),
        OpCode::ForPrep => handlers::compile_forprep(cs),
        OpCode::TForLoop => handlers::compile_tforloop(cs),

        // =====================================================================
        // Calls and frames
        // =====================================================================
        OpCode::Call => handlers::compile_call(cs),
        OpCode::TailCall => handlers::compile_tailcall(cs),
        OpCode::Return => handlers::compile_return(cs),
        OpCode::TForCall => handlers::compile_tforcall(cs),
        OpCode::Closure => handlers::compile_closure(cs),
        OpCode::VarArg => handlers::compile_vararg(cs),

        // consumed by LOADKX and SETLIST
        OpCode::ExtraArg => Ok(()),
    }
}
