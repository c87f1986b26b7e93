//! Cranelift compilation of Lua 5.3 functions
//!
//! Each [`Program`](crate::bytecode::Program) is translated as a whole into
//! one native function with the signature
//!
//! ```text
//! int32 f(lua_State *L, LClosure *cl)
//! ```
//!
//! Every bytecode offset gets its own Cranelift block. Operations with an
//! inline fast path (arithmetic, bitwise, table access, VARARG) synthesize
//! extra blocks between two offsets; everything else calls back into the
//! host runtime. The return value is the number of results left on the
//! stack, or for a tail call its negation.
//!
//! # Architecture
//!
//! ```text
//! Program -> JitCompiler::translate -> Translation (IR + log)
//!         -> JitCompiler::compile   -> CompiledFunction (native entry)
//! JitEngine::enter: call counting, compile once, cache per ProgramId
//! ```
//!
//! # Modules
//!
//! - [`types`]: host tags, `JitError`, `JitResult`
//! - [`config`]: `JitConfig` and optimization levels
//! - [`runtime`]: runtime functions generated code may call
//! - [`codegen`]: `CompileState`, the per-function translation context
//! - [`operand`]: register / constant / upvalue operands
//! - [`handlers`]: opcode-specific IR generation
//! - [`compiler`]: the dispatch driver and Cranelift module
//! - [`profile`]: hotness tracking per program
//! - [`engine`]: compile-once cache for embedders

pub mod codegen;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod handlers;
pub mod operand;
pub mod profile;
pub mod runtime;
pub mod types;

pub use codegen::{RuntimeCall, SubBlock, TranslationLog};
pub use compiler::{CompiledFunction, JitCompiler, NativeFn, Translation};
pub use config::{JitConfig, OptLevel, DEFAULT_HOT_THRESHOLD};
pub use engine::{EngineStats, JitEngine, ProgramId};
pub use profile::{ProgramProfile, ProgramState};
pub use runtime::RuntimeFn;
pub use types::{JitError, JitResult};
