//! lowlua - Ahead-of-time native compilation of Lua 5.3 functions
//!
//! This library translates the register bytecode of a single Lua 5.3
//! function prototype into Cranelift IR and finalizes it into native code
//! that runs inside an existing Lua VM. The generated function reads and
//! writes the VM's stack, closure, and call-frame records directly and
//! calls back into the VM for anything without an inline fast path.
//!
//! # Architecture
//!
//! 1. **Bytecode** (`bytecode` module)
//!    - Decodes 32-bit instruction words (iABC / iABx / iAsBx / iAx)
//!    - Holds a function prototype's code, constants, and flags as a `Program`
//!
//! 2. **Host** (`host` module)
//!    - `#[repr(C)]` mirrors of the VM records generated code touches
//!    - `RuntimeLayout`, the byte offsets the code generator uses
//!    - `HostSymbols`, addresses of the VM's runtime entry points
//!
//! 3. **JIT** (`jit` module)
//!    - Per-offset block translation with inline integer / float paths
//!    - Cranelift verification and finalization
//!    - `JitEngine`, a compile-once cache keyed by program
//!
//! # Example
//!
//! ```rust,no_run
//! use lowlua::bytecode::{Instruction, Literal, OpCode, Program};
//! use lowlua::host::HostSymbols;
//! use lowlua::jit::{JitCompiler, JitConfig};
//!
//! let mut b = Program::builder("answer");
//! let k = b.add_constant(Literal::Integer(42));
//! b.emit(Instruction::abx(OpCode::LoadK, 0, k));
//! b.emit(Instruction::abc(OpCode::Return, 0, 2, 0));
//! let program = b.build();
//!
//! let mut compiler = JitCompiler::new(JitConfig::default(), HostSymbols::new()).unwrap();
//! let translation = compiler.translate(&program).unwrap();
//! println!("{}", translation.ir());
//! let compiled = compiler.compile(&program).unwrap();
//! assert_eq!(compiled.instructions(), 2);
//! ```

pub mod bytecode;
pub mod host;
pub mod jit;

pub use bytecode::{Instruction, OpCode, Program, ProgramBuilder};
pub use host::{HostSymbols, RuntimeLayout};
pub use jit::{CompiledFunction, JitCompiler, JitConfig, JitEngine, JitError, JitResult, ProgramId};
