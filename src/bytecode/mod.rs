//! Lua 5.3 bytecode: opcodes, instruction words, and function prototypes
//!
//! # Modules
//!
//! - [`opcodes`]: `OpCode` and metamethod events
//! - [`instruction`]: field extraction for the iABC / iABx / iAsBx / iAx formats
//! - [`program`]: `Program`, the compiler's input, and `ProgramBuilder`

pub mod instruction;
pub mod opcodes;
pub mod program;

pub use instruction::{fb2int, index_k, is_k, rk_as_k, Instruction, FIELDS_PER_FLUSH};
pub use opcodes::{OpCode, TagMethod};
pub use program::{Literal, Program, ProgramBuilder};
