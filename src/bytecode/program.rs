//! The unit of compilation: one function prototype
//!
//! A [`Program`] is an owned, read-only snapshot of the parts of a host
//! `Proto` the compiler consults: the instruction array, a classified copy of
//! the constant pool, and the frame metadata. Generated code never reads the
//! snapshot at run time; constants are loaded through the live closure.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::instruction::Instruction;
use crate::host::layout::{Proto, TValue};
use crate::jit::types::constants::{
    LUA_TBOOLEAN, LUA_TNIL, LUA_TNUMFLT, LUA_TNUMINT,
};
use crate::jit::types::{JitError, JitResult};

/// Compile-time view of a constant pool entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    /// Any other value, identified by its host tag (strings in practice)
    Object(i32),
}

impl Literal {
    /// Classify a host constant
    pub fn from_tvalue(v: &TValue) -> Self {
        match v.tt {
            LUA_TNIL => Literal::Nil,
            LUA_TBOOLEAN => Literal::Boolean(v.as_boolean().unwrap_or(false)),
            LUA_TNUMINT => Literal::Integer(v.as_integer().unwrap_or(0)),
            LUA_TNUMFLT => Literal::Float(v.as_float().unwrap_or(0.0)),
            tt => Literal::Object(tt),
        }
    }

    /// Host value for non-object literals
    pub fn to_tvalue(&self) -> Option<TValue> {
        match *self {
            Literal::Nil => Some(TValue::nil()),
            Literal::Boolean(b) => Some(TValue::boolean(b)),
            Literal::Integer(i) => Some(TValue::integer(i)),
            Literal::Float(n) => Some(TValue::number(n)),
            Literal::Object(_) => None,
        }
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Literal::Integer(_) | Literal::Float(_))
    }
}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match *self {
            Literal::Nil => {}
            Literal::Boolean(b) => b.hash(state),
            Literal::Integer(i) => i.hash(state),
            Literal::Float(n) => n.to_bits().hash(state),
            Literal::Object(tt) => tt.hash(state),
        }
    }
}

/// One function prototype ready for compilation
#[derive(Debug, Clone)]
pub struct Program {
    name: String,
    code: Vec<Instruction>,
    constants: Vec<Literal>,
    num_params: u8,
    is_vararg: bool,
    max_stack_size: u8,
    num_protos: usize,
    num_upvalues: usize,
}

impl Program {
    pub fn builder(name: impl Into<String>) -> ProgramBuilder {
        ProgramBuilder::new(name)
    }

    /// Snapshot a live host prototype.
    ///
    /// # Safety
    /// `proto` must point to a valid Lua 5.3 `Proto` whose `code` and `k`
    /// arrays hold `sizecode` and `sizek` entries.
    pub unsafe fn from_proto(proto: *const Proto, name: impl Into<String>) -> JitResult<Self> {
        let p = proto
            .as_ref()
            .ok_or_else(|| JitError::malformed(0, "null prototype"))?;

        let sizecode = usize::try_from(p.sizecode)
            .map_err(|_| JitError::malformed(0, format!("negative sizecode {}", p.sizecode)))?;
        let sizek = usize::try_from(p.sizek)
            .map_err(|_| JitError::malformed(0, format!("negative sizek {}", p.sizek)))?;

        let code = if sizecode == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(p.code, sizecode)
                .iter()
                .map(|&w| Instruction(w))
                .collect()
        };
        let constants = if sizek == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(p.k, sizek)
                .iter()
                .map(Literal::from_tvalue)
                .collect()
        };

        Ok(Program {
            name: name.into(),
            code,
            constants,
            num_params: p.numparams,
            is_vararg: p.is_vararg != 0,
            max_stack_size: p.maxstacksize,
            num_protos: p.sizep.max(0) as usize,
            num_upvalues: p.sizeupvalues.max(0) as usize,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    #[inline]
    pub fn instruction(&self, pc: usize) -> Option<Instruction> {
        self.code.get(pc).copied()
    }

    #[inline]
    pub fn constants(&self) -> &[Literal] {
        &self.constants
    }

    #[inline]
    pub fn constant(&self, index: u32) -> Option<&Literal> {
        self.constants.get(index as usize)
    }

    #[inline]
    pub fn num_params(&self) -> u8 {
        self.num_params
    }

    #[inline]
    pub fn is_vararg(&self) -> bool {
        self.is_vararg
    }

    #[inline]
    pub fn max_stack_size(&self) -> u8 {
        self.max_stack_size
    }

    #[inline]
    pub fn num_protos(&self) -> usize {
        self.num_protos
    }

    /// Whether RETURN/TAILCALL must close upvalues first
    #[inline]
    pub fn has_nested_protos(&self) -> bool {
        self.num_protos > 0
    }

    #[inline]
    pub fn num_upvalues(&self) -> usize {
        self.num_upvalues
    }

    /// Content hash, stable for identical programs within one process
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.code.hash(&mut hasher);
        self.constants.hash(&mut hasher);
        self.num_params.hash(&mut hasher);
        self.is_vararg.hash(&mut hasher);
        self.max_stack_size.hash(&mut hasher);
        self.num_protos.hash(&mut hasher);
        self.num_upvalues.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "function <{}> ({} instructions, {} params{}, {} slots, {} constants, {} functions)",
            self.name,
            self.code.len(),
            self.num_params,
            if self.is_vararg { "+" } else { "" },
            self.max_stack_size,
            self.constants.len(),
            self.num_protos,
        )?;
        for (pc, instr) in self.code.iter().enumerate() {
            writeln!(f, "\t{}\t{:?}", pc + 1, instr)?;
        }
        Ok(())
    }
}

/// Builder for constructing Programs by hand
#[derive(Debug)]
pub struct ProgramBuilder {
    name: String,
    code: Vec<Instruction>,
    constants: Vec<Literal>,
    num_params: u8,
    is_vararg: bool,
    max_stack_size: u8,
    num_protos: usize,
    num_upvalues: usize,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ProgramBuilder {
            name: name.into(),
            code: Vec::new(),
            constants: Vec::new(),
            num_params: 0,
            is_vararg: false,
            max_stack_size: 2,
            num_protos: 0,
            num_upvalues: 0,
        }
    }

    /// Append an instruction, returning its pc
    pub fn emit(&mut self, instr: Instruction) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    /// Add a constant, reusing an identical entry
    pub fn add_constant(&mut self, lit: Literal) -> u32 {
        let existing = self.constants.iter().position(|k| match (k, &lit) {
            (Literal::Float(a), Literal::Float(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        });
        match existing {
            Some(idx) => idx as u32,
            None => {
                self.constants.push(lit);
                (self.constants.len() - 1) as u32
            }
        }
    }

    pub fn num_params(&mut self, n: u8) -> &mut Self {
        self.num_params = n;
        self
    }

    pub fn vararg(&mut self, is_vararg: bool) -> &mut Self {
        self.is_vararg = is_vararg;
        self
    }

    pub fn max_stack_size(&mut self, n: u8) -> &mut Self {
        self.max_stack_size = n;
        self
    }

    pub fn nested_protos(&mut self, n: usize) -> &mut Self {
        self.num_protos = n;
        self
    }

    pub fn upvalues(&mut self, n: usize) -> &mut Self {
        self.num_upvalues = n;
        self
    }

    pub fn build(&self) -> Program {
        Program {
            name: self.name.clone(),
            code: self.code.clone(),
            constants: self.constants.clone(),
            num_params: self.num_params,
            is_vararg: self.is_vararg,
            max_stack_size: self.max_stack_size,
            num_protos: self.num_protos,
            num_upvalues: self.num_upvalues,
        }
    }
}
