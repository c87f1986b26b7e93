//! Compile-once cache in front of the compiler
//!
//! [`JitEngine`] is what an embedding interpreter talks to. It counts calls
//! per program, compiles a program once it turns hot, and hands back the
//! installed entry point on every later call. A program whose compilation
//! failed is never retried.
//!
//! - **Concurrent lookups**: profiles live in a `DashMap` and are updated
//!   with atomics
//! - **Serialized compilation**: the single `JitCompiler` sits behind a
//!   `parking_lot::Mutex`; state transitions to Compiling happen under it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::compiler::{CompiledFunction, JitCompiler};
use super::config::JitConfig;
use super::profile::{ProgramProfile, ProgramState};
use super::types::{JitError, JitResult};
use crate::bytecode::Program;
use crate::host::{HostSymbols, Proto};

/// Identity of a program in the engine's cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(u64);

impl ProgramId {
    /// Identify a live host prototype by address
    pub fn from_proto(proto: *const Proto) -> Self {
        ProgramId(proto as usize as u64)
    }

    /// Identify a program by content
    pub fn of(program: &Program) -> Self {
        ProgramId(program.fingerprint())
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Compiler handle that may cross threads
struct CompilerCell(JitCompiler);

// Safety: the JIT module is only ever touched through the engine's mutex,
// and code it has finalized is immutable executable memory.
unsafe impl Send for CompilerCell {}

/// Statistics for the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Programs with a profile
    pub programs_tracked: u64,
    /// Calls recorded through `enter`
    pub calls: u64,
    /// Successful compilations
    pub compilations: u64,
    /// Failed compilations
    pub failures: u64,
}

pub struct JitEngine {
    compiler: Mutex<CompilerCell>,
    hot_threshold: u32,
    entries: DashMap<ProgramId, Arc<ProgramProfile>>,

    calls: AtomicU64,
    compilations: AtomicU64,
    failures: AtomicU64,
}

impl JitEngine {
    pub fn new(config: JitConfig, symbols: HostSymbols) -> JitResult<Self> {
        let hot_threshold = config.hot_threshold;
        let compiler = JitCompiler::new(config, symbols)?;
        Ok(JitEngine {
            compiler: Mutex::new(CompilerCell(compiler)),
            hot_threshold,
            entries: DashMap::new(),
            calls: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    fn profile(&self, id: ProgramId) -> Arc<ProgramProfile> {
        if let Some(entry) = self.entries.get(&id) {
            return Arc::clone(entry.value());
        }
        self.entries
            .entry(id)
            .or_insert_with(|| Arc::new(ProgramProfile::new()))
            .value()
            .clone()
    }

    /// Record a call of `program`; returns native code once available.
    ///
    /// The call that makes the program hot compiles it before returning.
    /// Compilation errors are logged and leave the program interpreted.
    pub fn enter(&self, id: ProgramId, program: &Program) -> Option<CompiledFunction> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let profile = self.profile(id);

        match profile.state() {
            ProgramState::Jitted => return profile.compiled(),
            ProgramState::Failed | ProgramState::Compiling => return None,
            ProgramState::Cold | ProgramState::Hot => {}
        }

        if profile.record_call(self.hot_threshold) {
            return self.compile_profile(id, &profile, program).ok();
        }
        profile.compiled()
    }

    /// Compile `program` now regardless of its call count
    pub fn compile_now(&self, id: ProgramId, program: &Program) -> JitResult<CompiledFunction> {
        let profile = self.profile(id);
        self.compile_profile(id, &profile, program)
    }

    fn compile_profile(
        &self,
        id: ProgramId,
        profile: &ProgramProfile,
        program: &Program,
    ) -> JitResult<CompiledFunction> {
        let mut compiler = self.compiler.lock();

        // another thread may have finished while we waited for the lock
        match profile.state() {
            ProgramState::Jitted => {
                return profile.compiled().ok_or(JitError::PreviouslyFailed)
            }
            ProgramState::Failed => return Err(JitError::PreviouslyFailed),
            _ => {}
        }
        if !profile.try_start_compiling() {
            return Err(JitError::PreviouslyFailed);
        }

        match compiler.0.compile(program) {
            Ok(compiled) => {
                profile.set_compiled(compiled);
                self.compilations.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: "lowlua::jit::engine",
                    program = program.name(),
                    id = id.raw(),
                    calls = profile.call_count(),
                    "installed native code"
                );
                Ok(compiled)
            }
            Err(err) => {
                profile.set_failed();
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "lowlua::jit::engine",
                    program = program.name(),
                    id = id.raw(),
                    error = %err,
                    "compilation failed; program stays interpreted"
                );
                Err(err)
            }
        }
    }

    /// Current state of a program, if the engine has seen it
    pub fn state(&self, id: ProgramId) -> Option<ProgramState> {
        self.entries.get(&id).map(|e| e.value().state())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            programs_tracked: self.entries.len() as u64,
            calls: self.calls.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
