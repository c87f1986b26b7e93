//! Per-program hotness tracking and install state
//!
//! Every program the engine sees gets a [`ProgramProfile`]. The state
//! machine is:
//!
//! 1. Cold: counting calls
//! 2. Hot: call count reached the threshold, compilation wanted
//! 3. Compiling: exactly one thread is compiling
//! 4. Jitted: native code installed
//! 5. Failed: compilation failed; the program stays interpreted for good

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::OnceLock;

use super::compiler::CompiledFunction;

/// Maximum calls to track (prevents counter overflow)
pub const MAX_CALL_COUNT: u32 = u32::MAX - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProgramState {
    Cold = 0,
    Hot = 1,
    Compiling = 2,
    Jitted = 3,
    Failed = 4,
}

impl From<u8> for ProgramState {
    fn from(v: u8) -> Self {
        match v {
            1 => ProgramState::Hot,
            2 => ProgramState::Compiling,
            3 => ProgramState::Jitted,
            4 => ProgramState::Failed,
            _ => ProgramState::Cold,
        }
    }
}

/// Profiling data for one program
///
/// # Thread Safety
///
/// All transitions are atomic. Many threads may count calls at once; only
/// the one that wins the Hot -> Compiling exchange compiles, and every
/// thread sees the installed code once the state reads Jitted.
#[derive(Debug)]
pub struct ProgramProfile {
    call_count: AtomicU32,
    state: AtomicU8,
    compiled: OnceLock<CompiledFunction>,
}

impl Default for ProgramProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramProfile {
    pub const fn new() -> Self {
        ProgramProfile {
            call_count: AtomicU32::new(0),
            state: AtomicU8::new(ProgramState::Cold as u8),
            compiled: OnceLock::new(),
        }
    }

    /// Count a call; true when this call made the program Hot
    #[inline]
    pub fn record_call(&self, threshold: u32) -> bool {
        let count = if self.call_count.load(Ordering::Relaxed) < MAX_CALL_COUNT {
            self.call_count.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            MAX_CALL_COUNT
        };

        count >= threshold
            && self
                .state
                .compare_exchange(
                    ProgramState::Cold as u8,
                    ProgramState::Hot as u8,
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
    }

    #[inline]
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn state(&self) -> ProgramState {
        ProgramState::from(self.state.load(Ordering::Acquire))
    }

    /// Move Cold or Hot to Compiling; true if this thread won
    pub fn try_start_compiling(&self) -> bool {
        [ProgramState::Hot, ProgramState::Cold].iter().any(|from| {
            self.state
                .compare_exchange(
                    *from as u8,
                    ProgramState::Compiling as u8,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
        })
    }

    /// Install native code; only valid while Compiling
    pub fn set_compiled(&self, compiled: CompiledFunction) {
        if self.compiled.set(compiled).is_ok() {
            self.state.store(ProgramState::Jitted as u8, Ordering::Release);
        }
    }

    pub fn set_failed(&self) {
        self.state.store(ProgramState::Failed as u8, Ordering::Release);
    }

    /// Installed code, once Jitted
    #[inline]
    pub fn compiled(&self) -> Option<CompiledFunction> {
        match self.state() {
            ProgramState::Jitted => self.compiled.get().copied(),
            _ => None,
        }
    }
}
