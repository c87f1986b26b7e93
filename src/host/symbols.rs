//! Embedder-supplied addresses for the runtime call surface.
//!
//! Generated code imports every host entry point by name and binds it to
//! the address registered here. Compiling a program that calls a name with
//! no binding fails with `JitError::MissingSymbol`, unless the compiler was
//! configured with `resolve_from_process`, in which case the JIT linker
//! looks the name up in the process symbol table (a statically linked Lua
//! core).

use std::collections::HashMap;

use crate::jit::runtime::RuntimeFn;

#[derive(Debug, Clone, Default)]
pub struct HostSymbols {
    // addresses are kept as integers so the table is Send
    entries: HashMap<&'static str, usize>,
}

impl HostSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one runtime entry point
    pub fn insert(&mut self, func: RuntimeFn, addr: *const u8) -> &mut Self {
        self.entries.insert(func.name(), addr as usize);
        self
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, func: RuntimeFn, addr: *const u8) -> Self {
        self.insert(func, addr);
        self
    }

    pub fn get(&self, func: RuntimeFn) -> Option<*const u8> {
        self.entries.get(func.name()).map(|&addr| addr as *const u8)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&'static str, *const u8)> + '_ {
        self.entries.iter().map(|(&name, &addr)| (name, addr as *const u8))
    }
}
