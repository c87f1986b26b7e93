//! Runtime function registration and declaration for the JIT compiler
//!
//! Every [`RuntimeFn`] is declared once per module as a `Linkage::Import`
//! with its C signature. Symbols are bound on the `JITBuilder`: the crate's
//! own float helpers always, host entry points from [`HostSymbols`].

use cranelift::prelude::*;
use cranelift_jit::JITBuilder;
use cranelift_module::{FuncId, Linkage, Module};

use crate::host::HostSymbols;
use crate::jit::runtime::{Abi, RuntimeFn};
use crate::jit::types::{JitError, JitResult};

/// Declared FuncIds, indexed by `RuntimeFn`
pub struct RuntimeFuncIds {
    ids: Vec<FuncId>,
}

impl RuntimeFuncIds {
    #[inline]
    pub fn get(&self, func: RuntimeFn) -> FuncId {
        self.ids[func.index()]
    }
}

/// Trait for runtime initialization - static dispatch on the compiler type
pub trait RuntimeInit {
    /// Register builtin and host symbols with the JIT builder
    fn register_runtime_symbols(builder: &mut JITBuilder, host: &HostSymbols);

    /// Declare every runtime function and return their FuncIds
    fn declare_runtime_funcs<M: Module>(module: &mut M) -> JitResult<RuntimeFuncIds>;
}

impl<T> RuntimeInit for T {
    fn register_runtime_symbols(builder: &mut JITBuilder, host: &HostSymbols) {
        for func in RuntimeFn::ALL {
            if let Some(addr) = func.builtin_addr() {
                builder.symbol(func.name(), addr);
            }
        }
        for (name, addr) in host.iter() {
            builder.symbol(name, addr);
        }
    }

    fn declare_runtime_funcs<M: Module>(module: &mut M) -> JitResult<RuntimeFuncIds> {
        let ptr_ty = module.target_config().pointer_type();
        let lower = |abi: Abi| match abi {
            Abi::Ptr => ptr_ty,
            Abi::I32 => types::I32,
            Abi::F64 => types::F64,
        };

        let mut ids = Vec::with_capacity(RuntimeFn::ALL.len());
        for func in RuntimeFn::ALL {
            let mut sig = module.make_signature();
            for &param in func.params() {
                sig.params.push(AbiParam::new(lower(param)));
            }
            if let Some(ret) = func.returns() {
                sig.returns.push(AbiParam::new(lower(ret)));
            }
            let id = module
                .declare_function(func.name(), Linkage::Import, &sig)
                .map_err(|e| JitError::backend(&format!("Failed to declare {}", func), e))?;
            ids.push(id);
        }
        Ok(RuntimeFuncIds { ids })
    }
}
