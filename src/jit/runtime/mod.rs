//! Runtime call surface of generated code.
//!
//! [`RuntimeFn`] enumerates every external function the translators may
//! call, with the exact C signature the host must implement. Entries whose
//! names start with `lua` are the Lua 5.3 core functions of that name; the
//! `lowlua_*` entries are small shims around VM logic that the core only
//! exposes as static inline code or macros (`luaV_shiftl`, `luaC_barrierback`,
//! `checkGC`, ...). The two `lowlua_float_*` helpers are implemented in
//! [`arithmetic`] and always registered by the compiler itself.
//!
//! # Calling Convention
//!
//! All entries use the platform C ABI. `L` is `lua_State*`, register and
//! constant arguments are `TValue*`.

pub mod arithmetic;

use std::fmt;

/// Abstract parameter type, lowered to a Cranelift type at declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abi {
    Ptr,
    I32,
    F64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuntimeFn {
    // === Generic operators ===
    /// `(L, ra, rb, rc, event)`: luaT_trybinTM-based fallback for binary operators
    Arith,
    Unm,
    BNot,
    Not,
    ObjLen,
    Concat,

    // === Comparison and tests ===
    EqualObj,
    LessThan,
    LessEqual,
    /// `(c, v) -> skip`: nonzero when `truthy(v) != c`
    Test,

    // === Calls and frames ===
    Call,
    Close,
    Closure,
    CheckStack,

    // === Tables ===
    NewTable,
    Resize,
    SetList,
    /// `luaH_get`: raw lookup returning the slot, or the nil sentinel
    TableGetFast,
    GetTable,
    SetTable,
    BarrierBack,

    // === Loops ===
    ForPrep,
    ForLoop,

    // === Garbage collector ===
    UpvalBarrier,
    CheckGc,

    // === Crate-owned numeric helpers ===
    FloatMod,
    FloatPow,
}

impl RuntimeFn {
    pub const ALL: [RuntimeFn; 27] = [
        RuntimeFn::Arith,
        RuntimeFn::Unm,
        RuntimeFn::BNot,
        RuntimeFn::Not,
        RuntimeFn::ObjLen,
        RuntimeFn::Concat,
        RuntimeFn::EqualObj,
        RuntimeFn::LessThan,
        RuntimeFn::LessEqual,
        RuntimeFn::Test,
        RuntimeFn::Call,
        RuntimeFn::Close,
        RuntimeFn::Closure,
        RuntimeFn::CheckStack,
        RuntimeFn::NewTable,
        RuntimeFn::Resize,
        RuntimeFn::SetList,
        RuntimeFn::TableGetFast,
        RuntimeFn::GetTable,
        RuntimeFn::SetTable,
        RuntimeFn::BarrierBack,
        RuntimeFn::ForPrep,
        RuntimeFn::ForLoop,
        RuntimeFn::UpvalBarrier,
        RuntimeFn::CheckGc,
        RuntimeFn::FloatMod,
        RuntimeFn::FloatPow,
    ];

    /// Linker-visible symbol name
    pub fn name(self) -> &'static str {
        match self {
            RuntimeFn::Arith => "lowlua_arith",
            RuntimeFn::Unm => "lowlua_unm",
            RuntimeFn::BNot => "lowlua_bnot",
            RuntimeFn::Not => "lowlua_not",
            RuntimeFn::ObjLen => "luaV_objlen",
            RuntimeFn::Concat => "luaV_concat",
            RuntimeFn::EqualObj => "luaV_equalobj",
            RuntimeFn::LessThan => "luaV_lessthan",
            RuntimeFn::LessEqual => "luaV_lessequal",
            RuntimeFn::Test => "lowlua_test",
            RuntimeFn::Call => "luaD_callnoyield",
            RuntimeFn::Close => "luaF_close",
            RuntimeFn::Closure => "lowlua_closure",
            RuntimeFn::CheckStack => "lowlua_checkstack",
            RuntimeFn::NewTable => "lowlua_newtable",
            RuntimeFn::Resize => "luaH_resize",
            RuntimeFn::SetList => "lowlua_setlist",
            RuntimeFn::TableGetFast => "luaH_get",
            RuntimeFn::GetTable => "lowlua_gettable",
            RuntimeFn::SetTable => "lowlua_settable",
            RuntimeFn::BarrierBack => "lowlua_barrierback",
            RuntimeFn::ForPrep => "lowlua_forprep",
            RuntimeFn::ForLoop => "lowlua_forloop",
            RuntimeFn::UpvalBarrier => "lowlua_upvalbarrier",
            RuntimeFn::CheckGc => "lowlua_checkcg",
            RuntimeFn::FloatMod => "lowlua_float_mod",
            RuntimeFn::FloatPow => "lowlua_float_pow",
        }
    }

    pub fn params(self) -> &'static [Abi] {
        use Abi::*;
        match self {
            RuntimeFn::Arith => &[Ptr, Ptr, Ptr, Ptr, I32],
            RuntimeFn::Unm | RuntimeFn::BNot | RuntimeFn::Not | RuntimeFn::ObjLen => {
                &[Ptr, Ptr, Ptr]
            }
            RuntimeFn::Concat => &[Ptr, I32],
            RuntimeFn::EqualObj | RuntimeFn::LessThan | RuntimeFn::LessEqual => &[Ptr, Ptr, Ptr],
            RuntimeFn::Test => &[I32, Ptr],
            RuntimeFn::Call => &[Ptr, Ptr, I32],
            RuntimeFn::Close => &[Ptr, Ptr],
            RuntimeFn::Closure => &[Ptr, Ptr, Ptr, Ptr, I32],
            RuntimeFn::CheckStack => &[Ptr, I32],
            RuntimeFn::NewTable => &[Ptr, Ptr],
            RuntimeFn::Resize => &[Ptr, Ptr, I32, I32],
            RuntimeFn::SetList => &[Ptr, Ptr, I32, I32],
            RuntimeFn::TableGetFast => &[Ptr, Ptr],
            RuntimeFn::GetTable | RuntimeFn::SetTable => &[Ptr, Ptr, Ptr, Ptr],
            RuntimeFn::BarrierBack => &[Ptr, Ptr, Ptr],
            RuntimeFn::ForPrep => &[Ptr, Ptr],
            RuntimeFn::ForLoop => &[Ptr],
            RuntimeFn::UpvalBarrier => &[Ptr, Ptr],
            RuntimeFn::CheckGc => &[Ptr, Ptr, Ptr],
            RuntimeFn::FloatMod | RuntimeFn::FloatPow => &[F64, F64],
        }
    }

    pub fn returns(self) -> Option<Abi> {
        match self {
            RuntimeFn::EqualObj
            | RuntimeFn::LessThan
            | RuntimeFn::LessEqual
            | RuntimeFn::Test
            | RuntimeFn::ForLoop => Some(Abi::I32),
            RuntimeFn::NewTable | RuntimeFn::TableGetFast => Some(Abi::Ptr),
            RuntimeFn::FloatMod | RuntimeFn::FloatPow => Some(Abi::F64),
            _ => None,
        }
    }

    /// Implemented by this crate rather than the host
    pub fn is_builtin(self) -> bool {
        matches!(self, RuntimeFn::FloatMod | RuntimeFn::FloatPow)
    }

    /// Address of a builtin implementation
    pub(crate) fn builtin_addr(self) -> Option<*const u8> {
        match self {
            RuntimeFn::FloatMod => Some(arithmetic::lowlua_float_mod as *const u8),
            RuntimeFn::FloatPow => Some(arithmetic::lowlua_float_pow as *const u8),
            _ => None,
        }
    }

    /// Position in [`RuntimeFn::ALL`]
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RuntimeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
