//! Host runtime record layouts.
//!
//! `#[repr(C)]` mirrors of the Lua 5.3 records generated code touches
//! (64-bit build, default `luaconf.h`), and [`RuntimeLayout`], the table of
//! byte offsets the compiler reads from instead of hard-coding them. The
//! mirrors double as the record types of the in-process test host.

use std::ffi::c_void;
use std::mem::{offset_of, size_of};

use serde::{Deserialize, Serialize};

use crate::jit::types::constants::{LUA_TBOOLEAN, LUA_TNIL, LUA_TNUMFLT, LUA_TNUMINT};

// =============================================================================
// Record mirrors
// =============================================================================

/// Payload of a tagged value; the active member is selected by `TValue::tt`
#[repr(C)]
#[derive(Clone, Copy)]
pub union Value {
    pub gc: *mut c_void,
    pub p: *mut c_void,
    pub b: i32,
    pub f: *const c_void,
    pub i: i64,
    pub n: f64,
}

/// Tagged value: payload plus type tag
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TValue {
    pub value: Value,
    pub tt: i32,
}

impl TValue {
    pub const fn nil() -> Self {
        TValue { value: Value { i: 0 }, tt: LUA_TNIL }
    }

    pub const fn integer(i: i64) -> Self {
        TValue { value: Value { i }, tt: LUA_TNUMINT }
    }

    pub const fn number(n: f64) -> Self {
        TValue { value: Value { n }, tt: LUA_TNUMFLT }
    }

    pub const fn boolean(b: bool) -> Self {
        TValue { value: Value { b: b as i32 }, tt: LUA_TBOOLEAN }
    }

    /// A collectable value of the given tag pointing at `gc`
    pub fn object(tt: i32, gc: *mut c_void) -> Self {
        TValue { value: Value { gc }, tt }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.tt == LUA_TNIL
    }

    /// `l_isfalse`: nil and false are the only false values
    #[inline]
    pub fn is_false(&self) -> bool {
        self.tt == LUA_TNIL || (self.tt == LUA_TBOOLEAN && unsafe { self.value.b } == 0)
    }

    pub fn as_integer(&self) -> Option<i64> {
        (self.tt == LUA_TNUMINT).then(|| unsafe { self.value.i })
    }

    pub fn as_float(&self) -> Option<f64> {
        (self.tt == LUA_TNUMFLT).then(|| unsafe { self.value.n })
    }

    /// Either numeric subtype, converted to float
    pub fn as_number(&self) -> Option<f64> {
        self.as_float().or_else(|| self.as_integer().map(|i| i as f64))
    }

    pub fn as_boolean(&self) -> Option<bool> {
        (self.tt == LUA_TBOOLEAN).then(|| unsafe { self.value.b } != 0)
    }

    pub fn as_gc(&self) -> *mut c_void {
        unsafe { self.value.gc }
    }
}

impl std::fmt::Debug for TValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tt {
            LUA_TNIL => write!(f, "nil"),
            LUA_TBOOLEAN => write!(f, "{}", unsafe { self.value.b } != 0),
            LUA_TNUMINT => write!(f, "{}", unsafe { self.value.i }),
            LUA_TNUMFLT => write!(f, "{:?}", unsafe { self.value.n }),
            tt => write!(f, "<tag {} @ {:p}>", tt, unsafe { self.value.gc }),
        }
    }
}

/// Opaque host table
#[repr(C)]
pub struct Table {
    _private: [u8; 0],
}

/// `CallInfo` with the Lua-function arm of its union spelled out
#[repr(C)]
pub struct CallInfo {
    pub func: *mut TValue,
    pub top: *mut TValue,
    pub previous: *mut CallInfo,
    pub next: *mut CallInfo,
    pub base: *mut TValue,
    pub savedpc: *const u32,
    /// Third word of the C-function arm (`ctx`)
    pub _c_ctx: isize,
    pub extra: isize,
    pub nresults: i16,
    pub callstatus: u16,
}

/// `lua_State`
#[repr(C)]
pub struct LuaState {
    pub next: *mut c_void,
    pub tt: u8,
    pub marked: u8,
    pub nci: u16,
    pub status: u8,
    pub top: *mut TValue,
    pub l_g: *mut c_void,
    pub ci: *mut CallInfo,
    pub oldpc: *const u32,
    pub stack_last: *mut TValue,
    pub stack: *mut TValue,
    pub openupval: *mut UpVal,
    pub gclist: *mut c_void,
    pub twups: *mut LuaState,
    pub error_jmp: *mut c_void,
    pub base_ci: CallInfo,
    pub hook: *const c_void,
    pub errfunc: isize,
    pub stacksize: i32,
    pub basehookcount: i32,
    pub hookcount: i32,
    pub nny: u16,
    pub n_ccalls: u16,
    pub hookmask: i32,
    pub allowhook: u8,
}

/// `Proto`
#[repr(C)]
pub struct Proto {
    pub next: *mut c_void,
    pub tt: u8,
    pub marked: u8,
    pub numparams: u8,
    pub is_vararg: u8,
    pub maxstacksize: u8,
    pub sizeupvalues: i32,
    pub sizek: i32,
    pub sizecode: i32,
    pub sizelineinfo: i32,
    pub sizep: i32,
    pub sizelocvars: i32,
    pub linedefined: i32,
    pub lastlinedefined: i32,
    pub k: *mut TValue,
    pub code: *mut u32,
    pub p: *mut *mut Proto,
    pub lineinfo: *mut i32,
    pub locvars: *mut c_void,
    pub upvalues: *mut c_void,
    pub cache: *mut LClosure,
    pub source: *mut c_void,
    pub gclist: *mut c_void,
}

/// `UpVal`: `v` points either into the stack (open) or at `value` (closed)
#[repr(C)]
pub struct UpVal {
    pub v: *mut TValue,
    pub refcount: usize,
    pub value: TValue,
}

/// `LClosure`; `upvals` is a trailing array of `nupvalues` entries
#[repr(C)]
pub struct LClosure {
    pub next: *mut c_void,
    pub tt: u8,
    pub marked: u8,
    pub nupvalues: u8,
    pub gclist: *mut c_void,
    pub p: *mut Proto,
    pub upvals: [*mut UpVal; 1],
}

// =============================================================================
// Offsets consumed by the code generator
// =============================================================================

/// Machine type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Target pointer width
    Ptr,
    I32,
    I64,
    F64,
}

/// A typed field at a byte offset inside a host record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub offset: i32,
    pub ty: FieldType,
}

impl Field {
    pub const fn new(offset: usize, ty: FieldType) -> Self {
        Field { offset: offset as i32, ty }
    }

    /// Same location read as a different machine type
    pub const fn as_type(self, ty: FieldType) -> Self {
        Field { offset: self.offset, ty }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TValueLayout {
    /// Stride between stack slots
    pub size: i64,
    pub value: Field,
    pub tag: Field,
}

impl TValueLayout {
    pub fn int_payload(&self) -> Field {
        self.value.as_type(FieldType::I64)
    }

    pub fn float_payload(&self) -> Field {
        self.value.as_type(FieldType::F64)
    }

    pub fn ptr_payload(&self) -> Field {
        self.value.as_type(FieldType::Ptr)
    }

    pub fn bool_payload(&self) -> Field {
        self.value.as_type(FieldType::I32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLayout {
    pub top: Field,
    pub ci: Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInfoLayout {
    pub func: Field,
    pub top: Field,
    pub base: Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureLayout {
    pub proto: Field,
    /// Offset of the first `UpVal*` of the trailing array
    pub upvals: i32,
    pub upval_stride: i32,
}

impl ClosureLayout {
    /// Slot `index` of the upvalue array
    pub fn upval(&self, index: u32) -> Field {
        Field {
            offset: self.upvals + self.upval_stride * index as i32,
            ty: FieldType::Ptr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoLayout {
    pub k: Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpValLayout {
    pub v: Field,
}

/// Every host offset the compiler depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeLayout {
    pub tvalue: TValueLayout,
    pub state: StateLayout,
    pub call_info: CallInfoLayout,
    pub closure: ClosureLayout,
    pub proto: ProtoLayout,
    pub upval: UpValLayout,
}

impl RuntimeLayout {
    /// Layout of a stock 64-bit Lua 5.3 build, taken from the mirrors above
    pub fn lua53() -> Self {
        use FieldType::*;
        RuntimeLayout {
            tvalue: TValueLayout {
                size: size_of::<TValue>() as i64,
                value: Field::new(offset_of!(TValue, value), I64),
                tag: Field::new(offset_of!(TValue, tt), I32),
            },
            state: StateLayout {
                top: Field::new(offset_of!(LuaState, top), Ptr),
                ci: Field::new(offset_of!(LuaState, ci), Ptr),
            },
            call_info: CallInfoLayout {
                func: Field::new(offset_of!(CallInfo, func), Ptr),
                top: Field::new(offset_of!(CallInfo, top), Ptr),
                base: Field::new(offset_of!(CallInfo, base), Ptr),
            },
            closure: ClosureLayout {
                proto: Field::new(offset_of!(LClosure, p), Ptr),
                upvals: offset_of!(LClosure, upvals) as i32,
                upval_stride: size_of::<*mut UpVal>() as i32,
            },
            proto: ProtoLayout {
                k: Field::new(offset_of!(Proto, k), Ptr),
            },
            upval: UpValLayout {
                v: Field::new(offset_of!(UpVal, v), Ptr),
            },
        }
    }
}

impl Default for RuntimeLayout {
    fn default() -> Self {
        Self::lua53()
    }
}
