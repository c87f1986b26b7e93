//! Host type tags.
//!
//! Values of `TValue::tt` in Lua 5.3: the basic type in bits 0-3, the
//! variant in bits 4-5, and bit 6 marking collectable values.

/// Marks a collectable (GC-managed) value
pub const BIT_ISCOLLECTABLE: i32 = 1 << 6;

#[inline]
pub const fn ctb(tag: i32) -> i32 {
    tag | BIT_ISCOLLECTABLE
}

// =============================================================================
// Basic types
// =============================================================================

pub const LUA_TNIL: i32 = 0;
pub const LUA_TBOOLEAN: i32 = 1;
pub const LUA_TLIGHTUSERDATA: i32 = 2;
pub const LUA_TNUMBER: i32 = 3;
pub const LUA_TSTRING: i32 = 4;
pub const LUA_TTABLE: i32 = 5;
pub const LUA_TFUNCTION: i32 = 6;
pub const LUA_TUSERDATA: i32 = 7;
pub const LUA_TTHREAD: i32 = 8;

// =============================================================================
// Variant tags
// =============================================================================

pub const LUA_TNUMFLT: i32 = LUA_TNUMBER;
pub const LUA_TNUMINT: i32 = LUA_TNUMBER | (1 << 4);

pub const LUA_TSHRSTR: i32 = LUA_TSTRING;
pub const LUA_TLNGSTR: i32 = LUA_TSTRING | (1 << 4);

pub const LUA_TLCL: i32 = LUA_TFUNCTION;
pub const LUA_TLCF: i32 = LUA_TFUNCTION | (1 << 4);
pub const LUA_TCCL: i32 = LUA_TFUNCTION | (2 << 4);

// =============================================================================
// Tags as stored in `tt_`
// =============================================================================

pub const TAG_NIL: i32 = LUA_TNIL;
pub const TAG_BOOLEAN: i32 = LUA_TBOOLEAN;
pub const TAG_FLOAT: i32 = LUA_TNUMFLT;
pub const TAG_INTEGER: i32 = LUA_TNUMINT;
pub const TAG_SHORT_STRING: i32 = ctb(LUA_TSHRSTR);
pub const TAG_LONG_STRING: i32 = ctb(LUA_TLNGSTR);
pub const TAG_TABLE: i32 = ctb(LUA_TTABLE);
pub const TAG_LUA_CLOSURE: i32 = ctb(LUA_TLCL);
pub const TAG_LIGHT_C_FUNCTION: i32 = LUA_TLCF;
pub const TAG_C_CLOSURE: i32 = ctb(LUA_TCCL);
