//! Host runtime interface: record layouts and symbol resolution

pub mod layout;
pub mod symbols;

pub use layout::{
    CallInfo, Field, FieldType, LClosure, LuaState, Proto, RuntimeLayout, TValue, Table, UpVal,
    Value,
};
pub use symbols::HostSymbols;
