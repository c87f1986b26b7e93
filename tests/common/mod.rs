//! In-process host for running compiled functions in tests
//!
//! Every runtime entry point is implemented here over the record mirrors in
//! `lowlua::host`. The VM is deliberately small:
//!
//! - tables are association lists behind `luaH_get`, leaked for the life of
//!   the test thread
//! - callable values are light C functions wrapping a Rust `HostFn`
//! - arithmetic follows Lua 5.3 on numbers; anything else records an error
//!   instead of raising
//! - `luaV_concat` concatenates the decimal digits of integers
//! - collector, barrier and close calls only record events
//!
//! Events and errors are kept per thread and reset by [`Frame::run`].

#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::c_void;
use std::mem::offset_of;

use lowlua::bytecode::{Literal, Program, TagMethod};
use lowlua::host::{CallInfo, HostSymbols, LClosure, LuaState, Proto, TValue, UpVal, Value};
use lowlua::jit::types::{TAG_FLOAT, TAG_INTEGER, TAG_LIGHT_C_FUNCTION, TAG_LUA_CLOSURE, TAG_TABLE};
use lowlua::jit::{CompiledFunction, JitCompiler, JitConfig, RuntimeFn};

/// Stack slots of every test thread
pub const STACK_SLOTS: usize = 256;
/// Slots above `stack_last`, as in `EXTRA_STACK`
const EXTRA_STACK: usize = 5;
const MAX_UPVALUES: usize = 8;

/// A callable the test host can place in a register
pub type HostFn = fn(&[TValue]) -> Vec<TValue>;

// =============================================================================
// Per-thread host log
// =============================================================================

#[derive(Default)]
struct HostLog {
    events: Vec<String>,
    errors: Vec<String>,
}

thread_local! {
    static HOST: RefCell<HostLog> = RefCell::new(HostLog::default());
}

fn record(event: impl Into<String>) {
    let event = event.into();
    HOST.with(|h| h.borrow_mut().events.push(event));
}

fn raise(message: impl Into<String>) {
    let message = message.into();
    HOST.with(|h| h.borrow_mut().errors.push(message));
}

fn reset_log() {
    HOST.with(|h| {
        let mut h = h.borrow_mut();
        h.events.clear();
        h.errors.clear();
    });
}

fn take_log() -> (Vec<String>, Vec<String>) {
    HOST.with(|h| {
        let mut h = h.borrow_mut();
        (std::mem::take(&mut h.events), std::mem::take(&mut h.errors))
    })
}

// =============================================================================
// Values
// =============================================================================

struct Sentinel(TValue);
// Safety: the sentinel is never written.
unsafe impl Sync for Sentinel {}

static NIL_SLOT: Sentinel = Sentinel(TValue::nil());

/// Raw table: insertion-ordered association list with stable slots
#[derive(Default)]
pub struct MockTable {
    entries: Vec<(TValue, Box<TValue>)>,
}

impl MockTable {
    fn slot(&mut self, key: &TValue) -> Option<*mut TValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| raw_equal(k, key))
            .map(|(_, v)| &mut **v as *mut TValue)
    }

    fn set(&mut self, key: TValue, value: TValue) {
        match self.slot(&key) {
            Some(slot) => unsafe { *slot = value },
            None => self.entries.push((key, Box::new(value))),
        }
    }

    fn get(&mut self, key: &TValue) -> TValue {
        self.slot(key).map(|s| unsafe { *s }).unwrap_or(TValue::nil())
    }

    /// Border of the array part: largest n with t[1..=n] all non-nil
    fn border(&mut self) -> i64 {
        let mut n = 0;
        while !self.get(&TValue::integer(n + 1)).is_nil() {
            n += 1;
        }
        n
    }
}

/// Allocate a table value holding `entries`
pub fn new_table(entries: &[(TValue, TValue)]) -> TValue {
    let mut table = MockTable::default();
    for (k, v) in entries {
        table.set(*k, *v);
    }
    TValue::object(TAG_TABLE, Box::into_raw(Box::new(table)) as *mut c_void)
}

/// Read `t[key]` without going through generated code
pub fn table_get(t: &TValue, key: TValue) -> TValue {
    assert_eq!(t.tt, TAG_TABLE, "not a table: {:?}", t);
    unsafe { (*(t.as_gc() as *mut MockTable)).get(&key) }
}

/// Write `t[key]` without going through generated code
pub fn table_set(t: &TValue, key: TValue, value: TValue) {
    assert_eq!(t.tt, TAG_TABLE, "not a table: {:?}", t);
    unsafe { (*(t.as_gc() as *mut MockTable)).set(key, value) }
}

/// A light C function value wrapping `f`
pub fn host_fn(f: HostFn) -> TValue {
    TValue {
        value: Value { f: f as *const c_void },
        tt: TAG_LIGHT_C_FUNCTION,
    }
}

/// An opaque collectable value of the given tag (strings, userdata, ...)
pub fn object(tt: i32) -> TValue {
    TValue::object(tt, Box::into_raw(Box::new(0u64)) as *mut c_void)
}

fn raw_equal(a: &TValue, b: &TValue) -> bool {
    if a.tt != b.tt {
        return false;
    }
    match (a.as_integer(), a.as_float(), a.as_boolean()) {
        (Some(x), _, _) => Some(x) == b.as_integer(),
        (_, Some(x), _) => Some(x) == b.as_float(),
        (_, _, Some(x)) => Some(x) == b.as_boolean(),
        _ => a.is_nil() || a.as_gc() == b.as_gc(),
    }
}

// =============================================================================
// Lua 5.3 number semantics
// =============================================================================

/// `luaV_tointeger` in exact mode
fn to_integer(v: &TValue) -> Option<i64> {
    if let Some(i) = v.as_integer() {
        return Some(i);
    }
    let n = v.as_float()?;
    (n.floor() == n && n >= -9.223_372_036_854_775_808e18 && n < 9.223_372_036_854_775_808e18)
        .then_some(n as i64)
}

fn shift_left(x: i64, y: i64) -> i64 {
    if y <= -64 || y >= 64 {
        0
    } else if y >= 0 {
        ((x as u64) << y) as i64
    } else {
        ((x as u64) >> -y) as i64
    }
}

fn float_mod(a: f64, b: f64) -> f64 {
    let m = a % b;
    if m * b < 0.0 {
        m + b
    } else {
        m
    }
}

/// `luaO_arith` restricted to numbers; `Err` carries the error message
pub fn lua_arith(op: TagMethod, a: &TValue, b: &TValue) -> Result<TValue, String> {
    use TagMethod::*;
    match op {
        BAnd | BOr | BXor | Shl | Shr | BNot => {
            let (x, y) = match (to_integer(a), to_integer(b)) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err("number has no integer representation".to_string()),
            };
            Ok(TValue::integer(match op {
                BAnd => x & y,
                BOr => x | y,
                BXor => x ^ y,
                Shl => shift_left(x, y),
                Shr => shift_left(x, y.wrapping_neg()),
                _ => !x,
            }))
        }
        Div | Pow => {
            let (x, y) = numbers(a, b)?;
            Ok(TValue::number(if op == Div { x / y } else { x.powf(y) }))
        }
        _ => {
            if let (Some(x), Some(y)) = (a.as_integer(), b.as_integer()) {
                return integer_arith(op, x, y).map(TValue::integer);
            }
            let (x, y) = numbers(a, b)?;
            Ok(TValue::number(match op {
                Add => x + y,
                Sub => x - y,
                Mul => x * y,
                Mod => float_mod(x, y),
                IDiv => (x / y).floor(),
                Unm => -x,
                other => return Err(format!("no arithmetic for {}", other)),
            }))
        }
    }
}

fn numbers(a: &TValue, b: &TValue) -> Result<(f64, f64), String> {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err("attempt to perform arithmetic on a non-number value".to_string()),
    }
}

fn integer_arith(op: TagMethod, x: i64, y: i64) -> Result<i64, String> {
    use TagMethod::*;
    match op {
        Add => Ok(x.wrapping_add(y)),
        Sub => Ok(x.wrapping_sub(y)),
        Mul => Ok(x.wrapping_mul(y)),
        Unm => Ok(0i64.wrapping_sub(x)),
        Mod if y == 0 => Err("attempt to perform 'n%0'".to_string()),
        IDiv if y == 0 => Err("attempt to perform 'n//0'".to_string()),
        Mod if y == -1 => Ok(0),
        IDiv if y == -1 => Ok(x.wrapping_neg()),
        Mod => {
            let m = x % y;
            Ok(if m != 0 && (m ^ y) < 0 { m + y } else { m })
        }
        IDiv => {
            let q = x / y;
            Ok(if x % y != 0 && (x ^ y) < 0 { q - 1 } else { q })
        }
        other => Err(format!("no integer arithmetic for {}", other)),
    }
}

fn less_than(a: &TValue, b: &TValue) -> Option<bool> {
    match (a.as_integer(), b.as_integer()) {
        (Some(x), Some(y)) => Some(x < y),
        _ => Some(a.as_number()? < b.as_number()?),
    }
}

fn equal(a: &TValue, b: &TValue) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => match (a.as_integer(), b.as_integer()) {
            (Some(i), Some(j)) => i == j,
            _ => x == y,
        },
        _ => raw_equal(a, b),
    }
}

// =============================================================================
// Runtime entry points
// =============================================================================

extern "C" fn host_arith(_l: *mut LuaState, ra: *mut TValue, rb: *const TValue, rc: *const TValue, event: i32) {
    let Some(op) = TagMethod::from_i32(event) else {
        raise(format!("bad event {}", event));
        return;
    };
    record(format!("arith {}", op.name()));
    let (b, c) = unsafe { (*rb, *rc) };
    match lua_arith(op, &b, &c) {
        Ok(v) => unsafe { *ra = v },
        Err(e) => raise(e),
    }
}

extern "C" fn host_unm(_l: *mut LuaState, ra: *mut TValue, rb: *const TValue) {
    record("unm");
    let b = unsafe { *rb };
    match lua_arith(TagMethod::Unm, &b, &b) {
        Ok(v) => unsafe { *ra = v },
        Err(e) => raise(e),
    }
}

extern "C" fn host_bnot(_l: *mut LuaState, ra: *mut TValue, rb: *const TValue) {
    record("bnot");
    let b = unsafe { *rb };
    match lua_arith(TagMethod::BNot, &b, &b) {
        Ok(v) => unsafe { *ra = v },
        Err(e) => raise(e),
    }
}

extern "C" fn host_not(_l: *mut LuaState, ra: *mut TValue, rb: *const TValue) {
    unsafe { *ra = TValue::boolean((*rb).is_false()) }
}

extern "C" fn host_objlen(_l: *mut LuaState, ra: *mut TValue, rb: *const TValue) {
    record("len");
    let b = unsafe { *rb };
    if b.tt == TAG_TABLE {
        let n = unsafe { (*(b.as_gc() as *mut MockTable)).border() };
        unsafe { *ra = TValue::integer(n) }
    } else {
        raise("attempt to get length");
    }
}

extern "C" fn host_concat(l: *mut LuaState, total: i32) {
    record(format!("concat {}", total));
    unsafe {
        let top = (*l).top;
        let first = top.sub(total as usize);
        let mut digits = String::new();
        for i in 0..total as usize {
            match (*first.add(i)).as_integer() {
                Some(n) => digits.push_str(&n.to_string()),
                None => {
                    raise("attempt to concatenate");
                    return;
                }
            }
        }
        *first = TValue::integer(digits.parse().unwrap_or(-1));
        (*l).top = first.add(1);
    }
}

extern "C" fn host_equalobj(_l: *mut LuaState, a: *const TValue, b: *const TValue) -> i32 {
    unsafe { equal(&*a, &*b) as i32 }
}

extern "C" fn host_lessthan(_l: *mut LuaState, a: *const TValue, b: *const TValue) -> i32 {
    unsafe { less_than(&*a, &*b) }.unwrap_or_else(|| {
        raise("attempt to compare");
        false
    }) as i32
}

extern "C" fn host_lessequal(_l: *mut LuaState, a: *const TValue, b: *const TValue) -> i32 {
    unsafe { less_than(&*b, &*a) }.map(|gt| !gt).unwrap_or_else(|| {
        raise("attempt to compare");
        false
    }) as i32
}

extern "C" fn host_test(c: i32, v: *const TValue) -> i32 {
    let truthy = unsafe { !(*v).is_false() };
    (truthy != (c != 0)) as i32
}

extern "C" fn host_call(l: *mut LuaState, func: *mut TValue, nresults: i32) {
    unsafe {
        let callee = *func;
        let nargs = (*l).top.offset_from(func) as usize - 1;
        record(format!("call {} {}", nargs, nresults));
        if callee.tt != TAG_LIGHT_C_FUNCTION {
            raise("attempt to call a non-function value");
            (*l).top = func;
            return;
        }
        let f = std::mem::transmute::<*const c_void, HostFn>(callee.value.f);
        let args: Vec<TValue> = (0..nargs).map(|i| *func.add(1 + i)).collect();
        let results = f(&args);
        let wanted = if nresults < 0 { results.len() } else { nresults as usize };
        for i in 0..wanted {
            *func.add(i) = results.get(i).copied().unwrap_or(TValue::nil());
        }
        (*l).top = func.add(wanted);
    }
}

unsafe fn slot_index(l: *mut LuaState, p: *const TValue) -> isize {
    p.offset_from((*l).stack)
}

extern "C" fn host_close(l: *mut LuaState, level: *mut TValue) {
    record(format!("close {}", unsafe { slot_index(l, level) }));
}

extern "C" fn host_closure(
    _l: *mut LuaState,
    _cl: *mut LClosure,
    _base: *mut TValue,
    ra: *mut TValue,
    index: i32,
) {
    record(format!("closure {}", index));
    unsafe { *ra = object(TAG_LUA_CLOSURE) }
}

extern "C" fn host_checkstack(l: *mut LuaState, n: i32) {
    record(format!("checkstack {}", n));
    unsafe {
        if (*l).top.add(n.max(0) as usize) > (*l).stack_last {
            raise("stack overflow");
        }
    }
}

extern "C" fn host_newtable(_l: *mut LuaState, ra: *mut TValue) -> *mut c_void {
    record("newtable");
    let t = new_table(&[]);
    unsafe { *ra = t };
    t.as_gc()
}

extern "C" fn host_resize(_l: *mut LuaState, _t: *mut c_void, array: i32, hash: i32) {
    record(format!("resize {} {}", array, hash));
}

extern "C" fn host_setlist(_l: *mut LuaState, ra: *mut TValue, first: i32, count: i32) {
    record(format!("setlist {} {}", first, count));
    unsafe {
        let t = *ra;
        if t.tt != TAG_TABLE {
            raise("setlist on a non-table");
            return;
        }
        let table = &mut *(t.as_gc() as *mut MockTable);
        for i in 1..=count as usize {
            table.set(TValue::integer(first as i64 + i as i64), *ra.add(i));
        }
    }
}

extern "C" fn host_table_get(t: *mut c_void, key: *const TValue) -> *const TValue {
    unsafe {
        match (*(t as *mut MockTable)).slot(&*key) {
            Some(slot) => slot as *const TValue,
            None => &NIL_SLOT.0 as *const TValue,
        }
    }
}

extern "C" fn host_gettable(_l: *mut LuaState, t: *const TValue, key: *const TValue, dest: *mut TValue) {
    record("gettable");
    unsafe {
        if (*t).tt != TAG_TABLE {
            raise("attempt to index a non-table value");
            return;
        }
        *dest = (*((*t).as_gc() as *mut MockTable)).get(&*key);
    }
}

extern "C" fn host_settable(_l: *mut LuaState, t: *const TValue, key: *const TValue, value: *const TValue) {
    record("settable");
    unsafe {
        if (*t).tt != TAG_TABLE {
            raise("attempt to index a non-table value");
            return;
        }
        (*((*t).as_gc() as *mut MockTable)).set(*key, *value);
    }
}

extern "C" fn host_barrierback(_l: *mut LuaState, _t: *mut c_void, _v: *const TValue) {
    record("barrierback");
}

extern "C" fn host_forprep(_l: *mut LuaState, ra: *mut TValue) {
    unsafe {
        let (init, limit, step) = (*ra, *ra.add(1), *ra.add(2));
        match (init.as_integer(), to_integer(&limit), step.as_integer()) {
            (Some(i), Some(lim), Some(s)) => {
                *ra.add(1) = TValue::integer(lim);
                *ra = TValue::integer(i.wrapping_sub(s));
            }
            _ => match (init.as_number(), limit.as_number(), step.as_number()) {
                (Some(i), Some(lim), Some(s)) => {
                    *ra.add(1) = TValue::number(lim);
                    *ra.add(2) = TValue::number(s);
                    *ra = TValue::number(i - s);
                }
                _ => raise("'for' values must be numbers"),
            },
        }
    }
}

extern "C" fn host_forloop(ra: *mut TValue) -> i32 {
    unsafe {
        let (idx, limit, step) = (*ra, *ra.add(1), *ra.add(2));
        let next = match (idx.as_integer(), limit.as_integer(), step.as_integer()) {
            (Some(i), Some(lim), Some(s)) => {
                let n = i.wrapping_add(s);
                let go = if s > 0 { n <= lim } else { lim <= n };
                go.then_some(TValue::integer(n))
            }
            _ => {
                let (i, lim, s) = (
                    idx.as_number().unwrap_or(0.0),
                    limit.as_number().unwrap_or(0.0),
                    step.as_number().unwrap_or(0.0),
                );
                let n = i + s;
                let go = if s > 0.0 { n <= lim } else { lim <= n };
                go.then_some(TValue::number(n))
            }
        };
        match next {
            Some(v) => {
                *ra = v;
                *ra.add(3) = v;
                1
            }
            None => 0,
        }
    }
}

extern "C" fn host_upvalbarrier(_l: *mut LuaState, _uv: *mut UpVal) {
    record("upvalbarrier");
}

extern "C" fn host_checkgc(l: *mut LuaState, _ci: *mut CallInfo, limit: *mut TValue) {
    record(format!("checkgc {}", unsafe { slot_index(l, limit) }));
}

/// Bindings for every host-implemented runtime function
pub fn host_symbols() -> HostSymbols {
    let mut symbols = HostSymbols::new();
    for func in RuntimeFn::ALL {
        let addr = match func {
            RuntimeFn::Arith => host_arith as *const u8,
            RuntimeFn::Unm => host_unm as *const u8,
            RuntimeFn::BNot => host_bnot as *const u8,
            RuntimeFn::Not => host_not as *const u8,
            RuntimeFn::ObjLen => host_objlen as *const u8,
            RuntimeFn::Concat => host_concat as *const u8,
            RuntimeFn::EqualObj => host_equalobj as *const u8,
            RuntimeFn::LessThan => host_lessthan as *const u8,
            RuntimeFn::LessEqual => host_lessequal as *const u8,
            RuntimeFn::Test => host_test as *const u8,
            RuntimeFn::Call => host_call as *const u8,
            RuntimeFn::Close => host_close as *const u8,
            RuntimeFn::Closure => host_closure as *const u8,
            RuntimeFn::CheckStack => host_checkstack as *const u8,
            RuntimeFn::NewTable => host_newtable as *const u8,
            RuntimeFn::Resize => host_resize as *const u8,
            RuntimeFn::SetList => host_setlist as *const u8,
            RuntimeFn::TableGetFast => host_table_get as *const u8,
            RuntimeFn::GetTable => host_gettable as *const u8,
            RuntimeFn::SetTable => host_settable as *const u8,
            RuntimeFn::BarrierBack => host_barrierback as *const u8,
            RuntimeFn::ForPrep => host_forprep as *const u8,
            RuntimeFn::ForLoop => host_forloop as *const u8,
            RuntimeFn::UpvalBarrier => host_upvalbarrier as *const u8,
            RuntimeFn::CheckGc => host_checkgc as *const u8,
            RuntimeFn::FloatMod | RuntimeFn::FloatPow => continue,
        };
        symbols.insert(func, addr);
    }
    symbols
}

/// A compiler bound to the test host
pub fn compiler() -> JitCompiler {
    JitCompiler::new(JitConfig::default(), host_symbols()).expect("compiler")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Frames
// =============================================================================

/// `LClosure` with room for its trailing upvalue array
#[repr(C)]
struct ClosureCell {
    head: LClosure,
    rest: [*mut UpVal; MAX_UPVALUES - 1],
}

const _: () = assert!(offset_of!(ClosureCell, rest) == offset_of!(LClosure, upvals) + 8);

/// Live host records for one activation of a program
pub struct Frame {
    stack: Box<[TValue]>,
    state: Box<LuaState>,
    ci: Box<CallInfo>,
    proto: Box<Proto>,
    closure: Box<ClosureCell>,
    upvals: Vec<Box<UpVal>>,
    constants: Vec<TValue>,
    code: Vec<u32>,
    base: usize,
    frame_size: usize,
}

/// What a run left behind
#[derive(Debug)]
pub struct Outcome {
    /// Return value of the native function
    pub ret: i32,
    /// The `|ret|` values just below `L->top`
    pub results: Vec<TValue>,
    /// Stack index of `L->top` after the run
    pub top: usize,
    /// R(0) .. R(maxstacksize - 1) after the run
    pub registers: Vec<TValue>,
    pub events: Vec<String>,
    pub errors: Vec<String>,
}

impl Outcome {
    pub fn result_ints(&self) -> Vec<Option<i64>> {
        self.results.iter().map(|v| v.as_integer()).collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events.iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub struct FrameBuilder<'p> {
    program: &'p Program,
    args: Vec<TValue>,
    varargs: Vec<TValue>,
    upvalues: Vec<TValue>,
}

impl<'p> FrameBuilder<'p> {
    pub fn args(mut self, args: &[TValue]) -> Self {
        self.args = args.to_vec();
        self
    }

    pub fn varargs(mut self, varargs: &[TValue]) -> Self {
        self.varargs = varargs.to_vec();
        self
    }

    pub fn upvalues(mut self, upvalues: &[TValue]) -> Self {
        self.upvalues = upvalues.to_vec();
        self
    }

    /// Lay out the stack the way `luaD_precall` leaves it
    pub fn build(self) -> Frame {
        let program = self.program;
        assert!(self.upvalues.len() <= MAX_UPVALUES);

        let code: Vec<u32> = program.code().iter().map(|i| i.0).collect();
        let constants: Vec<TValue> = program
            .constants()
            .iter()
            .map(|k| match k {
                Literal::Object(tt) => object(*tt),
                lit => lit.to_tvalue().unwrap_or(TValue::nil()),
            })
            .collect();

        let mut stack = vec![TValue::nil(); STACK_SLOTS].into_boxed_slice();
        let numparams = program.num_params() as usize;
        stack[0] = object(TAG_LUA_CLOSURE);

        // func, [fixed args moved out, varargs], base
        let base = if program.is_vararg() {
            1 + numparams + self.varargs.len()
        } else {
            1
        };
        for i in 0..numparams {
            stack[base + i] = self.args.get(i).copied().unwrap_or(TValue::nil());
        }
        for (i, v) in self.varargs.iter().enumerate() {
            stack[1 + numparams + i] = *v;
        }

        let mut upvals: Vec<Box<UpVal>> = self
            .upvalues
            .iter()
            .map(|v| {
                Box::new(UpVal {
                    v: std::ptr::null_mut(),
                    refcount: 1,
                    value: *v,
                })
            })
            .collect();
        for uv in upvals.iter_mut() {
            uv.v = &mut uv.value;
        }

        let frame_size = program.max_stack_size() as usize;
        let mut frame = Frame {
            stack,
            state: Box::new(unsafe { std::mem::zeroed() }),
            ci: Box::new(unsafe { std::mem::zeroed() }),
            proto: Box::new(unsafe { std::mem::zeroed() }),
            closure: Box::new(unsafe { std::mem::zeroed() }),
            upvals,
            constants,
            code,
            base,
            frame_size,
        };
        frame.link(program);
        frame
    }
}

impl Frame {
    pub fn builder(program: &Program) -> FrameBuilder<'_> {
        FrameBuilder {
            program,
            args: Vec::new(),
            varargs: Vec::new(),
            upvalues: Vec::new(),
        }
    }

    pub fn new(program: &Program) -> Frame {
        Self::builder(program).build()
    }

    fn link(&mut self, program: &Program) {
        let stack = self.stack.as_mut_ptr();
        unsafe {
            let p = &mut *self.proto;
            p.numparams = program.num_params();
            p.is_vararg = program.is_vararg() as u8;
            p.maxstacksize = program.max_stack_size();
            p.sizek = self.constants.len() as i32;
            p.k = self.constants.as_mut_ptr();
            p.sizecode = self.code.len() as i32;
            p.code = self.code.as_mut_ptr();
            p.sizep = program.num_protos() as i32;
            p.sizeupvalues = self.upvals.len() as i32;

            let cl = &mut *self.closure;
            cl.head.tt = TAG_LUA_CLOSURE as u8;
            cl.head.nupvalues = self.upvals.len() as u8;
            cl.head.p = &mut *self.proto;
            let slots = std::ptr::addr_of_mut!(cl.head.upvals) as *mut *mut UpVal;
            for (i, uv) in self.upvals.iter_mut().enumerate() {
                *slots.add(i) = &mut **uv;
            }

            let frame_top = stack.add(self.base + self.frame_size);
            let ci = &mut *self.ci;
            ci.func = stack;
            ci.base = stack.add(self.base);
            ci.top = frame_top;
            ci.nresults = -1;

            let l = &mut *self.state;
            l.stack = stack;
            l.stack_last = stack.add(STACK_SLOTS - EXTRA_STACK);
            l.stacksize = STACK_SLOTS as i32;
            l.ci = &mut *self.ci;
            l.top = frame_top;
        }
    }

    pub fn proto(&self) -> *const Proto {
        &*self.proto
    }

    pub fn set_register(&mut self, reg: usize, value: TValue) {
        self.stack[self.base + reg] = value;
    }

    pub fn register(&self, reg: usize) -> TValue {
        self.stack[self.base + reg]
    }

    /// Set `L->top` to `&R(reg)`, as an open-result producer would
    pub fn set_top(&mut self, reg: usize) {
        let base = self.base;
        self.state.top = unsafe { self.stack.as_mut_ptr().add(base + reg) };
    }

    /// K(index) as the host sees it
    pub fn constant(&self, index: u32) -> TValue {
        self.constants[index as usize]
    }

    pub fn upvalue(&self, index: usize) -> TValue {
        unsafe { *self.upvals[index].v }
    }

    pub fn slot(&self, index: usize) -> TValue {
        self.stack[index]
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Stack index of `ci->top`, where `L->top` starts
    pub fn frame_top(&self) -> usize {
        self.base + self.frame_size
    }

    /// Run compiled code on this frame
    pub fn run(&mut self, compiled: &CompiledFunction) -> Outcome {
        reset_log();
        let state: *mut LuaState = &mut *self.state;
        let closure = &mut self.closure.head as *mut LClosure;
        let ret = unsafe { compiled.call(state, closure) };

        let stack = self.stack.as_ptr();
        let top = unsafe { self.state.top.offset_from(stack) } as usize;
        let n = ret.unsigned_abs() as usize;
        let results = self.stack[top - n..top].to_vec();
        let registers = self.stack[self.base..self.base + self.frame_size].to_vec();
        let (events, errors) = take_log();
        Outcome {
            ret,
            results,
            top,
            registers,
            events,
            errors,
        }
    }
}

/// Compile and run `program` on a fresh frame
pub fn run(program: &Program) -> Outcome {
    let mut compiler = compiler();
    let compiled = compiler.compile(program).expect("compile");
    Frame::new(program).run(&compiled)
}

/// Integer payloads of `values`
pub fn ints(values: &[TValue]) -> Vec<Option<i64>> {
    values.iter().map(|v| v.as_integer()).collect()
}

pub fn int(i: i64) -> TValue {
    TValue::integer(i)
}

pub fn float(n: f64) -> TValue {
    TValue::number(n)
}

pub fn is_float(v: &TValue) -> bool {
    v.tt == TAG_FLOAT
}

pub fn is_int(v: &TValue) -> bool {
    v.tt == TAG_INTEGER
}
