//! Arithmetic operation handlers for JIT compilation
//!
//! Handles: ADD, SUB, MUL, MOD, POW, DIV, IDIV
//!
//! Each instruction is lowered in up to three stages:
//!
//! 1. integer stage: both operands tagged integer, exact 64-bit result
//! 2. float stage: both operands numbers, at least one of them a float
//! 3. tagged-method stage: anything else, handed to the host
//!
//! Stages are pruned from what the constant pool already says about the
//! operands. POW and DIV always produce floats and never get an integer
//! stage.

use cranelift::prelude::*;

use crate::bytecode::{Literal, OpCode};
use crate::jit::codegen::CompileState;
use crate::jit::operand::{Operand, StaticKind};
use crate::jit::runtime::RuntimeFn;
use crate::jit::types::{JitError, JitResult, TAG_FLOAT, TAG_INTEGER};

/// Operands of a binary operator `R(A) := RK(B) op RK(C)`
#[derive(Debug, Clone, Copy)]
pub(super) struct Binary {
    pub op: OpCode,
    pub dest: u32,
    pub lhs: Operand,
    pub rhs: Operand,
    pub lhs_kind: StaticKind,
    pub rhs_kind: StaticKind,
}

impl Binary {
    pub fn decode(cs: &CompileState, op: OpCode) -> Self {
        let instr = cs.instr();
        let lhs = Operand::rk(instr.b());
        let rhs = Operand::rk(instr.c());
        let program = cs.program();
        Binary {
            op,
            dest: instr.a(),
            lhs,
            rhs,
            lhs_kind: lhs.static_kind(program),
            rhs_kind: rhs.static_kind(program),
        }
    }

    /// Operand addresses, taken once in the instruction's own block
    pub fn addresses(&self, cs: &mut CompileState) -> JitResult<(Value, Value)> {
        Ok((self.lhs.address(cs)?, self.rhs.address(cs)?))
    }

    /// Branch to `hit` when every dynamic operand carries `tag`, else `miss`
    pub fn emit_tag_chain(
        &self,
        cs: &mut CompileState,
        addrs: (Value, Value),
        tag: i32,
        hit: Block,
        miss: Block,
        label: &'static str,
    ) {
        let mut dynamic = Vec::with_capacity(2);
        if self.lhs_kind.is_dynamic() {
            dynamic.push(addrs.0);
        }
        if self.rhs_kind.is_dynamic() {
            dynamic.push(addrs.1);
        }

        if dynamic.is_empty() {
            cs.builder.ins().jump(hit, &[]);
            return;
        }

        let last = dynamic.len() - 1;
        for (i, addr) in dynamic.into_iter().enumerate() {
            let matches = cs.tag_is(addr, tag);
            let next = if i == last { hit } else { cs.create_sub_block(label) };
            cs.builder.ins().brif(matches, next, &[], miss, &[]);
            if i != last {
                cs.switch_to(next);
            }
        }
    }

    /// `R(A) := arith(RK(B), RK(C))` through the host, then a base reload
    pub fn emit_fallback(&self, cs: &mut CompileState, addrs: (Value, Value)) -> JitResult<()> {
        let event = self.op.metamethod().ok_or_else(|| {
            JitError::malformed(cs.curr(), format!("{} has no metamethod event", self.op))
        })?;

        let ra = cs.register_addr(self.dest);
        let event = cs.make_int(event as i64);
        let state = cs.state();
        cs.call(RuntimeFn::Arith, &[state, ra, addrs.0, addrs.1, event]);
        cs.update_stack();
        Ok(())
    }
}

/// Translator for one arithmetic instruction
#[derive(Debug, Clone, Copy)]
pub struct Arith {
    bin: Binary,
}

impl Arith {
    pub fn new(cs: &CompileState, op: OpCode) -> JitResult<Self> {
        if !op.is_arith() {
            return Err(JitError::malformed(
                cs.curr(),
                format!("{} is not an arithmetic operator", op),
            ));
        }
        Ok(Arith {
            bin: Binary::decode(cs, op),
        })
    }

    fn has_integer_stage(&self) -> bool {
        !self.bin.op.is_float_only()
            && self.bin.lhs_kind.may_be_integer()
            && self.bin.rhs_kind.may_be_integer()
    }

    fn has_float_stage(&self) -> bool {
        let (l, r) = (&self.bin.lhs_kind, &self.bin.rhs_kind);
        if !l.may_be_number() || !r.may_be_number() {
            return false;
        }
        // two integer constants never reach a float stage unless the result is a float
        self.bin.op.is_float_only() || l.known_integer().is_none() || r.known_integer().is_none()
    }

    /// MOD or IDIV by a constant zero: the host raises the error
    fn rejects_integer_pair(&self) -> bool {
        matches!(self.bin.op, OpCode::Mod | OpCode::IDiv) && self.bin.rhs_kind.known_integer() == Some(0)
    }

    pub fn compile(self, cs: &mut CompileState) -> JitResult<()> {
        let addrs = self.bin.addresses(cs)?;
        let successor = cs.next_block()?;
        let fallback = cs.create_sub_block("arith.tm");

        let float_stage = self.has_float_stage();
        if self.has_integer_stage() {
            let miss = if float_stage {
                cs.create_sub_block("arith.float")
            } else {
                fallback
            };
            self.emit_integer_stage(cs, addrs, miss, fallback, successor)?;
            if float_stage {
                cs.switch_to(miss);
            }
        }
        if float_stage {
            self.emit_float_stage(cs, addrs, fallback, successor)?;
        }
        if !cs.is_terminated() {
            cs.builder.ins().jump(fallback, &[]);
        }

        cs.switch_to(fallback);
        self.bin.emit_fallback(cs, addrs)
    }

    // =========================================================================
    // Integer stage
    // =========================================================================

    fn emit_integer_stage(
        &self,
        cs: &mut CompileState,
        addrs: (Value, Value),
        miss: Block,
        fallback: Block,
        successor: Block,
    ) -> JitResult<()> {
        if self.rejects_integer_pair() {
            self.bin.emit_tag_chain(cs, addrs, TAG_INTEGER, fallback, miss, "arith.int.check");
            return Ok(());
        }

        let body = cs.create_sub_block("arith.int");
        self.bin.emit_tag_chain(cs, addrs, TAG_INTEGER, body, miss, "arith.int.check");
        cs.switch_to(body);

        let m = int_operand(cs, self.bin.lhs_kind, addrs.0);
        let n = int_operand(cs, self.bin.rhs_kind, addrs.1);

        let result = match self.bin.op {
            OpCode::Add => cs.builder.ins().iadd(m, n),
            OpCode::Sub => cs.builder.ins().isub(m, n),
            OpCode::Mul => cs.builder.ins().imul(m, n),
            OpCode::Mod | OpCode::IDiv => {
                if self.bin.rhs_kind.known_integer().is_none() {
                    let is_zero = cs.builder.ins().icmp_imm(IntCC::Equal, n, 0);
                    let nonzero = cs.create_sub_block("arith.int.nonzero");
                    cs.builder.ins().brif(is_zero, fallback, &[], nonzero, &[]);
                    cs.switch_to(nonzero);
                }
                if self.bin.op == OpCode::Mod {
                    floor_mod(cs, m, n)
                } else {
                    floor_div(cs, m, n)
                }
            }
            op => {
                return Err(JitError::malformed(
                    cs.curr(),
                    format!("{} has no integer form", op),
                ))
            }
        };

        let dst = cs.register_addr(self.bin.dest);
        cs.store_int(dst, result);
        cs.builder.ins().jump(successor, &[]);
        Ok(())
    }

    // =========================================================================
    // Float stage
    // =========================================================================

    fn emit_float_stage(
        &self,
        cs: &mut CompileState,
        addrs: (Value, Value),
        fallback: Block,
        successor: Block,
    ) -> JitResult<()> {
        let a = float_operand(cs, 0, self.bin.lhs_kind, addrs.0, fallback)?;
        let b = float_operand(cs, 1, self.bin.rhs_kind, addrs.1, fallback)?;

        let result = match self.bin.op {
            OpCode::Add => cs.builder.ins().fadd(a, b),
            OpCode::Sub => cs.builder.ins().fsub(a, b),
            OpCode::Mul => cs.builder.ins().fmul(a, b),
            OpCode::Div => cs.builder.ins().fdiv(a, b),
            OpCode::IDiv => {
                let q = cs.builder.ins().fdiv(a, b);
                cs.builder.ins().floor(q)
            }
            OpCode::Mod => cs.call_value(RuntimeFn::FloatMod, &[a, b])?,
            OpCode::Pow => cs.call_value(RuntimeFn::FloatPow, &[a, b])?,
            op => {
                return Err(JitError::malformed(
                    cs.curr(),
                    format!("{} has no float form", op),
                ))
            }
        };

        let dst = cs.register_addr(self.bin.dest);
        cs.store_float(dst, result);
        cs.builder.ins().jump(successor, &[]);
        Ok(())
    }
}

/// Integer payload of an operand already known to be an integer
fn int_operand(cs: &mut CompileState, kind: StaticKind, addr: Value) -> Value {
    match kind.known_integer() {
        Some(i) => cs.make_i64(i),
        None => cs.load_int(addr),
    }
}

/// Float value of an operand, converting integers; other tags go to `fallback`
fn float_operand(
    cs: &mut CompileState,
    which: usize,
    kind: StaticKind,
    addr: Value,
    fallback: Block,
) -> JitResult<Value> {
    match kind {
        StaticKind::Known(Literal::Integer(i)) => Ok(cs.builder.ins().f64const(i as f64)),
        StaticKind::Known(Literal::Float(n)) => Ok(cs.builder.ins().f64const(n)),
        StaticKind::Known(lit) => Err(JitError::malformed(
            cs.curr(),
            format!("{:?} is not a number", lit),
        )),
        StaticKind::Dynamic => {
            let var = cs.scratch_float(which);
            let is_float = cs.tag_is(addr, TAG_FLOAT);
            let load = cs.create_sub_block("arith.float.load");
            let check_int = cs.create_sub_block("arith.float.int");
            let join = cs.create_sub_block("arith.float.join");
            cs.builder.ins().brif(is_float, load, &[], check_int, &[]);

            cs.switch_to(load);
            let f = cs.load_float(addr);
            cs.builder.def_var(var, f);
            cs.builder.ins().jump(join, &[]);

            cs.switch_to(check_int);
            let is_int = cs.tag_is(addr, TAG_INTEGER);
            let convert = cs.create_sub_block("arith.float.convert");
            cs.builder.ins().brif(is_int, convert, &[], fallback, &[]);

            cs.switch_to(convert);
            let i = cs.load_int(addr);
            let f = cs.builder.ins().fcvt_from_sint(types::F64, i);
            cs.builder.def_var(var, f);
            cs.builder.ins().jump(join, &[]);

            cs.switch_to(join);
            Ok(cs.builder.use_var(var))
        }
    }
}

/// `n` with -1 replaced by 1, so that `srem`/`sdiv` cannot overflow
fn safe_divisor(cs: &mut CompileState, n: Value) -> (Value, Value) {
    let is_minus_one = cs.builder.ins().icmp_imm(IntCC::Equal, n, -1);
    let one = cs.make_i64(1);
    let divisor = cs.builder.ins().select(is_minus_one, one, n);
    (divisor, is_minus_one)
}

/// Remainder and quotient disagree in sign with `n`
fn needs_floor_adjust(cs: &mut CompileState, r: Value, n: Value) -> Value {
    let nonzero = cs.builder.ins().icmp_imm(IntCC::NotEqual, r, 0);
    let mixed = cs.builder.ins().bxor(r, n);
    let negative = cs.builder.ins().icmp_imm(IntCC::SignedLessThan, mixed, 0);
    cs.builder.ins().band(nonzero, negative)
}

/// `luaV_mod` for a nonzero `n`
fn floor_mod(cs: &mut CompileState, m: Value, n: Value) -> Value {
    // m % -1 == 0, which m % 1 also gives
    let (divisor, _) = safe_divisor(cs, n);
    let r = cs.builder.ins().srem(m, divisor);
    let adjust = needs_floor_adjust(cs, r, n);
    let adjusted = cs.builder.ins().iadd(r, n);
    cs.builder.ins().select(adjust, adjusted, r)
}

/// `luaV_div` for a nonzero `n`
fn floor_div(cs: &mut CompileState, m: Value, n: Value) -> Value {
    let (divisor, is_minus_one) = safe_divisor(cs, n);
    let q = cs.builder.ins().sdiv(m, divisor);
    let r = cs.builder.ins().srem(m, divisor);
    let adjust = needs_floor_adjust(cs, r, n);
    let lowered = cs.builder.ins().iadd_imm(q, -1);
    let q = cs.builder.ins().select(adjust, lowered, q);
    // m // -1 wraps like 0 - m
    let negated = cs.builder.ins().ineg(m);
    cs.builder.ins().select(is_minus_one, negated, q)
}
