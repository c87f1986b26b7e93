//! Bitwise operation handlers
//!
//! Handles: BAND, BOR, BXOR, SHL, SHR
//!
//! Same shape as the arithmetic translator minus the float stage: both
//! operands are converted to integers (integers as is, floats only when they
//! hold an exact integer value in range) and anything that does not convert
//! goes to the tagged-method stage.

use cranelift::prelude::*;

use crate::bytecode::{Literal, OpCode};
use crate::jit::codegen::CompileState;
use crate::jit::operand::StaticKind;
use crate::jit::types::{JitError, JitResult, TAG_FLOAT, TAG_INTEGER};

use super::arithmetic::Binary;

/// 2^63 as a float, the first value above the integer range
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Exact integer value of a float, as `luaV_tointeger` in exact mode
fn float_to_integer(n: f64) -> Option<i64> {
    (n.fract() == 0.0 && n >= -TWO_POW_63 && n < TWO_POW_63).then_some(n as i64)
}

/// Translator for one bitwise instruction
#[derive(Debug, Clone, Copy)]
pub struct Bitwise {
    bin: Binary,
}

impl Bitwise {
    pub fn new(cs: &CompileState, op: OpCode) -> JitResult<Self> {
        if !op.is_bitwise() {
            return Err(JitError::malformed(
                cs.curr(),
                format!("{} is not a bitwise operator", op),
            ));
        }
        Ok(Bitwise {
            bin: Binary::decode(cs, op),
        })
    }

    /// An operand that can never convert rules out the integer stage
    fn convertible(kind: StaticKind) -> bool {
        match kind {
            StaticKind::Dynamic | StaticKind::Known(Literal::Integer(_)) => true,
            StaticKind::Known(Literal::Float(n)) => float_to_integer(n).is_some(),
            StaticKind::Known(_) => false,
        }
    }

    pub fn compile(self, cs: &mut CompileState) -> JitResult<()> {
        let addrs = self.bin.addresses(cs)?;
        let successor = cs.next_block()?;
        let fallback = cs.create_sub_block("bitwise.tm");

        if Self::convertible(self.bin.lhs_kind) && Self::convertible(self.bin.rhs_kind) {
            let x = int_operand(cs, 0, self.bin.lhs_kind, addrs.0, fallback)?;
            let y = int_operand(cs, 1, self.bin.rhs_kind, addrs.1, fallback)?;

            let result = match self.bin.op {
                OpCode::BAnd => cs.builder.ins().band(x, y),
                OpCode::BOr => cs.builder.ins().bor(x, y),
                OpCode::BXor => cs.builder.ins().bxor(x, y),
                OpCode::Shl => shift_left(cs, x, y),
                OpCode::Shr => {
                    let y = cs.builder.ins().ineg(y);
                    shift_left(cs, x, y)
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
        } else {
            cs.builder.ins().jump(fallback, &[]);
        }

        cs.switch_to(fallback);
        self.bin.emit_fallback(cs, addrs)
    }
}

/// Integer value of an operand, or a branch to `fallback`
fn int_operand(
    cs: &mut CompileState,
    which: usize,
    kind: StaticKind,
    addr: Value,
    fallback: Block,
) -> JitResult<Value> {
    match kind {
        StaticKind::Known(Literal::Integer(i)) => Ok(cs.make_i64(i)),
        StaticKind::Known(Literal::Float(n)) => match float_to_integer(n) {
            Some(i) => Ok(cs.make_i64(i)),
            None => Err(JitError::malformed(
                cs.curr(),
                format!("{} has no integer representation", n),
            )),
        },
        StaticKind::Known(lit) => Err(JitError::malformed(
            cs.curr(),
            format!("{:?} is not a number", lit),
        )),
        StaticKind::Dynamic => {
            let var = cs.scratch_int(which);
            let is_int = cs.tag_is(addr, TAG_INTEGER);
            let load = cs.create_sub_block("bitwise.int");
            let check_float = cs.create_sub_block("bitwise.float");
            let join = cs.create_sub_block("bitwise.join");
            cs.builder.ins().brif(is_int, load, &[], check_float, &[]);

            cs.switch_to(load);
            let i = cs.load_int(addr);
            cs.builder.def_var(var, i);
            cs.builder.ins().jump(join, &[]);

            cs.switch_to(check_float);
            let is_float = cs.tag_is(addr, TAG_FLOAT);
            let convert = cs.create_sub_block("bitwise.convert");
            cs.builder.ins().brif(is_float, convert, &[], fallback, &[]);

            // exact when the round trip is lossless and below 2^63
            cs.switch_to(convert);
            let f = cs.load_float(addr);
            let i = cs.builder.ins().fcvt_to_sint_sat(types::I64, f);
            let back = cs.builder.ins().fcvt_from_sint(types::F64, i);
            let exact = cs.builder.ins().fcmp(FloatCC::Equal, back, f);
            let limit = cs.builder.ins().f64const(TWO_POW_63);
            let in_range = cs.builder.ins().fcmp(FloatCC::LessThan, f, limit);
            let ok = cs.builder.ins().band(exact, in_range);
            cs.builder.def_var(var, i);
            cs.builder.ins().brif(ok, join, &[], fallback, &[]);

            cs.switch_to(join);
            Ok(cs.builder.use_var(var))
        }
    }
}

/// `luaV_shiftl`: shifts of 64 or more in either direction give 0
fn shift_left(cs: &mut CompileState, x: Value, y: Value) -> Value {
    let left = cs.builder.ins().ishl(x, y);
    let neg_y = cs.builder.ins().ineg(y);
    let right = cs.builder.ins().ushr(x, neg_y);
    let is_right = cs.builder.ins().icmp_imm(IntCC::SignedLessThan, y, 0);
    let shifted = cs.builder.ins().select(is_right, right, left);

    let too_far_left = cs.builder.ins().icmp_imm(IntCC::SignedGreaterThanOrEqual, y, 64);
    let too_far_right = cs.builder.ins().icmp_imm(IntCC::SignedLessThanOrEqual, y, -64);
    let out = cs.builder.ins().bor(too_far_left, too_far_right);
    let zero = cs.make_i64(0);
    cs.builder.ins().select(out, zero, shifted)
}
